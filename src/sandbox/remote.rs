//! Remote ephemeral sandbox backed by an HTTP provider.
//!
//! The provider contract is deliberately small: create a sandbox, execute
//! one shell command line in it, delete it. Everything else (workspace
//! layout, agent install, file transfer) is built on top of `execute`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::{RemoteSandboxSettings, SandboxBackend, Settings};
use crate::exec::{shell_escape, shell_join, CommandOutput};
use crate::sandbox::{
    ReleaseOutcome, ResetOutcome, Sandbox, SandboxCommand, SandboxError, SandboxProfile,
};
use crate::shared::validate_identifier_value;
use crate::transfer::{pull_file, push_file, ChannelOutput, CommandChannel};

const API_BASE_ENV: &str = "SANDPIPER_SANDBOX_API_BASE";
const API_CALL_TIMEOUT: Duration = Duration::from_secs(60);
const TRANSFER_STEP_TIMEOUT: Duration = Duration::from_secs(120);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(900);
/// Slack on top of the provider-enforced command timeout so the HTTP call
/// does not give up before the provider reports back.
const EXEC_HTTP_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ProviderClient {
    api_base: String,
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateSandboxData {
    #[serde(alias = "sandboxId", alias = "sandbox_id")]
    id: String,
}

/// Execution result as the provider reports it. Field spellings vary
/// between providers, so the common variants are accepted as aliases.
#[derive(Debug, Clone, Deserialize)]
struct ExecData {
    #[serde(alias = "exitCode")]
    exit_code: i32,
    #[serde(default, alias = "result")]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

impl ProviderClient {
    pub fn new(settings: &RemoteSandboxSettings) -> Result<Self, SandboxError> {
        let api_base = std::env::var(API_BASE_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| settings.api_base.clone());
        if api_base.trim().is_empty() {
            return Err(SandboxError::Config {
                detail: "sandbox.remote.api_base is not configured".to_string(),
            });
        }
        let token = if settings.api_token_env.trim().is_empty() {
            None
        } else {
            match std::env::var(&settings.api_token_env) {
                Ok(value) if !value.trim().is_empty() => Some(value),
                _ => {
                    return Err(SandboxError::Config {
                        detail: format!(
                            "environment variable {} is not set",
                            settings.api_token_env
                        ),
                    })
                }
            }
        };
        Ok(Self { api_base, token })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    pub fn create_sandbox(&self) -> Result<String, SandboxError> {
        let url = self.endpoint("sandboxes");
        let response = self
            .authorize(ureq::post(&url).timeout(API_CALL_TIMEOUT))
            .send_json(json!({}))
            .map_err(|e| SandboxError::Api {
                detail: e.to_string(),
            })?;
        let data: CreateSandboxData =
            response.into_json().map_err(|e| SandboxError::ApiContract {
                detail: e.to_string(),
            })?;
        if data.id.trim().is_empty() {
            return Err(SandboxError::ApiContract {
                detail: "provider returned an empty sandbox id".to_string(),
            });
        }
        Ok(data.id)
    }

    pub fn execute(
        &self,
        sandbox_id: &str,
        command_text: &str,
        timeout: Duration,
    ) -> Result<ChannelOutput, SandboxError> {
        let url = self.endpoint(&format!(
            "sandboxes/{}/exec",
            urlencoding::encode(sandbox_id)
        ));
        let body = json!({
            "command": command_text,
            "timeoutMs": timeout.as_millis() as u64,
        });
        let response = self
            .authorize(ureq::post(&url).timeout(timeout + EXEC_HTTP_GRACE))
            .send_json(body)
            .map_err(|e| SandboxError::Api {
                detail: e.to_string(),
            })?;
        let data: ExecData = response.into_json().map_err(|e| SandboxError::ApiContract {
            detail: e.to_string(),
        })?;
        Ok(ChannelOutput {
            exit_code: data.exit_code,
            stdout: data.stdout,
            stderr: data.stderr,
        })
    }

    pub fn delete_sandbox(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        let url = self.endpoint(&format!("sandboxes/{}", urlencoding::encode(sandbox_id)));
        self.authorize(ureq::delete(&url).timeout(API_CALL_TIMEOUT))
            .call()
            .map_err(|e| SandboxError::Api {
                detail: e.to_string(),
            })?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct RemoteSandbox {
    client: ProviderClient,
    sandbox_id: String,
    workspace_dir: String,
    agent_binary: String,
}

impl RemoteSandbox {
    /// Creates and prepares a sandbox: provider create call, workspace
    /// directory, agent runtime install. A sandbox that fails preparation
    /// is deleted on a best-effort basis before the error is returned.
    pub fn create(settings: &Settings) -> Result<Self, SandboxError> {
        let remote = &settings.sandbox.remote;
        let client = ProviderClient::new(remote)?;
        let sandbox_id = client.create_sandbox()?;
        let sandbox = Self {
            client,
            sandbox_id,
            workspace_dir: remote.workspace_dir.trim_end_matches('/').to_string(),
            agent_binary: settings.agent.binary.clone(),
        };
        if let Err(err) = sandbox.prepare(&remote.install_command) {
            let _ = sandbox.client.delete_sandbox(&sandbox.sandbox_id);
            return Err(err);
        }
        Ok(sandbox)
    }

    pub fn id(&self) -> &str {
        &self.sandbox_id
    }

    fn prepare(&self, install_command: &str) -> Result<(), SandboxError> {
        let mkdir = format!("mkdir -p {}", shell_escape(&self.workspace_dir));
        let output = self.run_raw(&mkdir, API_CALL_TIMEOUT)?;
        if !output.success() {
            return Err(SandboxError::Install {
                detail: format!(
                    "failed to create workspace {}: {}",
                    self.workspace_dir,
                    output.failure_summary()
                ),
            });
        }
        let install = install_command.trim();
        if install.is_empty() {
            return Ok(());
        }
        let output = self.run_raw(install, INSTALL_TIMEOUT)?;
        if !output.success() {
            return Err(SandboxError::Install {
                detail: output.failure_summary(),
            });
        }
        Ok(())
    }

    fn run_raw(
        &self,
        command_text: &str,
        timeout: Duration,
    ) -> Result<ChannelOutput, SandboxError> {
        self.client.execute(&self.sandbox_id, command_text, timeout)
    }
}

impl Sandbox for RemoteSandbox {
    fn kind(&self) -> SandboxBackend {
        SandboxBackend::Remote
    }

    fn describe(&self) -> String {
        format!("remote sandbox {}", self.sandbox_id)
    }

    fn profile(&self) -> SandboxProfile {
        SandboxProfile {
            workspace_dir: self.workspace_dir.clone(),
            tools_dir: Some(format!("{}/tools", self.workspace_dir)),
            shared_filesystem: false,
        }
    }

    fn exec(&self, command: &SandboxCommand) -> Result<CommandOutput, SandboxError> {
        let mut argv = Vec::with_capacity(command.args.len() + 1);
        argv.push(command.program.clone());
        argv.extend(command.args.iter().cloned());
        let text = format!(
            "cd {} && {}",
            shell_escape(&self.workspace_dir),
            shell_join(&argv)
        );
        let output = self.run_raw(&text, command.timeout)?;
        Ok(CommandOutput {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            timed_out: false,
        })
    }

    fn push_file(&self, local: &Path, remote: &str) -> Result<(), SandboxError> {
        Ok(push_file(self, local, remote)?)
    }

    fn pull_file(&self, remote: &str, local: &Path) -> Result<(), SandboxError> {
        Ok(pull_file(self, remote, local)?)
    }

    fn workspace_listing(&self) -> Result<Vec<String>, SandboxError> {
        let command = format!("ls -1Ap {}", shell_escape(&self.workspace_dir));
        let output = self.run_raw(&command, API_CALL_TIMEOUT)?;
        if !output.success() {
            return Err(SandboxError::Listing {
                detail: output.failure_summary(),
            });
        }
        let mut names: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.ends_with('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    fn reset_agent_state(&self) -> ResetOutcome {
        let name = match self.agent_binary.rsplit('/').next() {
            Some(name) if !name.is_empty() => name,
            _ => {
                return ResetOutcome::Failed {
                    detail: format!("agent binary `{}` has no usable name", self.agent_binary),
                }
            }
        };
        if validate_identifier_value("agent binary name", name).is_err() {
            return ResetOutcome::Failed {
                detail: format!("agent binary name `{name}` is not safe to expand into a cleanup command"),
            };
        }
        let command = format!(
            "rm -rf \"$HOME/.{name}\" \"$HOME/.config/{name}\" {}",
            shell_escape(&format!("{}/.{name}", self.workspace_dir))
        );
        match self.run_raw(&command, API_CALL_TIMEOUT) {
            Ok(output) if output.success() => ResetOutcome::Cleared,
            Ok(output) => ResetOutcome::Failed {
                detail: output.failure_summary(),
            },
            Err(err) => ResetOutcome::Failed {
                detail: err.to_string(),
            },
        }
    }

    fn release(self: Box<Self>, keep: bool) -> ReleaseOutcome {
        if keep {
            return ReleaseOutcome::Retained;
        }
        match self.client.delete_sandbox(&self.sandbox_id) {
            Ok(()) => ReleaseOutcome::Destroyed,
            Err(err) => ReleaseOutcome::DestroyFailed {
                detail: err.to_string(),
            },
        }
    }
}

impl CommandChannel for RemoteSandbox {
    fn execute(&self, command: &str) -> Result<ChannelOutput, String> {
        self.run_raw(command, TRANSFER_STEP_TIMEOUT)
            .map_err(|err| err.to_string())
    }
}
