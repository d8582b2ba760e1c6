use super::ConfigError;
use crate::shared::StatePaths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SandboxBackend {
    #[default]
    LocalImage,
    Remote,
}

impl SandboxBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalImage => "local_image",
            Self::Remote => "remote",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local_image" | "local" => Ok(Self::LocalImage),
            "remote" => Ok(Self::Remote),
            _ => Err("backend must be one of: local, remote".to_string()),
        }
    }
}

impl std::fmt::Display for SandboxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_binary")]
    pub binary: String,
    #[serde(default = "default_primary_model")]
    pub model: String,
    #[serde(default)]
    pub retry_model: Option<String>,
    #[serde(default = "default_attempt_timeout_seconds")]
    pub attempt_timeout_seconds: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            binary: default_agent_binary(),
            model: default_primary_model(),
            retry_model: None,
            attempt_timeout_seconds: default_attempt_timeout_seconds(),
        }
    }
}

impl AgentSettings {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalSandboxSettings {
    #[serde(default = "default_image_tag")]
    pub image_tag: String,
    /// Directory holding the Dockerfile; defaults to `<state-root>/image`.
    #[serde(default)]
    pub build_context: Option<PathBuf>,
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,
}

impl Default for LocalSandboxSettings {
    fn default() -> Self {
        Self {
            image_tag: default_image_tag(),
            build_context: None,
            docker_binary: default_docker_binary(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteSandboxSettings {
    #[serde(default)]
    pub api_base: String,
    /// Name of the environment variable holding the provider token.
    #[serde(default)]
    pub api_token_env: String,
    #[serde(default = "default_install_command")]
    pub install_command: String,
    #[serde(default = "default_remote_workspace_dir")]
    pub workspace_dir: String,
}

impl Default for RemoteSandboxSettings {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_token_env: String::new(),
            install_command: default_install_command(),
            workspace_dir: default_remote_workspace_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SandboxSettings {
    #[serde(default)]
    pub backend: SandboxBackend,
    #[serde(default)]
    pub local: LocalSandboxSettings,
    #[serde(default)]
    pub remote: RemoteSandboxSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefusalSettings {
    /// Phrase -> enabled. Detection ignores disabled phrases; the list can
    /// grow without touching the retry logic.
    #[serde(default = "default_refusal_signatures")]
    pub signatures: BTreeMap<String, bool>,
}

impl Default for RefusalSettings {
    fn default() -> Self {
        Self {
            signatures: default_refusal_signatures(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsSettings {
    /// Defaults to `<state-root>/tools`.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Git URL of a shared store; unset disables sync.
    #[serde(default)]
    pub remote: Option<String>,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
}

impl Default for ToolsSettings {
    fn default() -> Self {
        Self {
            store_path: None,
            remote: None,
            allowed_extensions: default_allowed_extensions(),
            exclude_patterns: default_exclude_patterns(),
            git_binary: default_git_binary(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub refusal: RefusalSettings,
    #[serde(default)]
    pub tools: ToolsSettings,
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.binary.trim().is_empty() {
            return Err(ConfigError::Settings(
                "agent.binary must be non-empty".to_string(),
            ));
        }
        if self.agent.model.trim().is_empty() {
            return Err(ConfigError::Settings(
                "agent.model must be non-empty".to_string(),
            ));
        }
        if let Some(retry_model) = &self.agent.retry_model {
            if retry_model.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "agent.retry_model must be non-empty when set".to_string(),
                ));
            }
        }
        if self.agent.attempt_timeout_seconds == 0 {
            return Err(ConfigError::Settings(
                "agent.attempt_timeout_seconds must be positive".to_string(),
            ));
        }

        let tag = &self.sandbox.local.image_tag;
        if tag.trim().is_empty() || tag.chars().any(char::is_whitespace) {
            return Err(ConfigError::Settings(
                "sandbox.local.image_tag must be a non-empty tag without whitespace".to_string(),
            ));
        }
        if self.sandbox.local.docker_binary.trim().is_empty() {
            return Err(ConfigError::Settings(
                "sandbox.local.docker_binary must be non-empty".to_string(),
            ));
        }

        if self.sandbox.backend == SandboxBackend::Remote {
            if self.sandbox.remote.api_base.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "sandbox.remote.api_base is required for the remote backend".to_string(),
                ));
            }
            if !self.sandbox.remote.workspace_dir.starts_with('/') {
                return Err(ConfigError::Settings(
                    "sandbox.remote.workspace_dir must be an absolute path".to_string(),
                ));
            }
        }

        for phrase in self.refusal.signatures.keys() {
            if phrase.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "refusal.signatures keys must be non-empty phrases".to_string(),
                ));
            }
        }

        for extension in &self.tools.allowed_extensions {
            if extension.trim().is_empty() || extension.starts_with('.') {
                return Err(ConfigError::Settings(format!(
                    "tools.allowed_extensions entries must be bare extensions, got `{extension}`"
                )));
            }
        }
        if self.tools.git_binary.trim().is_empty() {
            return Err(ConfigError::Settings(
                "tools.git_binary must be non-empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn resolve_build_context(&self, paths: &StatePaths) -> PathBuf {
        self.sandbox
            .local
            .build_context
            .clone()
            .unwrap_or_else(|| paths.image_context_dir())
    }

    pub fn resolve_tool_store(&self, paths: &StatePaths) -> PathBuf {
        self.tools
            .store_path
            .clone()
            .unwrap_or_else(|| paths.tools_dir())
    }
}

fn default_agent_binary() -> String {
    "claude".to_string()
}

fn default_primary_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_attempt_timeout_seconds() -> u64 {
    3600
}

fn default_image_tag() -> String {
    "sandpiper-sandbox".to_string()
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_install_command() -> String {
    "npm install -g @anthropic-ai/claude-code".to_string()
}

fn default_remote_workspace_dir() -> String {
    "/workspace".to_string()
}

fn default_git_binary() -> String {
    "git".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    ["py", "sh", "rb", "pl", "js"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    ["runner_", ".git", "jobs"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_refusal_signatures() -> BTreeMap<String, bool> {
    [
        "i can't help",
        "i cannot help",
        "i can't assist",
        "i cannot assist",
        "can't fulfill this request",
        "cannot fulfill this request",
        "against my guidelines",
        "terms of service",
        "unable to assist with",
    ]
    .into_iter()
    .map(|phrase| (phrase.to_string(), true))
    .collect()
}
