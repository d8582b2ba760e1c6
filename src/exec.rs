use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub mod escape;
pub mod gateway;

pub use escape::{shell_escape, shell_join};
pub use gateway::run_command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdinPolicy {
    #[default]
    Null,
    Inherit,
}

#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env_overrides: BTreeMap<String, String>,
    pub stdin: StdinPolicy,
    pub timeout: Duration,
}

impl ExecRequest {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            env_overrides: BTreeMap::new(),
            stdin: StdinPolicy::Null,
            timeout,
        }
    }

    /// Loggable form of the invocation. Environment overrides are
    /// deliberately excluded so logs never carry credential values.
    pub fn command_form(&self) -> String {
        if self.args.is_empty() {
            return self.program.clone();
        }
        format!("{} {}", self.program, self.args.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Stdout and stderr in arrival order approximation, stdout first.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        if self.stdout.is_empty() {
            return self.stderr.clone();
        }
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// One-line reason for a failed command, preferring stderr.
    pub fn failure_summary(&self) -> String {
        if self.timed_out {
            return "command timed out".to_string();
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exit code {}", self.exit_code)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("process io failure for `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(program: &str, source: std::io::Error) -> ExecError {
    ExecError::Io {
        program: program.to_string(),
        source,
    }
}
