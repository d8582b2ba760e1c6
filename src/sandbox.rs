//! Execution environments for agent runs.
//!
//! Both backends sit behind one `Sandbox` trait so the driver and engine
//! never branch on which variant they hold. Backend differences the caller
//! must care about (is the workspace a shared mount, where do tools live)
//! are surfaced as data through [`SandboxProfile`].

use std::path::Path;
use std::time::Duration;

use crate::config::{SandboxBackend, Settings};
use crate::exec::{CommandOutput, ExecError};
use crate::shared::StatePaths;
use crate::transfer::TransferError;

pub mod local;
pub mod remote;

pub use local::{
    build_image, ensure_image_usable, probe_image, runtime_available, ImageReadiness, ImageState,
};
pub use remote::{ProviderClient, RemoteSandbox};

/// One command to run inside a sandbox. Arguments are passed as an argv
/// vector; each backend is responsible for any shell quoting its transport
/// needs.
#[derive(Debug, Clone)]
pub struct SandboxCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl SandboxCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

/// Facts about an acquired sandbox that change how the caller prepares a
/// job. `shared_filesystem` means files placed in the job's host workspace
/// are visible at `workspace_dir` without any transfer step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxProfile {
    pub workspace_dir: String,
    pub tools_dir: Option<String>,
    pub shared_filesystem: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Nothing to clear; every run already starts from a blank slate.
    Clean,
    Cleared,
    Failed { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Retained,
    Destroyed,
    DestroyFailed { detail: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox runtime `{binary}` is unavailable: {detail}")]
    RuntimeUnavailable { binary: String, detail: String },
    #[error("failed to build sandbox image `{tag}`: {detail}")]
    ImageBuild { tag: String, detail: String },
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sandbox filesystem error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to list sandbox workspace: {detail}")]
    Listing { detail: String },
    #[error("sandbox provider api error: {detail}")]
    Api { detail: String },
    #[error("unexpected sandbox provider response: {detail}")]
    ApiContract { detail: String },
    #[error("agent install failed in sandbox: {detail}")]
    Install { detail: String },
    #[error("sandbox configuration error: {detail}")]
    Config { detail: String },
}

pub trait Sandbox {
    fn kind(&self) -> SandboxBackend;

    /// Short human-readable identity for records and logs.
    fn describe(&self) -> String;

    fn profile(&self) -> SandboxProfile;

    /// Runs a command to completion. A non-zero exit is a normal result,
    /// not an error; `Err` means the command could not be carried at all.
    fn exec(&self, command: &SandboxCommand) -> Result<CommandOutput, SandboxError>;

    fn push_file(&self, local: &Path, remote: &str) -> Result<(), SandboxError>;

    fn pull_file(&self, remote: &str, local: &Path) -> Result<(), SandboxError>;

    /// Plain file names (no directories) at the top level of the sandbox
    /// workspace.
    fn workspace_listing(&self) -> Result<Vec<String>, SandboxError>;

    /// Clears agent-local state between retry attempts, best effort.
    fn reset_agent_state(&self) -> ResetOutcome;

    /// Gives the sandbox back. `keep` suppresses destruction of resources
    /// that would otherwise be torn down.
    fn release(self: Box<Self>, keep: bool) -> ReleaseOutcome;
}

/// Environment check run before any job record exists: is the configured
/// backend reachable enough to try provisioning at all.
pub fn preflight(settings: &Settings) -> Result<(), SandboxError> {
    match settings.sandbox.backend {
        SandboxBackend::LocalImage => runtime_available(&settings.sandbox.local.docker_binary),
        SandboxBackend::Remote => ProviderClient::new(&settings.sandbox.remote).map(|_| ()),
    }
}

/// Front door used by the engine: returns a ready-to-use sandbox for the
/// configured backend or a provisioning error.
pub fn acquire(
    settings: &Settings,
    paths: &StatePaths,
    workspace: &Path,
    tool_store: Option<&Path>,
) -> Result<Box<dyn Sandbox>, SandboxError> {
    match settings.sandbox.backend {
        SandboxBackend::LocalImage => {
            let sandbox = local::LocalImageSandbox::acquire(settings, paths, workspace, tool_store)?;
            Ok(Box::new(sandbox))
        }
        SandboxBackend::Remote => {
            let sandbox = RemoteSandbox::create(settings)?;
            Ok(Box::new(sandbox))
        }
    }
}
