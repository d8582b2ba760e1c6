//! One job, start to finish: preflight, record creation, sandbox
//! acquisition, the agent run, harvesting, finalization, release.
//!
//! The error boundary follows the record's lifecycle. Anything that goes
//! wrong before the record exists is an environment error the caller sees
//! directly; once the record is written, failures finalize it as `failed`
//! and come back as a normal [`JobOutcome`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{SandboxBackend, Settings};
use crate::driver::{drive, AttemptRecord, ContextFile, ContextPlacement, DriveRequest, RefusalPolicy};
use crate::jobs::{JobLedger, JobLog, JobRecord, JobStatus, LedgerError};
use crate::sandbox::{self, ReleaseOutcome, Sandbox, SandboxProfile};
use crate::shared::{append_engine_log, generate_job_id, now_secs, JobId, StatePaths};
use crate::tools::{harvest_workspace, pull_remote_store, push_remote_store, HarvestReport};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The job could not even start; no record was written.
    #[error("environment error: {0}")]
    Environment(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub prompt: String,
    pub context_files: Vec<PathBuf>,
    pub model_override: Option<String>,
    pub retry_model_override: Option<String>,
    pub timeout_override: Option<Duration>,
    /// Overrides the per-job workspace directory.
    pub working_dir: Option<PathBuf>,
    /// Suppresses destruction of a per-job sandbox on release.
    pub keep_sandbox: bool,
    /// Pre-allocated id, used when the caller detaches and respawns.
    pub job_id: Option<String>,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: String,
    pub status: JobStatus,
    pub log_file: PathBuf,
    pub failure_reason: Option<String>,
    pub attempts: Vec<AttemptRecord>,
    pub harvest: Option<HarvestReport>,
}

struct RunData {
    attempts: Vec<AttemptRecord>,
    succeeded: bool,
    harvest: Option<HarvestReport>,
    failure_reason: Option<String>,
}

pub struct Engine {
    settings: Settings,
    paths: StatePaths,
}

impl Engine {
    pub fn new(settings: Settings, paths: StatePaths) -> Self {
        Self { settings, paths }
    }

    pub fn run_job(&self, request: &JobRequest) -> Result<JobOutcome, EngineError> {
        sandbox::preflight(&self.settings)
            .map_err(|err| EngineError::Environment(err.to_string()))?;
        if request.prompt.trim().is_empty() {
            return Err(EngineError::Environment(
                "prompt must not be empty".to_string(),
            ));
        }
        for file in &request.context_files {
            if !file.is_file() {
                return Err(EngineError::Environment(format!(
                    "context file {} does not exist",
                    file.display()
                )));
            }
        }

        let now = now_secs();
        let ledger = JobLedger::new(self.paths.root.clone());
        let job_id = match &request.job_id {
            Some(id) => JobId::parse(id)
                .map_err(EngineError::Environment)?
                .as_str()
                .to_string(),
            None => {
                // A colliding id is regenerated a few times; a persistent
                // collision still trips the ledger's duplicate check.
                let mut candidate = generate_job_id(now).map_err(EngineError::Environment)?;
                for _ in 0..3 {
                    if !ledger.record_exists(&candidate) {
                        break;
                    }
                    candidate = generate_job_id(now).map_err(EngineError::Environment)?;
                }
                candidate
            }
        };

        let store = self.settings.resolve_tool_store(&self.paths);
        if self.settings.tools.remote.is_some() {
            let report = pull_remote_store(&store, &self.settings.tools);
            if !report.steps.is_empty() {
                let level = if report.all_ok() { "info" } else { "warn" };
                append_engine_log(&self.paths.root, level, "tools.pull", &report.summary());
            }
        }

        let workspace = match &request.working_dir {
            Some(dir) => dir.clone(),
            None => self.paths.job_workspace_path(&job_id),
        };
        fs::create_dir_all(&workspace).map_err(|err| {
            EngineError::Environment(format!(
                "failed to create workspace {}: {err}",
                workspace.display()
            ))
        })?;

        let model = request
            .model_override
            .clone()
            .unwrap_or_else(|| self.settings.agent.model.clone());
        let retry_model = request
            .retry_model_override
            .clone()
            .or_else(|| self.settings.agent.retry_model.clone());
        let timeout = request
            .timeout_override
            .unwrap_or_else(|| self.settings.agent.attempt_timeout());

        let log_file = self.paths.job_log_path(&job_id);
        let record = JobRecord {
            id: job_id.clone(),
            prompt: request.prompt.clone(),
            status: JobStatus::Running,
            started_at: now,
            ended_at: None,
            log_file: log_file.clone(),
            pid: Some(std::process::id()),
            model: model.clone(),
            retry_model: retry_model.clone(),
            sandbox: self.sandbox_label(),
            workspace: workspace.clone(),
            terminal_reason: None,
        };
        ledger.create(&record)?;
        append_engine_log(
            &self.paths.root,
            "info",
            "job.start",
            &format!("job {job_id} started with model {model}"),
        );

        let log = JobLog::new(&log_file);
        let _ = log.append(&format!("job {job_id} created (model {model})"));

        let (run, sandbox) = self.execute(
            request,
            &log,
            &workspace,
            &store,
            &job_id,
            &model,
            retry_model.as_deref(),
            timeout,
        );
        let (data, reason) = match run {
            Ok(data) => {
                let reason = data.failure_reason.clone();
                (data, reason)
            }
            Err(detail) => {
                let _ = log.append(&format!("job failed: {detail}"));
                (
                    RunData {
                        attempts: Vec::new(),
                        succeeded: false,
                        harvest: None,
                        failure_reason: Some(detail.clone()),
                    },
                    Some(detail),
                )
            }
        };

        let status = if data.succeeded {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        // The record turns terminal before the sandbox is released; a
        // finalization error is deferred so release still runs.
        let finalized = ledger.update_status(&job_id, status, Some(now_secs()), reason.clone());
        let _ = log.append(&format!("job {job_id} {status}"));
        append_engine_log(
            &self.paths.root,
            if data.succeeded { "info" } else { "warn" },
            "job.finish",
            &format!("job {job_id} {status}"),
        );
        if let Some(sandbox) = sandbox {
            self.release_sandbox(sandbox, request.keep_sandbox, &job_id, &log);
        }
        finalized?;

        Ok(JobOutcome {
            job_id,
            status,
            log_file,
            failure_reason: reason,
            attempts: data.attempts,
            harvest: data.harvest,
        })
    }

    fn sandbox_label(&self) -> String {
        match self.settings.sandbox.backend {
            SandboxBackend::LocalImage => {
                format!("image {}", self.settings.sandbox.local.image_tag)
            }
            SandboxBackend::Remote => "remote sandbox".to_string(),
        }
    }

    /// Acquires the sandbox and runs the job inside it. The handle comes
    /// back unreleased so the caller can finalize the record first.
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        request: &JobRequest,
        log: &JobLog,
        workspace: &Path,
        store: &Path,
        job_id: &str,
        model: &str,
        retry_model: Option<&str>,
        timeout: Duration,
    ) -> (Result<RunData, String>, Option<Box<dyn Sandbox>>) {
        let sandbox = match sandbox::acquire(&self.settings, &self.paths, workspace, Some(store)) {
            Ok(sandbox) => sandbox,
            Err(err) => return (Err(format!("sandbox provisioning failed: {err}")), None),
        };
        let _ = log.append(&format!("sandbox ready: {}", sandbox.describe()));

        let result = self.run_inside(
            sandbox.as_ref(),
            request,
            log,
            workspace,
            store,
            job_id,
            model,
            retry_model,
            timeout,
        );
        (result, Some(sandbox))
    }

    /// Releases the sandbox once the record is finalized. A failed teardown
    /// is logged but does not change the job's own outcome.
    fn release_sandbox(&self, sandbox: Box<dyn Sandbox>, keep: bool, job_id: &str, log: &JobLog) {
        match sandbox.release(keep) {
            ReleaseOutcome::Retained => {
                let _ = log.append("sandbox retained");
            }
            ReleaseOutcome::Destroyed => {
                let _ = log.append("sandbox destroyed");
            }
            ReleaseOutcome::DestroyFailed { detail } => {
                let _ = log.append(&format!("sandbox destroy failed: {detail}"));
                append_engine_log(
                    &self.paths.root,
                    "warn",
                    "sandbox.destroy_failed",
                    &format!("job {job_id}: {detail}"),
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_inside(
        &self,
        sandbox: &dyn Sandbox,
        request: &JobRequest,
        log: &JobLog,
        workspace: &Path,
        store: &Path,
        job_id: &str,
        model: &str,
        retry_model: Option<&str>,
        timeout: Duration,
    ) -> Result<RunData, String> {
        let profile = sandbox.profile();

        let context = self.prepare_context(sandbox, &profile, &request.context_files, log)?;
        if !profile.shared_filesystem {
            self.stage_tools(sandbox, &profile, store, log);
        }

        let policy = RefusalPolicy::from_signatures(&self.settings.refusal.signatures);
        let drive_request = DriveRequest {
            task_prompt: &request.prompt,
            context: &context,
            model,
            retry_model,
            agent_binary: &self.settings.agent.binary,
            attempt_timeout: timeout,
        };
        let outcome = drive(sandbox, &drive_request, &policy, log)
            .map_err(|err| format!("agent run failed: {err}"))?;

        let failure_reason = if outcome.succeeded {
            None
        } else {
            let last = outcome.final_attempt();
            Some(if last.timed_out {
                format!("agent timed out after {}s", timeout.as_secs())
            } else {
                format!("agent exited with code {}", last.exit_code)
            })
        };

        let harvest = if outcome.succeeded {
            if !profile.shared_filesystem {
                self.retrieve_outputs(sandbox, &profile, workspace, log);
            }
            self.harvest_and_sync(workspace, store, job_id, log)
        } else {
            None
        };

        Ok(RunData {
            attempts: outcome.attempts,
            succeeded: outcome.succeeded,
            harvest,
            failure_reason,
        })
    }

    /// Reads each context file once and decides its placement: inlined
    /// text for shared-filesystem sandboxes, an uploaded copy otherwise.
    /// Transfer failures here are fatal for the job.
    fn prepare_context(
        &self,
        sandbox: &dyn Sandbox,
        profile: &SandboxProfile,
        files: &[PathBuf],
        log: &JobLog,
    ) -> Result<Vec<ContextFile>, String> {
        let mut context = Vec::new();
        for path in files {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| format!("context file {} has no usable name", path.display()))?
                .to_string();
            let remote_path = format!(
                "{}/context/{}",
                profile.workspace_dir.trim_end_matches('/'),
                name
            );

            let inline_text = if profile.shared_filesystem {
                fs::read(path)
                    .map_err(|err| format!("failed to read context file {}: {err}", path.display()))
                    .map(|bytes| String::from_utf8(bytes).ok())?
            } else {
                None
            };

            let placement = match inline_text {
                Some(content) => ContextPlacement::Inline { content },
                None => {
                    sandbox.push_file(path, &remote_path).map_err(|err| {
                        format!("context transfer failed for {name}: {err}")
                    })?;
                    let _ = log.append(&format!("context file {name} uploaded to {remote_path}"));
                    ContextPlacement::Uploaded { remote_path }
                }
            };
            context.push(ContextFile { name, placement });
        }
        Ok(context)
    }

    /// Copies the tool store into a non-shared sandbox so the agent can
    /// reuse earlier scripts. Best effort: a missing tool is a weaker run,
    /// not a failed job.
    fn stage_tools(
        &self,
        sandbox: &dyn Sandbox,
        profile: &SandboxProfile,
        store: &Path,
        log: &JobLog,
    ) {
        let Some(tools_dir) = profile.tools_dir.as_deref() else {
            return;
        };
        let entries = match fs::read_dir(store) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let is_file = entry
                .file_type()
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let remote = format!("{}/{}", tools_dir.trim_end_matches('/'), name);
            if let Err(err) = sandbox.push_file(&entry.path(), &remote) {
                let _ = log.append(&format!("tool staging failed for {name}: {err}"));
            }
        }
    }

    /// Pulls the agent's top-level output files back to the host workspace
    /// so harvesting sees them. Only allowlisted names are transferred.
    fn retrieve_outputs(
        &self,
        sandbox: &dyn Sandbox,
        profile: &SandboxProfile,
        workspace: &Path,
        log: &JobLog,
    ) {
        let names = match sandbox.workspace_listing() {
            Ok(names) => names,
            Err(err) => {
                let _ = log.append(&format!("workspace listing failed, skipping harvest: {err}"));
                return;
            }
        };
        let tools = &self.settings.tools;
        for name in names {
            let excluded = tools
                .exclude_patterns
                .iter()
                .any(|pattern| !pattern.is_empty() && name.contains(pattern.as_str()));
            let allowed = Path::new(&name)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| {
                    tools
                        .allowed_extensions
                        .iter()
                        .any(|candidate| candidate.eq_ignore_ascii_case(ext))
                })
                .unwrap_or(false);
            if excluded || !allowed {
                continue;
            }
            let remote = format!("{}/{}", profile.workspace_dir.trim_end_matches('/'), name);
            if let Err(err) = sandbox.pull_file(&remote, &workspace.join(&name)) {
                let _ = log.append(&format!("output retrieval failed for {name}: {err}"));
            }
        }
    }

    fn harvest_and_sync(
        &self,
        workspace: &Path,
        store: &Path,
        job_id: &str,
        log: &JobLog,
    ) -> Option<HarvestReport> {
        match harvest_workspace(workspace, store, &self.settings.tools) {
            Ok(report) => {
                let _ = log.append(&report.summary());
                if !report.harvested.is_empty() && self.settings.tools.remote.is_some() {
                    let sync = push_remote_store(
                        store,
                        &self.settings.tools,
                        &format!("add tools from job {job_id}"),
                    );
                    let _ = log.append(&format!("tool sync: {}", sync.summary()));
                    let level = if sync.all_ok() { "info" } else { "warn" };
                    append_engine_log(&self.paths.root, level, "tools.push", &sync.summary());
                }
                Some(report)
            }
            Err(err) => {
                let _ = log.append(&format!("harvest failed: {err}"));
                append_engine_log(
                    &self.paths.root,
                    "warn",
                    "tools.harvest_failed",
                    &format!("job {job_id}: {err}"),
                );
                None
            }
        }
    }
}
