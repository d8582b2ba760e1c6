//! Git synchronization of the tool store with a shared remote.
//!
//! Every step is non-fatal: the job that triggered the sync has already
//! finished, so failures are recorded in the report for logging and the
//! next job simply tries again.

use std::path::Path;
use std::time::Duration;

use crate::config::ToolsSettings;
use crate::exec::{run_command, ExecRequest};

const GIT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStep {
    pub name: &'static str,
    pub ok: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub steps: Vec<SyncStep>,
}

impl SyncReport {
    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|step| step.ok)
    }

    pub fn summary(&self) -> String {
        if self.steps.is_empty() {
            return "sync skipped".to_string();
        }
        self.steps
            .iter()
            .map(|step| match (&step.ok, &step.detail) {
                (true, None) => format!("{} ok", step.name),
                (true, Some(detail)) => format!("{} ok ({detail})", step.name),
                (false, Some(detail)) => format!("{} failed: {detail}", step.name),
                (false, None) => format!("{} failed", step.name),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn push_step(&mut self, step: SyncStep) -> bool {
        let ok = step.ok;
        self.steps.push(step);
        ok
    }
}

/// Brings the store up to date before a job runs. Clones the remote when
/// the store does not exist yet, otherwise pull-rebases.
pub fn pull_remote_store(store: &Path, settings: &ToolsSettings) -> SyncReport {
    let mut report = SyncReport::default();
    let Some(remote) = settings.remote.as_deref() else {
        return report;
    };

    if store.join(".git").exists() {
        report.push_step(run_git_step(
            &settings.git_binary,
            Some(store),
            "pull",
            vec!["pull".to_string(), "--rebase".to_string()],
        ));
        return report;
    }

    if store.exists() && directory_is_non_empty(store) {
        report.push_step(SyncStep {
            name: "clone",
            ok: false,
            detail: Some(format!(
                "{} exists but is not a git repository",
                store.display()
            )),
        });
        return report;
    }

    report.push_step(run_git_step(
        &settings.git_binary,
        None,
        "clone",
        vec![
            "clone".to_string(),
            remote.to_string(),
            store.display().to_string(),
        ],
    ));
    report
}

/// Publishes harvested tools: stage everything, commit only when the tree
/// actually changed, then push.
pub fn push_remote_store(store: &Path, settings: &ToolsSettings, message: &str) -> SyncReport {
    let mut report = SyncReport::default();
    if settings.remote.is_none() {
        return report;
    }
    if !store.join(".git").exists() {
        report.push_step(SyncStep {
            name: "push",
            ok: false,
            detail: Some(format!("{} is not a git repository", store.display())),
        });
        return report;
    }

    if !report.push_step(run_git_step(
        &settings.git_binary,
        Some(store),
        "add",
        vec!["add".to_string(), "-A".to_string()],
    )) {
        return report;
    }

    let status_request = git_request(
        &settings.git_binary,
        Some(store),
        vec!["status".to_string(), "--porcelain".to_string()],
    );
    let status = match run_command(&status_request) {
        Ok(output) if output.success() => output,
        Ok(output) => {
            report.push_step(SyncStep {
                name: "status",
                ok: false,
                detail: Some(output.failure_summary()),
            });
            return report;
        }
        Err(err) => {
            report.push_step(SyncStep {
                name: "status",
                ok: false,
                detail: Some(err.to_string()),
            });
            return report;
        }
    };
    if status.stdout.trim().is_empty() {
        report.push_step(SyncStep {
            name: "status",
            ok: true,
            detail: Some("working tree clean, nothing to push".to_string()),
        });
        return report;
    }
    report.push_step(SyncStep {
        name: "status",
        ok: true,
        detail: None,
    });

    if !report.push_step(run_git_step(
        &settings.git_binary,
        Some(store),
        "commit",
        vec![
            "commit".to_string(),
            "-m".to_string(),
            message.to_string(),
        ],
    )) {
        return report;
    }

    report.push_step(run_git_step(
        &settings.git_binary,
        Some(store),
        "push",
        vec!["push".to_string()],
    ));
    report
}

fn git_request(git_binary: &str, cwd: Option<&Path>, args: Vec<String>) -> ExecRequest {
    let mut request = ExecRequest::new(git_binary, args, GIT_STEP_TIMEOUT);
    request.cwd = cwd.map(Path::to_path_buf);
    request
}

fn run_git_step(
    git_binary: &str,
    cwd: Option<&Path>,
    name: &'static str,
    args: Vec<String>,
) -> SyncStep {
    match run_command(&git_request(git_binary, cwd, args)) {
        Ok(output) if output.success() => SyncStep {
            name,
            ok: true,
            detail: None,
        },
        Ok(output) => SyncStep {
            name,
            ok: false,
            detail: Some(output.failure_summary()),
        },
        Err(err) => SyncStep {
            name,
            ok: false,
            detail: Some(err.to_string()),
        },
    }
}

fn directory_is_non_empty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
