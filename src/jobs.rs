use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod ledger;
pub mod logfile;

pub use ledger::{is_process_alive, JobLedger};
pub use logfile::JobLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (JobStatus::Running, JobStatus::Completed) | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub prompt: String,
    pub status: JobStatus,
    pub started_at: i64,
    #[serde(default)]
    pub ended_at: Option<i64>,
    pub log_file: PathBuf,
    /// Engine process id, used to reconcile records orphaned by a kill.
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub retry_model: Option<String>,
    #[serde(default)]
    pub sandbox: String,
    #[serde(default)]
    pub workspace: PathBuf,
    #[serde(default)]
    pub terminal_reason: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("job `{job_id}` already exists in the ledger")]
    DuplicateJob { job_id: String },
    #[error("job `{job_id}` was not found in the ledger")]
    UnknownJob { job_id: String },
    #[error("invalid status transition for job `{job_id}`: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("inconsistent record for job `{job_id}`: {detail}")]
    Inconsistent { job_id: String, detail: String },
    #[error("ledger io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed job record at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &std::path::Path, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn json_error(path: &std::path::Path, source: serde_json::Error) -> LedgerError {
    LedgerError::Json {
        path: path.display().to_string(),
        source,
    }
}
