//! Per-job record files under `<state root>/jobs/`.
//!
//! Every job gets its own JSON file, so two engine processes never contend
//! for a shared index and a corrupt record only loses that one job.

use std::fs;
use std::path::{Path, PathBuf};

use crate::jobs::{io_error, json_error, JobRecord, JobStatus, LedgerError};
use crate::shared::{append_engine_log, atomic_write_file};

const RECORDS_DIR: &str = "jobs";

pub struct JobLedger {
    state_root: PathBuf,
}

impl JobLedger {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    fn records_dir(&self) -> PathBuf {
        self.state_root.join(RECORDS_DIR)
    }

    pub fn record_path(&self, job_id: &str) -> PathBuf {
        self.records_dir().join(format!("{job_id}.json"))
    }

    pub fn record_exists(&self, job_id: &str) -> bool {
        self.record_path(job_id).is_file()
    }

    /// Writes a brand-new record. A second create under the same id is a bug
    /// in id generation and is rejected rather than silently overwritten.
    pub fn create(&self, record: &JobRecord) -> Result<(), LedgerError> {
        check_consistency(record)?;
        let dir = self.records_dir();
        fs::create_dir_all(&dir).map_err(|err| io_error(&dir, err))?;
        let path = self.record_path(&record.id);
        if path.exists() {
            return Err(LedgerError::DuplicateJob {
                job_id: record.id.clone(),
            });
        }
        self.persist(&path, record)
    }

    pub fn load(&self, job_id: &str) -> Result<JobRecord, LedgerError> {
        let path = self.record_path(job_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(LedgerError::UnknownJob {
                    job_id: job_id.to_string(),
                })
            }
            Err(err) => return Err(io_error(&path, err)),
        };
        serde_json::from_str(&raw).map_err(|err| json_error(&path, err))
    }

    /// Moves a record to `next`, stamping the end time and reason. Terminal
    /// records carry an end time and non-terminal records never do.
    pub fn update_status(
        &self,
        job_id: &str,
        next: JobStatus,
        ended_at: Option<i64>,
        terminal_reason: Option<String>,
    ) -> Result<JobRecord, LedgerError> {
        let mut record = self.load(job_id)?;
        if !record.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition {
                job_id: job_id.to_string(),
                from: record.status,
                to: next,
            });
        }
        if next.is_terminal() != ended_at.is_some() {
            return Err(LedgerError::Inconsistent {
                job_id: job_id.to_string(),
                detail: format!("status {next} does not match end time {ended_at:?}"),
            });
        }
        record.status = next;
        record.ended_at = ended_at;
        record.terminal_reason = terminal_reason;
        let path = self.record_path(job_id);
        self.persist(&path, &record)?;
        Ok(record)
    }

    /// All records, newest first. A file that fails to parse is skipped and
    /// logged so one corrupt record cannot hide the rest of the ledger.
    pub fn list(&self) -> Result<Vec<JobRecord>, LedgerError> {
        let dir = self.records_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|err| io_error(&dir, err))?;
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error(&dir, err))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(|err| io_error(&path, err))
                .and_then(|raw| serde_json::from_str::<JobRecord>(&raw).map_err(|err| json_error(&path, err)))
            {
                Ok(record) => records.push(record),
                Err(err) => {
                    append_engine_log(
                        &self.state_root,
                        "warn",
                        "ledger.skip_record",
                        &format!("skipping unreadable record {}: {err}", path.display()),
                    );
                }
            }
        }
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        Ok(records)
    }

    /// Marks running records whose engine process is gone as failed. Without
    /// this a `kill -9` would leave a job reported as running forever.
    pub fn reconcile(&self, now: i64) -> Result<Vec<String>, LedgerError> {
        let mut reconciled = Vec::new();
        for record in self.list()? {
            if record.status != JobStatus::Running {
                continue;
            }
            let Some(pid) = record.pid else { continue };
            if is_process_alive(pid) {
                continue;
            }
            self.update_status(
                &record.id,
                JobStatus::Failed,
                Some(now),
                Some("engine process exited without finalizing the record".to_string()),
            )?;
            append_engine_log(
                &self.state_root,
                "warn",
                "ledger.reconcile",
                &format!("job {} marked failed: engine pid {pid} is gone", record.id),
            );
            reconciled.push(record.id);
        }
        Ok(reconciled)
    }

    /// Deletes every record and log, leaving empty directories behind.
    pub fn purge(&self, logs_dir: &Path) -> Result<(), LedgerError> {
        for dir in [self.records_dir(), logs_dir.to_path_buf()] {
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(io_error(&dir, err)),
            }
            fs::create_dir_all(&dir).map_err(|err| io_error(&dir, err))?;
        }
        Ok(())
    }

    fn persist(&self, path: &Path, record: &JobRecord) -> Result<(), LedgerError> {
        let body = serde_json::to_vec_pretty(record)
            .map_err(|err| json_error(path, err))?;
        atomic_write_file(path, &body).map_err(|err| io_error(path, err))
    }
}

fn check_consistency(record: &JobRecord) -> Result<(), LedgerError> {
    if record.status.is_terminal() != record.ended_at.is_some() {
        return Err(LedgerError::Inconsistent {
            job_id: record.id.clone(),
            detail: format!(
                "status {} does not match end time {:?}",
                record.status, record.ended_at
            ),
        });
    }
    Ok(())
}

/// Probes a pid with `kill -0`, which tests deliverability without sending
/// a signal. Pid 0 addresses the caller's own process group and always
/// reports dead. On non-unix targets every pid reports dead so
/// reconciliation stays conservative there.
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
