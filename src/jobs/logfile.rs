use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use crate::jobs::{io_error, LedgerError};

/// Append-only plain-text log for one job. Every line carries a UTC
/// timestamp so interleaved attempts stay readable after the fact.
pub struct JobLog {
    path: PathBuf,
}

impl JobLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &str) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| io_error(&self.path, err))?;
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut body = String::new();
        for line in message.lines() {
            body.push('[');
            body.push_str(&stamp);
            body.push_str("] ");
            body.push_str(line);
            body.push('\n');
        }
        if body.is_empty() {
            body = format!("[{stamp}]\n");
        }
        file.write_all(body.as_bytes())
            .map_err(|err| io_error(&self.path, err))
    }

    /// Labelled block for multi-line command output.
    pub fn append_block(&self, label: &str, block: &str) -> Result<(), LedgerError> {
        let trimmed = block.trim_end();
        if trimmed.is_empty() {
            return self.append(&format!("{label}: (empty)"));
        }
        self.append(&format!("{label}:"))?;
        self.append(trimmed)
    }
}
