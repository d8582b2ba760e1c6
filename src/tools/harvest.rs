//! Copies newly produced scripts from a job workspace into the tool store.
//!
//! The scan is non-recursive and first-write-wins: a store entry is never
//! replaced, even when the workspace holds a different file under the same
//! name. Per-file problems are collected in the report rather than aborting
//! the whole harvest.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::ToolsSettings;
use crate::tools::{io_error, ToolsError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Store already has this name. `same_content` distinguishes a
    /// harmless re-run from a genuine collision.
    AlreadyPresent { same_content: bool },
    ExcludedPattern { pattern: String },
    ExtensionNotAllowed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    pub harvested: Vec<String>,
    pub skipped: Vec<SkippedFile>,
    pub failures: Vec<String>,
}

impl HarvestReport {
    pub fn summary(&self) -> String {
        format!(
            "harvested {} tool(s), skipped {}, {} failure(s)",
            self.harvested.len(),
            self.skipped.len(),
            self.failures.len()
        )
    }
}

pub fn harvest_workspace(
    workspace: &Path,
    store: &Path,
    settings: &ToolsSettings,
) -> Result<HarvestReport, ToolsError> {
    let mut report = HarvestReport::default();
    if !workspace.is_dir() {
        return Ok(report);
    }
    fs::create_dir_all(store).map_err(|err| io_error(store, err))?;

    let entries = fs::read_dir(workspace).map_err(|err| io_error(workspace, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| io_error(workspace, err))?;
        let is_file = entry
            .file_type()
            .map(|kind| kind.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            report
                .failures
                .push(format!("{:?}: file name is not valid UTF-8", file_name));
            continue;
        };

        if let Some(pattern) = matched_exclude(name, &settings.exclude_patterns) {
            report.skipped.push(SkippedFile {
                name: name.to_string(),
                reason: SkipReason::ExcludedPattern {
                    pattern: pattern.to_string(),
                },
            });
            continue;
        }
        if !extension_allowed(name, &settings.allowed_extensions) {
            report.skipped.push(SkippedFile {
                name: name.to_string(),
                reason: SkipReason::ExtensionNotAllowed,
            });
            continue;
        }

        let source = entry.path();
        let target = store.join(name);
        if target.exists() {
            report.skipped.push(SkippedFile {
                name: name.to_string(),
                reason: SkipReason::AlreadyPresent {
                    same_content: same_fingerprint(&source, &target),
                },
            });
            continue;
        }

        if let Err(err) = fs::copy(&source, &target) {
            report.failures.push(format!("{name}: {err}"));
            continue;
        }
        if let Err(err) = mark_executable(&target) {
            report.failures.push(format!("{name}: chmod failed: {err}"));
        }
        report.harvested.push(name.to_string());
    }

    report.harvested.sort();
    report.skipped.sort_by(|a, b| a.name.cmp(&b.name));
    report.failures.sort();
    Ok(report)
}

/// A file is excluded when its name contains any configured pattern.
fn matched_exclude<'a>(name: &str, patterns: &'a [String]) -> Option<&'a str> {
    patterns
        .iter()
        .find(|pattern| !pattern.is_empty() && name.contains(pattern.as_str()))
        .map(String::as_str)
}

fn extension_allowed(name: &str, allowed: &[String]) -> bool {
    let Some(extension) = Path::new(name).extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    allowed
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(extension))
}

fn mark_executable(path: &PathBuf) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

fn same_fingerprint(a: &Path, b: &Path) -> bool {
    match (fingerprint(a), fingerprint(b)) {
        (Some(fa), Some(fb)) => fa == fb,
        _ => false,
    }
}

fn fingerprint(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    let digest = Sha256::digest(&bytes);
    Some(
        digest
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>(),
    )
}
