use crate::app::command_support::{ensure_runtime_root, format_epoch};
use crate::jobs::{JobLedger, JobStatus};
use crate::shared::now_secs;
use std::fs;

pub fn cmd_jobs() -> Result<String, String> {
    let paths = ensure_runtime_root()?;
    let ledger = JobLedger::new(paths.root.clone());
    let reconciled = ledger.reconcile(now_secs()).map_err(|e| e.to_string())?;
    let records = ledger.list().map_err(|e| e.to_string())?;

    let mut lines = vec![format!("jobs_total={}", records.len())];
    if !reconciled.is_empty() {
        lines.push(format!("reconciled={}", reconciled.join(",")));
    }
    for record in &records {
        lines.push(format!("job:{}.status={}", record.id, record.status));
        lines.push(format!(
            "job:{}.started={}",
            record.id,
            format_epoch(record.started_at)
        ));
        if let Some(ended) = record.ended_at {
            lines.push(format!("job:{}.ended={}", record.id, format_epoch(ended)));
        }
        lines.push(format!("job:{}.model={}", record.id, record.model));
        lines.push(format!(
            "job:{}.prompt={}",
            record.id,
            prompt_excerpt(&record.prompt)
        ));
    }
    Ok(lines.join("\n"))
}

/// One line per record, so the prompt is flattened and cut short.
fn prompt_excerpt(prompt: &str) -> String {
    let flat = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= 60 {
        return flat;
    }
    let cut: String = flat.chars().take(57).collect();
    format!("{cut}...")
}

pub fn cmd_status(args: &[String]) -> Result<String, String> {
    let [job_id] = args else {
        return Err("usage: status <job-id>".to_string());
    };
    let paths = ensure_runtime_root()?;
    let ledger = JobLedger::new(paths.root.clone());
    // A record orphaned by a killed engine flips to failed here, so the
    // caller never sees a stale `running`.
    ledger.reconcile(now_secs()).map_err(|e| e.to_string())?;
    let record = ledger.load(job_id).map_err(|e| e.to_string())?;

    let mut lines = vec![
        format!("id={}", record.id),
        format!("status={}", record.status),
        format!("started={}", format_epoch(record.started_at)),
    ];
    if let Some(ended) = record.ended_at {
        lines.push(format!("ended={}", format_epoch(ended)));
    }
    lines.push(format!("model={}", record.model));
    if let Some(retry_model) = &record.retry_model {
        lines.push(format!("retry_model={retry_model}"));
    }
    lines.push(format!("sandbox={}", record.sandbox));
    lines.push(format!("workspace={}", record.workspace.display()));
    if record.status == JobStatus::Running {
        if let Some(pid) = record.pid {
            lines.push(format!("pid={pid}"));
        }
    }
    lines.push(format!("log={}", record.log_file.display()));
    if let Some(reason) = &record.terminal_reason {
        lines.push(format!("reason={reason}"));
    }
    Ok(lines.join("\n"))
}

pub fn cmd_logs(args: &[String]) -> Result<String, String> {
    let [job_id] = args else {
        return Err("usage: logs <job-id>".to_string());
    };
    let paths = ensure_runtime_root()?;
    let ledger = JobLedger::new(paths.root.clone());
    let record = ledger.load(job_id).map_err(|e| e.to_string())?;

    let raw = fs::read_to_string(&record.log_file).map_err(|e| {
        format!(
            "failed to read log {}: {e}",
            record.log_file.display()
        )
    })?;
    Ok(raw.trim_end().to_string())
}

pub fn cmd_purge() -> Result<String, String> {
    let paths = ensure_runtime_root()?;
    let ledger = JobLedger::new(paths.root.clone());
    let count = ledger.list().map_err(|e| e.to_string())?.len();
    ledger
        .purge(&paths.logs_dir())
        .map_err(|e| e.to_string())?;
    Ok(format!("purged_records={count}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_prompts_pass_through_with_whitespace_flattened() {
        assert_eq!(prompt_excerpt("write a fizzbuzz script"), "write a fizzbuzz script");
        assert_eq!(prompt_excerpt("two\n  lines\there"), "two lines here");
    }

    #[test]
    fn long_prompts_are_cut_with_an_ellipsis() {
        let long = "word ".repeat(30);
        let excerpt = prompt_excerpt(&long);
        assert_eq!(excerpt.chars().count(), 60);
        assert!(excerpt.ends_with("..."));
    }
}
