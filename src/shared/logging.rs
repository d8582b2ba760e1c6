use super::time::now_secs;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn engine_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/engine.log")
}

/// Best-effort structured log line; never fails the caller.
pub fn append_engine_log(state_root: &Path, level: &str, event: &str, message: &str) {
    let payload = serde_json::json!({
        "timestamp": now_secs(),
        "level": level,
        "event": event,
        "message": message,
    });

    let Ok(line) = serde_json::to_string(&payload) else {
        return;
    };

    let path = engine_log_path(state_root);
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = writeln!(file, "{line}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn engine_log_appends_json_lines() {
        let dir = tempdir().expect("tempdir");
        append_engine_log(dir.path(), "info", "job.start", "job-1 started");
        append_engine_log(dir.path(), "warn", "sync.push", "push failed");

        let raw = fs::read_to_string(engine_log_path(dir.path())).expect("read log");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json line");
        assert_eq!(first["level"], "info");
        assert_eq!(first["event"], "job.start");
        assert!(first["timestamp"].is_i64());
    }

    #[test]
    fn engine_log_failures_are_swallowed() {
        // State root that cannot exist as a directory.
        let dir = tempdir().expect("tempdir");
        let blocker = dir.path().join("occupied");
        fs::write(&blocker, b"file, not dir").expect("write blocker");
        append_engine_log(&blocker, "info", "noop", "dropped");
    }
}
