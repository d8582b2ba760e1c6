use crate::app::command_support::{ensure_runtime_root, load_settings};
use crate::tools::{pull_remote_store, push_remote_store};
use std::fs;

pub fn cmd_tools(args: &[String]) -> Result<String, String> {
    match args.first().map(String::as_str) {
        None | Some("list") => list(),
        Some("sync") => sync(),
        Some(_) => Err("usage: tools <list|sync>".to_string()),
    }
}

fn list() -> Result<String, String> {
    let settings = load_settings()?;
    let paths = ensure_runtime_root()?;
    let store = settings.resolve_tool_store(&paths);

    let mut names = Vec::new();
    if store.is_dir() {
        let entries = fs::read_dir(&store)
            .map_err(|e| format!("failed to read {}: {e}", store.display()))?;
        for entry in entries {
            let entry = entry.map_err(|e| format!("failed to read store entry: {e}"))?;
            let is_file = entry
                .file_type()
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
    }
    names.sort();

    let mut lines = vec![
        format!("store={}", store.display()),
        format!("tools_total={}", names.len()),
    ];
    lines.extend(names.into_iter().map(|name| format!("  {name}")));
    Ok(lines.join("\n"))
}

fn sync() -> Result<String, String> {
    let settings = load_settings()?;
    if settings.tools.remote.is_none() {
        return Err(
            "tools.remote is not configured; set a git URL in config.yaml to enable sync"
                .to_string(),
        );
    }
    let paths = ensure_runtime_root()?;
    let store = settings.resolve_tool_store(&paths);

    let pull = pull_remote_store(&store, &settings.tools);
    let push = push_remote_store(&store, &settings.tools, "manual sync");
    let lines = [
        format!("pull={}", pull.summary()),
        format!("push={}", push.summary()),
    ];
    if pull.all_ok() && push.all_ok() {
        Ok(lines.join("\n"))
    } else {
        Err(lines.join("\n"))
    }
}
