use crate::app::command_support::{ensure_runtime_root, map_config_err};
use crate::config::{default_global_config_path, save_settings, Settings};
use crate::sandbox::local::DEFAULT_DOCKERFILE;
use std::fs;

/// Idempotent bootstrap: creates the state directories, then seeds a
/// default config and sandbox Dockerfile without overwriting existing
/// ones.
pub fn cmd_init() -> Result<String, String> {
    let paths = ensure_runtime_root()?;
    let mut lines = vec![format!("state_root={}", paths.root.display())];

    let config_path = default_global_config_path().map_err(map_config_err)?;
    if config_path.exists() {
        lines.push(format!("config={} (kept)", config_path.display()));
    } else {
        let written = save_settings(&Settings::default()).map_err(map_config_err)?;
        lines.push(format!("config={} (created)", written.display()));
    }

    let dockerfile = paths.image_context_dir().join("Dockerfile");
    if dockerfile.exists() {
        lines.push(format!("dockerfile={} (kept)", dockerfile.display()));
    } else {
        fs::write(&dockerfile, DEFAULT_DOCKERFILE)
            .map_err(|e| format!("failed to write {}: {e}", dockerfile.display()))?;
        lines.push(format!("dockerfile={} (created)", dockerfile.display()));
    }

    lines.push("next=review the config, then run `sandpiper image build`".to_string());
    Ok(lines.join("\n"))
}
