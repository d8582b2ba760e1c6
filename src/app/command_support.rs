use crate::config::{load_global_settings, ConfigError, Settings};
use crate::shared::{bootstrap_state_root, default_state_root_path, StatePaths};
use chrono::{SecondsFormat, TimeZone, Utc};

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

pub fn ensure_runtime_root() -> Result<StatePaths, String> {
    let root = default_state_root_path().map_err(|e| e.to_string())?;
    let paths = StatePaths::new(root);
    bootstrap_state_root(&paths).map_err(|e| e.to_string())?;
    Ok(paths)
}

pub fn load_settings() -> Result<Settings, String> {
    load_global_settings().map_err(map_config_err)
}

/// Renders an epoch second for display; out-of-range values fall back to
/// the raw number.
pub fn format_epoch(secs: i64) -> String {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(when) => when.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => secs.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_renders_as_utc_rfc3339() {
        assert_eq!(format_epoch(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_epoch(1_755_868_800), "2025-08-22T13:20:00Z");
    }

    #[test]
    fn unrepresentable_epoch_falls_back_to_the_raw_value() {
        assert_eq!(format_epoch(i64::MAX), i64::MAX.to_string());
    }
}
