use super::{default_global_config_path, ConfigError, Settings};
use std::fs;
use std::path::{Path, PathBuf};

fn create_parent_dir(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.display().to_string(),
            source,
        })?;
    }
    Ok(())
}

pub fn save_settings(settings: &Settings) -> Result<PathBuf, ConfigError> {
    settings.validate()?;
    let path = default_global_config_path()?;
    save_settings_to(settings, &path)?;
    Ok(path)
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    create_parent_dir(path)?;
    let body = serde_yaml::to_string(settings).map_err(|source| ConfigError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, body).map_err(|source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    })
}
