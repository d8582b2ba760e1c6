use super::errors::StateError;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn required_directories(&self) -> Vec<PathBuf> {
        vec![
            self.jobs_dir(),
            self.logs_dir(),
            self.tools_dir(),
            self.workspaces_dir(),
            self.image_context_dir(),
        ]
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("tools")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.root.join("workspaces")
    }

    pub fn image_context_dir(&self) -> PathBuf {
        self.root.join("image")
    }

    pub fn job_log_path(&self, job_id: &str) -> PathBuf {
        self.logs_dir().join(format!("{job_id}.log"))
    }

    pub fn job_workspace_path(&self, job_id: &str) -> PathBuf {
        self.workspaces_dir().join(job_id)
    }
}

pub const DEFAULT_STATE_ROOT_DIR: &str = ".sandpiper";

pub fn default_state_root_path() -> Result<PathBuf, StateError> {
    let home = std::env::var_os("HOME").ok_or(StateError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(DEFAULT_STATE_ROOT_DIR))
}

pub fn bootstrap_state_root(paths: &StatePaths) -> Result<(), StateError> {
    for path in paths.required_directories() {
        fs::create_dir_all(&path).map_err(|source| StateError::CreateDir {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}
