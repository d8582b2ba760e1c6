//! Tool store maintenance: harvesting new scripts out of job workspaces
//! and synchronizing the store with an optional shared git remote.

pub mod harvest;
pub mod sync;

pub use harvest::{harvest_workspace, HarvestReport, SkipReason, SkippedFile};
pub use sync::{pull_remote_store, push_remote_store, SyncReport, SyncStep};

#[derive(Debug, thiserror::Error)]
pub enum ToolsError {
    #[error("tool store io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &std::path::Path, source: std::io::Error) -> ToolsError {
    ToolsError::Io {
        path: path.display().to_string(),
        source,
    }
}
