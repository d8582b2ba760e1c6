pub mod errors;
pub mod fs_atomic;
pub mod ids;
pub mod logging;
pub mod state_paths;
pub mod time;

pub use errors::StateError;
pub use fs_atomic::atomic_write_file;
pub use ids::{generate_job_id, validate_identifier_value, JobId};
pub use logging::{append_engine_log, engine_log_path};
pub use state_paths::{
    bootstrap_state_root, default_state_root_path, StatePaths, DEFAULT_STATE_ROOT_DIR,
};
pub use time::now_secs;
