pub mod protocol;

pub use protocol::{pull_file, push_file};

/// Encoded characters per push chunk. Sized to stay well under typical
/// shell argument limits after quoting.
pub const CHUNK_ENCODED_CHARS: usize = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ChannelOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// One-line reason for a failed command, preferring stderr.
    pub fn failure_summary(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exit code {}", self.exit_code)
    }
}

/// A sandbox that only exposes "run one shell command line". The transfer
/// protocol is written against this so it works for any such sandbox and
/// can be exercised against a local shell in tests.
pub trait CommandChannel {
    fn execute(&self, command: &str) -> Result<ChannelOutput, String>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to read local file {path}: {source}")]
    ReadLocal {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write local file {path}: {source}")]
    WriteLocal {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("channel failure while transferring {file}: {detail}")]
    Channel { file: String, detail: String },
    #[error("remote preparation failed for {file}: {detail}")]
    Prepare { file: String, detail: String },
    #[error("remote write failed for {file} at chunk {chunk_index}: {detail}")]
    ChunkWrite {
        file: String,
        chunk_index: usize,
        detail: String,
    },
    #[error("remote read failed for {file}: {detail}")]
    RemoteRead { file: String, detail: String },
    #[error("invalid base64 payload pulled from {file}: {source}")]
    Decode {
        file: String,
        #[source]
        source: base64::DecodeError,
    },
}
