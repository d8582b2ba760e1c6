use crate::exec::shell_escape;
use crate::transfer::{CommandChannel, TransferError, CHUNK_ENCODED_CHARS};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fs;
use std::path::Path;

/// Copies a local file into the sandbox, all-or-nothing: the first failed
/// chunk aborts the transfer with an error naming the file and chunk.
pub fn push_file(
    channel: &dyn CommandChannel,
    local: &Path,
    remote: &str,
) -> Result<(), TransferError> {
    let bytes = fs::read(local).map_err(|source| TransferError::ReadLocal {
        path: local.display().to_string(),
        source,
    })?;
    let encoded = STANDARD.encode(&bytes);
    let escaped_remote = shell_escape(remote);

    if let Some(parent) = remote_parent(remote) {
        run_prepare_step(
            channel,
            remote,
            &format!("mkdir -p {}", shell_escape(&parent)),
            "create remote directory",
        )?;
    }
    run_prepare_step(
        channel,
        remote,
        &format!("true > {escaped_remote}"),
        "truncate remote file",
    )?;

    // base64 output is ASCII, so byte offsets are char boundaries.
    let mut start = 0;
    let mut chunk_index = 0;
    while start < encoded.len() {
        let end = (start + CHUNK_ENCODED_CHARS).min(encoded.len());
        let chunk = &encoded[start..end];
        let command = format!(
            "echo {} | base64 -d >> {escaped_remote}",
            shell_escape(chunk)
        );
        let output = channel
            .execute(&command)
            .map_err(|detail| TransferError::Channel {
                file: remote.to_string(),
                detail,
            })?;
        if !output.success() {
            return Err(TransferError::ChunkWrite {
                file: remote.to_string(),
                chunk_index,
                detail: output.failure_summary(),
            });
        }
        start = end;
        chunk_index += 1;
    }
    Ok(())
}

/// Copies a sandbox file to a local path, creating parent directories.
pub fn pull_file(
    channel: &dyn CommandChannel,
    remote: &str,
    local: &Path,
) -> Result<(), TransferError> {
    let command = format!("base64 {}", shell_escape(remote));
    let output = channel
        .execute(&command)
        .map_err(|detail| TransferError::Channel {
            file: remote.to_string(),
            detail,
        })?;
    if !output.success() {
        return Err(TransferError::RemoteRead {
            file: remote.to_string(),
            detail: output.failure_summary(),
        });
    }

    // The coreutils encoder wraps lines; strip all whitespace before decoding.
    let compact: String = output
        .stdout
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|source| TransferError::Decode {
            file: remote.to_string(),
            source,
        })?;

    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent).map_err(|source| TransferError::WriteLocal {
            path: parent.display().to_string(),
            source,
        })?;
    }
    fs::write(local, &bytes).map_err(|source| TransferError::WriteLocal {
        path: local.display().to_string(),
        source,
    })
}

fn run_prepare_step(
    channel: &dyn CommandChannel,
    file: &str,
    command: &str,
    label: &str,
) -> Result<(), TransferError> {
    let output = channel
        .execute(command)
        .map_err(|detail| TransferError::Channel {
            file: file.to_string(),
            detail,
        })?;
    if !output.success() {
        return Err(TransferError::Prepare {
            file: file.to_string(),
            detail: format!("{label}: {}", output.failure_summary()),
        });
    }
    Ok(())
}

fn remote_parent(remote: &str) -> Option<String> {
    let trimmed = remote.trim_end_matches('/');
    let (parent, _) = trimmed.rsplit_once('/')?;
    if parent.is_empty() {
        return None;
    }
    Some(parent.to_string())
}
