use crate::exec::{io_error, CommandOutput, ExecError, ExecRequest, StdinPolicy};
use std::io::BufReader;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs a command to completion with a bounded wait. Non-zero exits and
/// timeouts are data in the returned output, not errors; launch failures
/// surface as conventional shell exit codes (127 missing, 126 denied) with
/// diagnostic text on stderr.
pub fn run_command(request: &ExecRequest) -> Result<CommandOutput, ExecError> {
    let mut command = Command::new(&request.program);
    command
        .args(&request.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    match request.stdin {
        StdinPolicy::Null => {
            command.stdin(Stdio::null());
        }
        StdinPolicy::Inherit => {}
    }

    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }
    for (k, v) in &request.env_overrides {
        command.env(k, v);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(CommandOutput {
                exit_code: 127,
                stdout: String::new(),
                stderr: format!("command not found: {}", request.program),
                timed_out: false,
            });
        }
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            return Ok(CommandOutput {
                exit_code: 126,
                stdout: String::new(),
                stderr: format!("permission denied: {}", request.program),
                timed_out: false,
            });
        }
        Err(err) => return Err(io_error(&request.program, err)),
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_error(&request.program, std::io::Error::other("missing stdout pipe")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io_error(&request.program, std::io::Error::other("missing stderr pipe")))?;

    let stdout_reader = thread::spawn(move || {
        let mut buf = String::new();
        let mut reader = BufReader::new(stdout);
        let _ = reader.read_to_string(&mut buf);
        buf
    });
    let stderr_reader = thread::spawn(move || {
        let mut buf = String::new();
        let mut reader = BufReader::new(stderr);
        let _ = reader.read_to_string(&mut buf);
        buf
    });

    let start = Instant::now();
    let (exit_status, timed_out) = loop {
        match child.try_wait() {
            Ok(Some(status)) => break (status, false),
            Ok(None) => {
                if start.elapsed() > request.timeout {
                    let _ = child.kill();
                    let status = child
                        .wait()
                        .map_err(|e| io_error(&request.program, e))?;
                    break (status, true);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => return Err(io_error(&request.program, err)),
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    // A signal-killed child reports no code; -1 keeps the result
    // unmistakably non-zero for callers treating exit code as data.
    let exit_code = exit_status.code().unwrap_or(-1);

    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
    })
}
