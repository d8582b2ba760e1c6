use crate::app::command_support::{ensure_runtime_root, load_settings};
use crate::config::SandboxBackend;
use crate::engine::{Engine, EngineError, JobOutcome, JobRequest};
use crate::jobs::JobStatus;
use crate::shared::{generate_job_id, now_secs};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

const RUN_USAGE: &str = "usage: run \"<prompt>\" [--model <id>] [--retry-model <id>] \
[--file <path>]... [--working-dir <path>] [--timeout <seconds>] \
[--backend <local|remote>] [--keep-sandbox] [--detach] [--quiet]";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct RunArgs {
    prompt: String,
    model: Option<String>,
    retry_model: Option<String>,
    files: Vec<PathBuf>,
    working_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    backend: Option<SandboxBackend>,
    keep_sandbox: bool,
    detach: bool,
    quiet: bool,
    /// Set by a detaching parent so the respawned child reuses its id.
    job_id: Option<String>,
}

pub fn cmd_run(args: &[String]) -> Result<String, String> {
    let parsed = parse_run_args(args)?;
    let mut settings = load_settings()?;
    if let Some(backend) = parsed.backend {
        settings.sandbox.backend = backend;
    }
    let paths = ensure_runtime_root()?;

    if parsed.detach {
        return detach(&parsed);
    }

    let engine = Engine::new(settings, paths);
    let outcome = engine.run_job(&to_request(&parsed)).map_err(|err| match err {
        EngineError::Environment(detail) => detail,
        other => other.to_string(),
    })?;
    render_outcome(&outcome, parsed.quiet)
}

fn parse_run_args(args: &[String]) -> Result<RunArgs, String> {
    let mut parsed = RunArgs::default();
    let mut prompt = None;
    let mut index = 0;
    while index < args.len() {
        let arg = args[index].as_str();
        match arg {
            "--model" => parsed.model = Some(take_value(args, &mut index, "--model")?),
            "--retry-model" => {
                parsed.retry_model = Some(take_value(args, &mut index, "--retry-model")?)
            }
            "--file" => parsed
                .files
                .push(PathBuf::from(take_value(args, &mut index, "--file")?)),
            "--working-dir" => {
                parsed.working_dir =
                    Some(PathBuf::from(take_value(args, &mut index, "--working-dir")?))
            }
            "--timeout" => {
                let raw = take_value(args, &mut index, "--timeout")?;
                let secs: u64 = raw.parse().map_err(|_| {
                    format!("--timeout expects a number of seconds, got `{raw}`")
                })?;
                if secs == 0 {
                    return Err("--timeout must be positive".to_string());
                }
                parsed.timeout_secs = Some(secs);
            }
            "--backend" => {
                let raw = take_value(args, &mut index, "--backend")?;
                parsed.backend =
                    Some(SandboxBackend::parse(&raw).map_err(|detail| format!("--backend: {detail}"))?);
            }
            "--keep-sandbox" => parsed.keep_sandbox = true,
            "--detach" => parsed.detach = true,
            "--quiet" => parsed.quiet = true,
            "--job-id" => parsed.job_id = Some(take_value(args, &mut index, "--job-id")?),
            _ if arg.starts_with("--") => return Err(format!("unknown flag `{arg}`")),
            _ => {
                if prompt.is_some() {
                    return Err(format!("unexpected argument `{arg}`"));
                }
                prompt = Some(arg.to_string());
            }
        }
        index += 1;
    }

    let Some(prompt) = prompt else {
        return Err(RUN_USAGE.to_string());
    };
    if prompt.trim().is_empty() {
        return Err("prompt must not be empty".to_string());
    }
    parsed.prompt = prompt;
    Ok(parsed)
}

fn take_value(args: &[String], index: &mut usize, flag: &str) -> Result<String, String> {
    *index += 1;
    args.get(*index)
        .cloned()
        .ok_or_else(|| format!("{flag} expects a value"))
}

fn to_request(parsed: &RunArgs) -> JobRequest {
    JobRequest {
        prompt: parsed.prompt.clone(),
        context_files: parsed.files.clone(),
        model_override: parsed.model.clone(),
        retry_model_override: parsed.retry_model.clone(),
        timeout_override: parsed.timeout_secs.map(Duration::from_secs),
        working_dir: parsed.working_dir.clone(),
        keep_sandbox: parsed.keep_sandbox,
        job_id: parsed.job_id.clone(),
    }
}

/// Respawns the binary as a detached foreground run that reuses a
/// pre-allocated job id, so the caller gets the id back immediately. The
/// record appears once the child passes preflight.
fn detach(parsed: &RunArgs) -> Result<String, String> {
    let job_id = match &parsed.job_id {
        Some(id) => id.clone(),
        None => generate_job_id(now_secs())?,
    };
    let exe = std::env::current_exe()
        .map_err(|e| format!("failed to locate the current executable: {e}"))?;

    let mut command = Command::new(exe);
    command.arg("run").arg(&parsed.prompt);
    command.args(["--job-id", &job_id]);
    if let Some(model) = &parsed.model {
        command.args(["--model", model]);
    }
    if let Some(retry_model) = &parsed.retry_model {
        command.args(["--retry-model", retry_model]);
    }
    for file in &parsed.files {
        command.arg("--file").arg(file);
    }
    if let Some(working_dir) = &parsed.working_dir {
        command.arg("--working-dir").arg(working_dir);
    }
    if let Some(secs) = parsed.timeout_secs {
        command.args(["--timeout", &secs.to_string()]);
    }
    if let Some(backend) = parsed.backend {
        command.args(["--backend", backend.as_str()]);
    }
    if parsed.keep_sandbox {
        command.arg("--keep-sandbox");
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    command
        .spawn()
        .map_err(|e| format!("failed to start the background job: {e}"))?;

    Ok(format!(
        "job={job_id}\nstatus=dispatched\nfollow=sandpiper logs {job_id}"
    ))
}

fn render_outcome(outcome: &JobOutcome, quiet: bool) -> Result<String, String> {
    if outcome.status != JobStatus::Completed {
        let reason = outcome
            .failure_reason
            .clone()
            .unwrap_or_else(|| "unknown failure".to_string());
        return Err(format!(
            "job {} failed: {reason} (log: {})",
            outcome.job_id,
            outcome.log_file.display()
        ));
    }

    let final_output = outcome
        .attempts
        .last()
        .map(|attempt| attempt.output.trim().to_string())
        .unwrap_or_default();
    if quiet {
        return Ok(final_output);
    }

    let mut lines = vec![
        format!("job={}", outcome.job_id),
        format!("status={}", outcome.status),
        format!("attempts={}", outcome.attempts.len()),
    ];
    for attempt in &outcome.attempts {
        lines.push(format!("attempt:{}.model={}", attempt.attempt, attempt.model));
        lines.push(format!("attempt:{}.exit={}", attempt.attempt, attempt.exit_code));
        if let Some(signature) = &attempt.refusal {
            lines.push(format!("attempt:{}.refusal={signature}", attempt.attempt));
        }
    }
    if let Some(harvest) = &outcome.harvest {
        lines.push(format!("harvest={}", harvest.summary()));
    }
    lines.push(format!("log={}", outcome.log_file.display()));
    if !final_output.is_empty() {
        lines.push(String::new());
        lines.push(final_output);
    }
    Ok(lines.join("\n"))
}
