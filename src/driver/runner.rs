//! The attempt loop: primary model, refusal check, one fallback retry.

use std::time::Duration;

use crate::driver::prompt::{assemble_prompt, ContextFile, PromptInputs};
use crate::driver::refusal::RefusalPolicy;
use crate::jobs::JobLog;
use crate::sandbox::{ResetOutcome, Sandbox, SandboxCommand, SandboxError};

#[derive(Debug, Clone)]
pub struct DriveRequest<'a> {
    pub task_prompt: &'a str,
    pub context: &'a [ContextFile],
    pub model: &'a str,
    pub retry_model: Option<&'a str>,
    pub agent_binary: &'a str,
    pub attempt_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub model: String,
    pub exit_code: i32,
    pub timed_out: bool,
    /// Signature that classified this attempt as a refusal, if any.
    pub refusal: Option<String>,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct DriveOutcome {
    pub attempts: Vec<AttemptRecord>,
    /// Present exactly when a fallback retry ran, recording the state
    /// cleanup that preceded it.
    pub reset: Option<ResetOutcome>,
    pub succeeded: bool,
}

impl DriveOutcome {
    pub fn final_attempt(&self) -> &AttemptRecord {
        // drive() always records at least one attempt before returning.
        &self.attempts[self.attempts.len() - 1]
    }
}

/// Runs the agent until it produces a final answer: one primary attempt,
/// plus one fallback attempt when the primary output matches a refusal
/// signature and a retry model is configured. The final attempt's exit
/// code decides success; refusal on the fallback is terminal.
pub fn drive(
    sandbox: &dyn Sandbox,
    request: &DriveRequest<'_>,
    policy: &RefusalPolicy,
    log: &JobLog,
) -> Result<DriveOutcome, SandboxError> {
    let profile = sandbox.profile();
    let prompt = assemble_prompt(&PromptInputs {
        task: request.task_prompt,
        context: request.context,
        workspace_dir: &profile.workspace_dir,
        tools_dir: profile.tools_dir.as_deref(),
    });

    let mut attempts = Vec::new();
    let mut reset = None;

    let first = run_attempt(sandbox, request, &prompt, request.model, 1, policy, log)?;
    let refused = first.refusal.is_some();
    attempts.push(first);

    if refused {
        match request.retry_model {
            Some(retry_model) => {
                let outcome = sandbox.reset_agent_state();
                log_line(log, &describe_reset(&outcome));
                reset = Some(outcome);
                let second =
                    run_attempt(sandbox, request, &prompt, retry_model, 2, policy, log)?;
                attempts.push(second);
            }
            None => {
                log_line(log, "refusal detected but no retry model is configured");
            }
        }
    }

    let last = &attempts[attempts.len() - 1];
    let succeeded = last.exit_code == 0 && !last.timed_out;
    Ok(DriveOutcome {
        attempts,
        reset,
        succeeded,
    })
}

fn run_attempt(
    sandbox: &dyn Sandbox,
    request: &DriveRequest<'_>,
    prompt: &str,
    model: &str,
    attempt: u32,
    policy: &RefusalPolicy,
    log: &JobLog,
) -> Result<AttemptRecord, SandboxError> {
    log_line(
        log,
        &format!("attempt {attempt}: launching agent with model {model}"),
    );
    let command = SandboxCommand::new(
        request.agent_binary,
        vec![
            "run".to_string(),
            "--model".to_string(),
            model.to_string(),
            prompt.to_string(),
            "--print-logs".to_string(),
        ],
        request.attempt_timeout,
    );
    let output = sandbox.exec(&command)?;
    let combined = output.combined_output();
    let refusal = policy.matched_signature(&combined).map(str::to_string);

    let _ = log.append_block(&format!("attempt {attempt} ({model}) output"), &combined);
    log_line(
        log,
        &format!(
            "attempt {attempt}: exit code {}{}",
            output.exit_code,
            if output.timed_out { " (timed out)" } else { "" }
        ),
    );
    if let Some(signature) = &refusal {
        log_line(
            log,
            &format!("attempt {attempt}: refusal signature matched: \"{signature}\""),
        );
    }

    Ok(AttemptRecord {
        attempt,
        model: model.to_string(),
        exit_code: output.exit_code,
        timed_out: output.timed_out,
        refusal,
        output: combined,
    })
}

fn describe_reset(outcome: &ResetOutcome) -> String {
    match outcome {
        ResetOutcome::Clean => "agent state reset: nothing to clear".to_string(),
        ResetOutcome::Cleared => "agent state reset: cleared".to_string(),
        ResetOutcome::Failed { detail } => {
            format!("agent state reset failed (continuing): {detail}")
        }
    }
}

// Log writes are best effort mid-run; the returned outcome carries the
// same data.
fn log_line(log: &JobLog, message: &str) {
    let _ = log.append(message);
}
