#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Run,
    Init,
    Jobs,
    Status,
    Logs,
    Purge,
    Image,
    Tools,
    Doctor,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "run" => CliVerb::Run,
        "init" => CliVerb::Init,
        "jobs" => CliVerb::Jobs,
        "status" => CliVerb::Status,
        "logs" => CliVerb::Logs,
        "purge" => CliVerb::Purge,
        "image" => CliVerb::Image,
        "tools" => CliVerb::Tools,
        "doctor" => CliVerb::Doctor,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  run \"<prompt>\" [flags]              Dispatch a job to a sandboxed agent".to_string(),
        "  init                                 Create the state root and default config"
            .to_string(),
        "  jobs                                 List recorded jobs".to_string(),
        "  status <job-id>                      Show one job record".to_string(),
        "  logs <job-id>                        Print a job's log file".to_string(),
        "  purge                                Delete every job record and log".to_string(),
        "  image status|build|rebuild           Manage the local sandbox image".to_string(),
        "  tools list|sync                      Inspect or sync the shared tool store".to_string(),
        "  doctor                               Run environment and config checks".to_string(),
    ]
}

pub fn run_flag_help_lines() -> Vec<String> {
    vec![
        "Run flags:".to_string(),
        "  --model <id>          Override the configured primary model".to_string(),
        "  --retry-model <id>    Override the fallback model for refusal retries".to_string(),
        "  --file <path>         Attach a context file (repeatable)".to_string(),
        "  --working-dir <path>  Use an existing directory as the job workspace".to_string(),
        "  --timeout <seconds>   Override the per-attempt timeout".to_string(),
        "  --backend <kind>      Run in the local image or a remote sandbox".to_string(),
        "  --keep-sandbox        Keep a per-job sandbox instead of destroying it".to_string(),
        "  --detach              Start the job in the background and return its id".to_string(),
        "  --quiet               Print only the agent's final output".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    let mut lines = cli_help_lines();
    lines.push(String::new());
    lines.extend(run_flag_help_lines());
    lines.join("\n")
}
