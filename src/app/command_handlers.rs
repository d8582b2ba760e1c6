use crate::app::cli::{help_text, parse_cli_verb, CliVerb};

pub mod doctor;
pub mod image;
pub mod init;
pub mod jobs;
pub mod run;
pub mod tools;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Run => run::cmd_run(&args[1..]),
        CliVerb::Init => init::cmd_init(),
        CliVerb::Jobs => jobs::cmd_jobs(),
        CliVerb::Status => jobs::cmd_status(&args[1..]),
        CliVerb::Logs => jobs::cmd_logs(&args[1..]),
        CliVerb::Purge => jobs::cmd_purge(),
        CliVerb::Image => image::cmd_image(&args[1..]),
        CliVerb::Tools => tools::cmd_tools(&args[1..]),
        CliVerb::Doctor => doctor::cmd_doctor(),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
