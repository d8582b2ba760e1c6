use sandpiper::app::command_handlers::run_cli;

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn no_arguments_prints_the_command_summary() {
    let text = run_cli(Vec::new()).expect("help");
    assert!(text.starts_with("Commands:"));
    assert!(text.contains("run \"<prompt>\""));
    assert!(text.contains("doctor"));
    assert!(text.contains("Run flags:"));
    assert!(text.contains("--detach"));
}

#[test]
fn unknown_verbs_are_rejected_with_the_verb_named() {
    let err = run_cli(args(&["launch"])).expect_err("unknown verb");
    assert_eq!(err, "unknown command `launch`");
}

#[test]
fn malformed_invocations_fail_on_usage_without_touching_config() {
    let err = run_cli(args(&["status"])).expect_err("status wants an id");
    assert_eq!(err, "usage: status <job-id>");

    let err = run_cli(args(&["status", "job-1", "extra"])).expect_err("one id only");
    assert_eq!(err, "usage: status <job-id>");

    let err = run_cli(args(&["logs"])).expect_err("logs wants an id");
    assert_eq!(err, "usage: logs <job-id>");

    let err = run_cli(args(&["image", "nuke"])).expect_err("bad image action");
    assert_eq!(err, "usage: image <status|build|rebuild>");

    let err = run_cli(args(&["tools", "nuke"])).expect_err("bad tools action");
    assert_eq!(err, "usage: tools <list|sync>");
}

#[test]
fn run_argument_errors_beat_config_errors() {
    let err = run_cli(args(&["run"])).expect_err("prompt required");
    assert!(err.starts_with("usage: run"));

    let err = run_cli(args(&["run", "--model"])).expect_err("dangling flag");
    assert_eq!(err, "--model expects a value");

    let err = run_cli(args(&["run", "p", "--frobnicate"])).expect_err("unknown flag");
    assert_eq!(err, "unknown flag `--frobnicate`");
}
