use sandpiper::config::ToolsSettings;
use sandpiper::tools::{pull_remote_store, push_remote_store};
use std::fs;
use std::path::{Path, PathBuf};

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    }
}

/// Fake git that records every invocation (with its working directory) and
/// reacts to marker files dropped by the tests.
fn write_mock_git(dir: &Path) -> (PathBuf, PathBuf) {
    let state = dir.join("git-state");
    fs::create_dir_all(&state).expect("state dir");
    let script = dir.join("mock-git");
    write_script(
        &script,
        &format!(
            "#!/bin/sh\n\
             STATE={state}\n\
             echo \"$PWD|$*\" >> \"$STATE/calls.log\"\n\
             case \"$1\" in\n\
               clone)\n\
                 if [ -f \"$STATE/clone-fails\" ]; then\n\
                   echo 'fatal: repository not found' >&2\n\
                   exit 128\n\
                 fi\n\
                 mkdir -p \"$3/.git\"\n\
                 ;;\n\
               status)\n\
                 if [ -f \"$STATE/dirty\" ]; then echo ' M tool.py'; fi\n\
                 ;;\n\
               push)\n\
                 if [ -f \"$STATE/push-fails\" ]; then\n\
                   echo 'remote hung up' >&2\n\
                   exit 1\n\
                 fi\n\
                 ;;\n\
             esac\n\
             exit 0\n",
            state = state.display()
        ),
    );
    (script, state)
}

fn calls(state: &Path) -> Vec<String> {
    match fs::read_to_string(state.join("calls.log")) {
        Ok(log) => log.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

fn settings_for(script: &Path) -> ToolsSettings {
    ToolsSettings {
        remote: Some("git@example.com:team/tools.git".to_string()),
        git_binary: script.display().to_string(),
        ..ToolsSettings::default()
    }
}

#[test]
fn first_pull_clones_then_later_pulls_rebase_inside_the_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (script, state) = write_mock_git(dir.path());
    let settings = settings_for(&script);
    let store = dir.path().join("store");

    let report = pull_remote_store(&store, &settings);
    assert!(report.all_ok(), "clone should succeed: {}", report.summary());
    assert_eq!(report.steps[0].name, "clone");
    assert!(store.join(".git").is_dir());

    let report = pull_remote_store(&store, &settings);
    assert!(report.all_ok(), "pull should succeed: {}", report.summary());
    assert_eq!(report.steps[0].name, "pull");

    let recorded = calls(&state);
    assert_eq!(recorded.len(), 2);
    assert!(recorded[0].contains(&format!(
        "clone git@example.com:team/tools.git {}",
        store.display()
    )));
    let (pull_cwd, pull_args) = recorded[1].split_once('|').expect("cwd|args");
    assert_eq!(pull_args, "pull --rebase");
    assert_eq!(
        PathBuf::from(pull_cwd),
        store.canonicalize().expect("store path")
    );
}

#[test]
fn clone_failure_carries_the_git_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (script, state) = write_mock_git(dir.path());
    fs::write(state.join("clone-fails"), b"").expect("marker");
    let settings = settings_for(&script);

    let report = pull_remote_store(&dir.path().join("store"), &settings);
    assert!(!report.all_ok());
    assert_eq!(report.steps[0].name, "clone");
    assert!(report
        .steps[0]
        .detail
        .as_deref()
        .expect("detail")
        .contains("repository not found"));
}

#[test]
fn push_commits_only_when_the_tree_changed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (script, state) = write_mock_git(dir.path());
    let settings = settings_for(&script);
    let store = dir.path().join("store");
    fs::create_dir_all(store.join(".git")).expect("seed store repo");

    // Clean tree stops after the status check.
    let report = push_remote_store(&store, &settings, "stash new tools");
    assert!(report.all_ok(), "{}", report.summary());
    let names: Vec<&str> = report.steps.iter().map(|step| step.name).collect();
    assert_eq!(names, vec!["add", "status"]);
    assert!(report
        .steps[1]
        .detail
        .as_deref()
        .expect("detail")
        .contains("nothing to push"));

    // A dirty tree runs the full add, status, commit, push sequence.
    fs::write(state.join("dirty"), b"").expect("marker");
    let report = push_remote_store(&store, &settings, "stash new tools");
    assert!(report.all_ok(), "{}", report.summary());
    let names: Vec<&str> = report.steps.iter().map(|step| step.name).collect();
    assert_eq!(names, vec!["add", "status", "commit", "push"]);

    let recorded = calls(&state);
    assert!(recorded
        .iter()
        .any(|line| line.contains("commit -m stash new tools")));
    assert!(recorded
        .last()
        .expect("at least one call")
        .ends_with("|push"));
}

#[test]
fn failed_push_is_reported_not_swallowed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (script, state) = write_mock_git(dir.path());
    fs::write(state.join("dirty"), b"").expect("marker");
    fs::write(state.join("push-fails"), b"").expect("marker");
    let settings = settings_for(&script);
    let store = dir.path().join("store");
    fs::create_dir_all(store.join(".git")).expect("seed store repo");

    let report = push_remote_store(&store, &settings, "stash new tools");
    assert!(!report.all_ok());
    let push = report.steps.last().expect("push step");
    assert_eq!(push.name, "push");
    assert!(!push.ok);
    assert!(push
        .detail
        .as_deref()
        .expect("detail")
        .contains("remote hung up"));
}
