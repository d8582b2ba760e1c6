use sandpiper::config::{SandboxBackend, Settings};
use sandpiper::engine::{Engine, JobRequest};
use sandpiper::jobs::JobStatus;
use sandpiper::sandbox::{
    ReleaseOutcome, RemoteSandbox, ResetOutcome, Sandbox, SandboxCommand, SandboxError,
};
use sandpiper::shared::{bootstrap_state_root, StatePaths};
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const API_BASE_ENV: &str = "SANDPIPER_SANDBOX_API_BASE";

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    path: String,
    auth_header: String,
    body: String,
}

struct MockProviderServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockProviderServer {
    fn start<F>(expected_requests: usize, responder: F) -> Self
    where
        F: Fn(usize, &str, &str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_for_thread = Arc::clone(&requests);

        let handle = thread::spawn(move || {
            for index in 0..expected_requests {
                let (mut stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

                let mut request_line = String::new();
                reader
                    .read_line(&mut request_line)
                    .expect("read request line");
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or("").to_string();
                let path = parts.next().unwrap_or("/").to_string();

                let mut auth_header = String::new();
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).expect("read header");
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    let lower = line.to_ascii_lowercase();
                    if lower.starts_with("authorization:") {
                        auth_header = line
                            .split_once(':')
                            .map(|(_, v)| v.trim().to_string())
                            .unwrap_or_default();
                    }
                    if lower.starts_with("content-length:") {
                        content_length = line
                            .split_once(':')
                            .map(|(_, v)| v.trim().parse::<usize>().unwrap_or(0))
                            .unwrap_or(0);
                    }
                }

                let mut body = vec![0_u8; content_length];
                if content_length > 0 {
                    reader.read_exact(&mut body).expect("read body");
                }
                let body = String::from_utf8_lossy(&body).to_string();

                let (status, response_body) = responder(index, &method, &path);
                requests_for_thread
                    .lock()
                    .expect("lock requests")
                    .push(RecordedRequest {
                        method,
                        path,
                        auth_header,
                        body,
                    });

                let reason = if status == 200 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response_body.len(),
                    response_body
                );
                stream
                    .write_all(response.as_bytes())
                    .expect("write response");
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
            handle: Some(handle),
        }
    }

    fn finish(mut self) -> Vec<RecordedRequest> {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("join mock server");
        }
        self.requests.lock().expect("lock requests").clone()
    }
}

fn ok_exec(stdout: &str) -> (u16, String) {
    (
        200,
        format!("{{\"exitCode\": 0, \"result\": \"{stdout}\", \"stderr\": \"\"}}"),
    )
}

fn remote_settings(base_url: &str) -> Settings {
    let mut settings = Settings::default();
    settings.sandbox.backend = SandboxBackend::Remote;
    settings.sandbox.remote.api_base = base_url.to_string();
    settings
}

#[test]
fn create_prepares_the_workspace_and_installs_the_agent() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    std::env::remove_var(API_BASE_ENV);

    let server = MockProviderServer::start(3, |index, _method, _path| match index {
        0 => (200, "{\"sandboxId\": \"sb-77\"}".to_string()),
        _ => ok_exec("ok"),
    });
    let settings = remote_settings(&server.base_url);

    let sandbox = RemoteSandbox::create(&settings).expect("create");
    assert_eq!(sandbox.id(), "sb-77");

    let requests = server.finish();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/sandboxes");
    assert!(requests[0].auth_header.is_empty());

    assert_eq!(requests[1].path, "/sandboxes/sb-77/exec");
    assert!(requests[1].body.contains("mkdir -p '/workspace'"));
    assert!(requests[1].body.contains("timeoutMs"));

    assert!(requests[2]
        .body
        .contains("npm install -g @anthropic-ai/claude-code"));
}

#[test]
fn bearer_token_is_sent_when_the_token_env_is_configured() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    std::env::remove_var(API_BASE_ENV);
    std::env::set_var("SANDPIPER_TEST_PROVIDER_TOKEN", "tok-123");

    let server = MockProviderServer::start(3, |index, _method, _path| match index {
        0 => (200, "{\"id\": \"sb-1\"}".to_string()),
        _ => ok_exec("ok"),
    });
    let mut settings = remote_settings(&server.base_url);
    settings.sandbox.remote.api_token_env = "SANDPIPER_TEST_PROVIDER_TOKEN".to_string();

    let sandbox = RemoteSandbox::create(&settings).expect("create");
    drop(sandbox);
    std::env::remove_var("SANDPIPER_TEST_PROVIDER_TOKEN");

    let requests = server.finish();
    for request in &requests {
        assert_eq!(request.auth_header, "Bearer tok-123");
    }
}

#[test]
fn exec_wraps_the_argv_in_a_quoted_workspace_cd() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    std::env::remove_var(API_BASE_ENV);

    let server = MockProviderServer::start(4, |index, _method, _path| match index {
        0 => (200, "{\"id\": \"sb-2\"}".to_string()),
        3 => (
            200,
            "{\"exit_code\": 4, \"stdout\": \"agent says hi\", \"stderr\": \"warn\"}".to_string(),
        ),
        _ => ok_exec("ok"),
    });
    let settings = remote_settings(&server.base_url);
    let sandbox = RemoteSandbox::create(&settings).expect("create");

    let output = sandbox
        .exec(&SandboxCommand::new(
            "claude",
            vec![
                "run".to_string(),
                "--model".to_string(),
                "claude-sonnet-4-5".to_string(),
                "prompt with spaces and 'quotes'".to_string(),
                "--print-logs".to_string(),
            ],
            Duration::from_secs(30),
        ))
        .expect("exec");

    assert_eq!(output.exit_code, 4);
    assert_eq!(output.stdout, "agent says hi");
    assert_eq!(output.stderr, "warn");
    assert!(!output.timed_out);

    let requests = server.finish();
    let body: serde_json::Value =
        serde_json::from_str(&requests[3].body).expect("exec body is json");
    let command = body["command"].as_str().expect("command field");
    assert!(command.starts_with("cd '/workspace' && 'claude' 'run' '--model' 'claude-sonnet-4-5'"));
    assert!(command.contains("'prompt with spaces and '\\''quotes'\\'''"));
    assert_eq!(body["timeoutMs"], 30_000);
}

#[test]
fn failed_install_deletes_the_half_prepared_sandbox() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    std::env::remove_var(API_BASE_ENV);

    let server = MockProviderServer::start(4, |index, _method, _path| match index {
        0 => (200, "{\"id\": \"sb-3\"}".to_string()),
        1 => ok_exec("ok"),
        2 => (
            200,
            "{\"exitCode\": 1, \"result\": \"\", \"stderr\": \"npm broke\"}".to_string(),
        ),
        _ => (200, "{}".to_string()),
    });
    let settings = remote_settings(&server.base_url);

    let err = RemoteSandbox::create(&settings).expect_err("install fails");
    match err {
        SandboxError::Install { detail } => assert!(detail.contains("npm broke")),
        other => panic!("expected install error, got {other:?}"),
    }

    let requests = server.finish();
    assert_eq!(requests[3].method, "DELETE");
    assert_eq!(requests[3].path, "/sandboxes/sb-3");
}

#[test]
fn release_destroys_unless_asked_to_keep() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    std::env::remove_var(API_BASE_ENV);

    let server = MockProviderServer::start(4, |index, _method, _path| match index {
        0 => (200, "{\"id\": \"sb-4\"}".to_string()),
        3 => (200, "{}".to_string()),
        _ => ok_exec("ok"),
    });
    let settings = remote_settings(&server.base_url);
    let sandbox = RemoteSandbox::create(&settings).expect("create");
    assert_eq!(Box::new(sandbox).release(false), ReleaseOutcome::Destroyed);
    let requests = server.finish();
    assert_eq!(requests[3].method, "DELETE");

    // keep=true never calls the provider again.
    let server = MockProviderServer::start(3, |index, _method, _path| match index {
        0 => (200, "{\"id\": \"sb-5\"}".to_string()),
        _ => ok_exec("ok"),
    });
    let settings = remote_settings(&server.base_url);
    let sandbox = RemoteSandbox::create(&settings).expect("create");
    assert_eq!(Box::new(sandbox).release(true), ReleaseOutcome::Retained);
    let requests = server.finish();
    assert_eq!(requests.len(), 3);
}

#[test]
fn failed_destroy_is_reported_not_swallowed() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    std::env::remove_var(API_BASE_ENV);

    let server = MockProviderServer::start(4, |index, _method, _path| match index {
        0 => (200, "{\"id\": \"sb-6\"}".to_string()),
        3 => (500, "{\"error\": \"backend gone\"}".to_string()),
        _ => ok_exec("ok"),
    });
    let settings = remote_settings(&server.base_url);
    let sandbox = RemoteSandbox::create(&settings).expect("create");

    match Box::new(sandbox).release(false) {
        ReleaseOutcome::DestroyFailed { detail } => assert!(detail.contains("500")),
        other => panic!("expected destroy failure, got {other:?}"),
    }
    server.finish();
}

#[test]
fn workspace_listing_keeps_files_and_drops_directories() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    std::env::remove_var(API_BASE_ENV);

    let server = MockProviderServer::start(4, |index, _method, _path| match index {
        0 => (200, "{\"id\": \"sb-7\"}".to_string()),
        3 => (
            200,
            "{\"exitCode\": 0, \"result\": \"fizz.py\\nnotes.md\\nsubdir/\\n.claude/\\n\"}"
                .to_string(),
        ),
        _ => ok_exec("ok"),
    });
    let settings = remote_settings(&server.base_url);
    let sandbox = RemoteSandbox::create(&settings).expect("create");

    let names = sandbox.workspace_listing().expect("listing");
    assert_eq!(names, vec!["fizz.py", "notes.md"]);

    let requests = server.finish();
    assert!(requests[3].body.contains("ls -1Ap '/workspace'"));
}

// The jobs directory holds exactly one record while a run_job test is in
// flight; its status at a given moment is the ordering witness.
fn recorded_status(jobs_dir: &Path) -> Option<String> {
    let entries = fs::read_dir(jobs_dir).ok()?;
    let record = entries
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))?;
    let raw = fs::read_to_string(record).ok()?;
    let json: serde_json::Value = serde_json::from_str(&raw).ok()?;
    json["status"].as_str().map(str::to_string)
}

#[test]
fn run_job_finalizes_the_record_before_destroying_the_sandbox() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    std::env::remove_var(API_BASE_ENV);

    let dir = tempfile::tempdir().expect("tempdir");
    let paths = StatePaths::new(dir.path().join("state"));
    bootstrap_state_root(&paths).expect("bootstrap");
    let jobs_dir = paths.jobs_dir();

    let status_at_delete: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let status_for_server = Arc::clone(&status_at_delete);
    // create, mkdir, install, agent attempt, workspace listing, delete.
    let server = MockProviderServer::start(6, move |index, method, _path| {
        if index == 0 {
            return (200, "{\"id\": \"sb-9\"}".to_string());
        }
        if method == "DELETE" {
            *status_for_server.lock().expect("lock status") = recorded_status(&jobs_dir);
            return (200, "{}".to_string());
        }
        ok_exec("")
    });

    let settings = remote_settings(&server.base_url);
    let engine = Engine::new(settings, paths);
    let outcome = engine
        .run_job(&JobRequest {
            prompt: "write a fizzbuzz script".to_string(),
            ..JobRequest::default()
        })
        .expect("run");
    assert_eq!(outcome.status, JobStatus::Completed);

    let requests = server.finish();
    assert_eq!(requests[5].method, "DELETE");
    assert_eq!(
        status_at_delete.lock().expect("status").as_deref(),
        Some("completed")
    );
}

#[test]
fn reset_clears_agent_state_directories() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    std::env::remove_var(API_BASE_ENV);

    let server = MockProviderServer::start(4, |index, _method, _path| match index {
        0 => (200, "{\"id\": \"sb-8\"}".to_string()),
        _ => ok_exec("ok"),
    });
    let settings = remote_settings(&server.base_url);
    let sandbox = RemoteSandbox::create(&settings).expect("create");

    assert_eq!(sandbox.reset_agent_state(), ResetOutcome::Cleared);

    let requests = server.finish();
    let body = &requests[3].body;
    assert!(body.contains("rm -rf"));
    assert!(body.contains("$HOME/.claude"));
    assert!(body.contains("$HOME/.config/claude"));
    assert!(body.contains("/workspace/.claude"));
}
