use assert_cmd::Command;
use httpmock::Method::{GET, PATCH, POST};
use httpmock::MockServer;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs::write;
use std::net::TcpListener;
use tempfile::NamedTempFile;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn request_file(body: &Value) -> NamedTempFile {
    let file = NamedTempFile::new().expect("Creating temp request file failed");
    write(file.path(), body.to_string()).expect("Writing temp request failed");
    file
}

/// Scripts the five git-data endpoints for a single commit on `main`.
fn mock_commit_sequence(server: &MockServer, tree_status: u16) {
    server.mock(|when, then| {
        when.method(GET)
            .path("/repos/octo/demo/git/ref/heads/main")
            .header("authorization", "Bearer test-token");
        then.status(200).json_body(json!({
            "ref": "refs/heads/main",
            "object": { "sha": "base-sha", "type": "commit" }
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/repos/octo/demo/git/commits/base-sha");
        then.status(200).json_body(json!({
            "sha": "base-sha",
            "tree": { "sha": "base-tree" }
        }));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/repos/octo/demo/git/trees")
            .body_contains("\"base_tree\":\"base-tree\"");
        if tree_status == 201 {
            then.status(201).json_body(json!({ "sha": "new-tree" }));
        } else {
            then.status(tree_status)
                .json_body(json!({ "message": "tree rejected" }));
        }
    });
    server.mock(|when, then| {
        when.method(POST).path("/repos/octo/demo/git/commits");
        then.status(201).json_body(json!({
            "sha": "new-commit",
            "tree": { "sha": "new-tree" }
        }));
    });
    server.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/octo/demo/git/refs/heads/main")
            .body_contains("\"force\":false");
        then.status(200).json_body(json!({
            "ref": "refs/heads/main",
            "object": { "sha": "new-commit", "type": "commit" }
        }));
    });
}

fn push_request() -> Value {
    json!({
        "owner": "octo",
        "repo": "demo",
        "branch": "main",
        "message": "Add docs",
        "files": [
            { "path": "docs/a.md", "content": "# A" },
            { "path": "docs/b.md", "content": "# B" },
            { "path": "docs/c.md", "content": "" }
        ]
    })
}

#[test]
fn limits_prints_ceilings_without_a_token() {
    let output = Command::cargo_bin("git-bulk")
        .expect("Binary exists")
        .arg("limits")
        .env_remove("GITHUB_TOKEN")
        .output()
        .expect("limits should run");

    assert!(output.status.success());
    let limits: Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(limits["max_files_per_push"], 100);
    assert_eq!(limits["max_file_size_bytes"], 26_214_400);
    assert_eq!(limits["max_total_push_size_bytes"], 104_857_600);
    assert_eq!(limits["default_chunk_size"], 50);
    assert_eq!(limits["max_chunk_size"], 100);
}

#[test]
fn push_happy_flow_prints_batch_result() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start();
    mock_commit_sequence(&server, 201);
    let request = request_file(&push_request());

    Command::cargo_bin("git-bulk")
        .expect("Binary exists")
        .arg("push")
        .arg("--request")
        .arg(request.path())
        .env("GITHUB_API_URL", server.base_url())
        .env("GITHUB_TOKEN", "test-token")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"fully_successful\": true")
                .and(predicate::str::contains("\"final_commit_sha\": \"new-commit\"")),
        );
}

#[test]
fn push_with_failed_chunk_exits_non_zero() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start();
    mock_commit_sequence(&server, 422);
    let request = request_file(&push_request());

    Command::cargo_bin("git-bulk")
        .expect("Binary exists")
        .arg("push")
        .arg("--request")
        .arg(request.path())
        .env("GITHUB_API_URL", server.base_url())
        .env("GITHUB_TOKEN", "test-token")
        .assert()
        .failure()
        .stdout(
            predicate::str::contains("\"fully_successful\": false")
                .and(predicate::str::contains("failed to create tree: tree rejected")),
        );
}

#[test]
fn delete_happy_flow_prints_deleted_paths() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start();
    mock_commit_sequence(&server, 201);
    let request = request_file(&json!({
        "owner": "octo",
        "repo": "demo",
        "branch": "main",
        "message": "Prune",
        "paths": ["docs/old.md"]
    }));

    Command::cargo_bin("git-bulk")
        .expect("Binary exists")
        .arg("delete")
        .arg("--request")
        .arg(request.path())
        .env("GITHUB_API_URL", server.base_url())
        .env("GITHUB_TOKEN", "test-token")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"files_deleted\": 1")
                .and(predicate::str::contains("\"ref\": \"refs/heads/main\"")),
        );
}

#[test]
fn commit_without_token_fails_with_clear_message() {
    let request = request_file(&push_request());

    Command::cargo_bin("git-bulk")
        .expect("Binary exists")
        .arg("commit")
        .arg("--request")
        .arg(request.path())
        .env_remove("GITHUB_TOKEN")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use git_bulk::cli::{run, Cli, Commands};

    let cli = Cli {
        config: None,
        command: Commands::Limits,
    };

    run(cli).await.expect("limits never fails");

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
