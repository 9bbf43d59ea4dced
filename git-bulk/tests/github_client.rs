use git_bulk::github::GitHubClient;
use git_bulk_core::contract::{GitDataClient, NewCommit, RepoRef, TreeEntry};
use httpmock::Method::{GET, PATCH, POST};
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn repo() -> RepoRef {
    RepoRef::new("octo", "demo")
}

#[tokio::test]
async fn get_ref_sends_token_and_parses_tip() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/octo/demo/git/ref/heads/main")
                .header("authorization", "Bearer secret")
                .header("accept", "application/vnd.github+json")
                .header_exists("user-agent");
            then.status(200).json_body(json!({
                "ref": "refs/heads/main",
                "node_id": "REF_1",
                "object": { "sha": "abc123", "type": "commit", "url": "x" }
            }));
        })
        .await;

    let client = GitHubClient::new(&server.base_url(), "secret").unwrap();
    let head = client.get_ref(&repo(), "heads/main").await.unwrap();

    mock.assert_async().await;
    assert_eq!(head.ref_name, "refs/heads/main");
    assert_eq!(head.sha, "abc123");
}

#[tokio::test]
async fn error_status_maps_to_remote_error_with_message() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PATCH).path("/repos/octo/demo/git/refs/heads/main");
            then.status(422).json_body(json!({
                "message": "Update is not a fast forward",
                "documentation_url": "https://docs.github.com/rest"
            }));
        })
        .await;

    let client = GitHubClient::new(&server.base_url(), "secret").unwrap();
    let err = client
        .update_ref(&repo(), "refs/heads/main", "def456", false)
        .await
        .unwrap_err();

    assert_eq!(err.status, Some(422));
    assert_eq!(err.message, "Update is not a fast forward");
}

#[tokio::test]
async fn non_json_error_falls_back_to_status_reason() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/demo/git/commits/abc");
            then.status(502).body("<html>upstream down</html>");
        })
        .await;

    let client = GitHubClient::new(&server.base_url(), "secret").unwrap();
    let err = client.get_commit(&repo(), "abc").await.unwrap_err();

    assert_eq!(err.status, Some(502));
    assert_eq!(err.message, "Bad Gateway");
}

#[tokio::test]
async fn create_tree_sends_base_tree_and_removals() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/repos/octo/demo/git/trees")
                .json_body(json!({
                    "base_tree": "base",
                    "tree": [
                        { "path": "new.txt", "mode": "100644", "type": "blob", "content": "hello" },
                        { "path": "old.txt", "mode": "100644", "type": "blob", "sha": null }
                    ]
                }));
            then.status(201).json_body(json!({ "sha": "tree-1", "tree": [] }));
        })
        .await;

    let client = GitHubClient::new(&server.base_url(), "secret").unwrap();
    let tree = client
        .create_tree(
            &repo(),
            "base",
            &[TreeEntry::file("new.txt", "hello"), TreeEntry::removal("old.txt")],
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(tree.sha, "tree-1");
}

#[tokio::test]
async fn create_commit_and_update_ref_round_out_the_sequence() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start_async().await;
    let commit_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/repos/octo/demo/git/commits")
                .json_body(json!({
                    "message": "Add files",
                    "tree": "tree-1",
                    "parents": ["base-sha"]
                }));
            then.status(201).json_body(json!({
                "sha": "commit-1",
                "tree": { "sha": "tree-1" },
                "parents": [{ "sha": "base-sha" }]
            }));
        })
        .await;
    let ref_mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/repos/octo/demo/git/refs/heads/main")
                .json_body(json!({ "sha": "commit-1", "force": false }));
            then.status(200).json_body(json!({
                "ref": "refs/heads/main",
                "object": { "sha": "commit-1", "type": "commit" }
            }));
        })
        .await;

    let client = GitHubClient::new(&server.base_url(), "secret").unwrap();
    let commit = client
        .create_commit(
            &repo(),
            &NewCommit {
                message: "Add files".into(),
                tree_sha: "tree-1".into(),
                parents: vec!["base-sha".into()],
            },
        )
        .await
        .unwrap();
    let updated = client
        .update_ref(&repo(), "refs/heads/main", &commit.sha, false)
        .await
        .unwrap();

    commit_mock.assert_async().await;
    ref_mock.assert_async().await;
    assert_eq!(commit.tree_sha, "tree-1");
    assert_eq!(updated.sha, "commit-1");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let client = GitHubClient::new("http://127.0.0.1:9", "secret").unwrap();
    let err = client.get_ref(&repo(), "heads/main").await.unwrap_err();
    assert_eq!(err.status, None);
}
