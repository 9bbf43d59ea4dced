#![doc = "GitHub REST implementation of the git data contract used by the commit pipeline."]
//
//! # GitHub client
//!
//! [`GitHubClient`] speaks the five git-data endpoints of the GitHub REST API
//! (`/repos/{owner}/{repo}/git/...`) and implements
//! [`git_bulk_core::contract::GitDataClient`] on top of them.
//!
//! - Construct with [`GitHubClient::new`] from the loaded config; the token
//!   comes from `GITHUB_TOKEN` via `load_config`.
//! - Non-2xx responses become a `RemoteError` carrying the status and the
//!   `message` field of GitHub's error body when present.
//! - Transport failures become a `RemoteError` without a status.
//! - Owner, repo, refs and shas are percent-encoded segment by segment; a `/`
//!   inside a ref name stays a path separator.

use async_trait::async_trait;
use git_bulk_core::contract::{
    GitCommit, GitDataClient, GitRef, GitTree, NewCommit, RepoRef, TreeEntry,
};
use git_bulk_core::error::RemoteError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";

pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    token: String,
}

#[derive(Deserialize)]
struct ObjectBody {
    sha: String,
}

#[derive(Deserialize)]
struct RefBody {
    #[serde(rename = "ref")]
    ref_name: String,
    object: ObjectBody,
}

#[derive(Deserialize)]
struct CommitBody {
    sha: String,
    tree: ObjectBody,
}

impl From<RefBody> for GitRef {
    fn from(body: RefBody) -> Self {
        GitRef {
            ref_name: body.ref_name,
            sha: body.object.sha,
        }
    }
}

impl From<CommitBody> for GitCommit {
    fn from(body: CommitBody) -> Self {
        GitCommit {
            sha: body.sha,
            tree_sha: body.tree.sha,
        }
    }
}

impl GitHubClient {
    pub fn new(api_url: &str, token: &str) -> anyhow::Result<Self> {
        let base = Url::parse(api_url)
            .map_err(|e| anyhow::anyhow!("Invalid GitHub API URL {api_url:?}: {e}"))?;
        anyhow::ensure!(
            !base.cannot_be_a_base(),
            "GitHub API URL {api_url:?} cannot carry a path"
        );

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .user_agent(concat!("git-bulk/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        tracing::info!(api_url, token_set = !token.is_empty(), "Initialised GitHub client");
        Ok(Self {
            http,
            api_url: base,
            token: token.to_string(),
        })
    }

    /// `{api_url}/repos/{owner}/{repo}/git/{tail...}`, one encoded segment per item.
    fn endpoint<'s>(&self, repo: &RepoRef, tail: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.api_url.clone();
        // `new` rejects cannot-be-a-base URLs
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repos", repo.owner.as_str(), repo.repo.as_str(), "git"])
                .extend(tail);
        }
        url
    }

    fn request<'s>(
        &self,
        method: Method,
        repo: &RepoRef,
        tail: impl IntoIterator<Item = &'s str>,
    ) -> RequestBuilder {
        self.http
            .request(method, self.endpoint(repo, tail))
            .bearer_auth(&self.token)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, RemoteError> {
        let resp = req.send().await.map_err(|e| {
            tracing::error!(error = %e, "GitHub request failed before a response");
            RemoteError::new(None, e.to_string())
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = error_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "request failed".to_string());
            tracing::warn!(status = status.as_u16(), %message, "GitHub returned an error");
            return Err(RemoteError::new(Some(status.as_u16()), message));
        }

        resp.json::<T>().await.map_err(|e| {
            RemoteError::new(
                Some(status.as_u16()),
                format!("unexpected response body: {e}"),
            )
        })
    }
}

/// GitHub error bodies look like `{"message": "...", "documentation_url": "..."}`.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(str::to_string)
}

/// `prefix` followed by the `/`-separated parts of a ref name.
fn ref_path<'a>(prefix: &'a str, ref_name: &'a str) -> impl Iterator<Item = &'a str> {
    std::iter::once(prefix).chain(ref_name.split('/'))
}

/// Removals are sent with an explicit `"sha": null`.
fn tree_entry_json(entry: &TreeEntry) -> Value {
    match &entry.content {
        Some(content) => json!({
            "path": entry.path,
            "mode": entry.mode,
            "type": entry.kind,
            "content": content,
        }),
        None => json!({
            "path": entry.path,
            "mode": entry.mode,
            "type": entry.kind,
            "sha": null,
        }),
    }
}

#[async_trait]
impl GitDataClient for GitHubClient {
    async fn get_ref(&self, repo: &RepoRef, ref_name: &str) -> Result<GitRef, RemoteError> {
        tracing::debug!(owner = %repo.owner, repo = %repo.repo, ref_name, "Fetching ref");
        let body: RefBody = self
            .send(self.request(Method::GET, repo, ref_path("ref", ref_name)))
            .await?;
        Ok(body.into())
    }

    async fn get_commit(&self, repo: &RepoRef, sha: &str) -> Result<GitCommit, RemoteError> {
        let body: CommitBody = self
            .send(self.request(Method::GET, repo, ["commits", sha]))
            .await?;
        Ok(body.into())
    }

    async fn create_tree(
        &self,
        repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<GitTree, RemoteError> {
        tracing::debug!(base_tree, entries = entries.len(), "Creating tree");
        let payload = json!({
            "base_tree": base_tree,
            "tree": entries.iter().map(tree_entry_json).collect::<Vec<_>>(),
        });
        let body: ObjectBody = self
            .send(self.request(Method::POST, repo, ["trees"]).json(&payload))
            .await?;
        Ok(GitTree { sha: body.sha })
    }

    async fn create_commit(
        &self,
        repo: &RepoRef,
        commit: &NewCommit,
    ) -> Result<GitCommit, RemoteError> {
        let payload = json!({
            "message": commit.message,
            "tree": commit.tree_sha,
            "parents": commit.parents,
        });
        let body: CommitBody = self
            .send(self.request(Method::POST, repo, ["commits"]).json(&payload))
            .await?;
        Ok(body.into())
    }

    async fn update_ref(
        &self,
        repo: &RepoRef,
        ref_name: &str,
        sha: &str,
        force: bool,
    ) -> Result<GitRef, RemoteError> {
        tracing::debug!(ref_name, sha, force, "Updating ref");
        let short = ref_name.strip_prefix("refs/").unwrap_or(ref_name);
        let payload = json!({ "sha": sha, "force": force });
        let body: RefBody = self
            .send(
                self.request(Method::PATCH, repo, ref_path("refs", short))
                    .json(&payload),
            )
            .await?;
        Ok(body.into())
    }
}
