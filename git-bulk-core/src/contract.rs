//! # contract: the remote object store the commit pipeline talks to
//!
//! [`GitDataClient`] is the single seam between the core and the network. It
//! exposes the five low-level git-data calls the pipeline needs and nothing
//! more: reading a branch tip, reading a commit, writing a tree, writing a
//! commit and moving a ref.
//!
//! ## Implementing
//! - The CLI crate ships a GitHub REST implementation.
//! - Every failure is reported as a [`RemoteError`] carrying the HTTP status
//!   when one exists. The pipeline wraps it with the step that failed.
//!
//! ## Mocking
//! - The trait is annotated for `mockall`; `MockGitDataClient` is exported
//!   under the default `test-export-mocks` feature so downstream tests can
//!   script remote behaviour.

use async_trait::async_trait;
use serde::Serialize;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::RemoteError;

/// Regular, non-executable file.
pub const FILE_MODE: &str = "100644";
pub const BLOB_TYPE: &str = "blob";

/// Owner/name pair identifying a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

/// A resolved reference and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    pub sha: String,
    pub tree_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitTree {
    pub sha: String,
}

/// Input for a new commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub message: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
}

/// One path in a tree write, merged by the remote into the base tree.
///
/// `content: None` removes the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Option<String>,
}

impl TreeEntry {
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: FILE_MODE.to_string(),
            kind: BLOB_TYPE.to_string(),
            content: Some(content.into()),
        }
    }

    pub fn removal(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: FILE_MODE.to_string(),
            kind: BLOB_TYPE.to_string(),
            content: None,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.content.is_none()
    }
}

/// Low-level git data API of the remote repository service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GitDataClient: Send + Sync {
    /// Resolves `ref_name` (e.g. `heads/main`) to the commit it points at.
    async fn get_ref(&self, repo: &RepoRef, ref_name: &str) -> Result<GitRef, RemoteError>;

    async fn get_commit(&self, repo: &RepoRef, sha: &str) -> Result<GitCommit, RemoteError>;

    /// Writes a tree on top of `base_tree`. Only the given paths change.
    async fn create_tree(
        &self,
        repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<GitTree, RemoteError>;

    async fn create_commit(
        &self,
        repo: &RepoRef,
        commit: &NewCommit,
    ) -> Result<GitCommit, RemoteError>;

    /// Moves `ref_name` (e.g. `refs/heads/main`) to `sha`.
    ///
    /// With `force == false` the remote must reject a non fast-forward move.
    async fn update_ref(
        &self,
        repo: &RepoRef,
        ref_name: &str,
        sha: &str,
        force: bool,
    ) -> Result<GitRef, RemoteError>;
}
