//! The five-call commit sequence against the remote object store.
//!
//! Nothing here mutates branch state until the final, non-force ref update, so
//! a failure at any earlier step leaves the remote untouched.

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chunking::Chunk;
use crate::contract::{GitDataClient, NewCommit, RepoRef, TreeEntry};
use crate::error::{PipelineStep, PushError, RemoteError, RetryError};
use crate::ratelimit::{EndpointClass, RateLimiter};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::validation::validate_chunk_size;

/// Every remote call passes through here: one core token per attempt, and a
/// retry loop only when the batch was given a [`RetryConfig`].
pub struct CallGate<'a> {
    limiter: &'a RateLimiter,
    retry: Option<&'a RetryConfig>,
    cancel: &'a CancellationToken,
}

enum GateError {
    Cancelled,
    Remote(RemoteError),
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::Cancelled => f.write_str("operation cancelled"),
            GateError::Remote(e) => e.fmt(f),
        }
    }
}

impl<'a> CallGate<'a> {
    pub fn new(
        limiter: &'a RateLimiter,
        retry: Option<&'a RetryConfig>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            limiter,
            retry,
            cancel,
        }
    }

    pub async fn call<T, F, Fut>(&self, step: PipelineStep, mut request: F) -> Result<T, PushError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let limiter = self.limiter;
        let cancel = self.cancel;
        let mut attempt = move || {
            // futures are lazy: the request is only sent after the token is held
            let pending = request();
            async move {
                limiter
                    .acquire(EndpointClass::Core, cancel)
                    .await
                    .map_err(|_| GateError::Cancelled)?;
                pending.await.map_err(GateError::Remote)
            }
        };

        let outcome = match self.retry {
            Some(config) => retry_with_backoff(cancel, config, attempt).await,
            None => attempt().await.map_err(|err| {
                // a signal that fired while the request was in flight wins
                if cancel.is_cancelled() {
                    RetryError::Cancelled
                } else {
                    RetryError::Exhausted(err)
                }
            }),
        };

        outcome.map_err(|err| match err {
            RetryError::Cancelled | RetryError::Exhausted(GateError::Cancelled) => {
                PushError::Cancelled
            }
            RetryError::Exhausted(GateError::Remote(source)) => PushError::Remote { step, source },
        })
    }
}

/// Result of a successful ref advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub commit_sha: String,
    pub ref_name: String,
}

/// Commits `entries` on top of the tip of `branch` and advances the branch.
///
/// Shared by chunk commits, single-commit pushes and deletes.
pub async fn commit_tree_entries<C>(
    client: &C,
    gate: &CallGate<'_>,
    repo: &RepoRef,
    branch: &str,
    entries: &[TreeEntry],
    message: &str,
) -> Result<CommitOutcome, PushError>
where
    C: GitDataClient + ?Sized,
{
    let lookup = format!("heads/{branch}");
    let full_ref = format!("refs/heads/{branch}");

    let head = {
        let lookup = lookup.as_str();
        gate.call(PipelineStep::GetRef, move || client.get_ref(repo, lookup))
            .await?
    };
    debug!(branch, tip = %head.sha, "Resolved branch tip");

    let base = {
        let sha = head.sha.as_str();
        gate.call(PipelineStep::GetCommit, move || client.get_commit(repo, sha))
            .await?
    };

    let tree = {
        let base_tree = base.tree_sha.as_str();
        gate.call(PipelineStep::CreateTree, move || {
            client.create_tree(repo, base_tree, entries)
        })
        .await?
    };
    debug!(tree = %tree.sha, entries = entries.len(), "Created tree");

    let new_commit = NewCommit {
        message: message.to_string(),
        tree_sha: tree.sha,
        parents: vec![head.sha.clone()],
    };
    let commit = {
        let new_commit = &new_commit;
        gate.call(PipelineStep::CreateCommit, move || {
            client.create_commit(repo, new_commit)
        })
        .await?
    };

    let updated = {
        let full_ref = full_ref.as_str();
        let sha = commit.sha.as_str();
        gate.call(PipelineStep::UpdateRef, move || {
            client.update_ref(repo, full_ref, sha, false)
        })
        .await?
    };
    debug!(commit = %commit.sha, ref_name = %updated.ref_name, "Advanced branch");

    Ok(CommitOutcome {
        commit_sha: commit.sha,
        ref_name: updated.ref_name,
    })
}

/// Commits one planned chunk, re-checking it against the absolute payload ceiling first.
pub async fn commit_chunk<C>(
    client: &C,
    gate: &CallGate<'_>,
    repo: &RepoRef,
    branch: &str,
    chunk: &Chunk,
    message: &str,
) -> Result<String, PushError>
where
    C: GitDataClient + ?Sized,
{
    validate_chunk_size(chunk.files())?;

    let entries: Vec<TreeEntry> = chunk
        .files()
        .iter()
        .map(|f| TreeEntry::file(f.path.as_str(), f.content.as_str()))
        .collect();

    commit_tree_entries(client, gate, repo, branch, &entries, message)
        .await
        .map(|outcome| outcome.commit_sha)
}
