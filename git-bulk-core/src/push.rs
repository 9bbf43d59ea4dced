//! Batch orchestration: validate, plan, then commit chunk by chunk.
//!
//! Three entrypoints share the commit sequence in [`crate::pipeline`]:
//! - [`push_files_chunked`]: any number of files, one commit per chunk
//! - [`push_files`]: up to [`MAX_FILES_PER_PUSH`] files in one commit
//! - [`delete_files`]: removal of up to [`MAX_FILES_PER_PUSH`] paths in one commit
//!
//! Validation failures abort before the first remote call. Chunks run strictly
//! in order, since each commit's parent is the tip left by the previous one.
//! Earlier successful chunks are never rolled back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::chunking::plan_chunks;
use crate::contract::{GitDataClient, RepoRef, TreeEntry};
use crate::error::{ErrorKind, PushError};
use crate::limits::{effective_chunk_size, max_chunk_bytes, MAX_FILES_PER_PUSH};
use crate::pipeline::{commit_chunk, commit_tree_entries, CallGate};
use crate::ratelimit::RateLimiter;
use crate::retry::RetryConfig;
use crate::validation::{
    validate_delete_paths, validate_file_count, validate_file_size, validate_files,
    validate_not_empty, validate_total_size, FileEntry,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BulkPushRequest {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Raw `{path, content}` objects; shape is checked by the validator.
    pub files: Vec<Value>,
    pub message: String,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushRequest {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub files: Vec<Value>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BulkDeleteRequest {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub paths: Vec<Value>,
    pub message: String,
}

/// Record of one attempted chunk. `commit_sha` is set iff `success`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkOutcome {
    /// 1-based position in the plan.
    pub chunk_index: usize,
    pub files_in_chunk: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub total_files: usize,
    pub total_chunks: usize,
    pub successful_chunks: usize,
    pub failed_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_commit_sha: Option<String>,
    pub chunks: Vec<ChunkOutcome>,
    pub fully_successful: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushResult {
    pub commit_sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub files_pushed: usize,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteResult {
    pub commit_sha: String,
    pub deleted_files: Vec<String>,
    pub files_deleted: usize,
    #[serde(rename = "ref")]
    pub ref_name: String,
}

/// What a batch execution runs with: the shared limiter, an optional retry
/// policy and the cancellation signal.
#[derive(Clone)]
pub struct PushContext {
    pub limiter: Arc<RateLimiter>,
    pub retry: Option<RetryConfig>,
    pub cancel: CancellationToken,
}

impl PushContext {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            retry: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn gate(&self) -> CallGate<'_> {
        CallGate::new(&self.limiter, self.retry.as_ref(), &self.cancel)
    }
}

/// Rejects the first oversized file, in input order, with its own size.
fn reject_oversized(entries: &[FileEntry]) -> Result<(), PushError> {
    for entry in entries {
        validate_file_size(&entry.path, entry.size())?;
    }
    Ok(())
}

fn chunk_message(message: &str, index: usize, total: usize) -> String {
    if total > 1 {
        format!("{message} [chunk {index}/{total}]")
    } else {
        message.to_string()
    }
}

/// Pushes any number of files as a sequence of size-bounded commits.
///
/// Returns `Err` only for batch-level validation failures. Per-chunk failures
/// are recorded in the [`BatchResult`]; the batch stops at the first one unless
/// `continue_on_error` is set. A cancelled chunk counts as a failure like any
/// other, so with `continue_on_error` every remaining chunk is recorded as
/// cancelled without reaching the remote.
pub async fn push_files_chunked<C>(
    client: &C,
    ctx: &PushContext,
    req: &BulkPushRequest,
) -> Result<BatchResult, PushError>
where
    C: GitDataClient + ?Sized,
{
    info!(
        owner = %req.owner,
        repo = %req.repo,
        branch = %req.branch,
        files = req.files.len(),
        "[PUSH] Starting chunked push"
    );

    validate_not_empty(req.files.len())?;
    let (summary, entries) = validate_files(&req.files)?;
    reject_oversized(&entries)?;

    let total_files = summary.file_count;
    let chunk_size = effective_chunk_size(req.chunk_size);
    let chunks = plan_chunks(entries, chunk_size, max_chunk_bytes());
    let total_chunks = chunks.len();
    info!(
        total_files,
        total_chunks,
        chunk_size,
        total_size = summary.total_size,
        "[PUSH] Planned chunks"
    );

    let repo = RepoRef::new(req.owner.as_str(), req.repo.as_str());
    let gate = ctx.gate();

    let mut outcomes = Vec::with_capacity(total_chunks);
    let mut successful_chunks = 0;
    let mut failed_chunks = 0;
    let mut final_commit_sha = None;

    for (i, chunk) in chunks.iter().enumerate() {
        let index = i + 1;
        let message = chunk_message(&req.message, index, total_chunks);

        match commit_chunk(client, &gate, &repo, &req.branch, chunk, &message).await {
            Ok(sha) => {
                info!(chunk = index, total_chunks, commit = %sha, files = chunk.len(), "[PUSH] Chunk committed");
                successful_chunks += 1;
                final_commit_sha = Some(sha.clone());
                outcomes.push(ChunkOutcome {
                    chunk_index: index,
                    files_in_chunk: chunk.len(),
                    commit_sha: Some(sha),
                    success: true,
                    error: None,
                    error_kind: None,
                    files: chunk.paths(),
                });
            }
            Err(e) => {
                error!(chunk = index, total_chunks, error = %e, "[PUSH][ERROR] Chunk failed");
                failed_chunks += 1;
                outcomes.push(ChunkOutcome {
                    chunk_index: index,
                    files_in_chunk: chunk.len(),
                    commit_sha: None,
                    success: false,
                    error: Some(e.to_string()),
                    error_kind: Some(e.kind()),
                    files: chunk.paths(),
                });
                if !req.continue_on_error {
                    info!(
                        attempted = index,
                        total_chunks,
                        "[PUSH] Stopping batch after failed chunk"
                    );
                    break;
                }
            }
        }
    }

    let result = BatchResult {
        total_files,
        total_chunks,
        successful_chunks,
        failed_chunks,
        final_commit_sha,
        chunks: outcomes,
        fully_successful: failed_chunks == 0,
    };
    info!(
        successful_chunks,
        failed_chunks,
        fully_successful = result.fully_successful,
        "[PUSH] Chunked push finished"
    );
    Ok(result)
}

/// Pushes a bounded batch as exactly one commit.
pub async fn push_files<C>(
    client: &C,
    ctx: &PushContext,
    req: &PushRequest,
) -> Result<PushResult, PushError>
where
    C: GitDataClient + ?Sized,
{
    info!(owner = %req.owner, repo = %req.repo, branch = %req.branch, files = req.files.len(), "[PUSH] Starting single-commit push");

    validate_not_empty(req.files.len())?;
    validate_file_count(req.files.len(), MAX_FILES_PER_PUSH)?;
    let (summary, entries) = validate_files(&req.files)?;
    reject_oversized(&entries)?;
    validate_total_size(summary.total_size)?;

    let tree: Vec<TreeEntry> = entries
        .iter()
        .map(|f| TreeEntry::file(f.path.as_str(), f.content.as_str()))
        .collect();

    let repo = RepoRef::new(req.owner.as_str(), req.repo.as_str());
    let outcome =
        commit_tree_entries(client, &ctx.gate(), &repo, &req.branch, &tree, &req.message).await?;
    info!(commit = %outcome.commit_sha, files = tree.len(), "[PUSH] Single-commit push finished");

    Ok(PushResult {
        commit_sha: outcome.commit_sha,
        ref_name: outcome.ref_name,
        files_pushed: tree.len(),
        total_size: summary.total_size,
    })
}

/// Removes paths from the branch in one commit of removal entries.
pub async fn delete_files<C>(
    client: &C,
    ctx: &PushContext,
    req: &BulkDeleteRequest,
) -> Result<DeleteResult, PushError>
where
    C: GitDataClient + ?Sized,
{
    info!(owner = %req.owner, repo = %req.repo, branch = %req.branch, paths = req.paths.len(), "[PUSH] Starting bulk delete");

    let paths = validate_delete_paths(&req.paths)?;
    let tree: Vec<TreeEntry> = paths.iter().map(|p| TreeEntry::removal(p.as_str())).collect();

    let repo = RepoRef::new(req.owner.as_str(), req.repo.as_str());
    let outcome =
        commit_tree_entries(client, &ctx.gate(), &repo, &req.branch, &tree, &req.message).await?;
    info!(commit = %outcome.commit_sha, deleted = paths.len(), "[PUSH] Bulk delete finished");

    Ok(DeleteResult {
        commit_sha: outcome.commit_sha,
        files_deleted: paths.len(),
        deleted_files: paths,
        ref_name: outcome.ref_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_message_only_suffixes_multi_chunk_batches() {
        assert_eq!(chunk_message("Add files", 1, 1), "Add files");
        assert_eq!(chunk_message("Add files", 2, 3), "Add files [chunk 2/3]");
    }

    #[test]
    fn bulk_request_defaults_optional_fields() {
        let req: BulkPushRequest = serde_json::from_value(serde_json::json!({
            "owner": "o",
            "repo": "r",
            "branch": "main",
            "files": [],
            "message": "m"
        }))
        .unwrap();

        assert_eq!(req.chunk_size, None);
        assert!(!req.continue_on_error);
    }

    #[test]
    fn outcome_serialization_omits_absent_fields() {
        let ok = ChunkOutcome {
            chunk_index: 1,
            files_in_chunk: 2,
            commit_sha: Some("abc".into()),
            success: true,
            error: None,
            error_kind: None,
            files: vec!["a".into(), "b".into()],
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["commit_sha"], "abc");
        assert!(json.get("error").is_none());

        let result = DeleteResult {
            commit_sha: "c".into(),
            deleted_files: vec!["x".into()],
            files_deleted: 1,
            ref_name: "refs/heads/main".into(),
        };
        assert_eq!(serde_json::to_value(&result).unwrap()["ref"], "refs/heads/main");
    }
}
