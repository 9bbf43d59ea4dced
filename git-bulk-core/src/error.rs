//! Error types shared by the pipeline, the limiter and the retry driver.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::validation::ValidationError;

/// Returned when a cancellation signal fires while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {code})"),
        None => String::new(),
    }
}

/// A failed call against the remote object store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", status_suffix(.status))]
pub struct RemoteError {
    /// HTTP status, absent for transport failures.
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// The remote call within the commit sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    GetRef,
    GetCommit,
    CreateTree,
    CreateCommit,
    UpdateRef,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineStep::GetRef => "failed to get branch reference",
            PipelineStep::GetCommit => "failed to get base commit",
            PipelineStep::CreateTree => "failed to create tree",
            PipelineStep::CreateCommit => "failed to create commit",
            PipelineStep::UpdateRef => "failed to update reference",
        })
    }
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{step}: {source}")]
    Remote {
        step: PipelineStep,
        #[source]
        source: RemoteError,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl From<Cancelled> for PushError {
    fn from(_: Cancelled) -> Self {
        PushError::Cancelled
    }
}

/// Coarse classification of a [`PushError`], recorded in chunk outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Remote,
    Cancelled,
}

impl PushError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PushError::Validation(_) => ErrorKind::Validation,
            PushError::Remote { .. } => ErrorKind::Remote,
            PushError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PushError::Cancelled)
    }
}

/// Outcome of a retried operation that did not succeed.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum RetryError<E> {
    /// Cancellation fired; takes priority over any operation error.
    #[error("operation cancelled")]
    Cancelled,
    /// The attempt budget ran out; carries the last operation error.
    #[error("{0}")]
    Exhausted(E),
}
