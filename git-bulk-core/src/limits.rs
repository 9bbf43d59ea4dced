//! Numeric ceilings for push operations and the limits query.

use serde::Serialize;
use std::collections::BTreeMap;

/// Maximum number of files accepted by a single-commit push or a bulk delete.
pub const MAX_FILES_PER_PUSH: usize = 100;

/// Maximum size of one file's content.
pub const MAX_FILE_SIZE_BYTES: u64 = 25 * 1024 * 1024;

/// Maximum raw content size of one commit's payload.
pub const MAX_TOTAL_PUSH_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Chunk planning stays 20% below [`MAX_TOTAL_PUSH_SIZE_BYTES`]: the wire payload
/// carries JSON envelope overhead on top of the raw content bytes.
pub const CHUNK_SAFETY_MARGIN: f64 = 0.80;

pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const MAX_CHUNK_SIZE: usize = 100;

const MB: u64 = 1024 * 1024;

/// The margined byte ceiling used by the chunk planner.
pub fn max_chunk_bytes() -> u64 {
    (MAX_TOTAL_PUSH_SIZE_BYTES as f64 * CHUNK_SAFETY_MARGIN) as u64
}

/// Resolves a caller-requested chunk size into `[1, MAX_CHUNK_SIZE]`.
pub fn effective_chunk_size(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_CHUNK_SIZE)
        .clamp(1, MAX_CHUNK_SIZE)
}

/// Formats a byte count with binary units, e.g. `1536` becomes `"1.50 KB"`.
pub fn format_file_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = b"KMGTPE"[exp] as char;
    format!("{:.2} {}B", bytes as f64 / div as f64, prefix)
}

pub(crate) fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / MB as f64
}

/// Snapshot of every ceiling a caller needs to pre-size its requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushLimits {
    pub max_files_per_push: usize,
    pub max_file_size_bytes: u64,
    pub max_file_size_mb: u64,
    pub max_total_push_size_bytes: u64,
    pub max_total_push_size_mb: u64,
    pub max_chunk_bytes: u64,
    pub default_chunk_size: usize,
    pub max_chunk_size: usize,
    pub recommendations: BTreeMap<&'static str, &'static str>,
}

pub fn push_limits() -> PushLimits {
    let recommendations = BTreeMap::from([
        ("small_batch", "Use a single-commit push for <= 100 files"),
        ("large_batch", "Use the chunked push for > 100 files"),
        ("large_files", "Keep each file under 25 MB; split or use Git LFS otherwise"),
    ]);

    PushLimits {
        max_files_per_push: MAX_FILES_PER_PUSH,
        max_file_size_bytes: MAX_FILE_SIZE_BYTES,
        max_file_size_mb: MAX_FILE_SIZE_BYTES / MB,
        max_total_push_size_bytes: MAX_TOTAL_PUSH_SIZE_BYTES,
        max_total_push_size_mb: MAX_TOTAL_PUSH_SIZE_BYTES / MB,
        max_chunk_bytes: max_chunk_bytes(),
        default_chunk_size: DEFAULT_CHUNK_SIZE,
        max_chunk_size: MAX_CHUNK_SIZE,
        recommendations,
    }
}
