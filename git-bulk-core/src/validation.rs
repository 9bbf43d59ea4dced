//! Input checks over raw file batches: shape, duplicate paths and size ceilings.
//!
//! Everything in here is a pure function of its input. Shape problems stop at the
//! first malformed entry; size ceilings are reported with both raw bytes and MB
//! in the message and in the machine-readable `details`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::limits::{
    format_file_size, to_mb, MAX_FILES_PER_PUSH, MAX_FILE_SIZE_BYTES, MAX_TOTAL_PUSH_SIZE_BYTES,
};

/// A file destined for the remote tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Size in bytes of the raw content.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Aggregate view over a scanned batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub total_size: u64,
    pub file_count: usize,
    pub largest_file: Option<String>,
    pub largest_file_size: u64,
    /// Path -> every index at which that path occurs.
    pub duplicates: BTreeMap<String, Vec<usize>>,
    /// Paths whose content exceeds [`MAX_FILE_SIZE_BYTES`], in input order.
    pub oversized_files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    InvalidFileFormat,
    MissingFilePath,
    MissingFileContent,
    DuplicateFilePaths,
    TooManyFiles,
    FileTooLarge,
    TotalSizeTooLarge,
    ChunkTooLarge,
    EmptyFileList,
    InvalidPath,
}

impl ValidationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationCode::InvalidFileFormat => "INVALID_FILE_FORMAT",
            ValidationCode::MissingFilePath => "MISSING_FILE_PATH",
            ValidationCode::MissingFileContent => "MISSING_FILE_CONTENT",
            ValidationCode::DuplicateFilePaths => "DUPLICATE_FILE_PATHS",
            ValidationCode::TooManyFiles => "TOO_MANY_FILES",
            ValidationCode::FileTooLarge => "FILE_TOO_LARGE",
            ValidationCode::TotalSizeTooLarge => "TOTAL_SIZE_TOO_LARGE",
            ValidationCode::ChunkTooLarge => "CHUNK_TOO_LARGE",
            ValidationCode::EmptyFileList => "EMPTY_FILE_LIST",
            ValidationCode::InvalidPath => "INVALID_PATH",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn suggestion_suffix(suggestion: &str) -> String {
    if suggestion.is_empty() {
        String::new()
    } else {
        format!(". Suggestion: {suggestion}")
    }
}

/// A rejected input, with an actionable suggestion for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{message}{}", suggestion_suffix(.suggestion))]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
    pub suggestion: String,
    pub details: Map<String, Value>,
}

impl ValidationError {
    pub fn new(
        code: ValidationCode,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            suggestion: suggestion.into(),
            details: Map::new(),
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        if let Value::Object(map) = details {
            self.details = map;
        }
        self
    }
}

/// Scans a raw batch into [`FileEntry`] values.
///
/// Fails on the first malformed entry, then on duplicate paths. Oversized files
/// are only recorded in the result; callers decide whether to reject them.
pub fn validate_files(raw: &[Value]) -> Result<(ValidationResult, Vec<FileEntry>), ValidationError> {
    let mut result = ValidationResult::default();
    let mut seen: HashMap<String, usize> = HashMap::with_capacity(raw.len());
    let mut entries = Vec::with_capacity(raw.len());

    for (i, item) in raw.iter().enumerate() {
        let obj = item.as_object().ok_or_else(|| {
            ValidationError::new(
                ValidationCode::InvalidFileFormat,
                format!("file at index {i} must be an object with path and content"),
                "Ensure each file has both 'path' (string) and 'content' (string) fields",
            )
        })?;

        let path = match obj.get("path").and_then(Value::as_str) {
            Some(p) if !p.is_empty() => p,
            _ => {
                return Err(ValidationError::new(
                    ValidationCode::MissingFilePath,
                    format!("file at index {i} must have a non-empty path"),
                    "Add a valid 'path' field to each file object",
                ))
            }
        };

        let content = obj.get("content").and_then(Value::as_str).ok_or_else(|| {
            ValidationError::new(
                ValidationCode::MissingFileContent,
                format!("file at index {i} must have content"),
                "Add a 'content' field to the file object (can be empty string)",
            )
        })?;

        if let Some(&first) = seen.get(path) {
            result
                .duplicates
                .entry(path.to_string())
                .or_insert_with(|| vec![first])
                .push(i);
        } else {
            seen.insert(path.to_string(), i);
        }

        let entry = FileEntry::new(path, content);
        let size = entry.size();
        result.total_size += size;
        result.file_count += 1;

        // strict comparison: the first of several equally large files wins
        if result.largest_file.is_none() || size > result.largest_file_size {
            result.largest_file = Some(entry.path.clone());
            result.largest_file_size = size;
        }

        if size > MAX_FILE_SIZE_BYTES {
            result.oversized_files.push(entry.path.clone());
        }

        entries.push(entry);
    }

    if let Some((path, indices)) = result.duplicates.iter().next() {
        return Err(ValidationError::new(
            ValidationCode::DuplicateFilePaths,
            format!(
                "duplicate file path '{path}' found at indices {indices:?} - each file path must be unique"
            ),
            format!("Remove duplicate entries for '{path}' and ensure each path appears only once"),
        )
        .with_details(json!({
            "path": path,
            "indices": indices,
            "duplicates": result.duplicates,
        })));
    }

    Ok((result, entries))
}

/// Rejects a batch larger than `max_files`.
pub fn validate_file_count(count: usize, max_files: usize) -> Result<(), ValidationError> {
    if count > max_files {
        return Err(ValidationError::new(
            ValidationCode::TooManyFiles,
            format!("file count {count} exceeds maximum {max_files}"),
            "Use the chunked push for batches over 100 files, or split into multiple pushes",
        )
        .with_details(json!({ "file_count": count, "max_files": max_files })));
    }
    Ok(())
}

/// Rejects a single file above [`MAX_FILE_SIZE_BYTES`]. At-limit is allowed.
pub fn validate_file_size(path: &str, size: u64) -> Result<(), ValidationError> {
    if size > MAX_FILE_SIZE_BYTES {
        return Err(ValidationError::new(
            ValidationCode::FileTooLarge,
            format!(
                "file '{path}' is {size} bytes ({}), exceeds limit of {MAX_FILE_SIZE_BYTES} bytes ({})",
                format_file_size(size),
                format_file_size(MAX_FILE_SIZE_BYTES)
            ),
            format!("Split '{path}' into smaller files or use Git LFS for large files"),
        )
        .with_details(json!({
            "path": path,
            "file_size_bytes": size,
            "file_size_mb": to_mb(size),
            "max_bytes": MAX_FILE_SIZE_BYTES,
            "max_mb": to_mb(MAX_FILE_SIZE_BYTES),
        })));
    }
    Ok(())
}

/// Rejects an aggregate payload above [`MAX_TOTAL_PUSH_SIZE_BYTES`].
pub fn validate_total_size(total_size: u64) -> Result<(), ValidationError> {
    if total_size > MAX_TOTAL_PUSH_SIZE_BYTES {
        return Err(ValidationError::new(
            ValidationCode::TotalSizeTooLarge,
            format!(
                "total size {total_size} bytes ({}) exceeds limit of {MAX_TOTAL_PUSH_SIZE_BYTES} bytes ({})",
                format_file_size(total_size),
                format_file_size(MAX_TOTAL_PUSH_SIZE_BYTES)
            ),
            "Use the chunked push to split into multiple commits, or reduce the number of files per push",
        )
        .with_details(json!({
            "total_size_bytes": total_size,
            "total_size_mb": to_mb(total_size),
            "max_bytes": MAX_TOTAL_PUSH_SIZE_BYTES,
            "max_mb": to_mb(MAX_TOTAL_PUSH_SIZE_BYTES),
        })));
    }
    Ok(())
}

/// Last check before a chunk goes over the wire, against the non-margined ceiling.
pub fn validate_chunk_size(files: &[FileEntry]) -> Result<(), ValidationError> {
    let chunk_size: u64 = files.iter().map(FileEntry::size).sum();
    if chunk_size > MAX_TOTAL_PUSH_SIZE_BYTES {
        return Err(ValidationError::new(
            ValidationCode::ChunkTooLarge,
            format!(
                "chunk size {chunk_size} bytes ({}) exceeds maximum of {MAX_TOTAL_PUSH_SIZE_BYTES} bytes ({}) - this chunk contains {} files totaling too much data",
                format_file_size(chunk_size),
                format_file_size(MAX_TOTAL_PUSH_SIZE_BYTES),
                files.len()
            ),
            "Reduce chunk_size parameter to use smaller chunks",
        )
        .with_details(json!({
            "chunk_size_bytes": chunk_size,
            "chunk_size_mb": to_mb(chunk_size),
            "max_bytes": MAX_TOTAL_PUSH_SIZE_BYTES,
            "max_mb": to_mb(MAX_TOTAL_PUSH_SIZE_BYTES),
            "file_count": files.len(),
        })));
    }
    Ok(())
}

/// Rejects an empty batch before any other check runs.
pub fn validate_not_empty(count: usize) -> Result<(), ValidationError> {
    if count == 0 {
        return Err(ValidationError::new(
            ValidationCode::EmptyFileList,
            "file list cannot be empty",
            "Provide at least one entry",
        ));
    }
    Ok(())
}

/// Validates the raw path list of a bulk delete.
pub fn validate_delete_paths(raw: &[Value]) -> Result<Vec<String>, ValidationError> {
    validate_not_empty(raw.len())?;
    validate_file_count(raw.len(), MAX_FILES_PER_PUSH)?;

    raw.iter()
        .enumerate()
        .map(|(i, p)| match p.as_str() {
            Some(path) if !path.is_empty() => Ok(path.to_string()),
            _ => Err(ValidationError::new(
                ValidationCode::InvalidPath,
                format!("path at index {i} must be a non-empty string"),
                "Pass every path to delete as a non-empty string",
            )),
        })
        .collect()
}
