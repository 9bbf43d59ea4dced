//! Greedy, order-preserving partition of a validated batch into commit-sized chunks.

use serde::Serialize;

use crate::validation::FileEntry;

/// An ordered, non-empty run of files committed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    files: Vec<FileEntry>,
}

impl Chunk {
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of the raw content sizes of every member.
    pub fn byte_size(&self) -> u64 {
        self.files.iter().map(FileEntry::size).sum()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    pub fn into_files(self) -> Vec<FileEntry> {
        self.files
    }
}

/// Splits `entries` into chunks of at most `max_files` files and `max_bytes` bytes.
///
/// A file is only moved into a fresh chunk when the open chunk already holds
/// something, so a single file larger than `max_bytes` ends up alone in its own
/// chunk rather than being rejected here.
pub fn plan_chunks(entries: Vec<FileEntry>, max_files: usize, max_bytes: u64) -> Vec<Chunk> {
    let max_files = max_files.max(1);
    let mut chunks = Vec::new();
    let mut open: Vec<FileEntry> = Vec::new();
    let mut open_bytes: u64 = 0;

    for entry in entries {
        let size = entry.size();
        let would_exceed_size = open_bytes + size > max_bytes;
        let would_exceed_count = open.len() >= max_files;

        if !open.is_empty() && (would_exceed_size || would_exceed_count) {
            chunks.push(Chunk {
                files: std::mem::take(&mut open),
            });
            open_bytes = 0;
        }

        open_bytes += size;
        open.push(entry);
    }

    if !open.is_empty() {
        chunks.push(Chunk { files: open });
    }

    tracing::debug!(chunks = chunks.len(), max_files, max_bytes, "Planned chunks");
    chunks
}
