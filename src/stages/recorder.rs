//! Batched writes of pipeline entries into the index.
//!
//! A [`Recorder`] buffers entries into chunks. For each chunk it validates
//! every entry, transforms the valid ones, writes the result in one
//! transaction and forwards the chunk downstream. What "valid", "transform"
//! and "write" mean depends on the [`RecordMode`].

use std::path::PathBuf;
use std::sync::Arc;

use super::connect_or_drain;
use crate::pipeline::{Channel, Stage};
use crate::progress::{ProgressReporter, SilentProgress};
use crate::scanner::Entry;
use crate::storage::{with_retry, Database, RetryPolicy, StorageResult, Store};

/// Entries written per transaction.
pub const DEFAULT_RECORD_CHUNK: usize = 500;

/// Why an entry was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidEntry {
    /// The entry has no path.
    #[error("entry has an empty path")]
    EmptyPath,

    /// A hash is required but was never computed.
    #[error("no hash computed for {0}")]
    MissingHash(PathBuf),

    /// Directories carry no content hash.
    #[error("directory cannot carry a hash: {0}")]
    Directory(PathBuf),
}

/// Checks that an entry is well-formed for a write.
pub trait Validate {
    /// Accept or reject one entry.
    ///
    /// # Errors
    ///
    /// Returns the reason the entry cannot be written.
    fn validate(&self, entry: &Entry) -> Result<(), InvalidEntry>;
}

/// Prepares an entry for writing; `None` drops it.
pub trait Transform {
    /// Transform one entry.
    fn transform(&self, entry: Entry) -> Option<Entry>;
}

/// Writes a chunk of entries in one transaction.
pub trait BulkWrite {
    /// Write `chunk`, returning the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns the storage error; nothing from the chunk is written then.
    fn write_chunk(&self, store: &mut Store, chunk: &[Entry]) -> StorageResult<usize>;
}

/// What a [`Recorder`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
    /// Insert new rows; used when the index is empty
    Insert,
    /// Re-stat entries and replace their rows
    Stats,
    /// Store computed hashes by path
    Hash,
    /// Set `deleted_at` by path
    MarkDeleted,
    /// Delete rows by path
    Delete,
}

impl RecordMode {
    /// Stage name for logs and progress.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Stats => "stats",
            Self::Hash => "record-hash",
            Self::MarkDeleted => "mark-deleted",
            Self::Delete => "delete",
        }
    }
}

fn paths(chunk: &[Entry]) -> Vec<String> {
    chunk.iter().map(|e| e.path_key().into_owned()).collect()
}

fn restat(entry: Entry) -> Option<Entry> {
    let path = entry.path.clone();
    match entry.load() {
        Ok(entry) => Some(entry),
        Err(e) => {
            log::warn!("Cannot stat {}: {}", path.display(), e);
            None
        }
    }
}

impl Validate for RecordMode {
    fn validate(&self, entry: &Entry) -> Result<(), InvalidEntry> {
        if entry.path.as_os_str().is_empty() {
            return Err(InvalidEntry::EmptyPath);
        }
        if *self == Self::Hash {
            if entry.is_directory() {
                return Err(InvalidEntry::Directory(entry.path.clone()));
            }
            if entry.content_hash.is_none() {
                return Err(InvalidEntry::MissingHash(entry.path.clone()));
            }
        }
        Ok(())
    }
}

impl Transform for RecordMode {
    fn transform(&self, entry: Entry) -> Option<Entry> {
        match self {
            Self::Insert if entry.is_loaded() => Some(entry),
            Self::Insert | Self::Stats => restat(entry),
            Self::Hash | Self::MarkDeleted | Self::Delete => Some(entry),
        }
    }
}

impl BulkWrite for RecordMode {
    fn write_chunk(&self, store: &mut Store, chunk: &[Entry]) -> StorageResult<usize> {
        match self {
            Self::Insert => store.insert_files(chunk),
            Self::Stats => store.replace_files(chunk),
            Self::Hash => {
                let hashes: Vec<(String, String)> = chunk
                    .iter()
                    .map(|e| (e.path_key().into_owned(), e.hash_or_empty().to_string()))
                    .collect();
                store.update_hashes(&hashes)
            }
            Self::MarkDeleted => store.mark_deleted(&paths(chunk)),
            Self::Delete => store.delete_by_paths(&paths(chunk)),
        }
    }
}

/// Buffers entries and writes them in chunks.
pub struct Recorder {
    db: Database,
    mode: RecordMode,
    chunk_size: usize,
    retry: RetryPolicy,
    progress: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("db", &self.db)
            .field("mode", &self.mode)
            .field("chunk_size", &self.chunk_size)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Create a recorder with default chunking and retry.
    #[must_use]
    pub fn new(db: Database, mode: RecordMode) -> Self {
        Self {
            db,
            mode,
            chunk_size: DEFAULT_RECORD_CHUNK,
            retry: RetryPolicy::default(),
            progress: Arc::new(SilentProgress),
        }
    }

    /// Set the chunk size (at least 1).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the retry policy for writes.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Report written batches to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// The write mode.
    #[must_use]
    pub fn mode(&self) -> RecordMode {
        self.mode
    }

    /// Validate and transform a buffered chunk.
    fn prepare(&self, buffer: &mut Vec<Entry>) -> Vec<Entry> {
        let mut chunk = Vec::with_capacity(buffer.len());
        for entry in buffer.drain(..) {
            if let Err(e) = self.mode.validate(&entry) {
                log::warn!("{}: skipping invalid entry: {}", self.mode.name(), e);
                continue;
            }
            if let Some(entry) = self.mode.transform(entry) {
                chunk.push(entry);
            }
        }
        chunk
    }

    fn flush(&self, store: &mut Store, buffer: &mut Vec<Entry>, output: &Channel<Entry>) -> usize {
        let chunk = self.prepare(buffer);
        if chunk.is_empty() {
            return 0;
        }

        let name = self.mode.name();
        match with_retry(self.retry, name, || self.mode.write_chunk(store, &chunk)) {
            Ok(rows) => log::trace!("{}: wrote {} rows", name, rows),
            Err(e) => log::error!("{}: failed to write {} entries: {}", name, chunk.len(), e),
        }

        let count = chunk.len();
        for entry in chunk {
            output.send(entry);
        }
        self.progress.on_batch(name, count);
        count
    }
}

impl Stage<Entry> for Recorder {
    fn name(&self) -> &str {
        self.mode.name()
    }

    fn run(&mut self, input: &Channel<Entry>, output: &Channel<Entry>) {
        let Some(mut store) = connect_or_drain(self.name(), &self.db, input) else {
            return;
        };
        let mut buffer = Vec::with_capacity(self.chunk_size);
        let mut recorded = 0usize;

        for entry in input.items() {
            buffer.push(entry);
            if buffer.len() >= self.chunk_size {
                recorded += self.flush(&mut store, &mut buffer, output);
            }
        }
        if !buffer.is_empty() {
            recorded += self.flush(&mut store, &mut buffer, output);
        }

        log::debug!("{}: {} entries recorded", self.mode.name(), recorded);
    }
}
