//! Streams rows out of the index.

use super::connect_or_drain;
use crate::pipeline::{Channel, Stage};
use crate::scanner::{Entry, FileId};
use crate::storage::{with_retry, Database, FileRow, RetryPolicy, StorageResult, Store};

/// Rows fetched per query.
pub const DEFAULT_PRODUCER_CHUNK: usize = 500;

/// Which rows a [`DbProducer`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerQuery {
    /// Files without a current hash
    NeedsHash,
    /// Rows not marked deleted
    NotDeleted,
}

impl ProducerQuery {
    fn fetch(self, store: &Store, after: FileId, limit: usize) -> StorageResult<Vec<FileRow>> {
        match self {
            Self::NeedsHash => store.files_needing_hash(after, limit),
            Self::NotDeleted => store.files_not_deleted(after, limit),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::NeedsHash => "needs-hash",
            Self::NotDeleted => "not-deleted",
        }
    }
}

/// Emits matching rows in id order using a keyset scan.
///
/// Each query asks for rows with an id above the last one emitted, so rows
/// that stop matching while the scan runs (because a later stage has
/// already handled them) are neither skipped nor repeated.
#[derive(Debug, Clone)]
pub struct DbProducer {
    db: Database,
    query: ProducerQuery,
    chunk_size: usize,
    limit: Option<usize>,
    retry: RetryPolicy,
}

impl DbProducer {
    /// Create a producer for `query`.
    #[must_use]
    pub fn new(db: Database, query: ProducerQuery) -> Self {
        Self {
            db,
            query,
            chunk_size: DEFAULT_PRODUCER_CHUNK,
            limit: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the rows fetched per query (at least 1).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Stop after emitting `limit` rows.
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Set the retry policy for queries.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Rows to ask for next, or `None` once the limit is reached.
    fn next_batch_size(&self, emitted: usize) -> Option<usize> {
        match self.limit {
            Some(limit) if emitted >= limit => None,
            Some(limit) => Some(self.chunk_size.min(limit - emitted)),
            None => Some(self.chunk_size),
        }
    }
}

impl Stage<Entry> for DbProducer {
    fn name(&self) -> &str {
        "producer"
    }

    fn run(&mut self, input: &Channel<Entry>, output: &Channel<Entry>) {
        let Some(store) = connect_or_drain(self.name(), &self.db, input) else {
            return;
        };
        let label = self.query.label();
        let mut watermark: FileId = 0;
        let mut emitted = 0usize;

        while let Some(batch) = self.next_batch_size(emitted) {
            let rows = match with_retry(self.retry, label, || {
                self.query.fetch(&store, watermark, batch)
            }) {
                Ok(rows) => rows,
                Err(e) => {
                    log::error!("producer ({}): query failed, stopping: {}", label, e);
                    break;
                }
            };

            let Some(last) = rows.last() else {
                break;
            };
            watermark = last.id;

            for row in rows {
                output.send(row.into_entry());
                emitted += 1;
            }
        }

        input.drain();
        log::debug!("producer ({}): {} rows emitted", label, emitted);
    }
}
