//! Hash bucketing and link generation.
//!
//! The mapper walks candidate rows ordered by `hash, id`, one keyset page at
//! a time. Equal hashes are adjacent in that order, so a [`Bucketer`] only
//! has to watch for the hash to change: the bucket that was open is then
//! closed and a new one opened. The open bucket survives page boundaries;
//! only closed buckets are ever written.

use crate::scanner::FileId;
use crate::storage::{with_retry, Link, RetryPolicy, StorageResult, Store};

/// Rows read per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Rows held in closed buckets before they are written out.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 500;

/// Settings for [`map_duplicates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapperConfig {
    /// Rows read per page
    pub page_size: usize,
    /// Closed-bucket rows that trigger a write
    pub flush_threshold: usize,
    /// Retry policy for reads and writes
    pub retry: RetryPolicy,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            retry: RetryPolicy::default(),
        }
    }
}

impl MapperConfig {
    /// Set the page size (at least 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the flush threshold.
    #[must_use]
    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Ids that share one content hash, in ascending id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// The shared hash
    pub hash: String,
    /// Member ids; the first is the representative
    pub ids: Vec<FileId>,
}

impl Bucket {
    fn open(hash: &str, id: FileId) -> Self {
        Self {
            hash: hash.to_string(),
            ids: vec![id],
        }
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the bucket has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The star of links for this bucket, reflexive link included.
    ///
    /// Empty for a bucket with fewer than two members.
    #[must_use]
    pub fn links(&self) -> Vec<Link> {
        match self.ids.as_slice() {
            [first, _, ..] => self.ids.iter().map(|&id| Link::new(*first, id)).collect(),
            _ => Vec::new(),
        }
    }
}

/// Groups a hash-ordered stream of ids into buckets.
///
/// Closed buckets with a single member are discarded immediately, so
/// [`pending_rows`](Self::pending_rows) only counts rows that will produce
/// links.
#[derive(Debug, Default)]
pub struct Bucketer {
    open: Option<Bucket>,
    closed: Vec<Bucket>,
    pending: usize,
}

impl Bucketer {
    /// Create an empty bucketer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next row. Rows must arrive in `hash, id` order.
    pub fn push(&mut self, hash: &str, id: FileId) {
        match self.open.as_mut() {
            Some(bucket) if bucket.hash == hash => bucket.ids.push(id),
            _ => {
                let previous = self.open.replace(Bucket::open(hash, id));
                if let Some(bucket) = previous {
                    self.close(bucket);
                }
            }
        }
    }

    fn close(&mut self, bucket: Bucket) {
        if bucket.len() >= 2 {
            self.pending += bucket.len();
            self.closed.push(bucket);
        }
    }

    /// Rows held in closed buckets.
    #[must_use]
    pub fn pending_rows(&self) -> usize {
        self.pending
    }

    /// Remove and return the closed buckets; the open bucket stays.
    pub fn take_closed(&mut self) -> Vec<Bucket> {
        self.pending = 0;
        std::mem::take(&mut self.closed)
    }

    /// Close the open bucket and return everything not yet taken.
    #[must_use]
    pub fn finish(mut self) -> Vec<Bucket> {
        if let Some(bucket) = self.open.take() {
            self.close(bucket);
        }
        self.take_closed()
    }
}

/// Totals from one mapping run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MapSummary {
    /// Candidate rows read from `files`
    pub rows_scanned: usize,
    /// Groups with two or more members
    pub groups: usize,
    /// Links written
    pub links: usize,
}

fn write_buckets(
    store: &mut Store,
    buckets: &[Bucket],
    retry: RetryPolicy,
    summary: &mut MapSummary,
) -> StorageResult<()> {
    if buckets.is_empty() {
        return Ok(());
    }
    let links: Vec<Link> = buckets.iter().flat_map(Bucket::links).collect();
    let written = with_retry(retry, "insert links", || store.insert_links(&links))?;

    log::trace!("Wrote {} links for {} groups", written, buckets.len());
    summary.groups += buckets.len();
    summary.links += written;
    Ok(())
}

/// Scan the whole index and append duplicate links.
///
/// Directories, deleted rows and rows without a usable hash are skipped.
/// Existing links are left in place; clear them first with
/// [`Store::clear_links`] for a fresh map.
///
/// # Arguments
///
/// * `store` - Open store to read from and write links to
/// * `config` - Page size, flush threshold and retry policy
///
/// # Errors
///
/// Returns the first storage error that survives retrying. Links flushed
/// before the error stay written.
pub fn map_duplicates(store: &mut Store, config: &MapperConfig) -> StorageResult<MapSummary> {
    let page_size = config.page_size.max(1);
    let mut bucketer = Bucketer::new();
    let mut summary = MapSummary::default();
    let mut after_hash = String::new();
    let mut after_id: FileId = 0;

    loop {
        let page = with_retry(config.retry, "duplicate candidates", || {
            store.duplicate_candidates(&after_hash, after_id, page_size)
        })?;
        let fetched = page.len();
        summary.rows_scanned += fetched;

        for row in &page {
            if let Some(hash) = row.hash.as_deref() {
                bucketer.push(hash, row.id);
            }
            if bucketer.pending_rows() > config.flush_threshold {
                let closed = bucketer.take_closed();
                write_buckets(store, &closed, config.retry, &mut summary)?;
            }
        }

        match page.last() {
            Some(last) if fetched == page_size => {
                after_hash = last.hash.clone().unwrap_or_default();
                after_id = last.id;
            }
            _ => break,
        }
    }

    let remaining = bucketer.finish();
    write_buckets(store, &remaining, config.retry, &mut summary)?;

    log::debug!(
        "Mapped {} rows into {} duplicate groups ({} links)",
        summary.rows_scanned,
        summary.groups,
        summary.links
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Entry;
    use crate::storage::Database;
    use tempfile::TempDir;

    fn ids(buckets: &[Bucket]) -> Vec<Vec<FileId>> {
        buckets.iter().map(|b| b.ids.clone()).collect()
    }

    #[test]
    fn test_bucketer_groups_adjacent_hashes() {
        let mut bucketer = Bucketer::new();
        for (hash, id) in [("a", 1), ("a", 2), ("b", 3), ("c", 4), ("c", 5), ("c", 6)] {
            bucketer.push(hash, id);
        }

        // "a" closed, "b" dropped as a singleton, "c" still open
        assert_eq!(bucketer.pending_rows(), 2);
        assert_eq!(ids(&bucketer.finish()), vec![vec![1, 2], vec![4, 5, 6]]);
    }

    #[test]
    fn test_take_closed_keeps_open_bucket() {
        let mut bucketer = Bucketer::new();
        bucketer.push("a", 1);
        bucketer.push("a", 2);
        bucketer.push("b", 3);

        assert_eq!(ids(&bucketer.take_closed()), vec![vec![1, 2]]);
        assert_eq!(bucketer.pending_rows(), 0);

        bucketer.push("b", 4);
        assert_eq!(ids(&bucketer.finish()), vec![vec![3, 4]]);
    }

    #[test]
    fn test_bucket_links() {
        let bucket = Bucket {
            hash: "h".into(),
            ids: vec![3, 8, 9],
        };
        assert_eq!(
            bucket.links(),
            vec![Link::new(3, 3), Link::new(3, 8), Link::new(3, 9)]
        );

        let single = Bucket {
            hash: "h".into(),
            ids: vec![3],
        };
        assert!(single.links().is_empty());
    }

    fn file(path: &str, size: u64, hash: &str) -> Entry {
        Entry {
            path: path.into(),
            size: Some(size),
            content_hash: Some(hash.to_string()),
            modified_at: Some(chrono::Utc::now()),
            is_directory: Some(false),
            ..Default::default()
        }
    }

    #[test]
    fn test_map_skips_unhashed_deleted_and_directories() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("files.db"));
        db.create_tables().unwrap();
        let mut store = db.connect().unwrap();

        store
            .insert_files(&[
                file("/a", 10, "h1"),
                file("/b", 10, "h1"),
                file("/c", 5, ""),
                file("/d", 5, ""),
                file("/gone", 10, "h1"),
                Entry {
                    is_directory: Some(true),
                    modified_at: Some(chrono::Utc::now()),
                    ..Entry::new("/dir")
                },
            ])
            .unwrap();
        store.mark_deleted(&["/gone".to_string()]).unwrap();

        let summary = map_duplicates(&mut store, &MapperConfig::default()).unwrap();

        assert_eq!(summary.rows_scanned, 2);
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.links, 2);
        assert_eq!(store.link_count().unwrap(), 2);
    }

    #[test]
    fn test_group_straddling_pages_stays_whole() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("files.db"));
        db.create_tables().unwrap();
        let mut store = db.connect().unwrap();

        let mut entries: Vec<_> = (0..4).map(|i| file(&format!("/x{i}"), 1, "a")).collect();
        entries.extend((0..5).map(|i| file(&format!("/y{i}"), 1, "b")));
        store.insert_files(&entries).unwrap();

        let config = MapperConfig::default()
            .with_page_size(3)
            .with_flush_threshold(1);
        let summary = map_duplicates(&mut store, &config).unwrap();

        assert_eq!(summary.groups, 2);
        assert_eq!(summary.links, 9);
    }

    #[test]
    fn test_pages_resume_from_the_last_row() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("files.db"));
        db.create_tables().unwrap();
        let mut store = db.connect().unwrap();

        // Unhashed rows interleaved by id must not shift later pages.
        let mut entries = Vec::new();
        for i in 0..6 {
            entries.push(file(&format!("/h{i}"), 1, if i % 2 == 0 { "even" } else { "odd" }));
            entries.push(file(&format!("/u{i}"), 1, ""));
        }
        store.insert_files(&entries).unwrap();

        for page_size in [1, 2, 3, 5, 6, 100] {
            store.clear_links().unwrap();
            let config = MapperConfig::default().with_page_size(page_size);
            let summary = map_duplicates(&mut store, &config).unwrap();

            assert_eq!(summary.rows_scanned, 6, "page {page_size}");
            assert_eq!(summary.groups, 2, "page {page_size}");
            assert_eq!(summary.links, 6, "page {page_size}");
        }
    }
}
