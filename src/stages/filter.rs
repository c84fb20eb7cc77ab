//! Change detection against the index.

use std::collections::HashMap;

use super::connect_or_drain;
use crate::pipeline::{Channel, Stage};
use crate::scanner::Entry;
use crate::storage::{with_retry, Database, FileRow, RetryPolicy, Store, MAX_PARAMS};

/// Entries looked up per query; one parameter per path.
pub const DEFAULT_FILTER_CHUNK: usize = MAX_PARAMS;

/// How a walked entry relates to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Same path and modification time as a live row
    Unchanged,
    /// No row for the path
    New(Entry),
    /// A row exists but is stale; the entry carries the row's id
    Changed(Entry),
}

/// Compare a loaded entry with the row stored for its path.
///
/// A row marked deleted never counts as unchanged, so a file that comes
/// back is recorded again.
#[must_use]
pub fn classify(entry: Entry, existing: Option<&FileRow>) -> Change {
    match existing {
        None => Change::New(entry),
        Some(row) if row.deleted_at.is_none() && row.modified_at == entry.modified_at => {
            Change::Unchanged
        }
        Some(row) => Change::Changed(entry.with_id(row.id)),
    }
}

#[derive(Debug, Default)]
struct FilterCounts {
    new: usize,
    changed: usize,
    unchanged: usize,
    dropped: usize,
}

/// Drops entries whose row is up to date and tags the rest.
///
/// Entries are looked up in chunks of `chunk_size` paths, one query per
/// chunk. Entries without a modification time (directories from the walk)
/// are stat-ed first; if that fails they are dropped.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    db: Database,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl ChangeFilter {
    /// Create a filter with default chunking and retry.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            chunk_size: DEFAULT_FILTER_CHUNK,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the lookup chunk size (clamped to `1..=MAX_PARAMS`).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_PARAMS);
        self
    }

    /// Set the retry policy for lookups.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn flush(
        &self,
        store: &Store,
        buffer: &mut Vec<Entry>,
        output: &Channel<Entry>,
        counts: &mut FilterCounts,
    ) {
        let entries = std::mem::take(buffer);
        let paths: Vec<String> = entries.iter().map(|e| e.path_key().into_owned()).collect();

        let rows = match with_retry(self.retry, "filter lookup", || store.files_by_paths(&paths)) {
            Ok(rows) => rows,
            Err(e) => {
                // Picked up again by the next index run.
                log::error!(
                    "filter: lookup of {} entries failed, dropping them: {}",
                    entries.len(),
                    e
                );
                counts.dropped += entries.len();
                return;
            }
        };

        let existing: HashMap<String, FileRow> =
            rows.into_iter().map(|row| (row.path.clone(), row)).collect();

        for (entry, path) in entries.into_iter().zip(paths) {
            match classify(entry, existing.get(&path)) {
                Change::Unchanged => counts.unchanged += 1,
                Change::New(entry) => {
                    counts.new += 1;
                    output.send(entry);
                }
                Change::Changed(entry) => {
                    log::trace!("filter: changed {}", entry.path.display());
                    counts.changed += 1;
                    output.send(entry);
                }
            }
        }
    }
}

impl Stage<Entry> for ChangeFilter {
    fn name(&self) -> &str {
        "filter"
    }

    fn run(&mut self, input: &Channel<Entry>, output: &Channel<Entry>) {
        let Some(store) = connect_or_drain(self.name(), &self.db, input) else {
            return;
        };
        let mut counts = FilterCounts::default();
        let mut buffer = Vec::with_capacity(self.chunk_size);

        for entry in input.items() {
            let entry = if entry.modified_at.is_some() {
                entry
            } else {
                let path = entry.path.clone();
                match entry.load() {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("filter: cannot stat {}: {}", path.display(), e);
                        counts.dropped += 1;
                        continue;
                    }
                }
            };

            buffer.push(entry);
            if buffer.len() >= self.chunk_size {
                self.flush(&store, &mut buffer, output, &mut counts);
            }
        }

        if !buffer.is_empty() {
            self.flush(&store, &mut buffer, output, &mut counts);
        }

        log::debug!(
            "filter: {} new, {} changed, {} unchanged, {} dropped",
            counts.new,
            counts.changed,
            counts.unchanged,
            counts.dropped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Message;
    use chrono::{Duration, Utc};
    use std::fs::File;
    use tempfile::TempDir;

    fn row(id: i64, modified_at: Option<chrono::DateTime<Utc>>) -> FileRow {
        FileRow {
            id,
            path: "/p".to_string(),
            size: Some(1),
            hash: None,
            modified_at,
            is_directory: false,
            deleted_at: None,
            record_created_at: None,
            updated_at: None,
            hashed_at: None,
        }
    }

    #[test]
    fn test_classify() {
        let now = Utc::now();
        let mut entry = Entry::new("/p");
        entry.modified_at = Some(now);

        assert_eq!(classify(entry.clone(), None), Change::New(entry.clone()));
        assert_eq!(
            classify(entry.clone(), Some(&row(3, Some(now)))),
            Change::Unchanged
        );
        assert_eq!(
            classify(entry.clone(), Some(&row(3, Some(now - Duration::seconds(5))))),
            Change::Changed(entry.clone().with_id(3))
        );

        let mut deleted = row(4, Some(now));
        deleted.deleted_at = Some(now);
        assert_eq!(
            classify(entry.clone(), Some(&deleted)),
            Change::Changed(entry.with_id(4))
        );
    }

    #[test]
    fn test_filter_drops_unchanged_and_stats_directories() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("files.db"));
        db.create_tables().unwrap();

        let known = dir.path().join("known");
        File::create(&known).unwrap();
        let fresh = dir.path().join("fresh");
        File::create(&fresh).unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let known_entry = Entry::new(&known).load().unwrap();
        db.connect()
            .unwrap()
            .insert_files(std::slice::from_ref(&known_entry))
            .unwrap();

        let input = Channel::queue();
        let output = Channel::queue();
        input.send(known_entry);
        input.send(Entry::new(&fresh).load().unwrap());
        input.send(Entry::directory(&sub));
        input.send(Entry::directory(dir.path().join("vanished")));
        input.put(Message::End);

        ChangeFilter::new(db).with_chunk_size(2).run(&input, &output);

        let mut passed = Vec::new();
        while let Message::Item(entry) = output.get() {
            passed.push(entry);
            if output.is_empty() {
                break;
            }
        }
        let paths: Vec<_> = passed.iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, vec![fresh, sub]);
        assert!(passed.iter().all(|e| e.id.is_none() && e.is_loaded()));
    }

    #[test]
    fn test_chunk_size_clamped() {
        let db = Database::new("unused.db");
        assert_eq!(ChangeFilter::new(db.clone()).with_chunk_size(0).chunk_size, 1);
        assert_eq!(
            ChangeFilter::new(db).with_chunk_size(5000).chunk_size,
            MAX_PARAMS
        );
    }
}
