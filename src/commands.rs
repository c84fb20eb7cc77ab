//! Pipeline assembly for each subcommand.
//!
//! Every function here takes resolved [`Settings`] and a progress reporter,
//! builds the pipeline for one command, runs it and returns a summary. No
//! function prints; rendering is left to the caller.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::config::Settings;
use crate::duplicates::{self, DuplicateGroup, ListSummary, MapSummary};
use crate::output::{OutputFormat, ReportWriter};
use crate::pipeline::{Counter, Pipeline};
use crate::progress::ProgressReporter;
use crate::scanner::{Entry, HashStage, MissingFilter, WalkStage, Walker};
use crate::stages::{ChangeFilter, DbProducer, ProducerQuery, RecordMode, Recorder};
use crate::storage::{with_retry, Database, DatabaseStatistics, FileRow, Store};

/// Result of an `index` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    /// Entries written (new or changed)
    pub recorded: usize,
    /// Whether the index was empty, so change detection was skipped
    pub initial: bool,
}

/// Result of a `hash` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HashSummary {
    /// Files whose hash was recorded (failed hashes included)
    pub hashed: usize,
}

/// Result of a `cleanup` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    /// Rows whose path no longer exists
    pub missing: usize,
    /// Whether those rows were deleted rather than marked
    pub purged: bool,
}

/// Result of a `debug` timing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DebugTiming {
    /// Entries written
    pub entries: usize,
    /// Wall time of the timed section
    pub elapsed: Duration,
}

fn open(settings: &Settings) -> Result<Database> {
    let db = settings.database();
    db.create_tables()
        .with_context(|| format!("Cannot open database {}", db.path().display()))?;
    Ok(db)
}

fn connect(db: &Database) -> Result<Store> {
    db.connect()
        .with_context(|| format!("Cannot open database {}", db.path().display()))
}

/// Run `pipeline` with a tail counter and return how many items reached it.
fn run_counted(pipeline: Pipeline<Entry>, label: &str) -> Result<usize> {
    let counter = Counter::new(label);
    let total = counter.counter();
    pipeline
        .stage(counter)
        .run()
        .with_context(|| format!("{label} pipeline failed"))?;
    Ok(total.load(Ordering::SeqCst))
}

/// Walk `root` and record new or changed entries.
///
/// When the index holds no rows yet every walked entry is inserted
/// directly; otherwise entries pass through change detection and are
/// re-stat-ed before their rows are replaced.
///
/// # Errors
///
/// Fails before anything runs if `root` is missing or not a directory, or
/// if the database cannot be opened. Fails afterwards if a stage panicked.
pub fn index(
    root: &Path,
    settings: &Settings,
    progress: Arc<dyn ProgressReporter>,
) -> Result<IndexSummary> {
    let walker = Walker::new(root, settings.walker_config());
    walker
        .check_root()
        .with_context(|| format!("Cannot index {}", root.display()))?;

    let db = open(settings)?;
    let initial = connect(&db)?.file_count()? == 0;
    let retry = settings.retry_policy();

    let mut pipeline = Pipeline::new(settings.strategy)
        .stage(WalkStage::new(walker).with_progress(Arc::clone(&progress)));
    let mode = if initial {
        RecordMode::Insert
    } else {
        pipeline = pipeline.stage(
            ChangeFilter::new(db.clone())
                .with_chunk_size(settings.filter_chunk_size)
                .with_retry(retry),
        );
        RecordMode::Stats
    };
    pipeline = pipeline.stage(
        Recorder::new(db, mode)
            .with_chunk_size(settings.record_chunk_size)
            .with_retry(retry)
            .with_progress(progress),
    );

    log::info!(
        "Indexing {} ({} strategy{})",
        root.display(),
        settings.strategy,
        if initial { ", empty index" } else { "" }
    );
    let recorded = run_counted(pipeline, "index")?;
    Ok(IndexSummary { recorded, initial })
}

/// Hash every file that has no current hash.
///
/// # Arguments
///
/// * `settings` - Resolved settings (workers, chunk sizes, strategy)
/// * `limit` - Hash at most this many files
/// * `progress` - Receives hash and batch events
///
/// # Errors
///
/// Fails if the database cannot be opened or a stage panicked.
pub fn hash(
    settings: &Settings,
    limit: Option<usize>,
    progress: Arc<dyn ProgressReporter>,
) -> Result<HashSummary> {
    let db = open(settings)?;
    let retry = settings.retry_policy();

    let pipeline = Pipeline::new(settings.strategy)
        .stage(
            DbProducer::new(db.clone(), ProducerQuery::NeedsHash)
                .with_chunk_size(settings.producer_chunk_size)
                .with_limit(limit)
                .with_retry(retry),
        )
        .stage(
            HashStage::new()
                .with_workers(settings.hash_workers)
                .with_progress(Arc::clone(&progress)),
        )
        .stage(
            Recorder::new(db, RecordMode::Hash)
                .with_chunk_size(settings.record_chunk_size)
                .with_retry(retry)
                .with_progress(progress),
        );

    log::info!("Hashing with {} workers", settings.hash_workers);
    let hashed = run_counted(pipeline, "hash")?;
    Ok(HashSummary { hashed })
}

/// Find rows whose path no longer exists and mark or delete them.
///
/// # Errors
///
/// Fails if the database cannot be opened or a stage panicked.
pub fn cleanup(
    settings: &Settings,
    purge: bool,
    progress: Arc<dyn ProgressReporter>,
) -> Result<CleanupSummary> {
    let db = open(settings)?;
    let retry = settings.retry_policy();
    let mode = if purge {
        RecordMode::Delete
    } else {
        RecordMode::MarkDeleted
    };

    let pipeline = Pipeline::new(settings.strategy)
        .stage(
            DbProducer::new(db.clone(), ProducerQuery::NotDeleted)
                .with_chunk_size(settings.producer_chunk_size)
                .with_retry(retry),
        )
        .stage(MissingFilter)
        .stage(
            Recorder::new(db, mode)
                .with_chunk_size(settings.record_chunk_size)
                .with_retry(retry)
                .with_progress(progress),
        );

    let missing = run_counted(pipeline, "cleanup")?;
    Ok(CleanupSummary {
        missing,
        purged: purge,
    })
}

/// Recompute stale directory sizes; returns how many were updated.
///
/// # Errors
///
/// Fails if the database cannot be opened or the update fails.
pub fn folder_stats(settings: &Settings) -> Result<usize> {
    let db = open(settings)?;
    let updated = connect(&db)?
        .update_directory_sizes()
        .context("Failed to update directory sizes")?;
    Ok(updated)
}

/// Build the duplicate link table.
///
/// # Arguments
///
/// * `settings` - Page size, flush threshold and retry policy
/// * `fresh` - Remove existing links first
///
/// # Errors
///
/// Fails if the database cannot be opened or a read or write fails.
pub fn map_duplicates(settings: &Settings, fresh: bool) -> Result<MapSummary> {
    let db = open(settings)?;
    let mut store = connect(&db)?;
    if fresh {
        let cleared = store.clear_links()?;
        log::debug!("Cleared {} existing links", cleared);
    }
    let summary = duplicates::map_duplicates(&mut store, &settings.mapper_config())
        .context("Failed to map duplicates")?;
    Ok(summary)
}

/// Collect duplicate groups, largest files first.
///
/// # Errors
///
/// Fails if the database cannot be opened or a page cannot be read.
pub fn collect_duplicates(settings: &Settings) -> Result<(Vec<DuplicateGroup>, ListSummary)> {
    let db = open(settings)?;
    let store = connect(&db)?;
    let mut groups = Vec::new();
    let summary = duplicates::list_duplicates(&store, settings.page_size, |group| {
        groups.push(group);
        Ok::<(), anyhow::Error>(())
    })?;
    Ok((groups, summary))
}

/// List duplicates in `format` to `output`, or to stdout.
///
/// Each group is rendered as soon as the lister closes it; the summary is
/// written last.
///
/// # Errors
///
/// Fails if the listing fails or the report cannot be written.
pub fn list_duplicates(
    settings: &Settings,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<ListSummary> {
    let db = open(settings)?;
    let store = connect(&db)?;

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Cannot create {}", path.display()))?;
            stream_report(&store, settings.page_size, format, BufWriter::new(file))
        }
        None => stream_report(&store, settings.page_size, format, io::stdout().lock()),
    }
}

fn stream_report<W: Write>(
    store: &Store,
    page_size: usize,
    format: OutputFormat,
    writer: W,
) -> Result<ListSummary> {
    let mut report = ReportWriter::new(format, writer)?;
    let summary = duplicates::list_duplicates(store, page_size, |group| {
        report.write_group(&group)?;
        Ok::<(), anyhow::Error>(())
    })?;
    let mut writer = report.finish(&summary)?;
    writer.flush()?;
    Ok(summary)
}

/// Walk `root` and insert every entry, timing the pipeline.
///
/// No change detection runs; entries are inserted even when the database
/// already holds rows for them.
///
/// # Errors
///
/// Fails before anything runs if `root` is missing or not a directory, or
/// if the database cannot be opened. Fails afterwards if a stage panicked.
pub fn debug_walk_path(
    root: &Path,
    settings: &Settings,
    progress: Arc<dyn ProgressReporter>,
) -> Result<DebugTiming> {
    let walker = Walker::new(root, settings.walker_config());
    walker
        .check_root()
        .with_context(|| format!("Cannot walk {}", root.display()))?;
    let db = open(settings)?;

    let pipeline = Pipeline::new(settings.strategy)
        .stage(WalkStage::new(walker).with_progress(Arc::clone(&progress)))
        .stage(
            Recorder::new(db, RecordMode::Insert)
                .with_chunk_size(settings.record_chunk_size)
                .with_retry(settings.retry_policy())
                .with_progress(progress),
        );

    let started = Instant::now();
    let entries = run_counted(pipeline, "walk-path")?;
    Ok(DebugTiming {
        entries,
        elapsed: started.elapsed(),
    })
}

/// Copy every row of the index at `source` into the configured database,
/// `batch_size` rows per transaction, timing the copy.
///
/// # Errors
///
/// Fails if `source` does not exist or is the configured database itself,
/// or if a read or write fails.
pub fn debug_insert(source: &Path, settings: &Settings, batch_size: usize) -> Result<DebugTiming> {
    if !source.is_file() {
        bail!("Source database {} does not exist", source.display());
    }
    let target = open(settings)?;
    let same = source.canonicalize()? == target.path().canonicalize()?;
    if same {
        bail!("Source and target are the same database: {}", source.display());
    }

    let from = connect(&Database::new(source))?;
    let mut to = connect(&target)?;
    let batch_size = batch_size.max(1);
    let retry = settings.retry_policy();
    let mut after = 0;
    let mut entries = 0;

    let started = Instant::now();
    loop {
        let rows = with_retry(retry, "read source rows", || from.files_after(after, batch_size))
            .with_context(|| format!("Cannot read {}", source.display()))?;
        let fetched = rows.len();
        let Some(last) = rows.last() else {
            break;
        };
        after = last.id;

        let batch: Vec<Entry> = rows.into_iter().map(FileRow::into_entry).collect();
        entries += with_retry(retry, "insert rows", || to.insert_files(&batch))?;
        log::debug!("Copied {} rows ({} so far)", fetched, entries);

        if fetched < batch_size {
            break;
        }
    }

    Ok(DebugTiming {
        entries,
        elapsed: started.elapsed(),
    })
}

/// Summary figures for the whole index.
///
/// # Errors
///
/// Fails if the database cannot be opened or queried.
pub fn stats(settings: &Settings) -> Result<DatabaseStatistics> {
    let db = open(settings)?;
    let stats = connect(&db)?.statistics()?;
    Ok(stats)
}
