//! SQLite-backed file index.
//!
//! This module owns everything persisted by the tool: the `files` table (one
//! row per indexed path) and the `file_links` table (duplicate links written
//! by the mapper).
//!
//! # Architecture
//!
//! * [`Database`] is a plain description of where the index lives. It is cheap
//!   to clone and is handed to every stage that touches storage.
//! * [`Store`] owns one open connection. Stages open their own store inside
//!   `run`, so no connection is ever shared between workers.
//! * [`rows`] holds the records read back from storage.
//! * [`retry`] retries operations that failed because another connection held
//!   the database lock.
//!
//! # Timestamps
//!
//! Timestamps are stored as UTC text (`YYYY-MM-DD HH:MM:SS.fff+00:00`) which
//! orders lexically the same as chronologically, so staleness checks such as
//! `hashed_at < modified_at` can run inside SQL.

pub mod retry;
pub mod rows;
mod store;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode};

pub use retry::{with_retry, RetryPolicy};
pub use rows::{DatabaseStatistics, FileRow, Link, LinkedPair};
pub use store::Store;

/// Maximum number of bound parameters per statement.
pub const MAX_PARAMS: usize = 999;

/// Default time a connection waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS files(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_created_at TIMESTAMP,
        updated_at TIMESTAMP,
        path TEXT,
        modified_at TIMESTAMP,
        deleted_at TIMESTAMP,
        size INTEGER,
        hash TEXT,
        hashed_at TIMESTAMP,
        is_directory INTEGER
    );
    CREATE INDEX IF NOT EXISTS path_index ON files(path);
    CREATE INDEX IF NOT EXISTS hash_index ON files(hash, id);
    CREATE TABLE IF NOT EXISTS file_links(
        file_1_id INTEGER,
        file_2_id INTEGER
    );
";

/// Errors raised by the storage layer.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// An SQLite call failed.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database path points at a directory.
    #[error("Database path is a directory: {0}")]
    PathIsDirectory(PathBuf),
}

impl StorageError {
    /// Whether the failure came from lock contention and may succeed later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Location and connection settings of an index database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    /// Describe the database at `path`. Nothing is opened yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Set how long a connection waits on a locked database.
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new connection.
    ///
    /// The file is created if it does not exist. The connection uses WAL
    /// journaling so readers in one stage do not block writers in another.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PathIsDirectory`] if the path is a directory,
    /// or the SQLite error if the file cannot be opened.
    pub fn connect(&self) -> StorageResult<Store> {
        if self.path.is_dir() {
            return Err(StorageError::PathIsDirectory(self.path.clone()));
        }

        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::trace!("Opened {} (journal_mode={})", self.path.display(), mode);

        Ok(Store::new(conn, self.path.clone()))
    }

    /// Create the tables and indexes if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or written.
    pub fn create_tables(&self) -> StorageResult<()> {
        let store = self.connect()?;
        store.connection().execute_batch(SCHEMA)?;
        log::debug!("Schema ready in {}", self.path.display());
        Ok(())
    }
}

/// `?,?,?` with `n` placeholders.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

/// `?{start},?{start+1},...` with `n` numbered placeholders.
pub(crate) fn numbered_placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(",")
}
