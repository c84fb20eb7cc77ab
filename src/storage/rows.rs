//! Records read back from the index.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::Serialize;

use crate::scanner::{Entry, FileId};

/// Column list matching [`FileRow::from_row`].
pub(crate) const FILE_COLUMNS: &str = "id, record_created_at, updated_at, path, modified_at, \
     deleted_at, size, hash, hashed_at, is_directory";

/// One row of the `files` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRow {
    /// Primary key
    pub id: FileId,
    /// Indexed path
    pub path: String,
    /// Size in bytes; aggregated for directories
    pub size: Option<u64>,
    /// Hex content hash; empty when hashing failed
    pub hash: Option<String>,
    /// File modification time at the last index
    pub modified_at: Option<DateTime<Utc>>,
    /// Whether the path is a directory
    pub is_directory: bool,
    /// Set once cleanup found the path gone
    pub deleted_at: Option<DateTime<Utc>>,
    /// When the row was inserted
    pub record_created_at: Option<DateTime<Utc>>,
    /// When the row was last written
    pub updated_at: Option<DateTime<Utc>>,
    /// When `hash` was computed
    pub hashed_at: Option<DateTime<Utc>>,
}

impl FileRow {
    /// Read a row selected with [`FILE_COLUMNS`].
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let size: Option<i64> = row.get(6)?;
        Ok(Self {
            id: row.get(0)?,
            record_created_at: row.get(1)?,
            updated_at: row.get(2)?,
            path: row.get(3)?,
            modified_at: row.get(4)?,
            deleted_at: row.get(5)?,
            size: size.and_then(|s| u64::try_from(s).ok()),
            hash: row.get(7)?,
            hashed_at: row.get(8)?,
            is_directory: row.get::<_, Option<bool>>(9)?.unwrap_or(false),
        })
    }

    /// Whether the row has a usable content hash.
    #[must_use]
    pub fn has_hash(&self) -> bool {
        self.hash.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// Whether the row should be (re)hashed.
    ///
    /// True for a file with no hash or a failed hash, and for a hash older
    /// than both the modification time and the last write of the row. A
    /// hash recorded after the last write is current even when the file's
    /// mtime lies in the future.
    #[must_use]
    pub fn needs_hash(&self) -> bool {
        if self.is_directory {
            return false;
        }
        if !self.has_hash() {
            return true;
        }
        match (self.hashed_at, self.modified_at, self.updated_at) {
            (None, _, _) => true,
            (Some(hashed), Some(modified), Some(updated)) => hashed < modified && hashed < updated,
            (Some(_), _, _) => false,
        }
    }

    /// Convert into the in-flight form used by pipelines.
    #[must_use]
    pub fn into_entry(self) -> Entry {
        Entry {
            id: Some(self.id),
            path: self.path.into(),
            size: self.size,
            content_hash: self.hash,
            modified_at: self.modified_at,
            is_directory: Some(self.is_directory),
            deleted_at: self.deleted_at,
        }
    }
}

/// A duplicate link: `second_id` has the same content as `first_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    /// Representative of the group
    pub first_id: FileId,
    /// Member of the group (the representative links to itself)
    pub second_id: FileId,
}

impl Link {
    /// Create a link.
    #[must_use]
    pub fn new(first_id: FileId, second_id: FileId) -> Self {
        Self {
            first_id,
            second_id,
        }
    }

    /// Whether the link points back at its own representative.
    #[must_use]
    pub fn is_reflexive(&self) -> bool {
        self.first_id == self.second_id
    }
}

/// A non-reflexive link joined with both ends' file data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedPair {
    /// Representative id
    pub first_id: FileId,
    /// Duplicate id
    pub second_id: FileId,
    /// Representative path
    pub first_path: String,
    /// Representative size in bytes
    pub first_size: u64,
    /// Duplicate path
    pub second_path: String,
}

/// Summary figures for the `stats` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStatistics {
    /// Rows in `files`
    pub total_records: u64,
    /// File rows
    pub files: u64,
    /// Directory rows
    pub directories: u64,
    /// Rows marked deleted
    pub deleted: u64,
    /// Sum of live file sizes
    pub total_size: u64,
    /// Files with a usable hash
    pub hashed: u64,
    /// Rows in `file_links`
    pub links: u64,
    /// Size of the database file on disk
    pub database_bytes: u64,
}
