//! Filesystem side of the index: entries, the walk stage and the hashing stage.
//!
//! This module provides functionality for:
//! - The [`Entry`] record that flows through every pipeline
//! - Explicit metadata loading via [`Stat`]
//! - Directory walking ([`walker`])
//! - Streaming BLAKE3 hashing under a worker pool ([`hasher`])
//! - The existence check used by the cleanup pipeline ([`filter`])
//!
//! # Loading metadata
//!
//! An [`Entry`] only carries what its producer knew. Nothing is read from the
//! filesystem behind a field access; callers that need `size` or
//! `modified_at` take a [`Stat`] and fold it in:
//!
//! ```no_run
//! use dupindex::scanner::{Entry, Stat};
//! use std::path::Path;
//!
//! let path = Path::new("Cargo.toml");
//! let stat = Stat::of(path).unwrap();
//! let entry = Entry::new(path).with_stat(stat);
//! assert!(entry.size.is_some());
//! ```

pub mod filter;
pub mod hasher;
pub mod walker;

use std::borrow::Cow;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

// Re-export main types
pub use filter::MissingFilter;
pub use hasher::{HashStage, Hasher, DEFAULT_HASH_WORKERS, READ_CHUNK_SIZE};
pub use walker::{WalkStage, Walker, WalkerConfig};

/// Synthetic primary key assigned by storage.
pub type FileId = i64;

/// Result of one stat system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Whether the path is a directory
    pub is_directory: bool,
    /// Size in bytes; `None` for directories
    pub size: Option<u64>,
    /// Last modification time
    pub modified_at: DateTime<Utc>,
}

impl Stat {
    /// Stat a path, following symbolic links.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the path cannot be stat-ed
    /// (vanished, permission denied, dangling link).
    pub fn of(path: &Path) -> io::Result<Self> {
        fs::metadata(path).map(|metadata| Self::from_metadata(&metadata))
    }

    /// Build a stat from metadata that was already fetched.
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let is_directory = metadata.is_dir();
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        Self {
            is_directory,
            size: (!is_directory).then(|| metadata.len()),
            modified_at: DateTime::<Utc>::from(modified),
        }
    }
}

/// One filesystem path and whatever is known about it.
///
/// Entries are moved from stage to stage, so a single entry is never
/// touched by two stages at once. `id` is set once storage knows the path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    /// Storage id, if the entry has been persisted
    pub id: Option<FileId>,
    /// Path of the file or directory
    pub path: PathBuf,
    /// Size in bytes (never set for a directory until aggregated)
    pub size: Option<u64>,
    /// Hex content hash; the empty string marks a failed hash
    pub content_hash: Option<String>,
    /// Last modification time
    pub modified_at: Option<DateTime<Utc>>,
    /// Whether the path is a directory
    pub is_directory: Option<bool>,
    /// When the path was found to be gone
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// Create an entry with nothing but a path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a directory entry whose metadata is not loaded yet.
    #[must_use]
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            is_directory: Some(true),
            ..Self::new(path)
        }
    }

    /// Attach a storage id.
    #[must_use]
    pub fn with_id(mut self, id: FileId) -> Self {
        self.id = Some(id);
        self
    }

    /// Fold a stat result into the entry.
    ///
    /// Directories keep `size = None`; the content hash is left alone.
    #[must_use]
    pub fn with_stat(mut self, stat: Stat) -> Self {
        self.is_directory = Some(stat.is_directory);
        self.modified_at = Some(stat.modified_at);
        self.size = stat.size;
        self
    }

    /// Stat the path and return the populated entry.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the stat call; the entry is consumed.
    pub fn load(self) -> io::Result<Self> {
        let stat = Stat::of(&self.path)?;
        Ok(self.with_stat(stat))
    }

    /// Whether the entry is known to be a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.is_directory == Some(true)
    }

    /// Whether the stat fields have been populated.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.is_directory.is_some() && self.modified_at.is_some()
    }

    /// The content hash, or `""` for directories and unhashed entries.
    #[must_use]
    pub fn hash_or_empty(&self) -> &str {
        if self.is_directory() {
            return "";
        }
        self.content_hash.as_deref().unwrap_or("")
    }

    /// The path as stored in the index.
    #[must_use]
    pub fn path_key(&self) -> Cow<'_, str> {
        self.path.to_string_lossy()
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error raised for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised while hashing `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}
