//! Duplicate detection over the index.
//!
//! Detection runs in two steps that share nothing but the `file_links`
//! table:
//!
//! 1. **Mapping** ([`mapper`]): scan `files` in hash order and write a star of
//!    links for every hash shared by two or more live files.
//! 2. **Listing** ([`lister`]): read the links back, largest files first, and
//!    rebuild the groups.
//!
//! Both steps read in fixed-size pages and carry the group being built
//! across page boundaries, so a group is never split in two however the
//! pages fall.
//!
//! # Example
//!
//! ```no_run
//! use dupindex::duplicates::{collect_duplicates, map_duplicates, MapperConfig};
//! use dupindex::storage::Database;
//!
//! let db = Database::new("files.db");
//! let mut store = db.connect().unwrap();
//! let summary = map_duplicates(&mut store, &MapperConfig::default()).unwrap();
//! println!("{} groups", summary.groups);
//!
//! for group in collect_duplicates(&store, 1000).unwrap() {
//!     println!("{} ({} copies)", group.representative, group.len());
//! }
//! ```

pub mod lister;
pub mod mapper;

use serde::Serialize;

use crate::scanner::FileId;

pub use lister::{collect_duplicates, list_duplicates, ListSummary, DEFAULT_LIST_PAGE_SIZE};
pub use mapper::{
    map_duplicates, Bucket, Bucketer, MapSummary, MapperConfig, DEFAULT_FLUSH_THRESHOLD,
    DEFAULT_PAGE_SIZE,
};

/// Files sharing one content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Id of the representative file
    pub id: FileId,
    /// Path of the representative file
    pub representative: String,
    /// Size of each copy in bytes
    pub size: u64,
    /// Paths of the other copies
    pub duplicates: Vec<String>,
}

impl DuplicateGroup {
    /// Start a group with its representative and no duplicates yet.
    #[must_use]
    pub fn new(id: FileId, representative: impl Into<String>, size: u64) -> Self {
        Self {
            id,
            representative: representative.into(),
            size,
            duplicates: Vec::new(),
        }
    }

    /// Number of copies, the representative included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.duplicates.len() + 1
    }

    /// Always false; a group holds at least its representative.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Bytes taken by every copy together.
    #[must_use]
    pub fn duplicated_bytes(&self) -> u64 {
        self.size * self.len() as u64
    }

    /// Bytes that removing every copy but one would free.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.size * self.duplicates.len() as u64
    }

    /// All paths, representative first.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.representative.as_str())
            .chain(self.duplicates.iter().map(String::as_str))
    }
}
