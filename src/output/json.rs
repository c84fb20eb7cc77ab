//! JSON output formatter for duplicate listings.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "duplicates": [
//!     {
//!       "id": 12,
//!       "representative": "/path/to/file1.txt",
//!       "size": 1024,
//!       "duplicates": ["/path/to/file2.txt"]
//!     }
//!   ],
//!   "summary": {
//!     "duplicate_groups": 1,
//!     "duplicate_files": 2,
//!     "duplicated_bytes": 2048,
//!     "reclaimable_bytes": 1024
//!   }
//! }
//! ```
//!
//! [`JsonWriter`] produces the same document incrementally: the group array
//! is written as groups arrive and the summary follows it.

use std::io::Write;

use serde::Serialize;

use super::OutputError;
use crate::duplicates::{DuplicateGroup, ListSummary};

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Number of duplicate groups
    pub duplicate_groups: usize,
    /// Files across all groups, representatives included
    pub duplicate_files: usize,
    /// Bytes taken by every copy
    pub duplicated_bytes: u64,
    /// Bytes freed by keeping one copy per group
    pub reclaimable_bytes: u64,
}

impl From<&ListSummary> for JsonSummary {
    fn from(summary: &ListSummary) -> Self {
        Self {
            duplicate_groups: summary.groups,
            duplicate_files: summary.files,
            duplicated_bytes: summary.duplicated_bytes,
            reclaimable_bytes: summary.reclaimable_bytes,
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    /// Duplicate groups, largest files first
    pub duplicates: &'a [DuplicateGroup],
    /// Listing totals
    pub summary: JsonSummary,
}

impl<'a> JsonOutput<'a> {
    /// Create a new JSON output from groups and their summary.
    #[must_use]
    pub fn new(groups: &'a [DuplicateGroup], summary: &ListSummary) -> Self {
        Self {
            duplicates: groups,
            summary: summary.into(),
        }
    }

    /// Serialize to a compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to a pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the document followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), OutputError> {
        let mut json = JsonWriter::new(writer)?;
        for group in self.duplicates {
            json.write_group(group)?;
        }
        json.finish_with(&self.summary)?;
        Ok(())
    }
}

/// Incremental JSON listing, one group per line inside the array.
pub struct JsonWriter<W> {
    writer: W,
    groups: usize,
}

impl<W: Write> JsonWriter<W> {
    /// Open the document and the group array.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the writer.
    pub fn new(mut writer: W) -> Result<Self, OutputError> {
        write!(writer, "{{\n  \"duplicates\": [")?;
        Ok(Self { writer, groups: 0 })
    }

    /// Append one group to the array.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_group(&mut self, group: &DuplicateGroup) -> Result<(), OutputError> {
        let separator = if self.groups == 0 { "" } else { "," };
        write!(self.writer, "{separator}\n    ")?;
        serde_json::to_writer(&mut self.writer, group)?;
        self.groups += 1;
        Ok(())
    }

    /// Close the array, write the summary and hand the writer back.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn finish(self, summary: &ListSummary) -> Result<W, OutputError> {
        self.finish_with(&summary.into())
    }

    fn finish_with(mut self, summary: &JsonSummary) -> Result<W, OutputError> {
        if self.groups > 0 {
            write!(self.writer, "\n  ")?;
        }
        write!(self.writer, "],\n  \"summary\": ")?;
        serde_json::to_writer(&mut self.writer, summary)?;
        writeln!(self.writer, "\n}}")?;
        Ok(self.writer)
    }
}
