//! Report formatters for duplicate listings and index statistics.
//!
//! This module provides different output formats:
//! - Text for terminals, with human-readable sizes
//! - JSON for automation and scripting
//! - CSV for spreadsheet import
//!
//! [`ReportWriter`] renders groups as the lister emits them, so a listing
//! never has to sit in memory. [`Report`] renders an already collected one.
//!
//! # Example
//!
//! ```no_run
//! use dupindex::duplicates::list_duplicates;
//! use dupindex::output::{OutputError, OutputFormat, ReportWriter};
//! use dupindex::storage::Database;
//!
//! let store = Database::new("files.db").connect().unwrap();
//! let mut report = ReportWriter::new(OutputFormat::Json, std::io::stdout()).unwrap();
//! let summary = list_duplicates::<OutputError, _>(&store, 1000, |group| {
//!     report.write_group(&group)
//! })
//! .unwrap();
//! report.finish(&summary).unwrap();
//! ```

pub mod csv;
pub mod json;
pub mod text;

use std::io;

use serde::{Deserialize, Serialize};

use crate::duplicates::{DuplicateGroup, ListSummary};
use crate::storage::StorageError;

// Re-export main types
pub use self::csv::{CsvOutput, CsvOutputError, CsvWriter};
pub use json::{JsonOutput, JsonSummary, JsonWriter};
pub use text::{write_statistics, TextOutput, TextWriter};

/// Report formats for `list-duplicates`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable listing
    #[default]
    Text,
    /// One JSON document
    Json,
    /// One row per file
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Csv => "csv",
        };
        f.write_str(name)
    }
}

/// Errors raised while writing a report.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error during CSV serialization.
    #[error(transparent)]
    Csv(#[from] CsvOutputError),

    /// The listing could not be read.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A complete duplicate listing, ready to render.
#[derive(Debug, Clone, Copy)]
pub struct Report<'a> {
    groups: &'a [DuplicateGroup],
    summary: &'a ListSummary,
}

impl<'a> Report<'a> {
    /// Create a report over already collected groups.
    #[must_use]
    pub fn new(groups: &'a [DuplicateGroup], summary: &'a ListSummary) -> Self {
        Self { groups, summary }
    }

    /// Render the report in `format`.
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, format: OutputFormat, writer: W) -> Result<(), OutputError> {
        let mut report = ReportWriter::new(format, writer)?;
        for group in self.groups {
            report.write_group(group)?;
        }
        report.finish(self.summary)?;
        Ok(())
    }
}

/// Incremental report in one of the [`OutputFormat`]s.
pub enum ReportWriter<W: io::Write> {
    /// Text blocks, summary line last
    Text(TextWriter<W>),
    /// Group array, summary object last
    Json(JsonWriter<W>),
    /// Rows only
    Csv(CsvWriter<W>),
}

impl<W: io::Write> ReportWriter<W> {
    /// Start a report on `writer`.
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if the opening bytes cannot be written.
    pub fn new(format: OutputFormat, writer: W) -> Result<Self, OutputError> {
        Ok(match format {
            OutputFormat::Text => Self::Text(TextWriter::new(writer)),
            OutputFormat::Json => Self::Json(JsonWriter::new(writer)?),
            OutputFormat::Csv => Self::Csv(CsvWriter::new(writer)),
        })
    }

    /// Render one group.
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if writing or serialization fails.
    pub fn write_group(&mut self, group: &DuplicateGroup) -> Result<(), OutputError> {
        match self {
            Self::Text(text) => text.write_group(group)?,
            Self::Json(json) => json.write_group(group)?,
            Self::Csv(csv) => csv.write_group(group)?,
        }
        Ok(())
    }

    /// Write the trailer and hand the writer back.
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if writing or serialization fails.
    pub fn finish(self, summary: &ListSummary) -> Result<W, OutputError> {
        Ok(match self {
            Self::Text(text) => text.finish(summary)?,
            Self::Json(json) => json.finish(summary)?,
            Self::Csv(csv) => csv.finish()?,
        })
    }
}
