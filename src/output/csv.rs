//! CSV output formatter for duplicate listings.
//!
//! Provides machine-readable CSV output for spreadsheets and data analysis.
//! One row is generated for each file of each group.
//!
//! # Columns
//!
//! - `group_id`: Numeric ID identifying the duplicate group
//! - `role`: `representative` for the first copy, `duplicate` for the rest
//! - `path`: Path as stored in the index
//! - `size`: File size in bytes

use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::duplicates::DuplicateGroup;

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A single row in the CSV output.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    group_id: usize,
    role: &'static str,
    path: &'a str,
    size: u64,
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    groups: &'a [DuplicateGroup],
}

impl<'a> CsvOutput<'a> {
    /// Create a new CSV output formatter.
    #[must_use]
    pub fn new(groups: &'a [DuplicateGroup]) -> Self {
        Self { groups }
    }

    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv = CsvWriter::new(writer);
        for group in self.groups {
            csv.write_group(group)?;
        }
        csv.finish()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

/// Incremental CSV listing. The header goes out with the first row, so an
/// empty listing writes nothing.
pub struct CsvWriter<W: io::Write> {
    writer: csv::Writer<W>,
    groups: usize,
}

impl<W: io::Write> CsvWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            groups: 0,
        }
    }

    /// Write one row per file of `group`, numbering groups from 1.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_group(&mut self, group: &DuplicateGroup) -> Result<(), CsvOutputError> {
        self.groups += 1;
        for (position, path) in group.paths().enumerate() {
            self.writer.serialize(CsvRow {
                group_id: self.groups,
                role: if position == 0 {
                    "representative"
                } else {
                    "duplicate"
                },
                path,
                size: group.size,
            })?;
        }
        Ok(())
    }

    /// Flush buffered rows and hand the writer back.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if the final flush fails.
    pub fn finish(self) -> Result<W, CsvOutputError> {
        self.writer
            .into_inner()
            .map_err(|err| CsvOutputError::Io(err.into_error()))
    }
}
