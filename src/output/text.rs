//! Plain-text rendering for terminals.

use std::io::{self, Write};

use bytesize::ByteSize;

use crate::duplicates::{DuplicateGroup, ListSummary};
use crate::storage::DatabaseStatistics;

/// Text formatter for a duplicate listing.
pub struct TextOutput<'a> {
    groups: &'a [DuplicateGroup],
    summary: &'a ListSummary,
}

impl<'a> TextOutput<'a> {
    /// Create a text formatter.
    #[must_use]
    pub fn new(groups: &'a [DuplicateGroup], summary: &'a ListSummary) -> Self {
        Self { groups, summary }
    }

    /// Write one block per group, then a summary line.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the writer.
    pub fn write_to<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut text = TextWriter::new(writer);
        for group in self.groups {
            text.write_group(group)?;
        }
        text.finish(self.summary)?;
        Ok(())
    }
}

/// Incremental text listing: each group is written as soon as it arrives.
pub struct TextWriter<W> {
    writer: W,
}

impl<W: Write> TextWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write the block for one group.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the writer.
    pub fn write_group(&mut self, group: &DuplicateGroup) -> io::Result<()> {
        writeln!(
            self.writer,
            "{} copies of {} ({} reclaimable)",
            group.len(),
            ByteSize::b(group.size),
            ByteSize::b(group.reclaimable_bytes())
        )?;
        for path in group.paths() {
            writeln!(self.writer, "  {path}")?;
        }
        writeln!(self.writer)
    }

    /// Write the summary line and hand the writer back.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the writer.
    pub fn finish(mut self, summary: &ListSummary) -> io::Result<W> {
        writeln!(
            self.writer,
            "{} duplicate groups, {} files, {} duplicated, {} reclaimable",
            summary.groups,
            summary.files,
            ByteSize::b(summary.duplicated_bytes),
            ByteSize::b(summary.reclaimable_bytes)
        )?;
        Ok(self.writer)
    }
}

/// Write index statistics as aligned `label: value` lines.
///
/// # Errors
///
/// Returns the I/O error from the writer.
pub fn write_statistics<W: Write>(stats: &DatabaseStatistics, mut writer: W) -> io::Result<()> {
    let rows = [
        ("Records", stats.total_records.to_string()),
        ("Files", stats.files.to_string()),
        ("Directories", stats.directories.to_string()),
        ("Deleted", stats.deleted.to_string()),
        ("Hashed", stats.hashed.to_string()),
        ("Duplicate links", stats.links.to_string()),
        ("Total size", ByteSize::b(stats.total_size).to_string()),
        ("Database size", ByteSize::b(stats.database_bytes).to_string()),
    ];
    for (label, value) in rows {
        writeln!(writer, "{:<16} {}", format!("{label}:"), value)?;
    }
    Ok(())
}
