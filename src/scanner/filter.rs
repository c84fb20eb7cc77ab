//! Existence check used by the cleanup pipeline.

use super::Entry;
use crate::pipeline::{Channel, Stage};

/// Passes only entries whose path no longer exists.
///
/// A path whose existence cannot be determined (for example a permission
/// error on a parent directory) is treated as present and dropped, so an
/// unreadable mount never gets its rows marked deleted.
#[derive(Debug, Default, Clone, Copy)]
pub struct MissingFilter;

impl Stage<Entry> for MissingFilter {
    fn name(&self) -> &str {
        "missing"
    }

    fn run(&mut self, input: &Channel<Entry>, output: &Channel<Entry>) {
        let (mut seen, mut missing) = (0usize, 0usize);

        for entry in input.items() {
            seen += 1;
            match entry.path.try_exists() {
                Ok(false) => {
                    log::trace!("missing: {}", entry.path.display());
                    missing += 1;
                    output.send(entry);
                }
                Ok(true) => {}
                Err(e) => {
                    log::warn!("Cannot check {}: {}", entry.path.display(), e);
                }
            }
        }

        log::debug!("missing: {} of {} entries are gone", missing, seen);
    }
}
