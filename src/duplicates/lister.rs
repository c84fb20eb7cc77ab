//! Rebuilding duplicate groups from the link table.

use super::DuplicateGroup;
use crate::storage::{StorageError, StorageResult, Store};

/// Link rows read per page.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Totals from one listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ListSummary {
    /// Groups emitted
    pub groups: usize,
    /// Files across all groups, representatives included
    pub files: usize,
    /// Bytes taken by every copy of every group
    pub duplicated_bytes: u64,
    /// Bytes freed by keeping one copy per group
    pub reclaimable_bytes: u64,
}

impl ListSummary {
    fn add(&mut self, group: &DuplicateGroup) {
        self.groups += 1;
        self.files += group.len();
        self.duplicated_bytes += group.duplicated_bytes();
        self.reclaimable_bytes += group.reclaimable_bytes();
    }
}

/// Stream duplicate groups, largest files first, to `on_group`.
///
/// Link rows arrive ordered by representative, so a group ends when the
/// representative id changes. The group being built is kept across page
/// boundaries.
///
/// # Arguments
///
/// * `store` - Store holding the links
/// * `page_size` - Link rows read per query
/// * `on_group` - Called once per complete group
///
/// # Errors
///
/// Returns a storage error converted into `E`, or the first error returned
/// by `on_group`; the listing stops there.
pub fn list_duplicates<E, F>(
    store: &Store,
    page_size: usize,
    mut on_group: F,
) -> Result<ListSummary, E>
where
    E: From<StorageError>,
    F: FnMut(DuplicateGroup) -> Result<(), E>,
{
    let page_size = page_size.max(1);
    let mut summary = ListSummary::default();
    let mut current: Option<DuplicateGroup> = None;
    let mut offset = 0;

    loop {
        let page = store.link_page(offset, page_size)?;
        let fetched = page.len();
        offset += fetched;

        for pair in page {
            match current.as_mut() {
                Some(group) if group.id == pair.first_id => group.duplicates.push(pair.second_path),
                _ => {
                    let mut group =
                        DuplicateGroup::new(pair.first_id, pair.first_path, pair.first_size);
                    group.duplicates.push(pair.second_path);
                    if let Some(done) = current.replace(group) {
                        summary.add(&done);
                        on_group(done)?;
                    }
                }
            }
        }

        if fetched < page_size {
            break;
        }
    }

    if let Some(done) = current {
        summary.add(&done);
        on_group(done)?;
    }
    Ok(summary)
}

/// Collect every duplicate group into memory.
///
/// # Errors
///
/// Returns the storage error if a page cannot be read.
pub fn collect_duplicates(store: &Store, page_size: usize) -> StorageResult<Vec<DuplicateGroup>> {
    let mut groups = Vec::new();
    list_duplicates::<StorageError, _>(store, page_size, |group| {
        groups.push(group);
        Ok(())
    })?;
    Ok(groups)
}
