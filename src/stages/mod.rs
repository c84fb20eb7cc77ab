//! Pipeline stages backed by the index database.
//!
//! - [`ChangeFilter`] drops walked entries whose row is up to date
//! - [`DbProducer`] streams rows out of the index with a keyset scan
//! - [`Recorder`] validates, transforms and bulk-writes entries
//!
//! Every stage opens its own [`Store`](crate::storage::Store) at the start of
//! `run`, so stages can run on any strategy without sharing a connection. A
//! stage that cannot open the database logs the error and drains its input,
//! which lets the rest of the pipeline finish normally.

pub mod filter;
pub mod producer;
pub mod recorder;

pub use filter::{classify, Change, ChangeFilter, DEFAULT_FILTER_CHUNK};
pub use producer::{DbProducer, ProducerQuery, DEFAULT_PRODUCER_CHUNK};
pub use recorder::{
    BulkWrite, InvalidEntry, RecordMode, Recorder, Transform, Validate, DEFAULT_RECORD_CHUNK,
};

use crate::pipeline::Channel;
use crate::scanner::Entry;
use crate::storage::{Database, Store};

/// Open a connection for a stage, or drain the input if that fails.
pub(crate) fn connect_or_drain(
    stage: &str,
    db: &Database,
    input: &Channel<Entry>,
) -> Option<Store> {
    match db.connect() {
        Ok(store) => Some(store),
        Err(e) => {
            log::error!(
                "{}: cannot open {}: {}",
                stage,
                db.path().display(),
                e
            );
            let dropped = input.drain();
            if dropped > 0 {
                log::warn!("{}: dropped {} entries", stage, dropped);
            }
            None
        }
    }
}
