//! The stage contract and two general-purpose stages.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::Channel;
use crate::progress::{ProgressReporter, SilentProgress};

/// Default number of items between two [`Counter`] reports.
pub const DEFAULT_COUNTER_CHUNK: usize = 500;

/// A unit of pipeline work.
///
/// A stage reads `input` until the stream ends, finalizes, and returns.
/// When several workers share one input, the one that reads `End` must put
/// it back; [`Channel::recv_item`] does this, so stage loops should read
/// through it. Forwarding `End` downstream is the driver's job, never the
/// stage's.
pub trait Stage<T>: Send {
    /// Short name used for logging and worker thread names.
    fn name(&self) -> &str;

    /// Process the stream.
    fn run(&mut self, input: &Channel<T>, output: &Channel<T>);
}

/// Forwards every item unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl<T: Send> Stage<T> for PassThrough {
    fn name(&self) -> &str {
        "pass"
    }

    fn run(&mut self, input: &Channel<T>, output: &Channel<T>) {
        for item in input.items() {
            output.send(item);
        }
    }
}

/// Forwards every item, counting it.
///
/// Every `chunk_size` items, and once more for the remainder at the end of
/// the stream, the count is reported through [`ProgressReporter::on_batch`].
/// The running total is kept in a shared counter that stays readable after
/// the pipeline has consumed the stage.
pub struct Counter {
    label: String,
    chunk_size: usize,
    progress: Arc<dyn ProgressReporter>,
    total: Arc<AtomicUsize>,
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("label", &self.label)
            .field("chunk_size", &self.chunk_size)
            .field("total", &self.count())
            .finish_non_exhaustive()
    }
}

impl Counter {
    /// Create a silent counter reporting under `label`.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            chunk_size: DEFAULT_COUNTER_CHUNK,
            progress: Arc::new(SilentProgress),
            total: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report every `chunk_size` items (0 is treated as 1).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Send batch reports to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Handle to the running total.
    #[must_use]
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.total)
    }

    /// Items counted so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl<T: Send> Stage<T> for Counter {
    fn name(&self) -> &str {
        &self.label
    }

    fn run(&mut self, input: &Channel<T>, output: &Channel<T>) {
        let mut pending = 0;

        for item in input.items() {
            self.total.fetch_add(1, Ordering::SeqCst);
            pending += 1;
            output.send(item);

            if pending == self.chunk_size {
                self.progress.on_batch(&self.label, pending);
                pending = 0;
            }
        }

        if pending > 0 {
            self.progress.on_batch(&self.label, pending);
        }
        log::debug!("{}: {} item(s) passed", self.label, self.count());
    }
}
