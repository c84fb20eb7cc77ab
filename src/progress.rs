//! Progress reporting for pipeline runs.
//!
//! Stages report three kinds of events through a [`ProgressReporter`]: an
//! entry was walked, a hash started/finished/failed, and a batch of entries
//! was processed. Reporting is fire-and-forget: implementations must not
//! block and have no way to push back on the pipeline.
//!
//! Three implementations are provided:
//! - [`SilentProgress`] ignores everything (library default, tests)
//! - [`LogProgress`] forwards events to the `log` facade
//! - [`Progress`] draws indicatif spinners on the terminal

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::scanner::{Entry, HashError};

/// Lifecycle of one hashing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashState {
    /// Submitted to the worker pool
    Started,
    /// Hash computed
    Finished,
    /// The file could not be read; the entry carries an empty hash
    Failed,
}

/// Receiver of pipeline progress events.
///
/// Every method has an empty default so implementors only override what
/// they care about. Methods are called concurrently from worker threads.
pub trait ProgressReporter: Send + Sync {
    /// Called for each entry emitted by the walk stage.
    ///
    /// # Arguments
    ///
    /// * `entry` - The entry just sent downstream
    fn on_walked(&self, _entry: &Entry) {}

    /// Called at each point of a file's hashing lifecycle.
    ///
    /// # Arguments
    ///
    /// * `entry` - The entry being hashed
    /// * `state` - Where in the lifecycle it is
    /// * `error` - The read error, for [`HashState::Failed`] only
    fn on_hash(&self, _entry: &Entry, _state: HashState, _error: Option<&HashError>) {}

    /// Called after a stage has processed a batch of entries.
    ///
    /// # Arguments
    ///
    /// * `stage` - Name of the reporting stage
    /// * `count` - Number of entries in the batch
    fn on_batch(&self, _stage: &str, _count: usize) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {}

/// Forwards events to the `log` facade.
///
/// Walked entries and hash starts go to `trace`, finished hashes and batches
/// to `debug`, failures to `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn on_walked(&self, entry: &Entry) {
        log::trace!("Walked {}", entry.path.display());
    }

    fn on_hash(&self, entry: &Entry, state: HashState, error: Option<&HashError>) {
        match state {
            HashState::Started => log::trace!("Hashing {}", entry.path.display()),
            HashState::Finished => log::debug!("Hashed {}", entry.path.display()),
            HashState::Failed => match error {
                Some(err) => log::warn!("Failed to hash {}: {}", entry.path.display(), err),
                None => log::warn!("Failed to hash {}", entry.path.display()),
            },
        }
    }

    fn on_batch(&self, stage: &str, count: usize) {
        log::debug!("{}: processed {} entries", stage, count);
    }
}

/// Terminal progress using indicatif spinners.
///
/// One spinner per event kind is created lazily on the first event, so a
/// `hash` run never shows a walking spinner and vice versa.
pub struct Progress {
    multi: MultiProgress,
    walking: Mutex<Option<ProgressBar>>,
    hashing: Mutex<Option<ProgressBar>>,
    recording: Mutex<Option<ProgressBar>>,
    failed: AtomicUsize,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Examples
    ///
    /// ```
    /// use dupindex::progress::Progress;
    ///
    /// let progress = Progress::new();
    /// progress.finish();
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            walking: Mutex::new(None),
            hashing: Mutex::new(None),
            recording: Mutex::new(None),
            failed: AtomicUsize::new(0),
        }
    }

    /// Number of files whose hash failed so far.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Finish every spinner that was started.
    pub fn finish(&self) {
        let bars = [
            (&self.walking, "Walking complete"),
            (&self.hashing, "Hashing complete"),
            (&self.recording, "Recording complete"),
        ];
        for (slot, message) in bars {
            if let Some(pb) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                pb.finish_with_message(message);
            }
        }
    }

    fn spinner_style(unit: &str) -> ProgressStyle {
        ProgressStyle::with_template(&format!(
            "{{spinner:.green}} {{msg}} [{{elapsed_precise}}] {{pos}} {unit}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    /// Run `update` against the spinner in `slot`, creating it first if needed.
    fn with_spinner(
        &self,
        slot: &Mutex<Option<ProgressBar>>,
        label: &str,
        unit: &str,
        update: impl FnOnce(&ProgressBar),
    ) {
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let pb = guard.get_or_insert_with(|| {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::spinner_style(unit));
            pb.set_message(label.to_string());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });
        update(pb);
    }
}

impl ProgressReporter for Progress {
    fn on_walked(&self, _entry: &Entry) {
        self.with_spinner(&self.walking, "Walking", "entries", |pb| pb.inc(1));
    }

    fn on_hash(&self, entry: &Entry, state: HashState, error: Option<&HashError>) {
        match state {
            HashState::Started => {}
            HashState::Finished => {
                self.with_spinner(&self.hashing, "Hashing", "files", |pb| {
                    pb.inc(1);
                    pb.set_message(format!("Hashing {}", truncate_path(&entry.path_key(), 30)));
                });
            }
            HashState::Failed => {
                let failed = self.failed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(err) = error {
                    log::warn!("Failed to hash {}: {}", entry.path.display(), err);
                }
                self.with_spinner(&self.hashing, "Hashing", "files", |pb| {
                    pb.inc(1);
                    pb.set_message(format!("Hashing ({failed} failed)"));
                });
            }
        }
    }

    fn on_batch(&self, stage: &str, count: usize) {
        self.with_spinner(&self.recording, "Recording", "entries", |pb| {
            pb.inc(count as u64);
            pb.set_message(format!("Recording ({stage})"));
        });
    }
}

/// Truncate a path for display in a spinner message.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let chars = file_name.chars().count();
    if chars >= max_len {
        let tail: String = file_name.chars().skip(chars + 3 - max_len).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
