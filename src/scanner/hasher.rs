//! BLAKE3 file hasher with streaming support.
//!
//! # Overview
//!
//! [`Hasher`] computes the hex-encoded BLAKE3 digest of a file's contents,
//! reading [`READ_CHUNK_SIZE`] bytes at a time so memory use stays flat
//! whatever the file size.
//!
//! [`HashStage`] runs the hasher inside a pipeline. Directories are passed
//! straight through; files are handed to a fixed-size rayon pool. The stage
//! keeps a count of in-flight jobs per path and, once its input ends, waits
//! on a condition variable until every job has sent its entry downstream.
//! Only then does it return, so the driver's end marker can never overtake a
//! hashed entry.
//!
//! # Example
//!
//! ```no_run
//! use dupindex::scanner::Hasher;
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let hex = hasher.hash_file(Path::new("Cargo.toml")).unwrap();
//! assert_eq!(hex.len(), 64);
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use super::{Entry, HashError};
use crate::pipeline::{Channel, Stage};
use crate::progress::{HashState, ProgressReporter, SilentProgress};

/// Bytes read per `read` call while hashing (1 MiB).
pub const READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Default size of the hashing worker pool.
pub const DEFAULT_HASH_WORKERS: usize = 10;

/// Streaming BLAKE3 file hasher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hasher {
    buffer_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher reading [`READ_CHUNK_SIZE`] bytes at a time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer_size: READ_CHUNK_SIZE,
        }
    }

    /// Use a different read size (clamped to at least one byte).
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// The read size in bytes.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Hash the full contents of a file.
    ///
    /// # Arguments
    ///
    /// * `path` - File to hash
    ///
    /// # Returns
    ///
    /// The 64-character lowercase hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn hash_file(&self, path: &Path) -> Result<String, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Hash an in-memory buffer the same way files are hashed.
    #[must_use]
    pub fn hash_bytes(data: &[u8]) -> String {
        blake3::hash(data).to_hex().to_string()
    }
}

/// Outstanding jobs keyed by path.
#[derive(Default)]
struct InFlight {
    jobs: Mutex<HashMap<PathBuf, usize>>,
    idle: Condvar,
}

impl InFlight {
    fn start(&self, path: &Path) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        *jobs.entry(path.to_path_buf()).or_insert(0) += 1;
    }

    fn finish(&self, path: &Path) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = jobs.get_mut(path) {
            *count -= 1;
            if *count == 0 {
                jobs.remove(path);
            }
        }
        if jobs.is_empty() {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let _idle = self
            .idle
            .wait_while(jobs, |jobs| !jobs.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn len(&self) -> usize {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }
}

/// Marks a job finished when dropped, even if the job unwinds.
struct JobGuard {
    in_flight: Arc<InFlight>,
    path: PathBuf,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.in_flight.finish(&self.path);
    }
}

/// Hash one entry, recording failures as an empty hash.
fn hash_entry(hasher: &Hasher, mut entry: Entry, progress: &dyn ProgressReporter) -> Entry {
    match hasher.hash_file(&entry.path) {
        Ok(hash) => {
            entry.content_hash = Some(hash);
            progress.on_hash(&entry, HashState::Finished, None);
        }
        Err(err) => {
            entry.content_hash = Some(String::new());
            progress.on_hash(&entry, HashState::Failed, Some(&err));
        }
    }
    entry
}

/// Pipeline stage hashing file entries on a worker pool.
pub struct HashStage {
    hasher: Hasher,
    workers: usize,
    progress: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for HashStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashStage")
            .field("hasher", &self.hasher)
            .field("workers", &self.workers)
            .field("progress", &"<reporter>")
            .finish()
    }
}

impl Default for HashStage {
    fn default() -> Self {
        Self::new()
    }
}

impl HashStage {
    /// Create a stage with [`DEFAULT_HASH_WORKERS`] workers and no progress.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
            workers: DEFAULT_HASH_WORKERS,
            progress: Arc::new(SilentProgress),
        }
    }

    /// Set the pool size (clamped to at least one worker).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Use a custom hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Report hashing events to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// The pool size.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    fn build_pool(&self) -> Option<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("hash-{i}"))
            .panic_handler(|_| log::error!("Hash worker panicked"))
            .build()
            .map_err(|e| {
                log::warn!("Failed to create hash pool, hashing inline: {}", e);
            })
            .ok()
    }
}

impl Stage<Entry> for HashStage {
    fn name(&self) -> &str {
        "hash"
    }

    fn run(&mut self, input: &Channel<Entry>, output: &Channel<Entry>) {
        let pool = self.build_pool();
        let in_flight = Arc::new(InFlight::default());
        let mut submitted = 0usize;
        let mut passed = 0usize;

        for entry in input.items() {
            if entry.is_directory() {
                passed += 1;
                output.send(entry);
                continue;
            }

            submitted += 1;
            self.progress.on_hash(&entry, HashState::Started, None);

            match &pool {
                Some(pool) => {
                    in_flight.start(&entry.path);
                    let guard = JobGuard {
                        in_flight: Arc::clone(&in_flight),
                        path: entry.path.clone(),
                    };
                    let hasher = self.hasher;
                    let progress = Arc::clone(&self.progress);
                    let output = output.clone();

                    pool.spawn(move || {
                        let entry = hash_entry(&hasher, entry, progress.as_ref());
                        output.send(entry);
                        drop(guard);
                    });
                }
                None => {
                    let entry = hash_entry(&self.hasher, entry, self.progress.as_ref());
                    output.send(entry);
                }
            }
        }

        log::debug!(
            "hash: input ended, waiting for {} in-flight job(s)",
            in_flight.len()
        );
        in_flight.wait_idle();
        drop(pool);
        log::debug!(
            "hash: {} file(s) hashed, {} director(ies) passed through",
            submitted,
            passed
        );
    }
}
