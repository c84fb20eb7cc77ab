//! Staged pipeline with end-of-stream propagation.
//!
//! A [`Pipeline`] is an ordered list of stage groups. Every worker in group
//! `i` reads from channel `i` and writes to channel `i + 1`. The first and last
//! channels are endpoints, so the first group sees an immediately finished
//! stream and whatever the last group emits is dropped.
//!
//! # End-of-stream protocol
//!
//! The driver, not the stages, moves the end marker along. Once every worker
//! of group `i` has returned, the driver puts [`Message::End`] onto channel
//! `i + 1`. A worker that reads `End` writes it back before returning, so all
//! siblings sharing the channel see it; see [`Channel::recv_item`].
//!
//! # Strategies
//!
//! - [`Strategy::Sequential`]: groups run one after another in the calling
//!   thread. Channel `i + 1` is fully written before group `i + 1` starts,
//!   so a whole stream sits in memory. Meant for small runs and debugging.
//! - [`Strategy::Threaded`]: every worker gets a scoped thread and borrows its
//!   stage. Groups run concurrently.
//! - [`Strategy::Isolated`]: every worker is moved into its own named thread
//!   and owns its stage outright. Nothing is borrowed from the caller. This
//!   is the default.
//!
//! A panicking worker is contained. Its group still counts as finished, the
//! end marker still goes out, and [`Pipeline::run`] reports the panic once
//! the whole pipeline has drained.
//!
//! # Example
//!
//! ```
//! use dupindex::pipeline::{Counter, Pipeline, Strategy, PassThrough};
//!
//! let counter = Counter::new("tail");
//! let total = counter.counter();
//! Pipeline::<u32>::new(Strategy::Threaded)
//!     .stage(PassThrough)
//!     .stage(counter)
//!     .run()
//!     .unwrap();
//! assert_eq!(total.load(std::sync::atomic::Ordering::SeqCst), 0);
//! ```

pub mod channel;
pub mod stage;

use std::any::Any;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use serde::{Deserialize, Serialize};

pub use channel::{Channel, Message};
pub use stage::{Counter, PassThrough, Stage, DEFAULT_COUNTER_CHUNK};

/// How stage workers are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One group at a time in the calling thread
    Sequential,
    /// Scoped threads borrowing their stages
    Threaded,
    /// Dedicated threads owning their stages
    #[default]
    Isolated,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sequential => "sequential",
            Self::Threaded => "threaded",
            Self::Isolated => "isolated",
        };
        f.write_str(name)
    }
}

/// Failures reported after a pipeline has drained.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// A worker thread could not be started; its stage never ran.
    #[error("failed to start worker for stage '{stage}': {source}")]
    Spawn {
        /// Stage name
        stage: String,
        /// OS error from the thread builder
        #[source]
        source: io::Error,
    },

    /// One or more workers panicked.
    #[error("worker panicked in stage(s): {}", stages.join(", "))]
    WorkerPanicked {
        /// Names of the stages whose workers panicked
        stages: Vec<String>,
    },
}

/// A group of workers sharing one input and one output channel.
pub type StageGroup<T> = Vec<Box<dyn Stage<T>>>;

/// An ordered list of stage groups plus the strategy that runs them.
pub struct Pipeline<T> {
    strategy: Strategy,
    groups: Vec<StageGroup<T>>,
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<Vec<&str>> = self
            .groups
            .iter()
            .map(|group| group.iter().map(|stage| stage.name()).collect())
            .collect();
        f.debug_struct("Pipeline")
            .field("strategy", &self.strategy)
            .field("groups", &names)
            .finish()
    }
}

/// Collects worker failures while the driver keeps draining.
#[derive(Default)]
struct Failures {
    spawn: Option<PipelineError>,
    panicked: Vec<String>,
}

impl Failures {
    fn spawn_failed(&mut self, stage: &str, source: io::Error) {
        log::error!("Could not start worker for stage '{}': {}", stage, source);
        if self.spawn.is_none() {
            self.spawn = Some(PipelineError::Spawn {
                stage: stage.to_string(),
                source,
            });
        }
    }

    fn panicked(&mut self, stage: &str, payload: &(dyn Any + Send)) {
        log::error!(
            "Worker for stage '{}' panicked: {}",
            stage,
            panic_message(payload)
        );
        self.panicked.push(stage.to_string());
    }

    fn into_result(self) -> Result<(), PipelineError> {
        if let Some(err) = self.spawn {
            return Err(err);
        }
        if !self.panicked.is_empty() {
            return Err(PipelineError::WorkerPanicked {
                stages: self.panicked,
            });
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

impl<T: Send + 'static> Pipeline<T> {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            groups: Vec::new(),
        }
    }

    /// Append a group of workers that share one input channel.
    ///
    /// An empty group is ignored.
    #[must_use]
    pub fn pipe(mut self, group: StageGroup<T>) -> Self {
        if !group.is_empty() {
            self.groups.push(group);
        }
        self
    }

    /// Append a single-worker group.
    #[must_use]
    pub fn stage(self, stage: impl Stage<T> + 'static) -> Self {
        self.pipe(vec![Box::new(stage)])
    }

    /// The scheduling strategy.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Number of stage groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Run every stage to completion.
    ///
    /// Returns once every worker has returned and every end marker has been
    /// delivered, even when some workers failed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Spawn`] if a worker thread could not be
    /// started, or [`PipelineError::WorkerPanicked`] if any worker panicked.
    pub fn run(self) -> Result<(), PipelineError> {
        if self.groups.is_empty() {
            return Ok(());
        }

        let channels = Self::channels(self.groups.len());
        log::debug!(
            "Running {} stage group(s) with {} strategy",
            self.groups.len(),
            self.strategy
        );

        let failures = match self.strategy {
            Strategy::Sequential => run_sequential(self.groups, &channels),
            Strategy::Threaded => run_threaded(self.groups, &channels),
            Strategy::Isolated => run_isolated(self.groups, &channels),
        };
        failures.into_result()
    }

    /// Endpoint, `n - 1` queues, endpoint.
    fn channels(groups: usize) -> Vec<Channel<T>> {
        let mut channels = Vec::with_capacity(groups + 1);
        channels.push(Channel::endpoint());
        channels.extend((1..groups).map(|_| Channel::queue()));
        channels.push(Channel::endpoint());
        channels
    }
}

fn run_sequential<T: Send>(groups: Vec<StageGroup<T>>, channels: &[Channel<T>]) -> Failures {
    let mut failures = Failures::default();

    for (index, mut group) in groups.into_iter().enumerate() {
        let (input, output) = (&channels[index], &channels[index + 1]);
        for stage in &mut group {
            log::debug!("Stage '{}' started", stage.name());
            let result = panic::catch_unwind(AssertUnwindSafe(|| stage.run(input, output)));
            if let Err(payload) = result {
                failures.panicked(stage.name(), payload.as_ref());
            }
        }
        output.put(Message::End);
    }

    failures
}

fn run_threaded<T: Send>(mut groups: Vec<StageGroup<T>>, channels: &[Channel<T>]) -> Failures {
    let mut failures = Failures::default();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(groups.len());

        for (index, group) in groups.iter_mut().enumerate() {
            let (input, output) = (&channels[index], &channels[index + 1]);
            let mut group_handles = Vec::with_capacity(group.len());

            for stage in group.iter_mut() {
                let name = stage.name().to_string();
                let spawned = thread::Builder::new()
                    .name(format!("stage-{name}"))
                    .spawn_scoped(scope, move || stage.run(input, output));
                match spawned {
                    Ok(handle) => group_handles.push((name, handle)),
                    Err(err) => failures.spawn_failed(&name, err),
                }
            }
            handles.push(group_handles);
        }

        // Barrier: group i is done before End goes onto channel i + 1.
        for (index, group_handles) in handles.into_iter().enumerate() {
            for (name, handle) in group_handles {
                if let Err(payload) = handle.join() {
                    failures.panicked(&name, payload.as_ref());
                }
            }
            channels[index + 1].put(Message::End);
        }
    });

    failures
}

fn run_isolated<T: Send + 'static>(
    groups: Vec<StageGroup<T>>,
    channels: &[Channel<T>],
) -> Failures {
    let mut failures = Failures::default();
    let mut handles = Vec::with_capacity(groups.len());

    for (index, group) in groups.into_iter().enumerate() {
        let mut group_handles = Vec::with_capacity(group.len());

        for mut stage in group {
            let name = stage.name().to_string();
            let input = channels[index].clone();
            let output = channels[index + 1].clone();
            let spawned = thread::Builder::new()
                .name(format!("stage-{name}"))
                .spawn(move || stage.run(&input, &output));
            match spawned {
                Ok(handle) => group_handles.push((name, handle)),
                Err(err) => failures.spawn_failed(&name, err),
            }
        }
        handles.push(group_handles);
    }

    for (index, group_handles) in handles.into_iter().enumerate() {
        for (name, handle) in group_handles {
            if let Err(payload) = handle.join() {
                failures.panicked(&name, payload.as_ref());
            }
        }
        channels[index + 1].put(Message::End);
    }

    failures
}
