//! Directory walker and the walk stage built on it.
//!
//! # Overview
//!
//! [`Walker`] recursively enumerates everything below a root directory with
//! [`walkdir`]. The root itself is not emitted. Children are visited in file
//! name order so repeated walks of an unchanged tree yield the same sequence.
//!
//! - Directories come out as [`Entry::directory`] with their metadata left
//!   unloaded; the change filter stats them later if it needs to.
//! - Everything else is stat-ed eagerly. A failed stat (vanished file,
//!   permission denied, dangling link) is yielded as a [`ScanError`].
//!
//! # Features
//!
//! - Optional symlink following
//! - Hidden file filtering
//! - Gitignore-style pattern matching via the `ignore` crate; an ignored
//!   directory is pruned together with everything under it
//!
//! # Example
//!
//! ```no_run
//! use dupindex::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     skip_hidden: true,
//!     ..Default::default()
//! };
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(entry) => println!("{}: {:?} bytes", entry.path.display(), entry.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use walkdir::{DirEntry, WalkDir};

use super::{Entry, ScanError, Stat};
use crate::pipeline::{Channel, Stage};
use crate::progress::{ProgressReporter, SilentProgress};

/// Options controlling which paths the walker visits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkerConfig {
    /// Follow symbolic links into directories
    pub follow_symlinks: bool,
    /// Skip files and directories whose name starts with a dot
    pub skip_hidden: bool,
    /// Gitignore-style patterns to exclude
    pub ignore_patterns: Vec<String>,
}

impl WalkerConfig {
    /// Set symlink following.
    #[must_use]
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set hidden file skipping.
    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Set the ignore patterns.
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }
}

/// Recursive directory walker.
#[derive(Debug, Clone)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// # Arguments
    ///
    /// * `path` - Root directory to scan
    /// * `config` - Walker configuration options
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
        }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check that the root exists and is a directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotFound`] or [`ScanError::NotADirectory`].
    pub fn check_root(&self) -> Result<(), ScanError> {
        let metadata =
            std::fs::metadata(&self.root).map_err(|e| ScanError::from_io(&self.root, e))?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(ScanError::NotADirectory(self.root.clone()))
        }
    }

    /// Build gitignore matcher from config patterns.
    fn build_gitignore(&self) -> Option<Gitignore> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if gitignore.is_empty() => None,
            Ok(gitignore) => Some(gitignore),
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    /// Check if a path should be ignored based on configured patterns.
    fn should_ignore(&self, path: &Path, is_dir: bool, gitignore: Option<&Gitignore>) -> bool {
        let Some(gi) = gitignore else {
            return false;
        };

        // Patterns are matched against the path relative to the root,
        // with forward slashes even on Windows.
        let relative_path = path.strip_prefix(&self.root).unwrap_or(path);
        let path_str = relative_path.to_string_lossy();
        let normalized_path = if cfg!(windows) {
            path_str.replace('\\', "/")
        } else {
            path_str.into_owned()
        };

        gi.matched(normalized_path, is_dir).is_ignore()
    }

    fn keep(&self, entry: &DirEntry, gitignore: Option<&Gitignore>) -> bool {
        if self.config.skip_hidden && is_hidden(entry) {
            log::trace!("Skipping hidden: {}", entry.path().display());
            return false;
        }
        if self.should_ignore(entry.path(), entry.file_type().is_dir(), gitignore) {
            log::trace!("Ignoring: {}", entry.path().display());
            return false;
        }
        true
    }

    /// Walk the directory tree.
    ///
    /// Returns an iterator over [`Entry`] results. Errors are yielded as
    /// [`ScanError`] values rather than stopping iteration.
    pub fn walk(&self) -> impl Iterator<Item = Result<Entry, ScanError>> + '_ {
        let gitignore = self.build_gitignore();

        WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| self.keep(entry, gitignore.as_ref()))
            .map(move |result| match result {
                Ok(entry) => self.process_entry(&entry),
                Err(e) => Err(self.handle_walk_error(e)),
            })
    }

    /// Turn a directory entry into an [`Entry`].
    fn process_entry(&self, entry: &DirEntry) -> Result<Entry, ScanError> {
        let path = entry.path();

        if entry.file_type().is_dir() {
            return Ok(Entry::directory(path));
        }

        match Stat::of(path) {
            // A link to a directory we are not following into.
            Ok(stat) if stat.is_directory => Ok(Entry::directory(path)),
            Ok(stat) => Ok(Entry::new(path).with_stat(stat)),
            Err(e) => Err(ScanError::from_io(path, e)),
        }
    }

    /// Convert a walkdir error.
    fn handle_walk_error(&self, error: walkdir::Error) -> ScanError {
        let path = error
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);

        if error.loop_ancestor().is_some() {
            return ScanError::Io {
                path,
                source: io::Error::other(error.to_string()),
            };
        }

        match error.into_io_error() {
            Some(io_error) => ScanError::from_io(&path, io_error),
            None => ScanError::Io {
                path,
                source: io::Error::other("directory walk failed"),
            },
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// Pipeline stage emitting every path under a root.
///
/// The walk ignores its input; it is meant to head a pipeline. Paths that
/// cannot be stat-ed are logged and skipped.
pub struct WalkStage {
    walker: Walker,
    progress: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for WalkStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalkStage")
            .field("walker", &self.walker)
            .finish_non_exhaustive()
    }
}

impl WalkStage {
    /// Create a walk stage.
    #[must_use]
    pub fn new(walker: Walker) -> Self {
        Self {
            walker,
            progress: Arc::new(SilentProgress),
        }
    }

    /// Report walked entries to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }
}

impl Stage<Entry> for WalkStage {
    fn name(&self) -> &str {
        "walk"
    }

    fn run(&mut self, input: &Channel<Entry>, output: &Channel<Entry>) {
        log::debug!("walk: starting at {}", self.walker.root().display());
        let (mut emitted, mut skipped) = (0usize, 0usize);

        for result in self.walker.walk() {
            match result {
                Ok(entry) => {
                    log::trace!("walk: {}", entry.path.display());
                    self.progress.on_walked(&entry);
                    output.send(entry);
                    emitted += 1;
                }
                Err(e) => {
                    log::warn!("Skipping: {}", e);
                    skipped += 1;
                }
            }
        }

        input.drain();
        log::debug!("walk: {} entries emitted, {} skipped", emitted, skipped);
    }
}
