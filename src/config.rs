//! Layered application settings.
//!
//! Settings are merged from, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. `dupindex.toml` in the platform config directory
//! 3. The file given with `--config`
//! 4. `DUPINDEX_*` environment variables (`DUPINDEX_HASH_WORKERS=4`)
//! 5. Command-line flags
//!
//! They are resolved once at startup and handed to pipeline constructors;
//! nothing below the CLI reads the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::duplicates::{MapperConfig, DEFAULT_FLUSH_THRESHOLD, DEFAULT_PAGE_SIZE};
use crate::pipeline::Strategy;
use crate::scanner::{WalkerConfig, DEFAULT_HASH_WORKERS};
use crate::stages::{DEFAULT_FILTER_CHUNK, DEFAULT_PRODUCER_CHUNK, DEFAULT_RECORD_CHUNK};
use crate::storage::{Database, RetryPolicy};

/// Prefix of environment variables read into [`Settings`].
pub const ENV_PREFIX: &str = "DUPINDEX_";

/// File name looked up in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "dupindex.toml";

/// Errors raised while resolving settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A file passed with `--config` does not exist.
    #[error("Config file not found: {0}")]
    MissingFile(PathBuf),

    /// A layer could not be parsed or had a value of the wrong type.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    /// The database path names a directory.
    #[error("Database path is a directory: {0}")]
    DatabaseIsDirectory(PathBuf),
}

/// Every tunable of the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Index database file
    pub database: PathBuf,
    /// How pipeline stages are scheduled
    pub strategy: Strategy,
    /// Hash worker threads
    pub hash_workers: usize,
    /// Paths looked up per change-detection query
    pub filter_chunk_size: usize,
    /// Entries written per transaction
    pub record_chunk_size: usize,
    /// Rows read per producer query
    pub producer_chunk_size: usize,
    /// Rows read per page by the duplicate mapper and lister
    pub page_size: usize,
    /// Closed-bucket rows that trigger a link write
    pub flush_threshold: usize,
    /// Attempts for a statement that hits a locked database
    pub retry_attempts: u32,
    /// Pause between those attempts, in milliseconds
    pub retry_delay_ms: u64,
    /// Skip hidden files and directories while walking
    pub skip_hidden: bool,
    /// Follow symbolic links while walking
    pub follow_symlinks: bool,
    /// Gitignore-style patterns excluded from the walk
    pub ignore_patterns: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            database: PathBuf::from("files.db"),
            strategy: Strategy::default(),
            hash_workers: DEFAULT_HASH_WORKERS,
            filter_chunk_size: DEFAULT_FILTER_CHUNK,
            record_chunk_size: DEFAULT_RECORD_CHUNK,
            producer_chunk_size: DEFAULT_PRODUCER_CHUNK,
            page_size: DEFAULT_PAGE_SIZE,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            retry_attempts: retry.attempts,
            retry_delay_ms: u64::try_from(retry.delay.as_millis()).unwrap_or(u64::MAX),
            skip_hidden: false,
            follow_symlinks: false,
            ignore_patterns: Vec::new(),
        }
    }
}

/// Values given on the command line; unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Overrides {
    /// `-d/--database`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    /// `--strategy`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    /// `--workers`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_workers: Option<usize>,
    /// `--skip-hidden`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_hidden: Option<bool>,
    /// `--follow-symlinks`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_symlinks: Option<bool>,
    /// `-i/--ignore`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignore_patterns: Vec<String>,
}

impl Settings {
    /// The platform config file, if a home directory can be determined.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "dupindex").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Build the layered figment without extracting it.
    ///
    /// # Arguments
    ///
    /// * `config_file` - Extra TOML file given with `--config`
    /// * `overrides` - Command-line values, merged last
    #[must_use]
    pub fn figment(config_file: Option<&Path>, overrides: &Overrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = Self::default_config_path() {
            figment = figment.merge(Toml::file(path));
        }
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
    }

    /// Resolve settings from every layer.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config_file` does not exist, a layer is
    /// malformed, or the database path is a directory.
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        if let Some(path) = config_file {
            if !path.is_file() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
        }
        let settings: Self = Self::figment(config_file, overrides)
            .extract()
            .map_err(Box::new)?;
        settings.validate()?;
        log::debug!("Resolved settings: {:?}", settings);
        Ok(settings)
    }

    /// Reject settings that cannot work.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DatabaseIsDirectory` if the database path names
    /// an existing directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.is_dir() {
            return Err(ConfigError::DatabaseIsDirectory(self.database.clone()));
        }
        Ok(())
    }

    /// The index database.
    #[must_use]
    pub fn database(&self) -> Database {
        Database::new(&self.database)
    }

    /// Retry policy for storage contention.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    /// Walk options.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig::default()
            .with_follow_symlinks(self.follow_symlinks)
            .with_skip_hidden(self.skip_hidden)
            .with_ignore_patterns(self.ignore_patterns.clone())
    }

    /// Duplicate mapper options.
    #[must_use]
    pub fn mapper_config(&self) -> MapperConfig {
        MapperConfig::default()
            .with_page_size(self.page_size)
            .with_flush_threshold(self.flush_threshold)
            .with_retry(self.retry_policy())
    }
}
