//! Command-line interface definitions for dupindex.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//! Global options (verbosity, config file, progress) come before the subcommand; every
//! subcommand takes `-d/--database` and `-t/--time`.
//!
//! # Example
//!
//! ```bash
//! # Index a tree, then hash everything new or changed
//! dupindex index ~/Pictures
//! dupindex hash --workers 4
//!
//! # Build the duplicate map and list it as JSON
//! dupindex map-duplicates --fresh
//! dupindex list-duplicates --format json -o dupes.json
//!
//! # Verbose mode for debugging
//! dupindex -v index ~/Pictures --strategy threaded
//!
//! # Time the walk alone, then a bulk copy of its rows
//! dupindex debug walk-path ~/Pictures -d walk.db
//! dupindex debug insert walk.db -d copy.db -s 1000
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Overrides;
use crate::output::OutputFormat;
use crate::pipeline::Strategy;

/// Index a directory tree into SQLite and find duplicate files by content.
///
/// dupindex records every file and directory under a root, hashes file
/// contents with BLAKE3, and links files that share a hash so duplicates
/// can be listed largest first.
#[derive(Debug, Parser)]
#[command(name = "dupindex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Extra configuration file (TOML)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Show progress spinners while pipelines run
    #[arg(long, global = true)]
    pub progress: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for dupindex.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Walk a directory tree and record new or changed entries
    Index(IndexArgs),
    /// Hash every file without a current hash
    Hash(HashArgs),
    /// Mark (or purge) rows whose path no longer exists
    Cleanup(CleanupArgs),
    /// Recompute directory sizes from the files below them
    FolderStats(DbArgs),
    /// Link files that share a content hash
    MapDuplicates(MapArgs),
    /// List duplicate groups, largest files first
    ListDuplicates(ListArgs),
    /// Show index statistics
    Stats(DbArgs),
    /// Time the walk and bulk insert paths on their own
    Debug(DebugArgs),
}

impl Commands {
    /// The database options shared by every subcommand.
    #[must_use]
    pub fn db_args(&self) -> &DbArgs {
        match self {
            Self::Index(args) => &args.db,
            Self::Hash(args) => &args.db,
            Self::Cleanup(args) => &args.db,
            Self::MapDuplicates(args) => &args.db,
            Self::ListDuplicates(args) => &args.db,
            Self::FolderStats(args) | Self::Stats(args) => args,
            Self::Debug(args) => match &args.command {
                DebugCommand::WalkPath(args) => &args.db,
                DebugCommand::Insert(args) => &args.db,
            },
        }
    }

    /// Settings given on the command line, merged over every other layer.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        let mut overrides = Overrides {
            database: self.db_args().database.clone(),
            ..Default::default()
        };
        match self {
            Self::Index(args) => {
                overrides.strategy = args.pipeline.strategy.map(Strategy::from);
                overrides.skip_hidden = args.skip_hidden.then_some(true);
                overrides.follow_symlinks = args.follow_symlinks.then_some(true);
                overrides.ignore_patterns.clone_from(&args.ignore_patterns);
            }
            Self::Hash(args) => {
                overrides.strategy = args.pipeline.strategy.map(Strategy::from);
                overrides.hash_workers = args.workers;
            }
            Self::Cleanup(args) => {
                overrides.strategy = args.pipeline.strategy.map(Strategy::from);
            }
            Self::Debug(DebugArgs {
                command: DebugCommand::WalkPath(args),
            }) => {
                overrides.strategy = args.pipeline.strategy.map(Strategy::from);
            }
            _ => {}
        }
        overrides
    }
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct DbArgs {
    /// Index database file [default: files.db]
    #[arg(short, long, value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Print how long the command took
    #[arg(short, long)]
    pub time: bool,
}

/// Options for commands that run a pipeline.
#[derive(Debug, Clone, Default, Args)]
pub struct PipelineArgs {
    /// How pipeline stages are scheduled [default: isolated]
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,
}

/// Arguments for the index subcommand.
#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Root of the tree to index
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Follow symbolic links while walking
    ///
    /// Warning: May revisit files if symlinks form cycles.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Gitignore-style patterns to skip (can be specified multiple times)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub db: DbArgs,
}

/// Arguments for the hash subcommand.
#[derive(Debug, Args)]
pub struct HashArgs {
    /// Number of hashing threads [default: 10]
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Hash at most N files in this run
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub db: DbArgs,
}

/// Arguments for the cleanup subcommand.
#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Delete missing rows instead of marking them deleted
    #[arg(long)]
    pub purge: bool,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub db: DbArgs,
}

/// Arguments for the map-duplicates subcommand.
#[derive(Debug, Args)]
pub struct MapArgs {
    /// Remove existing links before mapping
    #[arg(long)]
    pub fresh: bool,

    #[command(flatten)]
    pub db: DbArgs,
}

/// Arguments for the list-duplicates subcommand.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: FormatArg,

    /// Write the report to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub db: DbArgs,
}

/// Arguments for the debug subcommand.
#[derive(Debug, Args)]
pub struct DebugArgs {
    #[command(subcommand)]
    pub command: DebugCommand,
}

/// Timing tools.
#[derive(Debug, Subcommand)]
pub enum DebugCommand {
    /// Walk PATH and insert every entry into the database, without change detection
    WalkPath(WalkPathArgs),
    /// Copy every row of another index database into the database
    Insert(InsertArgs),
}

/// Arguments for `debug walk-path`.
#[derive(Debug, Args)]
pub struct WalkPathArgs {
    /// Root of the tree to walk
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub db: DbArgs,
}

/// Arguments for `debug insert`.
#[derive(Debug, Args)]
pub struct InsertArgs {
    /// Index database to copy rows from
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Rows per transaction [default: record_chunk_size]
    #[arg(short = 's', long, value_name = "N")]
    pub batch_size: Option<usize>,

    #[command(flatten)]
    pub db: DbArgs,
}

/// Pipeline strategies as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// One stage after another in the calling thread
    Sequential,
    /// One scoped thread per worker
    Threaded,
    /// One dedicated thread per worker, sharing only channels
    Isolated,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sequential => Self::Sequential,
            StrategyArg::Threaded => Self::Threaded,
            StrategyArg::Isolated => Self::Isolated,
        }
    }
}

/// Report formats as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Human-readable listing
    Text,
    /// JSON document
    Json,
    /// CSV, one row per file
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
            FormatArg::Csv => Self::Csv,
        }
    }
}
