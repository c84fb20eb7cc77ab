//! dupindex - persistent file index and duplicate finder
//!
//! Walks a directory tree into a SQLite index, hashes file contents with
//! BLAKE3 under a worker pool, and links files that share a hash. Work is
//! done by staged pipelines ([`pipeline`]) whose stages pass [`scanner::Entry`]
//! values over channels and talk to the index through [`storage`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod stages;
pub mod storage;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use bytesize::ByteSize;

use crate::cli::{Cli, Commands, DebugCommand};
use crate::config::Settings;
use crate::error::ExitCode;
use crate::progress::{LogProgress, Progress, ProgressReporter};

/// Run the command line `cli` describes.
///
/// # Errors
///
/// Returns configuration errors before any work starts, and storage or
/// pipeline errors from the command itself.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let settings = Settings::load(cli.config.as_deref(), &cli.command.overrides())?;
    let started = Instant::now();

    let spinners = cli.progress.then(|| Arc::new(Progress::new()));
    let progress: Arc<dyn ProgressReporter> = match &spinners {
        Some(spinners) => Arc::clone(spinners) as Arc<dyn ProgressReporter>,
        None => Arc::new(LogProgress),
    };

    let result = dispatch(&cli, &settings, progress);
    if let Some(spinners) = spinners {
        spinners.finish();
    }
    result?;

    if cli.command.db_args().time {
        eprintln!("Took {:.2?}", started.elapsed());
    }
    Ok(ExitCode::Success)
}

fn dispatch(cli: &Cli, settings: &Settings, progress: Arc<dyn ProgressReporter>) -> Result<()> {
    let quiet = cli.quiet;
    let say = |line: String| {
        if !quiet {
            println!("{line}");
        }
    };

    match &cli.command {
        Commands::Index(args) => {
            let summary = commands::index(&args.path, settings, progress)?;
            say(format!("Recorded {} new or changed entries", summary.recorded));
        }
        Commands::Hash(args) => {
            let summary = commands::hash(settings, args.limit, progress)?;
            say(format!("Hashed {} files", summary.hashed));
        }
        Commands::Cleanup(args) => {
            let summary = commands::cleanup(settings, args.purge, progress)?;
            let verb = if summary.purged { "Purged" } else { "Marked deleted" };
            say(format!("{verb} {} missing entries", summary.missing));
        }
        Commands::FolderStats(_) => {
            let updated = commands::folder_stats(settings)?;
            say(format!("Updated {updated} directory sizes"));
        }
        Commands::MapDuplicates(args) => {
            let summary = commands::map_duplicates(settings, args.fresh)?;
            say(format!(
                "Scanned {} rows: {} duplicate groups, {} links",
                summary.rows_scanned, summary.groups, summary.links
            ));
        }
        Commands::ListDuplicates(args) => {
            let summary =
                commands::list_duplicates(settings, args.format.into(), args.output.as_deref())?;
            if let Some(path) = &args.output {
                say(format!(
                    "Wrote {} groups ({} reclaimable) to {}",
                    summary.groups,
                    ByteSize::b(summary.reclaimable_bytes),
                    path.display()
                ));
            }
        }
        Commands::Stats(_) => {
            let stats = commands::stats(settings)?;
            output::write_statistics(&stats, std::io::stdout().lock())?;
        }
        Commands::Debug(args) => match &args.command {
            DebugCommand::WalkPath(walk) => {
                let timing = commands::debug_walk_path(&walk.path, settings, progress)?;
                say(format!(
                    "\"walk-path {}\" took {:.2?} ({} entries)",
                    walk.path.display(),
                    timing.elapsed,
                    timing.entries
                ));
            }
            DebugCommand::Insert(insert) => {
                let batch_size = insert.batch_size.unwrap_or(settings.record_chunk_size);
                let timing = commands::debug_insert(&insert.source, settings, batch_size)?;
                say(format!(
                    "\"insert {}\" took {:.2?} ({} rows, {} per batch)",
                    insert.source.display(),
                    timing.elapsed,
                    timing.entries,
                    batch_size
                ));
            }
        },
    }
    Ok(())
}
