use clap::Parser;
use dupindex::cli::Cli;
use dupindex::error::ExitCode;
use dupindex::run_app;
use tempfile::tempdir;

use super::support::{all_rows, sample_tree, settings};

fn run(args: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec!["dupindex", "-q"];
    argv.extend_from_slice(args);
    run_app(Cli::try_parse_from(argv).unwrap())
}

#[test]
fn test_full_workflow_from_the_command_line() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let db = dir.path().join("files.db");
    let db = db.to_str().unwrap();
    let root = root.to_str().unwrap();
    let report = dir.path().join("dupes.json");

    assert_eq!(run(&["index", root, "-d", db]).unwrap(), ExitCode::Success);
    assert_eq!(run(&["hash", "-d", db, "--workers", "2"]).unwrap(), ExitCode::Success);
    assert_eq!(run(&["map-duplicates", "-d", db]).unwrap(), ExitCode::Success);
    assert_eq!(
        run(&["list-duplicates", "-d", db, "-f", "json", "-o", report.to_str().unwrap()]).unwrap(),
        ExitCode::Success
    );

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["duplicates"].as_array().unwrap().len(), 2);
    assert_eq!(json["summary"]["duplicate_groups"], 2);

    assert_eq!(all_rows(&settings(dir.path())).len(), 6);
}

#[test]
fn test_stats_on_empty_database() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("files.db");

    assert_eq!(
        run(&["stats", "-d", db.to_str().unwrap()]).unwrap(),
        ExitCode::Success
    );
    assert!(db.exists());
}

#[test]
fn test_missing_root_is_a_config_error() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("files.db");
    let missing = dir.path().join("nope");

    let err = run(&["index", missing.to_str().unwrap(), "-d", db.to_str().unwrap()]).unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
    assert!(!db.exists());
}

#[test]
fn test_missing_config_file_is_a_config_error() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("absent.toml");

    let err = run(&["--config", config.to_str().unwrap(), "stats"]).unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
}

#[test]
fn test_debug_walk_then_insert() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let walk_db = dir.path().join("walk.db");
    let copy_db = dir.path().join("files.db");

    assert_eq!(
        run(&["debug", "walk-path", root.to_str().unwrap(), "-d", walk_db.to_str().unwrap()]).unwrap(),
        ExitCode::Success
    );
    assert_eq!(
        run(&[
            "debug",
            "insert",
            walk_db.to_str().unwrap(),
            "-d",
            copy_db.to_str().unwrap(),
            "-s",
            "4",
            "-t",
        ])
        .unwrap(),
        ExitCode::Success
    );

    // five files and "sub"
    let rows = all_rows(&settings(dir.path()));
    assert_eq!(rows.len(), 6);
    assert_eq!(rows.iter().filter(|r| r.is_directory).count(), 1);

    let err = run(&["debug", "insert", walk_db.to_str().unwrap(), "-d", walk_db.to_str().unwrap()])
        .unwrap_err();
    assert!(err.to_string().contains("same database"), "{err}");
}
