use std::fs;
use std::time::{Duration, SystemTime};

use dupindex::commands;
use dupindex::config::Settings;
use dupindex::pipeline::Strategy;
use filetime::FileTime;
use tempfile::tempdir;

use super::support::{all_rows, row, sample_tree, settings, silent, write_file};

#[test]
fn test_first_index_records_files_and_directories() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());

    let summary = commands::index(&root, &settings, silent()).unwrap();

    assert!(summary.initial);
    assert_eq!(summary.recorded, 6);

    let rows = all_rows(&settings);
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|r| r.path.starts_with(&*root.to_string_lossy())));

    let sub = row(&settings, &root.join("sub"));
    assert!(sub.is_directory);
    assert_eq!(sub.size, None);
    assert!(sub.modified_at.is_some());

    let a = row(&settings, &root.join("a.txt"));
    assert!(!a.is_directory);
    assert_eq!(a.size, Some(5));
    assert_eq!(a.hash, None);
    assert!(a.record_created_at.is_some());
}

#[test]
fn test_second_index_is_idempotent() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());

    commands::index(&root, &settings, silent()).unwrap();
    let before = all_rows(&settings);

    let summary = commands::index(&root, &settings, silent()).unwrap();

    assert!(!summary.initial);
    assert_eq!(summary.recorded, 0);
    assert_eq!(all_rows(&settings), before);
}

#[test]
fn test_changed_mtime_is_recorded_once() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();

    let target = root.join("sub").join("d.txt");
    let old = row(&settings, &target);
    let later = SystemTime::now() + Duration::from_secs(60);
    filetime::set_file_mtime(&target, FileTime::from_system_time(later)).unwrap();

    let summary = commands::index(&root, &settings, silent()).unwrap();
    assert_eq!(summary.recorded, 1);

    let new = row(&settings, &target);
    assert!(new.modified_at > old.modified_at);
    assert_ne!(new.id, old.id, "changed rows are replaced");
    assert_eq!(all_rows(&settings).len(), 6);

    let again = commands::index(&root, &settings, silent()).unwrap();
    assert_eq!(again.recorded, 0);
}

#[test]
fn test_new_file_is_picked_up() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();

    let fresh = root.join("fresh.txt");
    write_file(&fresh, b"new");

    let summary = commands::index(&root, &settings, silent()).unwrap();
    assert_eq!(summary.recorded, 1);

    let row = row(&settings, &fresh);
    assert_eq!(row.size, Some(3));
    assert_eq!(all_rows(&settings).len(), 7);
}

#[test]
fn test_every_strategy_indexes_the_same_rows() {
    let mut results = Vec::new();

    for strategy in [Strategy::Sequential, Strategy::Threaded, Strategy::Isolated] {
        let dir = tempdir().unwrap();
        let root = sample_tree(dir.path());
        let settings = Settings {
            strategy,
            ..settings(dir.path())
        };

        let summary = commands::index(&root, &settings, silent()).unwrap();
        let paths: Vec<String> = all_rows(&settings)
            .into_iter()
            .map(|r| {
                r.path
                    .strip_prefix(&*root.to_string_lossy())
                    .unwrap()
                    .to_string()
            })
            .collect();
        results.push((summary.recorded, paths));
    }

    assert_eq!(results[0].0, 6);
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], results[2]);
}

#[test]
fn test_skip_hidden_and_ignore_patterns() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    write_file(&root.join(".hidden").join("x.txt"), b"x");
    write_file(&root.join("build.log"), b"log");
    let settings = Settings {
        skip_hidden: true,
        ignore_patterns: vec!["*.log".to_string()],
        ..settings(dir.path())
    };

    commands::index(&root, &settings, silent()).unwrap();

    let rows = all_rows(&settings);
    assert_eq!(rows.len(), 6);
    assert!(rows
        .iter()
        .all(|r| !r.path.contains(".hidden") && !r.path.ends_with(".log")));
}

#[test]
fn test_index_rejects_file_root() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, b"x").unwrap();

    let err = commands::index(&file, &settings(dir.path()), silent()).unwrap_err();

    assert_eq!(
        dupindex::error::ExitCode::for_error(&err),
        dupindex::error::ExitCode::ConfigError
    );
}
