use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dupindex::commands;
use dupindex::config::Settings;
use dupindex::pipeline::Strategy;
use dupindex::progress::HashState;
use dupindex::scanner::Hasher;
use filetime::FileTime;
use tempfile::tempdir;

use super::support::{all_rows, row, sample_tree, settings, silent, store, HashEvents};

#[test]
fn test_every_file_gets_a_current_hash() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();

    let summary = commands::hash(&settings, None, silent()).unwrap();

    assert_eq!(summary.hashed, 5);
    for row in all_rows(&settings) {
        if row.is_directory {
            assert_eq!(row.hash, None, "{}", row.path);
            continue;
        }
        assert!(row.has_hash(), "{}", row.path);
        assert!(row.hashed_at.unwrap() >= row.modified_at.unwrap());
        assert!(!row.needs_hash());
    }
    assert_eq!(
        row(&settings, &root.join("a.txt")).hash,
        Some(Hasher::hash_bytes(b"alpha"))
    );
    assert!(store(&settings).files_needing_hash(0, 100).unwrap().is_empty());

    let again = commands::hash(&settings, None, silent()).unwrap();
    assert_eq!(again.hashed, 0);
}

#[test]
fn test_vanished_file_reports_failure_and_stays_unhashed() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();

    let gone = root.join("b.txt");
    fs::remove_file(&gone).unwrap();

    let events = Arc::new(HashEvents::default());
    let summary = commands::hash(&settings, None, events.clone()).unwrap();

    assert_eq!(summary.hashed, 5);
    assert_eq!(events.of(HashState::Failed), vec![gone.clone()]);
    assert_eq!(events.of(HashState::Started).len(), 5);
    assert_eq!(events.of(HashState::Finished).len(), 4);

    let failed = row(&settings, &gone);
    assert_eq!(failed.hash.as_deref(), Some(""));
    assert_eq!(failed.hashed_at, None);
    assert!(failed.needs_hash());
}

#[test]
fn test_limit_caps_one_run() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();

    assert_eq!(commands::hash(&settings, Some(2), silent()).unwrap().hashed, 2);
    assert_eq!(commands::hash(&settings, Some(2), silent()).unwrap().hashed, 2);
    assert_eq!(commands::hash(&settings, None, silent()).unwrap().hashed, 1);
}

#[test]
fn test_modified_file_is_hashed_again() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();
    commands::hash(&settings, None, silent()).unwrap();

    let target = root.join("a.txt");
    fs::write(&target, b"changed").unwrap();
    let later = SystemTime::now() + Duration::from_secs(60);
    filetime::set_file_mtime(&target, FileTime::from_system_time(later)).unwrap();

    commands::index(&root, &settings, silent()).unwrap();
    assert!(row(&settings, &target).needs_hash());

    assert_eq!(commands::hash(&settings, None, silent()).unwrap().hashed, 1);
    let rehashed = row(&settings, &target);
    assert_eq!(rehashed.hash, Some(Hasher::hash_bytes(b"changed")));

    // The mtime is still ahead of the clock, but the hash is newer than the
    // row's last write, so it stays current.
    assert!(rehashed.hashed_at.unwrap() < rehashed.modified_at.unwrap());
    assert!(!rehashed.needs_hash());
    assert_eq!(commands::hash(&settings, None, silent()).unwrap().hashed, 0);
}

#[test]
fn test_hash_under_every_strategy() {
    for strategy in [Strategy::Sequential, Strategy::Threaded, Strategy::Isolated] {
        let dir = tempdir().unwrap();
        let root = sample_tree(dir.path());
        let settings = Settings {
            strategy,
            hash_workers: 3,
            ..settings(dir.path())
        };
        commands::index(&root, &settings, silent()).unwrap();

        let summary = commands::hash(&settings, None, silent()).unwrap();

        assert_eq!(summary.hashed, 5, "{strategy}");
        assert!(
            store(&settings).files_needing_hash(0, 100).unwrap().is_empty(),
            "{strategy}"
        );
    }
}
