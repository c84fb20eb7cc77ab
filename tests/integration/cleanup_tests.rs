use std::fs;

use dupindex::commands;
use tempfile::tempdir;

use super::support::{all_rows, row, sample_tree, settings, silent};

#[test]
fn test_missing_file_is_marked_deleted() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();

    let gone = root.join("sub").join("e.txt");
    fs::remove_file(&gone).unwrap();

    let summary = commands::cleanup(&settings, false, silent()).unwrap();

    assert_eq!(summary.missing, 1);
    assert!(!summary.purged);
    assert!(row(&settings, &gone).deleted_at.is_some());
    assert_eq!(row(&settings, &root.join("a.txt")).deleted_at, None);
    assert_eq!(all_rows(&settings).len(), 6);

    let again = commands::cleanup(&settings, false, silent()).unwrap();
    assert_eq!(again.missing, 0);
}

#[test]
fn test_purge_removes_rows() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();

    fs::remove_dir_all(root.join("sub")).unwrap();

    let summary = commands::cleanup(&settings, true, silent()).unwrap();

    assert_eq!(summary.missing, 3);
    assert!(summary.purged);
    let paths: Vec<String> = all_rows(&settings).into_iter().map(|r| r.path).collect();
    assert_eq!(paths.len(), 3);
    assert!(paths.iter().all(|p| !p.contains("sub")));
}

#[test]
fn test_deleted_rows_are_skipped_by_hashing() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();

    fs::remove_file(root.join("b.txt")).unwrap();
    commands::cleanup(&settings, false, silent()).unwrap();

    assert_eq!(commands::hash(&settings, None, silent()).unwrap().hashed, 4);
}
