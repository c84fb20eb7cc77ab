use dupindex::commands;
use tempfile::tempdir;

use super::support::{row, settings, silent, write_file};

#[test]
fn test_directory_sizes_sum_the_files_below() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("tree");
    write_file(&root.join("d").join("a"), &[0u8; 10]);
    write_file(&root.join("d").join("sub").join("b"), &[0u8; 20]);
    write_file(&root.join("e").join("c"), &[0u8; 5]);
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();

    let updated = commands::folder_stats(&settings).unwrap();

    assert_eq!(updated, 3);
    assert_eq!(row(&settings, &root.join("d")).size, Some(30));
    assert_eq!(row(&settings, &root.join("d").join("sub")).size, Some(20));
    assert_eq!(row(&settings, &root.join("e")).size, Some(5));
}

#[test]
fn test_fresh_sizes_are_left_alone() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("tree");
    write_file(&root.join("d").join("a"), b"0123456789");
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();

    assert_eq!(commands::folder_stats(&settings).unwrap(), 1);
    assert_eq!(commands::folder_stats(&settings).unwrap(), 0);
    assert_eq!(row(&settings, &root.join("d")).size, Some(10));
}

#[test]
fn test_sibling_with_common_prefix_is_not_counted() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("tree");
    write_file(&root.join("d").join("a"), &[0u8; 3]);
    write_file(&root.join("d2").join("a"), &[0u8; 7]);
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();

    commands::folder_stats(&settings).unwrap();

    assert_eq!(row(&settings, &root.join("d")).size, Some(3));
    assert_eq!(row(&settings, &root.join("d2")).size, Some(7));
}
