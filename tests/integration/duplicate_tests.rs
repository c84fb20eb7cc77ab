use dupindex::commands;
use dupindex::duplicates::{collect_duplicates, map_duplicates, MapperConfig};
use dupindex::scanner::Entry;
use dupindex::storage::{Database, Store};
use tempfile::{tempdir, TempDir};

use super::support::{hashed_entry, sample_tree, settings, silent};

fn fresh_store(dir: &TempDir) -> Store {
    let db = Database::new(dir.path().join("files.db"));
    db.create_tables().unwrap();
    db.connect().unwrap()
}

fn links(store: &Store) -> Vec<(i64, i64)> {
    let mut stmt = store
        .connection()
        .prepare("SELECT file_1_id, file_2_id FROM file_links ORDER BY file_1_id, file_2_id")
        .unwrap();
    let links = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    links
}

#[test]
fn test_duplicate_round_trip() {
    let dir = tempdir().unwrap();
    let mut store = fresh_store(&dir);
    // ids 1, 2, 3
    store
        .insert_files(&[
            hashed_entry("/A", 10, "h1"),
            hashed_entry("/B", 10, "h1"),
            hashed_entry("/C", 5, "h2"),
        ])
        .unwrap();

    let summary = map_duplicates(&mut store, &MapperConfig::default()).unwrap();
    assert_eq!(summary.groups, 1);
    assert_eq!(links(&store), vec![(1, 1), (1, 2)]);

    let groups = collect_duplicates(&store, 1000).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].representative, "/A");
    assert_eq!(groups[0].duplicates, vec!["/B"]);
    assert_eq!(groups[0].len(), 2);
    assert_eq!(groups[0].duplicated_bytes(), 20);
}

#[test]
fn test_group_straddling_the_default_page_boundary() {
    let dir = tempdir().unwrap();
    let mut store = fresh_store(&dir);

    // Rows sort by hash: 998 unique "a…" hashes, then five "m" rows at
    // positions 998..1003, then unique "z…" hashes.
    let mut entries: Vec<Entry> = (0..998)
        .map(|i| hashed_entry(&format!("/a/{i}"), 1, &format!("a{i:05}")))
        .collect();
    entries.extend((0..5).map(|i| hashed_entry(&format!("/m/{i}"), 7, "m")));
    entries.extend((0..500).map(|i| hashed_entry(&format!("/z/{i}"), 1, &format!("z{i:05}"))));
    store.insert_files(&entries).unwrap();

    let summary = map_duplicates(&mut store, &MapperConfig::default()).unwrap();
    assert_eq!(summary.rows_scanned, 1503);
    assert_eq!(summary.groups, 1);
    assert_eq!(summary.links, 5);

    let groups = collect_duplicates(&store, 1000).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 5);
    assert_eq!(groups[0].size, 7);
}

#[test]
fn test_page_boundary_matrix() {
    for prefix in [0usize, 1, 2, 5, 9] {
        for page_size in [1usize, 2, 3, 7, 1000] {
            for flush_threshold in [0usize, 1, 2, 500] {
                let dir = tempdir().unwrap();
                let mut store = fresh_store(&dir);

                let mut entries: Vec<Entry> = (0..prefix)
                    .map(|i| hashed_entry(&format!("/p/{i}"), 1, &format!("a{i:03}")))
                    .collect();
                entries.extend((0..3).map(|i| hashed_entry(&format!("/g/{i}"), 4, "m")));
                entries.extend((0..2).map(|i| hashed_entry(&format!("/h/{i}"), 2, "n")));
                entries.extend((0..4).map(|i| hashed_entry(&format!("/s/{i}"), 1, &format!("z{i:03}"))));
                store.insert_files(&entries).unwrap();

                let config = MapperConfig::default()
                    .with_page_size(page_size)
                    .with_flush_threshold(flush_threshold);
                let summary = map_duplicates(&mut store, &config).unwrap();

                let case = format!("prefix {prefix}, page {page_size}, flush {flush_threshold}");
                assert_eq!(summary.groups, 2, "{case}");
                assert_eq!(summary.links, 5, "{case}");

                let groups = collect_duplicates(&store, page_size).unwrap();
                let shape: Vec<(u64, usize)> = groups.iter().map(|g| (g.size, g.len())).collect();
                assert_eq!(shape, vec![(4, 3), (2, 2)], "{case}");
            }
        }
    }
}

#[test]
fn test_fresh_map_replaces_links() {
    let dir = tempdir().unwrap();
    let root = sample_tree(dir.path());
    let settings = settings(dir.path());
    commands::index(&root, &settings, silent()).unwrap();
    commands::hash(&settings, None, silent()).unwrap();

    // "alpha" twice, "bravo" twice, "delta" once
    let first = commands::map_duplicates(&settings, false).unwrap();
    assert_eq!(first.groups, 2);
    assert_eq!(first.links, 4);

    let appended = commands::map_duplicates(&settings, false).unwrap();
    assert_eq!(appended.links, 4);
    assert_eq!(settings.database().connect().unwrap().link_count().unwrap(), 8);

    commands::map_duplicates(&settings, true).unwrap();
    assert_eq!(settings.database().connect().unwrap().link_count().unwrap(), 4);

    let (groups, summary) = commands::collect_duplicates(&settings).unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(summary.duplicated_bytes, 20);
    assert_eq!(summary.reclaimable_bytes, 10);
    for group in &groups {
        assert_eq!(group.len(), 2);
        assert!(!group.representative.ends_with("d.txt"));
    }
}

#[test]
fn test_purged_ids_are_never_reused_by_stale_links() {
    let dir = tempdir().unwrap();
    let mut store = fresh_store(&dir);
    store
        .insert_files(&[hashed_entry("/A", 10, "h1"), hashed_entry("/B", 10, "h1")])
        .unwrap();
    map_duplicates(&mut store, &MapperConfig::default()).unwrap();
    assert_eq!(links(&store), vec![(1, 1), (1, 2)]);

    // /B held the highest id; its successor must not inherit it.
    assert_eq!(store.delete_by_paths(&["/B".to_string()]).unwrap(), 1);
    store
        .insert_files(&[hashed_entry("/unrelated", 10, "zzz")])
        .unwrap();

    let groups = collect_duplicates(&store, 1000).unwrap();
    assert!(
        groups
            .iter()
            .all(|g| g.paths().all(|p| p != "/unrelated")),
        "{groups:?}"
    );
    assert!(groups.is_empty(), "{groups:?}");
}
