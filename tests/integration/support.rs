//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dupindex::config::Settings;
use dupindex::progress::{HashState, ProgressReporter};
use dupindex::scanner::{Entry, HashError};
use dupindex::storage::{FileRow, Store};

pub fn settings(dir: &Path) -> Settings {
    Settings {
        database: dir.join("files.db"),
        ..Default::default()
    }
}

pub fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path).unwrap().write_all(content).unwrap();
}

/// `tree/` with three files at the top and two in `sub/`.
pub fn sample_tree(dir: &Path) -> PathBuf {
    let root = dir.join("tree");
    write_file(&root.join("a.txt"), b"alpha");
    write_file(&root.join("b.txt"), b"bravo");
    write_file(&root.join("c.txt"), b"alpha");
    write_file(&root.join("sub").join("d.txt"), b"delta");
    write_file(&root.join("sub").join("e.txt"), b"bravo");
    root
}

pub fn store(settings: &Settings) -> Store {
    settings.database().connect().unwrap()
}

pub fn all_rows(settings: &Settings) -> Vec<FileRow> {
    let mut rows = store(settings).files_after(0, 1_000_000).unwrap();
    rows.sort_by(|a, b| a.path.cmp(&b.path));
    rows
}

pub fn row(settings: &Settings, path: &Path) -> FileRow {
    let key = path.to_string_lossy().to_string();
    store(settings)
        .files_by_paths(&[key.clone()])
        .unwrap()
        .into_iter()
        .next()
        .unwrap_or_else(|| panic!("no row for {key}"))
}

pub fn silent() -> Arc<dyn ProgressReporter> {
    Arc::new(dupindex::progress::SilentProgress)
}

/// Records hash events as `(path, state)`.
#[derive(Default)]
pub struct HashEvents(pub Mutex<Vec<(PathBuf, HashState)>>);

impl HashEvents {
    pub fn of(&self, state: HashState) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == state)
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }
}

impl ProgressReporter for HashEvents {
    fn on_hash(&self, entry: &Entry, state: HashState, _error: Option<&HashError>) {
        self.0.lock().unwrap().push((entry.path.clone(), state));
    }
}

/// A file row with a given hash, ready for `Store::insert_files`.
pub fn hashed_entry(path: &str, size: u64, hash: &str) -> Entry {
    Entry {
        path: path.into(),
        size: Some(size),
        content_hash: Some(hash.to_string()),
        modified_at: Some(chrono::Utc::now()),
        is_directory: Some(false),
        ..Default::default()
    }
}
