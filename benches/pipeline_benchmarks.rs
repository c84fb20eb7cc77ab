use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use dupindex::commands;
use dupindex::config::Settings;
use dupindex::duplicates::{map_duplicates, MapperConfig};
use dupindex::pipeline::Strategy;
use dupindex::progress::{ProgressReporter, SilentProgress};
use dupindex::scanner::{Entry, Hasher, Walker, WalkerConfig};
use dupindex::storage::Database;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// Helper to create a test directory with a specific structure
fn setup_test_dir(depth: usize, files_per_dir: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    create_dir_recursive(temp_dir.path().join("tree"), depth, files_per_dir);
    temp_dir
}

fn create_dir_recursive(path: PathBuf, depth: usize, files_per_dir: usize) {
    if depth == 0 {
        return;
    }
    fs::create_dir_all(&path).expect("Failed to create dir");

    for i in 0..files_per_dir {
        let file_path = path.join(format!("file_{}.txt", i));
        // Every tenth file has the same content.
        let content = if i % 10 == 0 {
            "shared content".to_string()
        } else {
            format!("{} {}", path.display(), i)
        };
        fs::write(file_path, content).expect("Failed to write file");
    }

    if depth > 1 {
        for i in 0..2 {
            create_dir_recursive(path.join(format!("dir_{}", i)), depth - 1, files_per_dir);
        }
    }
}

fn settings(dir: &Path, strategy: Strategy) -> Settings {
    Settings {
        database: dir.join("files.db"),
        strategy,
        ..Default::default()
    }
}

fn silent() -> Arc<dyn ProgressReporter> {
    Arc::new(SilentProgress)
}

// 1. Directory walking
fn bench_walker(c: &mut Criterion) {
    let temp_dir = setup_test_dir(4, 10);
    let root = temp_dir.path().join("tree");

    c.bench_function("walker_150_files", |b| {
        b.iter(|| {
            let walker = Walker::new(&root, WalkerConfig::default());
            let entries: Vec<_> = walker.walk().collect();
            black_box(entries);
        })
    });
}

// 2. Hashing
fn bench_hasher(c: &mut Criterion) {
    let mut group = c.benchmark_group("hasher");
    let hasher = Hasher::new();

    for size_kb in [1, 1024, 10240] {
        let data = vec![b'a'; size_kb * 1024];
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("bench_file.dat");
        fs::write(&file_path, &data).expect("Failed to write bench file");

        group.bench_with_input(format!("blake3_{}KB", size_kb), &file_path, |b, path| {
            b.iter(|| black_box(hasher.hash_file(path).unwrap()));
        });
    }
    group.finish();
}

// 3. Index then hash, per strategy, into a fresh database each time
fn bench_index_and_hash(c: &mut Criterion) {
    let temp_dir = setup_test_dir(3, 10);
    let root = temp_dir.path().join("tree");
    let mut group = c.benchmark_group("index_and_hash");

    for strategy in [Strategy::Sequential, Strategy::Threaded, Strategy::Isolated] {
        group.bench_function(strategy.to_string(), |b| {
            b.iter_batched(
                || TempDir::new().unwrap(),
                |db_dir| {
                    let settings = settings(db_dir.path(), strategy);
                    commands::index(&root, &settings, silent()).unwrap();
                    black_box(commands::hash(&settings, None, silent()).unwrap());
                },
                BatchSize::PerIteration,
            );
        });
    }
    group.finish();
}

// 4. Duplicate mapping over 10k hashed rows
fn bench_mapper(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(temp_dir.path().join("files.db"));
    db.create_tables().unwrap();
    let mut store = db.connect().unwrap();

    let entries: Vec<Entry> = (0..10_000)
        .map(|i| Entry {
            path: format!("/bench/{i}").into(),
            size: Some(100),
            content_hash: Some(format!("{:08}", i % 4_000)),
            is_directory: Some(false),
            ..Default::default()
        })
        .collect();
    store.insert_files(&entries).unwrap();

    c.bench_function("map_10k_rows", |b| {
        b.iter(|| {
            store.clear_links().unwrap();
            black_box(map_duplicates(&mut store, &MapperConfig::default()).unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_walker,
    bench_hasher,
    bench_index_and_hash,
    bench_mapper
);
criterion_main!(benches);
