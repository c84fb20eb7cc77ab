use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dupindex::pipeline::{Channel, Pipeline, Stage, Strategy};
use dupindex::scanner::{Entry, HashStage, Walker, WalkerConfig, WalkStage};
use tempfile::tempdir;

use super::support::{sample_tree, HashEvents};

/// Collects every entry that reaches the end of the pipeline.
struct Sink(Arc<Mutex<Vec<Entry>>>);

impl Stage<Entry> for Sink {
    fn name(&self) -> &str {
        "sink"
    }

    fn run(&mut self, input: &Channel<Entry>, _output: &Channel<Entry>) {
        for entry in input.items() {
            self.0.lock().unwrap().push(entry);
        }
    }
}

#[test]
fn test_hash_group_delivers_each_file_once() {
    for strategy in [Strategy::Sequential, Strategy::Threaded, Strategy::Isolated] {
        let dir = tempdir().unwrap();
        let root = sample_tree(dir.path());
        let events = Arc::new(HashEvents::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let hashers: Vec<Box<dyn Stage<Entry>>> = (0..3)
            .map(|_| {
                Box::new(HashStage::new().with_workers(2).with_progress(events.clone()))
                    as Box<dyn Stage<Entry>>
            })
            .collect();

        Pipeline::new(strategy)
            .stage(WalkStage::new(Walker::new(&root, WalkerConfig::default())))
            .pipe(hashers)
            .stage(Sink(Arc::clone(&seen)))
            .run()
            .unwrap();

        let mut paths: Vec<PathBuf> = seen.lock().unwrap().iter().map(|e| e.path.clone()).collect();
        paths.sort();
        let before = paths.len();
        paths.dedup();
        assert_eq!(before, paths.len(), "{strategy}: duplicate deliveries");
        assert_eq!(paths.len(), 6, "{strategy}");

        let entries = seen.lock().unwrap();
        for entry in entries.iter() {
            if entry.is_directory() {
                assert_eq!(entry.content_hash, None, "{strategy}");
            } else {
                assert_eq!(entry.content_hash.as_deref().map(str::len), Some(64), "{strategy}");
            }
        }
        assert_eq!(events.of(dupindex::progress::HashState::Finished).len(), 5, "{strategy}");
    }
}
