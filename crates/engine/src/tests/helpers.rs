use crate::{Config, SimpleStorage};
use std::path::Path;

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Default-sized storage: the 64 MiB memtable never flushes on its own, so
/// tests that only exercise the in-memory path stay fast.
pub fn open_storage(dir: &Path) -> SimpleStorage {
    init_tracing();
    SimpleStorage::open(dir, Config::default()).unwrap()
}

/// The smallest permitted memtable with a small level-0 threshold, for tests
/// that need real flushes and merges.
pub fn small_config() -> Config {
    Config {
        memtable_size_bytes: 4 * 1024 * 1024,
        l0_max_files: 3,
        block_size: 256 * 1024,
        shrink_timer_minutes: 0,
    }
}

pub fn open_small(dir: &Path) -> SimpleStorage {
    init_tracing();
    SimpleStorage::open(dir, small_config()).unwrap()
}

/// Counts `.vsst` files across the data directory's level subdirectories.
pub fn count_sst_files(data_dir: &Path) -> usize {
    let mut count = 0;
    for entry in std::fs::read_dir(data_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            for file in std::fs::read_dir(&path).unwrap() {
                let file = file.unwrap().path();
                if file.extension().map(|e| e == "vsst").unwrap_or(false) {
                    count += 1;
                }
            }
        }
    }
    count
}
