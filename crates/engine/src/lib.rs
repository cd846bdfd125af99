//! # Engine — the SimpleStorage LSM key-value store
//!
//! The central orchestrator tying the `memtable` and `sstable` crates into an
//! embedded log-structured merge tree.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌────────────────────────────────────────────────┐
//! │                SIMPLE STORAGE                  │
//! │                                                │
//! │ write.rs → memtable insert                     │
//! │              |                                 │
//! │              |  (memtable full?)               │
//! │              v            yes                  │
//! │           flush → new L0 SST                   │
//! │              |                                 │
//! │              v                                 │
//! │      worker: merge L0 → L1 → L2 …              │
//! │              (journalled, crash-safe)          │
//! │                                                │
//! │ read.rs → memtable → L0 (newest first) → L1+   │
//! │            (first match wins)                  │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `lib.rs`       | `SimpleStorage` struct, `open`, accessors, `Drop`    |
//! | `manifest.rs`  | `Config` plus the `manifest.json` document           |
//! | `read.rs`      | `get`, `exists`, prefix queries                      |
//! | `write.rs`     | `put`, `remove`, `remove_async`, `flush`, `shrink`   |
//! | `compaction.rs`| worker thread: merge / async-remove / shrink tasks   |
//! | `recovery.rs`  | merge-journal replay and orphaned-tmp cleanup        |
//! | `tier.rs`      | the tier vector (memtable, level 0, general levels)  |
//! | `journal.rs`   | the crash-safe two-phase merge journal               |
//!
//! ## Tiers
//!
//! ```text
//! ┌────────────────────────────┐  ← freshest, checked first
//! │ MEMTABLE                   │
//! ├────────────────────────────┤  ← from flushes (files may overlap)
//! │ LEVEL 0                    │
//! ├────────────────────────────┤  ← from compaction (no overlap)
//! │ LEVEL 1 .. LEVEL N         │     file size ×5, file count ×2 per
//! └────────────────────────────┘     level; the last one is terminal
//! ```
//!
//! ## Concurrency
//!
//! Any number of threads may call the public API. A reader-writer lock guards
//! the tier vector: probes take shared access, mutations and merge swap
//! phases take exclusive access. One worker thread owns the task queue;
//! merge I/O runs without the writer lock, only the final index swap holds
//! it. Durability is at memtable-flush granularity; there is no per-write
//! log.

mod compaction;
mod error;
mod general;
mod journal;
mod level0;
mod lock;
mod manifest;
mod read;
mod recovery;
mod tier;
mod write;

pub use error::{Error, Result};
pub use manifest::Config;
pub use sstable::{Value, ValueType};

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;
use tracing::info;

use compaction::Task;
use lock::LockFile;
use memtable::MemTable;
use sstable::MAX_SST_FILE_SIZE;
use tier::{FileTier, Tiers};

pub(crate) const LOCK_FILE_NAME: &str = ".lock";
pub(crate) const MEMTABLE_TMP_NAME: &str = "memtable.vsst.tmp";
pub(crate) const LEVEL0_DIR: &str = "level0";
pub(crate) const LEVEL_DIR_PREFIX: &str = "level";

pub(crate) fn lock_mutex<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Background work queue; guarded by `Shared::queue`.
#[derive(Default)]
pub(crate) struct TaskQueue {
    pub(crate) tasks: VecDeque<Task>,
    /// The worker is currently executing a task.
    pub(crate) in_flight: bool,
    /// Shutdown has begun; no new tasks are accepted.
    pub(crate) stopped: bool,
}

/// State shared between the public API, the worker thread and the shrink
/// timer.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) data_dir: PathBuf,
    pub(crate) tiers: RwLock<Tiers>,
    pub(crate) queue: Mutex<TaskQueue>,
    /// Signals the worker that a task arrived (or shutdown).
    pub(crate) task_cv: Condvar,
    /// Signals `wait_all_async` callers that the queue drained.
    pub(crate) idle_cv: Condvar,
    /// Wakes the shrink timer early on shutdown.
    pub(crate) timer_cv: Condvar,
    /// Engine-owned SST sequence counter; re-opens resume from the maximum
    /// sequence observed across all tiers.
    pub(crate) seq: AtomicU64,
    _lock: LockFile,
}

impl Shared {
    pub(crate) fn read_tiers(&self) -> RwLockReadGuard<'_, Tiers> {
        self.tiers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn write_tiers(&self) -> RwLockWriteGuard<'_, Tiers> {
        self.tiers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn enqueue(&self, task: Task) -> Result<()> {
        let mut queue = lock_mutex(&self.queue);
        if queue.stopped {
            return Err(Error::AlreadyStopped);
        }
        queue.tasks.push_back(task);
        self.task_cv.notify_one();
        Ok(())
    }
}

/// An embedded, single-process LSM key-value store.
///
/// Obtained from [`SimpleStorage::open`]; closed on drop (the worker is
/// stopped and joined, in-flight compaction steps run to completion, queued
/// ones are discarded and re-derived after the next open).
pub struct SimpleStorage {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    shrink_timer: Option<JoinHandle<()>>,
}

impl SimpleStorage {
    /// Opens (or initializes) the storage in `data_dir`.
    ///
    /// # Steps
    ///
    /// 1. Create the directory and take the exclusive `.lock`.
    /// 2. Load or create `manifest.json`; an existing manifest overrides
    ///    `config`, and the effective values are validated.
    /// 3. Open the tiers, scanning each level directory for `.vsst` files.
    /// 4. Replay a committed merge journal left by a crash, then delete
    ///    orphaned `*.tmp` files.
    /// 5. Resume the sequence counter from the maximum across all tiers and
    ///    start the worker (and the shrink timer, when configured).
    pub fn open(data_dir: impl AsRef<Path>, config: Config) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        let lock = LockFile::acquire(data_dir.join(LOCK_FILE_NAME))?;
        let config = manifest::load_or_create(&data_dir, config)?;

        // Journal replay, first half: drop the files a committed merge step
        // already superseded, before the scan below can index them.
        let mut journal = recovery::load_journal(&data_dir)?;
        recovery::remove_doomed_files(&journal)?;

        let mut files = Vec::new();
        files.push(FileTier::Zero(level0::LevelZero::open(
            data_dir.join(LEVEL0_DIR),
            config.l0_max_files,
        )?));

        // Generated general tiers: file size ×5 and file count ×2 per level,
        // until the file size caps at the maximum SST size. The capped tier
        // is terminal: unbounded file count, tombstones dropped there.
        let mut file_size = (config.memtable_size_bytes as u64).saturating_mul(5);
        let mut num_files = config.l0_max_files.saturating_mul(2);
        let mut level = 1usize;
        loop {
            let terminal = file_size >= MAX_SST_FILE_SIZE;
            files.push(FileTier::General(general::GeneralLevel::open(
                data_dir.join(format!("{LEVEL_DIR_PREFIX}{level}")),
                file_size.min(MAX_SST_FILE_SIZE),
                if terminal { usize::MAX } else { num_files },
                terminal,
            )?));
            if terminal {
                break;
            }
            file_size = file_size.saturating_mul(5);
            num_files = num_files.saturating_mul(2);
            level += 1;
        }

        let mut tiers = Tiers {
            mem: MemTable::new(config.memtable_size_bytes),
            files,
        };
        if !journal.is_empty() {
            recovery::register_journal_files(&mut journal, &mut tiers)?;
        }
        recovery::remove_tmp_files(&data_dir)?;
        let seq = tiers.files.iter().map(FileTier::max_seq).max().unwrap_or(0);

        info!(
            data_dir = %data_dir.display(),
            tiers = tiers.tier_count(),
            seq,
            "storage opened"
        );

        let shrink_minutes = config.shrink_timer_minutes;
        let shared = Arc::new(Shared {
            config,
            data_dir,
            tiers: RwLock::new(tiers),
            queue: Mutex::new(TaskQueue::default()),
            task_cv: Condvar::new(),
            idle_cv: Condvar::new(),
            timer_cv: Condvar::new(),
            seq: AtomicU64::new(seq),
            _lock: lock,
        });

        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || compaction::worker_loop(&shared))
        };
        let shrink_timer = (shrink_minutes > 0).then(|| {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || compaction::shrink_timer_loop(&shared, shrink_minutes))
        });

        Ok(Self {
            shared,
            worker: Some(worker),
            shrink_timer,
        })
    }

    /// Blocks until every queued background task (merges, async removals,
    /// shrinks) has been executed.
    pub fn wait_all_async(&self) {
        let mut queue = lock_mutex(&self.shared.queue);
        while (!queue.tasks.is_empty() || queue.in_flight) && !queue.stopped {
            queue = self
                .shared
                .idle_cv
                .wait(queue)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Current value of the sequence counter.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.shared.seq.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of tiers, the memtable included.
    #[must_use]
    pub fn tier_count(&self) -> usize {
        self.shared.read_tiers().tier_count()
    }

    /// SST file count per file tier, level 0 first.
    #[must_use]
    pub fn tier_file_counts(&self) -> Vec<usize> {
        self.shared
            .read_tiers()
            .files
            .iter()
            .map(FileTier::count)
            .collect()
    }

}

impl std::fmt::Debug for SimpleStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tiers = self.shared.read_tiers();
        f.debug_struct("SimpleStorage")
            .field("data_dir", &self.shared.data_dir)
            .field("seq", &self.seq())
            .field("memtable_entries", &tiers.mem.len())
            .field(
                "file_counts",
                &tiers.files.iter().map(FileTier::count).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Shutdown: request stop, wake every sleeper, join the worker and timer.
/// In-flight steps finish (the merge journal covers a hard crash); queued
/// tasks are dropped and re-derived after the next open.
impl Drop for SimpleStorage {
    fn drop(&mut self) {
        {
            let mut queue = lock_mutex(&self.shared.queue);
            queue.stopped = true;
        }
        self.shared.task_cv.notify_all();
        self.shared.timer_cv.notify_all();
        self.shared.idle_cv.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Some(timer) = self.shrink_timer.take() {
            let _ = timer.join();
        }
    }
}

#[cfg(test)]
mod tests;
