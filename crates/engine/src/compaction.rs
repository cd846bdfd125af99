//! The background worker: compaction merges, async removals, and terminal
//! shrinks.
//!
//! One dedicated thread drains the task queue. Merge I/O (reading the inputs
//! and writing the `merged_*.tmp` outputs) runs without the tier lock; only
//! the index swap at the end of each step takes the writer lock, after the
//! merge journal has committed the step's effect. Recoverable task failures
//! are logged and the task is dropped; a corrupt or unreadable input aborts
//! just that step with the journal uncommitted, so the source files stay
//! live.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::journal::{MergeLog, MERGE_LOG_NAME};
use crate::{lock_mutex, Shared};

pub(crate) enum Task {
    /// Merge the due files of tier `level` into tier `level + 1`.
    Merge { level: usize, max_seq: u64 },
    /// Flip the tombstone for `key` in the file tiers, bounded by `max_seq`.
    RemoveSst { key: Vec<u8>, max_seq: u64 },
    /// Rewrite the terminal tier, dropping dead entries.
    Shrink,
}

pub(crate) fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut queue = lock_mutex(&shared.queue);
            loop {
                if queue.stopped {
                    shared.idle_cv.notify_all();
                    return;
                }
                if let Some(task) = queue.tasks.pop_front() {
                    queue.in_flight = true;
                    break task;
                }
                queue = shared
                    .task_cv
                    .wait(queue)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        };

        let result = match task {
            Task::Merge { level, max_seq } => handle_merge(shared, level, max_seq),
            Task::RemoveSst { key, max_seq } => handle_remove(shared, &key, max_seq),
            Task::Shrink => handle_shrink(shared),
        };
        if let Err(e) = result {
            warn!(error = %e, "background task failed");
        }

        let mut queue = lock_mutex(&shared.queue);
        queue.in_flight = false;
        if queue.tasks.is_empty() {
            shared.idle_cv.notify_all();
        }
    }
}

/// Periodically queues a shrink of the terminal tier; woken early on
/// shutdown.
pub(crate) fn shrink_timer_loop(shared: &Shared, minutes: u64) {
    let period = Duration::from_secs(minutes * 60);
    loop {
        let queue = lock_mutex(&shared.queue);
        let (queue, timeout) = shared
            .timer_cv
            .wait_timeout(queue, period)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if queue.stopped {
            return;
        }
        drop(queue);
        if timeout.timed_out() {
            let _ = shared.enqueue(Task::Shrink);
        }
    }
}

fn handle_merge(shared: &Shared, level: usize, max_seq: u64) -> Result<()> {
    let files = {
        let tiers = shared.read_tiers();
        // never merge the memtable, never merge out of the terminal tier
        if level == 0 || level + 1 >= tiers.tier_count() {
            return Ok(());
        }
        match tiers.file(level) {
            Some(tier) => tier.files_to_merge(max_seq),
            None => return Ok(()),
        }
    };
    if files.is_empty() {
        return Ok(());
    }
    info!(level, files = files.len(), "merging tier into the next");

    let mut journal = MergeLog::load(shared.data_dir.join(MERGE_LOG_NAME))?;
    let mut seq_after = 0;
    for src_path in &files {
        merge_one(shared, level, src_path, &mut journal)?;
        let tiers = shared.read_tiers();
        seq_after = tiers.file(level).map(|t| t.max_seq()).unwrap_or(0);
    }

    // ripple: the destination tier may itself be due now
    let tier_count = shared.read_tiers().tier_count();
    if level + 2 < tier_count {
        let _ = shared.enqueue(Task::Merge {
            level: level + 1,
            max_seq: seq_after,
        });
    }
    Ok(())
}

/// One journalled merge step: plan under the reader lock, merge without any
/// lock, commit the journal, swap the indexes under the writer lock, clean
/// up.
fn merge_one(
    shared: &Shared,
    level: usize,
    src_path: &PathBuf,
    journal: &mut MergeLog,
) -> Result<()> {
    let plan = {
        let tiers = shared.read_tiers();
        let next = tiers
            .file(level + 1)
            .and_then(|t| t.as_general())
            .ok_or_else(|| {
                Error::Corruption(format!("merge destination tier {} missing", level + 1))
            })?;
        next.plan_merge(src_path)?
    };

    let new_files = sstable::merge(
        src_path,
        &plan.overlap,
        &plan.out_dir,
        plan.max_file_size,
        shared.config.block_size,
        plan.keep_removed,
    )?;
    debug!(
        src = %src_path.display(),
        overlap = plan.overlap.len(),
        outputs = new_files.len(),
        "merge step written"
    );

    journal.add_to_remove(src_path.clone());
    for path in &plan.overlap {
        journal.add_to_remove(path.clone());
    }
    for sst in &new_files {
        journal.add_to_register(level + 1, sst.path().to_path_buf());
    }
    journal.commit()?;

    {
        let mut tiers = shared.write_tiers();
        if let Some(next) = tiers.file_mut(level + 1) {
            next.remove_ssts(&plan.overlap);
            next.add_ssts(new_files)?;
        }
        if let Some(src_tier) = tiers.file_mut(level) {
            src_tier.remove_ssts(std::slice::from_ref(src_path));
        }
    }
    journal.remove_files()?;
    Ok(())
}

fn handle_remove(shared: &Shared, key: &[u8], max_seq: u64) -> Result<()> {
    let tiers = shared.write_tiers();
    for level in 1..tiers.tier_count() {
        if let Some(tier) = tiers.file(level) {
            if tier.remove(key, max_seq)? {
                debug!(level, "async removal flipped a tombstone");
                return Ok(());
            }
        }
    }
    Ok(())
}

fn handle_shrink(shared: &Shared) -> Result<()> {
    let (files, terminal_index) = {
        let tiers = shared.read_tiers();
        let terminal_index = tiers.tier_count() - 1;
        let Some(terminal) = tiers.file(terminal_index).and_then(|t| t.as_general()) else {
            return Ok(());
        };
        (terminal.plan_shrink(), terminal_index)
    };
    if files.is_empty() {
        return Ok(());
    }
    info!(files = files.len(), "shrinking the terminal tier");

    let mut journal = MergeLog::load(shared.data_dir.join(MERGE_LOG_NAME))?;
    let mut new_files = Vec::new();
    let mut old_paths = Vec::new();
    for sst in &files {
        if let Some(out) = sst.shrink(shared.config.block_size)? {
            journal.add_to_register(terminal_index, out.path().to_path_buf());
            new_files.push(out);
        }
        journal.add_to_remove(sst.path().to_path_buf());
        old_paths.push(sst.path().to_path_buf());
    }
    journal.commit()?;

    {
        let mut tiers = shared.write_tiers();
        if let Some(terminal) = tiers.file_mut(terminal_index) {
            terminal.remove_ssts(&old_paths);
            terminal.add_ssts(new_files)?;
        }
    }
    journal.remove_files()?;
    Ok(())
}
