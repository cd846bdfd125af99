//! The storage tiers. Tier 0 is the memtable; tier 1 is level 0; tiers 2 and
//! up are general levels. File-backed tiers share one closed interface and
//! the engine pattern-matches where tier identity matters (only general
//! levels receive merges, only the terminal one shrinks).

use std::path::PathBuf;

use memtable::MemTable;
use sstable::{Entry, EntryStatus, SstFile};

use crate::error::Result;
use crate::general::GeneralLevel;
use crate::level0::LevelZero;

pub(crate) enum FileTier {
    Zero(LevelZero),
    General(GeneralLevel),
}

impl FileTier {
    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        match self {
            FileTier::Zero(l0) => l0.get(key),
            FileTier::General(level) => level.get(key),
        }
    }

    pub(crate) fn status(&self, key: &[u8]) -> Result<EntryStatus> {
        match self {
            FileTier::Zero(l0) => l0.status(key),
            FileTier::General(level) => level.status(key),
        }
    }

    /// In-place tombstone flip. The sequence bound only constrains level 0,
    /// where overlapping files make "which copy" ambiguous; a general tier
    /// holds at most one copy of a key.
    pub(crate) fn remove(&self, key: &[u8], max_seq: u64) -> Result<bool> {
        match self {
            FileTier::Zero(l0) => l0.remove(key, max_seq),
            FileTier::General(level) => level.remove(key),
        }
    }

    pub(crate) fn keys_with_prefix(&self, prefix: &[u8], max_results: usize) -> Result<Vec<Vec<u8>>> {
        match self {
            FileTier::Zero(l0) => l0.keys_with_prefix(prefix, max_results),
            FileTier::General(level) => level.keys_with_prefix(prefix, max_results),
        }
    }

    pub(crate) fn for_each_key_with_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<bool> {
        match self {
            FileTier::Zero(l0) => l0.for_each_key_with_prefix(prefix, f),
            FileTier::General(level) => level.for_each_key_with_prefix(prefix, f),
        }
    }

    pub(crate) fn files_to_merge(&self, max_seq: u64) -> Vec<PathBuf> {
        match self {
            FileTier::Zero(l0) => l0.files_to_merge(max_seq),
            FileTier::General(level) => level.files_to_merge(max_seq),
        }
    }

    pub(crate) fn add_ssts(&mut self, ssts: Vec<SstFile>) -> Result<()> {
        match self {
            FileTier::Zero(l0) => l0.add_ssts(ssts),
            FileTier::General(level) => level.add_ssts(ssts),
        }
    }

    pub(crate) fn remove_ssts(&mut self, paths: &[PathBuf]) {
        match self {
            FileTier::Zero(l0) => l0.remove_ssts(paths),
            FileTier::General(level) => level.remove_ssts(paths),
        }
    }

    pub(crate) fn max_seq(&self) -> u64 {
        match self {
            FileTier::Zero(l0) => l0.max_seq(),
            FileTier::General(level) => level.max_seq(),
        }
    }

    pub(crate) fn count(&self) -> usize {
        match self {
            FileTier::Zero(l0) => l0.count(),
            FileTier::General(level) => level.count(),
        }
    }

    pub(crate) fn as_general(&self) -> Option<&GeneralLevel> {
        match self {
            FileTier::General(level) => Some(level),
            FileTier::Zero(_) => None,
        }
    }
}

/// The ordered tier vector guarded by the engine's reader-writer lock.
pub(crate) struct Tiers {
    pub(crate) mem: MemTable,
    /// `files[0]` is tier 1 (level 0); `files[i]` is tier `i + 1`.
    pub(crate) files: Vec<FileTier>,
}

impl Tiers {
    /// Total number of tiers, the memtable included.
    pub(crate) fn tier_count(&self) -> usize {
        1 + self.files.len()
    }

    /// File tier by its index in the tier vector (1-based; 0 is the
    /// memtable).
    pub(crate) fn file(&self, tier_index: usize) -> Option<&FileTier> {
        self.files.get(tier_index.checked_sub(1)?)
    }

    pub(crate) fn file_mut(&mut self, tier_index: usize) -> Option<&mut FileTier> {
        self.files.get_mut(tier_index.checked_sub(1)?)
    }
}
