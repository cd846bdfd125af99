//! General tiers (level 1 and up): non-overlapping SSTs indexed by min key,
//! by sequence number, and by file path. A point probe touches exactly one
//! file, found by `upper_bound(min_key) - 1`.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sstable::{Entry, EntryStatus, SstFile};

use crate::error::Result;

const FILE_PREFIX: &str = "general_";
const FILE_EXTENSION: &str = "vsst";

/// What one merge step into this tier will do: which resident files overlap
/// the source (and therefore get rewritten), where the outputs go, and how
/// they are bounded.
pub(crate) struct MergePlan {
    pub(crate) overlap: Vec<PathBuf>,
    pub(crate) out_dir: PathBuf,
    pub(crate) max_file_size: u64,
    pub(crate) keep_removed: bool,
}

pub(crate) struct GeneralLevel {
    dir: PathBuf,
    max_file_size: u64,
    max_files: usize,
    terminal: bool,
    /// Suffix for generated file names, so renames never collide.
    next_file_index: u64,
    by_min_key: BTreeMap<Vec<u8>, Arc<SstFile>>,
    by_seq: BTreeMap<u64, Arc<SstFile>>,
    by_path: HashMap<PathBuf, Arc<SstFile>>,
    /// Sequence numbers in recency order, most recently probed last.
    recency: Mutex<Vec<u64>>,
}

impl GeneralLevel {
    pub(crate) fn open(
        dir: PathBuf,
        max_file_size: u64,
        max_files: usize,
        terminal: bool,
    ) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let mut level = Self {
            dir: dir.clone(),
            max_file_size,
            max_files,
            terminal,
            next_file_index: 0,
            by_min_key: BTreeMap::new(),
            by_seq: BTreeMap::new(),
            by_path: HashMap::new(),
            recency: Mutex::new(Vec::new()),
        };
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == FILE_EXTENSION).unwrap_or(false) {
                if let Some(idx) = parse_file_index(&path) {
                    level.next_file_index = level.next_file_index.max(idx);
                }
                found.push(SstFile::open(&path)?);
            }
        }
        level.add_ssts(found)?;
        Ok(level)
    }

    /// The single file whose range can contain `key`, spliced to the MRU end
    /// of the recency list when found.
    fn find_sst(&self, key: &[u8]) -> Option<&Arc<SstFile>> {
        let (_, sst) = self
            .by_min_key
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .next_back()?;
        if sst.max_key() < key {
            return None;
        }
        self.touch(sst.seq());
        Some(sst)
    }

    fn touch(&self, seq: u64) {
        let mut recency = self.recency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = recency.iter().position(|&s| s == seq) {
            recency.remove(pos);
            recency.push(seq);
        }
    }

    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        match self.find_sst(key) {
            Some(sst) => Ok(sst.get(key)?),
            None => Ok(None),
        }
    }

    pub(crate) fn status(&self, key: &[u8]) -> Result<EntryStatus> {
        match self.find_sst(key) {
            Some(sst) => Ok(sst.status(key)?),
            None => Ok(EntryStatus::NotFound),
        }
    }

    pub(crate) fn remove(&self, key: &[u8]) -> Result<bool> {
        match self.find_sst(key) {
            Some(sst) => Ok(sst.remove(key)?),
            None => Ok(false),
        }
    }

    /// Files that could hold keys with `prefix`: the candidate containing the
    /// prefix point, then consecutive files while their min key still starts
    /// with it.
    fn files_for_prefix<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = &'a Arc<SstFile>> + 'a {
        let start: Bound<&[u8]> = match self
            .by_min_key
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(prefix)))
            .next_back()
        {
            Some((min_key, _)) => Bound::Included(min_key.as_slice()),
            None => Bound::Unbounded,
        };
        self.by_min_key
            .range::<[u8], _>((start, Bound::Unbounded))
            .take_while(move |(min_key, _)| {
                min_key.as_slice() <= prefix || min_key.starts_with(prefix)
            })
            .map(|(_, sst)| sst)
    }

    pub(crate) fn keys_with_prefix(&self, prefix: &[u8], max_results: usize) -> Result<Vec<Vec<u8>>> {
        let mut result = Vec::new();
        for sst in self.files_for_prefix(prefix) {
            result.extend(sst.keys_with_prefix(prefix, max_results - result.len())?);
            if result.len() >= max_results {
                break;
            }
        }
        Ok(result)
    }

    pub(crate) fn for_each_key_with_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<bool> {
        for sst in self.files_for_prefix(prefix) {
            if !sst.for_each_key_with_prefix(prefix, f)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Once the tier holds its budgeted file count, the oldest third of files
    /// (by sequence) moves on to the next tier.
    pub(crate) fn files_to_merge(&self, _max_seq: u64) -> Vec<PathBuf> {
        if self.by_seq.len() < self.max_files {
            return Vec::new();
        }
        let take = (self.by_seq.len() / 3).max(1);
        self.by_seq
            .values()
            .take(take)
            .map(|sst| sst.path().to_path_buf())
            .collect()
    }

    /// Computes the merge step for pulling the SST at `src_path` into this
    /// tier: every resident file whose key range intersects the source's
    /// range becomes a merge destination and is replaced afterwards.
    pub(crate) fn plan_merge(&self, src_path: &Path) -> Result<MergePlan> {
        let src = SstFile::open(src_path)?;
        let mut overlap = Vec::new();
        if let Some((_, prev)) = self
            .by_min_key
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(src.min_key())))
            .next_back()
        {
            if prev.max_key() >= src.min_key() {
                overlap.push(prev.path().to_path_buf());
            }
        }
        for (_, sst) in self.by_min_key.range::<[u8], _>((
            Bound::Excluded(src.min_key()),
            Bound::Included(src.max_key()),
        )) {
            overlap.push(sst.path().to_path_buf());
        }
        Ok(MergePlan {
            overlap,
            out_dir: self.dir.clone(),
            max_file_size: self.max_file_size,
            keep_removed: !self.terminal,
        })
    }

    /// Every resident file, oldest first; the shrink pass rewrites them all.
    pub(crate) fn plan_shrink(&self) -> Vec<Arc<SstFile>> {
        self.by_seq.values().cloned().collect()
    }

    /// Renames each file to `general_<seq>_<index>.vsst` and threads it into
    /// all three indexes.
    pub(crate) fn add_ssts(&mut self, ssts: Vec<SstFile>) -> Result<()> {
        for mut sst in ssts {
            self.next_file_index += 1;
            let name = format!(
                "{FILE_PREFIX}{}_{}.{FILE_EXTENSION}",
                sst.seq(),
                self.next_file_index
            );
            sst.rename(self.dir.join(name))?;
            let sst = Arc::new(sst);
            self.by_min_key.insert(sst.min_key().to_vec(), Arc::clone(&sst));
            self.by_seq.insert(sst.seq(), Arc::clone(&sst));
            self.by_path.insert(sst.path().to_path_buf(), Arc::clone(&sst));
            self.recency
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(sst.seq());
        }
        Ok(())
    }

    /// Unindexes the given files. The underlying file deletion is the merge
    /// journal's job.
    pub(crate) fn remove_ssts(&mut self, paths: &[PathBuf]) {
        for path in paths {
            if let Some(sst) = self.by_path.remove(path) {
                self.by_min_key.remove(sst.min_key());
                self.by_seq.remove(&sst.seq());
                self.recency
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .retain(|&s| s != sst.seq());
            }
        }
    }

    pub(crate) fn max_seq(&self) -> u64 {
        self.by_seq.keys().next_back().copied().unwrap_or(0)
    }

    pub(crate) fn count(&self) -> usize {
        self.by_seq.len()
    }
}

/// Extracts the trailing file index from `general_<seq>_<index>.vsst`.
fn parse_file_index(path: &Path) -> Option<u64> {
    path.file_stem()?
        .to_str()?
        .rsplit('_')
        .next()?
        .parse()
        .ok()
}
