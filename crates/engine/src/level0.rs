//! Level 0: SSTs produced directly by memtable flushes. Key ranges may
//! overlap, so every probe walks the files newest-first and the first file
//! that knows the key decides.

use std::path::PathBuf;

use sstable::{Entry, EntryStatus, SstFile};

use crate::error::Result;

const FILE_PREFIX: &str = "L0_";
const FILE_EXTENSION: &str = "vsst";

pub(crate) struct LevelZero {
    dir: PathBuf,
    max_files: usize,
    /// Sorted by sequence number, oldest first.
    files: Vec<SstFile>,
}

impl LevelZero {
    /// Opens the tier, scanning `dir` for `.vsst` files.
    pub(crate) fn open(dir: PathBuf, max_files: usize) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == FILE_EXTENSION).unwrap_or(false) {
                files.push(SstFile::open(&path)?);
            }
        }
        files.sort_by_key(SstFile::seq);
        Ok(Self {
            dir,
            max_files,
            files,
        })
    }

    /// Newest-first probe; the first file containing the key (tombstones
    /// included) decides.
    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        for sst in self.files.iter().rev() {
            if let Some(entry) = sst.get(key)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    pub(crate) fn status(&self, key: &[u8]) -> Result<EntryStatus> {
        for sst in self.files.iter().rev() {
            let status = sst.status(key)?;
            if status != EntryStatus::NotFound {
                return Ok(status);
            }
        }
        Ok(EntryStatus::NotFound)
    }

    /// Flips the tombstone in the newest file with `seq <= max_seq` that
    /// actually contains the key.
    pub(crate) fn remove(&self, key: &[u8], max_seq: u64) -> Result<bool> {
        for sst in self.files.iter().rev() {
            if sst.seq() > max_seq {
                continue;
            }
            if sst.remove(key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn keys_with_prefix(&self, prefix: &[u8], max_results: usize) -> Result<Vec<Vec<u8>>> {
        let mut result = Vec::new();
        for sst in self.files.iter().rev() {
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
        for sst in self.files.iter().rev() {
            if !sst.for_each_key_with_prefix(prefix, f)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Once the file count reaches the configured threshold, every file with
    /// `seq <= max_seq` is due for merging into the next tier.
    pub(crate) fn files_to_merge(&self, max_seq: u64) -> Vec<PathBuf> {
        if self.files.len() < self.max_files {
            return Vec::new();
        }
        self.files
            .iter()
            .filter(|sst| sst.seq() <= max_seq)
            .map(|sst| sst.path().to_path_buf())
            .collect()
    }

    /// Renames each SST to its tier name `L0_<seq>.vsst` and takes ownership.
    pub(crate) fn add_ssts(&mut self, ssts: Vec<SstFile>) -> Result<()> {
        for mut sst in ssts {
            let name = format!("{FILE_PREFIX}{}.{FILE_EXTENSION}", sst.seq());
            sst.rename(self.dir.join(name))?;
            self.files.push(sst);
        }
        self.files.sort_by_key(SstFile::seq);
        Ok(())
    }

    pub(crate) fn remove_ssts(&mut self, paths: &[PathBuf]) {
        self.files.retain(|sst| !paths.iter().any(|p| p == sst.path()));
    }

    pub(crate) fn max_seq(&self) -> u64 {
        self.files.last().map(SstFile::seq).unwrap_or(0)
    }

    pub(crate) fn count(&self) -> usize {
        self.files.len()
    }
}
