//! SST reader: point lookups, prefix scans, in-order iteration, and the
//! one-byte in-place tombstone flip.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::block::DataBlock;
use crate::format::{
    INDEX_KEY_LEN_SIZE, INDEX_OFFSET_SIZE, INDEX_SIZE_FIELD, SST_HEADER_SIZE, SST_MAGIC,
    SST_VERSION,
};
use crate::value::{Entry, EntryStatus, StoredEntry};
use crate::writer::write_from_iter;
use crate::{corrupt, Result};

/// Decoded data blocks kept per reader; an arbitrary entry is evicted when
/// the bound is reached.
const MAX_CACHED_BLOCKS: usize = 10;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An open SST file.
///
/// The full index block is held in memory; `get`/`status` need a single block
/// read (usually served from the cache) per call. The reader is shared
/// between threads behind `&self`: the persistent file handle and the block
/// cache are each guarded by their own mutex, which is the only
/// interior-mutable state.
pub struct SstFile {
    path: PathBuf,
    seq: u64,
    max_key: Vec<u8>,
    /// `(min_key, file_offset)` per data block, in key order.
    index: Vec<(Vec<u8>, u64)>,
    /// File offset where the index block starts; also the end of the body.
    index_offset: u64,
    file: Mutex<File>,
    cache: Mutex<HashMap<u64, Vec<u8>>>,
}

impl SstFile {
    /// Opens and validates an SST file: magic, version, index size, index
    /// entries. The last data block is read once to learn the file's max key.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut f = File::open(&path)?;
        let filesize = f.metadata()?.len();
        if filesize < (SST_HEADER_SIZE + INDEX_SIZE_FIELD) as u64 {
            return Err(corrupt(format!(
                "file too small for an sstable: {} bytes",
                filesize
            )));
        }

        let mut magic = [0u8; 4];
        f.read_exact(&mut magic)?;
        if &magic != SST_MAGIC {
            return Err(corrupt("invalid signature"));
        }
        let version = f.read_u8()?;
        if version != SST_VERSION {
            return Err(corrupt(format!("unsupported version {version}")));
        }
        let seq = f.read_u64::<LittleEndian>()?;

        f.seek(SeekFrom::End(-(INDEX_SIZE_FIELD as i64)))?;
        let index_size = f.read_u32::<LittleEndian>()? as u64;
        if filesize < index_size + (SST_HEADER_SIZE + INDEX_SIZE_FIELD) as u64 {
            return Err(corrupt("index size exceeds file size"));
        }
        let index_offset = filesize - index_size - INDEX_SIZE_FIELD as u64;

        f.seek(SeekFrom::Start(index_offset))?;
        let mut buf = vec![0u8; index_size as usize];
        f.read_exact(&mut buf)?;

        let mut index = Vec::new();
        let mut pos = 0usize;
        while pos + INDEX_KEY_LEN_SIZE <= buf.len() {
            let key_len = LittleEndian::read_u16(&buf[pos..pos + INDEX_KEY_LEN_SIZE]) as usize;
            if key_len == 0
                || pos + INDEX_KEY_LEN_SIZE + key_len + INDEX_OFFSET_SIZE > buf.len()
            {
                return Err(corrupt("invalid key length in index block"));
            }
            pos += INDEX_KEY_LEN_SIZE;
            let min_key = buf[pos..pos + key_len].to_vec();
            pos += key_len;
            let offset = LittleEndian::read_u64(&buf[pos..pos + INDEX_OFFSET_SIZE]);
            pos += INDEX_OFFSET_SIZE;
            index.push((min_key, offset));
        }
        if index.is_empty() {
            return Err(corrupt("empty index block"));
        }

        let this = Self {
            path,
            seq,
            max_key: Vec::new(),
            index,
            index_offset,
            file: Mutex::new(f),
            cache: Mutex::new(HashMap::new()),
        };
        let last = this.index.len() - 1;
        let block = DataBlock::new(this.read_block(last)?)?;
        let (max_key, _) = block.entry_at(block.count() - 1)?;
        Ok(Self { max_key, ..this })
    }

    /// Builds a reader over a file just produced by the builder, reusing the
    /// in-memory index so the open is cheap.
    pub(crate) fn from_parts(
        path: PathBuf,
        index_offset: u64,
        seq: u64,
        max_key: Vec<u8>,
        index: Vec<(Vec<u8>, u64)>,
    ) -> Result<Self> {
        if index.is_empty() {
            return Err(corrupt("sstable built without any data blocks"));
        }
        let file = File::open(&path)?;
        Ok(Self {
            path,
            seq,
            max_key,
            index,
            index_offset,
            file: Mutex::new(file),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn min_key(&self) -> &[u8] {
        &self.index[0].0
    }

    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    pub(crate) fn block_count(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn block_min_key(&self, i: usize) -> &[u8] {
        &self.index[i].0
    }

    /// Index of the data block that could contain `key`:
    /// `upper_bound(index, key) - 1` on the min keys.
    fn find_block(&self, key: &[u8]) -> Option<usize> {
        let idx = self
            .index
            .partition_point(|(min_key, _)| min_key.as_slice() <= key);
        idx.checked_sub(1)
    }

    fn block_size_at(&self, i: usize) -> Result<u64> {
        let start = self.index[i].1;
        let end = match self.index.get(i + 1) {
            Some((_, next)) => *next,
            None => self.index_offset,
        };
        end.checked_sub(start)
            .ok_or_else(|| corrupt("index block offsets are not increasing"))
    }

    /// Raw bytes of data block `i`, via the bounded block cache.
    pub(crate) fn read_block(&self, i: usize) -> Result<Vec<u8>> {
        let offset = self.index[i].1;
        let size = self.block_size_at(i)? as usize;
        let mut cache = lock(&self.cache);
        if let Some(bytes) = cache.get(&offset) {
            return Ok(bytes.clone());
        }
        if cache.len() >= MAX_CACHED_BLOCKS {
            if let Some(&victim) = cache.keys().next() {
                cache.remove(&victim);
            }
        }
        let mut data = vec![0u8; size];
        {
            let mut f = lock(&self.file);
            f.seek(SeekFrom::Start(offset))?;
            f.read_exact(&mut data)?;
        }
        cache.insert(offset, data.clone());
        Ok(data)
    }

    /// Point lookup. `Entry::Removed` marks a tombstoned or expired entry;
    /// `None` means the key is not in this file.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let Some(i) = self.find_block(key) else {
            return Ok(None);
        };
        DataBlock::new(self.read_block(i)?)?.get(key)
    }

    pub fn status(&self, key: &[u8]) -> Result<EntryStatus> {
        let Some(i) = self.find_block(key) else {
            return Ok(EntryStatus::NotFound);
        };
        DataBlock::new(self.read_block(i)?)?.status(key)
    }

    /// Flips the entry's type byte to `Removed` and rewrites the containing
    /// block at its original file offset (the block's serialized size is
    /// unchanged). Idempotent; returns `false` if the key is absent.
    ///
    /// Callers serialize removals; concurrent `remove` of the same file is
    /// not supported.
    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        let Some(i) = self.find_block(key) else {
            return Ok(false);
        };
        let offset = self.index[i].1;
        let mut block = DataBlock::new(self.read_block(i)?)?;
        if !block.remove(key)? {
            return Ok(false);
        }
        lock(&self.cache).insert(offset, block.data().to_vec());
        let mut f = OpenOptions::new().write(true).open(&self.path)?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(block.data())?;
        Ok(true)
    }

    /// Live keys starting with `prefix`, walking consecutive data blocks
    /// while the prefix is still attainable.
    pub fn keys_with_prefix(&self, prefix: &[u8], max_results: usize) -> Result<Vec<Vec<u8>>> {
        let mut result = Vec::new();
        if prefix > self.max_key.as_slice() {
            return Ok(result);
        }
        let min_key = self.min_key();
        if prefix < min_key && !min_key.starts_with(prefix) {
            return Ok(result);
        }
        let start = self.find_block(prefix).unwrap_or(0);
        for i in start..self.index.len() {
            let block_min = self.block_min_key(i);
            if prefix < block_min && !block_min.starts_with(prefix) {
                break;
            }
            let block = DataBlock::new(self.read_block(i)?)?;
            result.extend(block.keys_with_prefix(prefix, max_results - result.len())?);
            if result.len() >= max_results {
                break;
            }
        }
        Ok(result)
    }

    /// Calls `f` for each live key starting with `prefix`; returns `false`
    /// when the callback stopped the walk.
    pub fn for_each_key_with_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<bool> {
        if prefix > self.max_key.as_slice() {
            return Ok(true);
        }
        let min_key = self.min_key();
        if prefix < min_key && !min_key.starts_with(prefix) {
            return Ok(true);
        }
        let start = self.find_block(prefix).unwrap_or(0);
        for i in start..self.index.len() {
            let block_min = self.block_min_key(i);
            if prefix < block_min && !block_min.starts_with(prefix) {
                break;
            }
            let block = DataBlock::new(self.read_block(i)?)?;
            if !block.for_each_key_with_prefix(prefix, f)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// In-order iterator over `(key, stored entry)`, loading one data block
    /// at a time.
    pub fn iter(&self) -> SstIterator<'_> {
        SstIterator {
            file: self,
            block_idx: 0,
            block: None,
            slot: 0,
        }
    }

    /// `iter` adapted to a std iterator of results, for feeding the writer.
    pub fn entries(&self) -> impl Iterator<Item = Result<(Vec<u8>, StoredEntry)>> + '_ {
        let mut it = self.iter();
        std::iter::from_fn(move || it.next_entry().transpose())
    }

    /// Rewrites this file next to itself, physically dropping tombstones and
    /// expired entries. Returns `None` when nothing is left alive.
    pub fn shrink(&self, block_size: usize) -> Result<Option<SstFile>> {
        let mut out = self.path.as_os_str().to_os_string();
        out.push("_cleaned_.tmp");
        write_from_iter(Path::new(&out), block_size, self.seq, false, self.entries())
    }

    /// Moves the underlying file; the open handle stays valid.
    pub fn rename(&mut self, new_path: impl AsRef<Path>) -> Result<()> {
        let new_path = new_path.as_ref().to_path_buf();
        std::fs::rename(&self.path, &new_path)?;
        self.path = new_path;
        Ok(())
    }
}

impl std::fmt::Debug for SstFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SstFile")
            .field("path", &self.path)
            .field("seq", &self.seq)
            .field("blocks", &self.index.len())
            .finish()
    }
}

/// Yields `(key, stored entry)` in key order.
pub struct SstIterator<'a> {
    file: &'a SstFile,
    block_idx: usize,
    block: Option<DataBlock>,
    slot: u32,
}

impl SstIterator<'_> {
    /// The next entry, or `None` when the file is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, StoredEntry)>> {
        loop {
            match &self.block {
                Some(block) if self.slot < block.count() => {
                    let item = block.entry_at(self.slot)?;
                    self.slot += 1;
                    return Ok(Some(item));
                }
                Some(_) => {
                    self.block = None;
                    self.block_idx += 1;
                }
                None => {
                    if self.block_idx >= self.file.index.len() {
                        return Ok(None);
                    }
                    self.block = Some(DataBlock::new(self.file.read_block(self.block_idx)?)?);
                    self.slot = 0;
                }
            }
        }
    }
}
