//! SST builder: streams sorted entries into a new table file.

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::block::DataBlockBuilder;
use crate::expiry;
use crate::format::{
    INDEX_SIZE_FIELD, MIN_ENTRY_SIZE, SST_HEADER_SIZE, SST_MAGIC, SST_VERSION,
};
use crate::reader::SstFile;
use crate::value::{Entry, StoredEntry};
use crate::{Error, Result};

/// Serializes the index block: `keylen (u16) | min_key | offset (u64)` per
/// data block, followed by the u32 byte size of the region.
pub(crate) struct IndexBlockBuilder {
    buf: Vec<u8>,
}

impl IndexBlockBuilder {
    pub(crate) fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub(crate) fn add_key(&mut self, key: &[u8], offset: u64) {
        self.buf.extend_from_slice(&(key.len() as u16).to_le_bytes());
        self.buf.extend_from_slice(key);
        self.buf.extend_from_slice(&offset.to_le_bytes());
    }

    pub(crate) fn size(&self) -> usize {
        self.buf.len() + INDEX_SIZE_FIELD
    }

    pub(crate) fn build(mut self) -> Vec<u8> {
        let size = self.buf.len() as u32;
        self.buf.extend_from_slice(&size.to_le_bytes());
        self.buf
    }
}

/// Writes a new SST file entry by entry (or whole data block by whole data
/// block on the merge fast path).
///
/// The header is written lazily when the first entry arrives, so an abandoned
/// builder that never saw data leaves only an empty file behind. Callers must
/// feed keys in strictly increasing order; the builder records an index entry
/// `(min_key, file_offset)` whenever a new data block starts.
pub struct SstBuilder {
    file: std::fs::File,
    path: PathBuf,
    seq: u64,
    /// Bytes written to the file so far; doubles as the next block offset.
    written: u64,
    block: DataBlockBuilder,
    index: IndexBlockBuilder,
    index_entries: Vec<(Vec<u8>, u64)>,
    last_key: Vec<u8>,
}

impl SstBuilder {
    pub fn new(path: impl AsRef<Path>, block_size: usize, seq: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            file,
            path,
            seq,
            written: 0,
            block: DataBlockBuilder::new(block_size),
            index: IndexBlockBuilder::new(),
            index_entries: Vec::new(),
            last_key: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True until the first entry or block has been accepted.
    pub fn is_empty(&self) -> bool {
        self.index_entries.is_empty() && self.block.is_empty()
    }

    /// Size the finished file would have if finalized now.
    pub fn current_size(&self) -> u64 {
        self.written + self.block.size() as u64 + self.index.size() as u64
    }

    fn write_header(&mut self) -> Result<()> {
        self.file.write_all(SST_MAGIC)?;
        self.file.write_u8(SST_VERSION)?;
        self.file.write_u64::<LittleEndian>(self.seq)?;
        self.written = SST_HEADER_SIZE as u64;
        Ok(())
    }

    fn record_block_start(&mut self, min_key: &[u8]) {
        self.index.add_key(min_key, self.written);
        self.index_entries.push((min_key.to_vec(), self.written));
    }

    fn flush_block(&mut self) -> Result<()> {
        let data = self.block.build();
        self.file.write_all(&data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Appends one entry, starting a new data block when the current one is
    /// full.
    pub fn add(&mut self, key: &[u8], entry: &Entry, expiration_ms: u64) -> Result<()> {
        self.last_key = key.to_vec();
        if self.index_entries.is_empty() {
            self.write_header()?;
            self.record_block_start(key);
        }
        if !self.block.add(key, entry, expiration_ms) {
            self.flush_block()?;
            self.record_block_start(key);
            if !self.block.add(key, entry, expiration_ms) {
                return Err(Error::EntryTooLarge(
                    MIN_ENTRY_SIZE + key.len() + entry.encoded_len(),
                ));
            }
        }
        Ok(())
    }

    /// Appends an already-serialized data block verbatim (the merge fast
    /// path). The per-entry builder must be idle. `max_key` is passed for the
    /// final block of a copied file so the resulting table knows its last key.
    pub fn add_block(
        &mut self,
        min_key: &[u8],
        data: &[u8],
        max_key: Option<&[u8]>,
    ) -> Result<()> {
        if self.index_entries.is_empty() {
            self.write_header()?;
        }
        self.record_block_start(min_key);
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        if let Some(max_key) = max_key {
            self.last_key = max_key.to_vec();
        }
        Ok(())
    }

    /// Flushes a non-empty trailing block, appends the index block and its
    /// size, syncs, and opens the finished file as an [`SstFile`].
    ///
    /// Must not be called on an empty builder; check [`is_empty`] first.
    ///
    /// [`is_empty`]: SstBuilder::is_empty
    pub fn finalize(mut self) -> Result<SstFile> {
        if !self.block.is_empty() {
            self.flush_block()?;
        }
        let index_offset = self.written;
        let index = std::mem::replace(&mut self.index, IndexBlockBuilder::new());
        self.file.write_all(&index.build())?;
        self.file.sync_all()?;
        SstFile::from_parts(
            self.path,
            index_offset,
            self.seq,
            self.last_key,
            self.index_entries,
        )
    }
}

/// Writes `entries` (sorted by key) into a new SST at `path`.
///
/// With `keep_removed` unset, tombstones and expired entries are filtered
/// out. Returns `None` (and removes the file) when nothing survives the
/// filter, so no degenerate empty table ever reaches a tier.
pub fn write_from_iter<I>(
    path: &Path,
    block_size: usize,
    seq: u64,
    keep_removed: bool,
    entries: I,
) -> Result<Option<SstFile>>
where
    I: IntoIterator<Item = Result<(Vec<u8>, StoredEntry)>>,
{
    let mut builder = SstBuilder::new(path, block_size, seq)?;
    for item in entries {
        let (key, stored) = item?;
        if keep_removed
            || (!stored.entry.is_removed() && !expiry::is_expired(stored.expiration_ms))
        {
            builder.add(&key, &stored.entry, stored.expiration_ms)?;
        }
    }
    if builder.is_empty() {
        let path = builder.path().to_path_buf();
        drop(builder);
        let _ = std::fs::remove_file(&path);
        return Ok(None);
    }
    Ok(Some(builder.finalize()?))
}
