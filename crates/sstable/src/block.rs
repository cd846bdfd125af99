//! Data blocks: a bounded run of sorted entries plus an offset table for
//! intra-block binary search.

use byteorder::{ByteOrder, LittleEndian};

use crate::expiry;
use crate::format::{
    BLOCK_COUNT_SIZE, EXPIRATION_SIZE, KEY_LEN_SIZE, MAX_KEY_LEN, MIN_ENTRY_SIZE,
    OFFSET_ENTRY_SIZE, VALUE_TYPE_SIZE,
};
use crate::value::{Entry, EntryStatus, StoredEntry, Value, ValueType};
use crate::{corrupt, Result};

/// Accumulates sorted entries into the serialized block layout
/// `entry* | offset-table | count`.
///
/// The builder does not enforce key order; callers feed it from an already
/// sorted source (memtable iteration or a merge).
pub struct DataBlockBuilder {
    max_block_size: usize,
    offsets: Vec<u32>,
    buf: Vec<u8>,
    count: u32,
}

impl DataBlockBuilder {
    pub fn new(max_block_size: usize) -> Self {
        Self {
            max_block_size,
            offsets: Vec::new(),
            buf: Vec::with_capacity(max_block_size),
            count: 0,
        }
    }

    /// Appends one entry. Returns `false` without touching the buffer when
    /// adding it would push `data + offset_table + count` past the block size.
    pub fn add(&mut self, key: &[u8], entry: &Entry, expiration_ms: u64) -> bool {
        let entry_size = MIN_ENTRY_SIZE + key.len() + entry.encoded_len();
        let new_size = self.buf.len()
            + entry_size
            + (self.offsets.len() + 1) * OFFSET_ENTRY_SIZE
            + BLOCK_COUNT_SIZE;
        if new_size > self.max_block_size {
            return false;
        }

        self.offsets.push(self.buf.len() as u32);
        self.buf.extend_from_slice(&(key.len() as u16).to_le_bytes());
        self.buf.extend_from_slice(key);
        self.buf.extend_from_slice(&expiration_ms.to_le_bytes());
        self.buf.push(entry.value_type().tag());
        if let Entry::Value(v) = entry {
            v.encode_into(&mut self.buf);
        }
        self.count += 1;
        true
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Serialized size the block would have if finalized now.
    pub fn size(&self) -> usize {
        self.buf.len() + self.offsets.len() * OFFSET_ENTRY_SIZE + BLOCK_COUNT_SIZE
    }

    /// Appends the offset table and count, returning the finalized block and
    /// resetting the builder for the next block.
    pub fn build(&mut self) -> Vec<u8> {
        let offsets = std::mem::take(&mut self.offsets);
        for off in offsets {
            self.buf.extend_from_slice(&off.to_le_bytes());
        }
        self.buf.extend_from_slice(&self.count.to_le_bytes());
        self.count = 0;
        std::mem::take(&mut self.buf)
    }
}

/// A parsed data block.
///
/// Every offset, key length and value length read out of the block is checked
/// against the block's bounds; a violation surfaces as a corruption error
/// rather than a read of garbage.
pub struct DataBlock {
    data: Vec<u8>,
    count: u32,
    /// End of the entry region; the offset table starts here.
    entries_end: usize,
}

impl DataBlock {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.len() < BLOCK_COUNT_SIZE {
            return Err(corrupt("block too small to contain a count"));
        }
        let count = LittleEndian::read_u32(&data[data.len() - BLOCK_COUNT_SIZE..]);
        if count == 0 {
            return Err(corrupt("block contains no entries"));
        }
        let table = count as u64 * OFFSET_ENTRY_SIZE as u64;
        if (data.len() as u64) < BLOCK_COUNT_SIZE as u64 + table {
            return Err(corrupt("block too small to contain its offset table"));
        }
        let entries_end = data.len() - BLOCK_COUNT_SIZE - table as usize;
        Ok(Self {
            data,
            count,
            entries_end,
        })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn entry_pos(&self, slot: u32) -> usize {
        let at = self.entries_end + slot as usize * OFFSET_ENTRY_SIZE;
        LittleEndian::read_u32(&self.data[at..at + OFFSET_ENTRY_SIZE]) as usize
    }

    fn parse_key(&self, pos: usize) -> Result<&[u8]> {
        if pos + KEY_LEN_SIZE > self.entries_end {
            return Err(corrupt("entry offset points outside block bounds"));
        }
        let key_len = LittleEndian::read_u16(&self.data[pos..pos + KEY_LEN_SIZE]) as usize;
        if key_len == 0 || key_len > MAX_KEY_LEN || pos + KEY_LEN_SIZE + key_len > self.entries_end
        {
            return Err(corrupt("invalid key length in block entry"));
        }
        Ok(&self.data[pos + KEY_LEN_SIZE..pos + KEY_LEN_SIZE + key_len])
    }

    fn expiration_at(&self, pos: usize, key_len: usize) -> Result<u64> {
        let cursor = pos + KEY_LEN_SIZE + key_len;
        if cursor + EXPIRATION_SIZE + VALUE_TYPE_SIZE > self.entries_end {
            return Err(corrupt("entry truncated inside block"));
        }
        Ok(LittleEndian::read_u64(
            &self.data[cursor..cursor + EXPIRATION_SIZE],
        ))
    }

    /// Type of the entry at `pos` as seen by a reader: an entry whose TTL
    /// deadline has passed (or whose expiration marks a tombstone) reads as
    /// `Removed` regardless of the stored tag.
    fn parse_value_type(&self, pos: usize, key_len: usize) -> Result<ValueType> {
        let expiration = self.expiration_at(pos, key_len)?;
        if expiry::is_expired(expiration) {
            return Ok(ValueType::Removed);
        }
        ValueType::from_tag(self.data[pos + KEY_LEN_SIZE + key_len + EXPIRATION_SIZE])
    }

    fn parse_value(&self, pos: usize, key_len: usize, ty: ValueType) -> Result<Value> {
        let cursor = pos + KEY_LEN_SIZE + key_len + EXPIRATION_SIZE + VALUE_TYPE_SIZE;
        if cursor > self.entries_end {
            return Err(corrupt("entry value starts outside block bounds"));
        }
        Value::decode(ty, &self.data[cursor..self.entries_end])
    }

    /// First slot whose key is ≥ `key`, or `count` if all keys are smaller.
    fn lower_bound_slot(&self, key: &[u8]) -> Result<u32> {
        let mut left = 0u32;
        let mut right = self.count;
        while left < right {
            let mid = left + (right - left) / 2;
            let entry_key = self.parse_key(self.entry_pos(mid))?;
            if key <= entry_key {
                right = mid;
            } else {
                left = mid + 1;
            }
        }
        Ok(left)
    }

    /// Point lookup. Returns `Entry::Removed` for tombstoned or TTL-expired
    /// entries and `None` when the key is not in this block.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let slot = self.lower_bound_slot(key)?;
        if slot >= self.count {
            return Ok(None);
        }
        let pos = self.entry_pos(slot);
        if self.parse_key(pos)? != key {
            return Ok(None);
        }
        let ty = self.parse_value_type(pos, key.len())?;
        if ty == ValueType::Removed {
            return Ok(Some(Entry::Removed));
        }
        Ok(Some(Entry::Value(self.parse_value(pos, key.len(), ty)?)))
    }

    pub fn status(&self, key: &[u8]) -> Result<EntryStatus> {
        let slot = self.lower_bound_slot(key)?;
        if slot >= self.count {
            return Ok(EntryStatus::NotFound);
        }
        let pos = self.entry_pos(slot);
        if self.parse_key(pos)? != key {
            return Ok(EntryStatus::NotFound);
        }
        if self.parse_value_type(pos, key.len())? == ValueType::Removed {
            return Ok(EntryStatus::Removed);
        }
        Ok(EntryStatus::Exists)
    }

    /// Entry at `slot` in stored form: the raw tag and raw expiration, with
    /// no TTL demotion. Iteration and merging decide themselves what to drop.
    pub fn entry_at(&self, slot: u32) -> Result<(Vec<u8>, StoredEntry)> {
        if slot >= self.count {
            return Err(corrupt("entry slot out of range"));
        }
        let pos = self.entry_pos(slot);
        let key = self.parse_key(pos)?.to_vec();
        let expiration_ms = self.expiration_at(pos, key.len())?;
        let tag = self.data[pos + KEY_LEN_SIZE + key.len() + EXPIRATION_SIZE];
        let entry = if tag == ValueType::Removed.tag() {
            Entry::Removed
        } else {
            let ty = ValueType::from_tag(tag)?;
            Entry::Value(self.parse_value(pos, key.len(), ty)?)
        };
        Ok((key, StoredEntry {
            entry,
            expiration_ms,
        }))
    }

    /// Live keys starting with `prefix`, in key order, at most `max_results`.
    pub fn keys_with_prefix(&self, prefix: &[u8], max_results: usize) -> Result<Vec<Vec<u8>>> {
        let mut result = Vec::new();
        let mut slot = self.lower_bound_slot(prefix)?;
        while slot < self.count && result.len() < max_results {
            let pos = self.entry_pos(slot);
            let entry_key = self.parse_key(pos)?;
            if !entry_key.starts_with(prefix) {
                break;
            }
            if self.parse_value_type(pos, entry_key.len())? != ValueType::Removed {
                result.push(entry_key.to_vec());
            }
            slot += 1;
        }
        Ok(result)
    }

    /// Calls `f` for each live key starting with `prefix`. Returns `false`
    /// when the callback stopped the walk.
    pub fn for_each_key_with_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<bool> {
        let mut slot = self.lower_bound_slot(prefix)?;
        while slot < self.count {
            let pos = self.entry_pos(slot);
            let entry_key = self.parse_key(pos)?;
            if !entry_key.starts_with(prefix) {
                return Ok(true);
            }
            if self.parse_value_type(pos, entry_key.len())? != ValueType::Removed
                && !f(entry_key)
            {
                return Ok(false);
            }
            slot += 1;
        }
        Ok(true)
    }

    /// Flips the entry's type byte to `Removed` in place. Idempotent; returns
    /// `false` when the key is not in this block.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        let slot = self.lower_bound_slot(key)?;
        if slot >= self.count {
            return Ok(false);
        }
        let pos = self.entry_pos(slot);
        if self.parse_key(pos)? != key {
            return Ok(false);
        }
        if self.parse_value_type(pos, key.len())? == ValueType::Removed {
            return Ok(true);
        }
        self.data[pos + KEY_LEN_SIZE + key.len() + EXPIRATION_SIZE] = ValueType::Removed.tag();
        Ok(true)
    }
}
