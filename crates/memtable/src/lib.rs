//! In-memory write buffer of the storage engine.
//!
//! A [`MemTable`] adapts the lock-free [`skiplist::SkipList`] to the stored
//! entry model: every record carries an expiration field, logical deletion is
//! a tombstone entry, and the table tracks the approximate on-disk footprint
//! it would have once flushed so the engine knows when it is full.

use skiplist::SkipList;
use sstable::{
    is_expired, on_disk_entry_size, Entry, EntryStatus, EXPIRATION_TOMBSTONE,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// An entry plus its expiration, as held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemEntry {
    pub entry: Entry,
    pub expiration_ms: u64,
}

/// Sorted in-memory table with TTL awareness and a byte budget.
///
/// Safe for concurrent use: writes go through the lock-free skip list, size
/// accounting is atomic. The engine still serializes writers for its own
/// reasons (flush scheduling), but nothing here requires it.
pub struct MemTable {
    max_size_bytes: usize,
    current_size_bytes: AtomicUsize,
    data: SkipList<Vec<u8>, MemEntry>,
}

// Fixed file overhead counted towards the flush budget up front: header plus
// one index entry. The exact per-block cost depends on the block size, which
// the memtable deliberately does not know about.
const BASE_FILE_OVERHEAD: usize = sstable::SST_HEADER_SIZE + 8 + 2;

impl MemTable {
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            max_size_bytes,
            current_size_bytes: AtomicUsize::new(BASE_FILE_OVERHEAD),
            data: SkipList::new(),
        }
    }

    /// Inserts or replaces `key`. The on-disk footprint is accumulated only
    /// on the first insertion of a key; replacements are not re-counted.
    pub fn put(&self, key: Vec<u8>, entry: Entry, expiration_ms: u64) {
        let size = on_disk_entry_size(key.len(), &entry);
        let inserted = self.data.insert(
            key,
            MemEntry {
                entry,
                expiration_ms,
            },
        );
        if inserted {
            self.current_size_bytes.fetch_add(size, Ordering::Relaxed);
        }
    }

    /// Point lookup. A TTL-expired entry reads as `Entry::Removed`, exactly
    /// like a tombstone; `None` means the memtable knows nothing about the
    /// key.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        let entry = self.data.get(key)?;
        if is_expired(entry.expiration_ms) {
            return Some(Entry::Removed);
        }
        Some(entry.entry.clone())
    }

    pub fn status(&self, key: &[u8]) -> EntryStatus {
        match self.data.get(key) {
            None => EntryStatus::NotFound,
            Some(entry) if is_expired(entry.expiration_ms) => EntryStatus::Removed,
            Some(entry) if entry.entry.is_removed() => EntryStatus::Removed,
            Some(_) => EntryStatus::Exists,
        }
    }

    /// Replaces the stored entry with a deletion tombstone iff the key is
    /// present. Returns `false` when the key is unknown here, in which case
    /// the caller has to chase it through the file tiers.
    pub fn remove(&self, key: &[u8]) -> bool {
        if self.data.get(key).is_none() {
            return false;
        }
        self.put(key.to_vec(), Entry::Removed, EXPIRATION_TOMBSTONE);
        true
    }

    /// Live keys starting with `prefix`, in key order, at most `max_results`.
    pub fn keys_with_prefix(&self, prefix: &[u8], max_results: usize) -> Vec<Vec<u8>> {
        let mut result = Vec::new();
        for (key, entry) in self.data.range_from(prefix) {
            if result.len() >= max_results || !key.starts_with(prefix) {
                break;
            }
            if !entry.entry.is_removed() && !is_expired(entry.expiration_ms) {
                result.push(key.clone());
            }
        }
        result
    }

    /// Calls `f` for each live key starting with `prefix`; returns `false`
    /// when the callback stopped the walk.
    pub fn for_each_key_with_prefix(&self, prefix: &[u8], f: &mut dyn FnMut(&[u8]) -> bool) -> bool {
        for (key, entry) in self.data.range_from(prefix) {
            if !key.starts_with(prefix) {
                return true;
            }
            if !entry.entry.is_removed() && !is_expired(entry.expiration_ms) && !f(key) {
                return false;
            }
        }
        true
    }

    /// Whether the accumulated approximate on-disk footprint has reached the
    /// configured budget.
    pub fn full(&self) -> bool {
        self.current_size_bytes.load(Ordering::Relaxed) >= self.max_size_bytes
    }

    pub fn approx_size(&self) -> usize {
        self.current_size_bytes.load(Ordering::Relaxed)
    }

    /// Number of keys, tombstones included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Ordered iteration over every entry, tombstones included; the flush
    /// path serializes all of it.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &MemEntry)> {
        self.data.iter()
    }
}
