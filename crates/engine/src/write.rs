//! Write path: `put`, `remove`, `remove_async`, `flush`, `shrink`.
//!
//! All mutations take the writer lock. A put lands in the memtable; once the
//! memtable's projected on-disk footprint reaches its budget it is serialized
//! into a new level-0 SST and a merge task is queued for the worker.

use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::debug;

use memtable::MemTable;
use sstable::{
    now_ms, on_disk_entry_size, write_from_iter, Entry, StoredEntry, BLOCK_COUNT_SIZE,
    EXPIRATION_NOT_SET, EXPIRATION_TOMBSTONE, MAX_KEY_LEN,
};

use crate::compaction::Task;
use crate::error::{Error, Result};
use crate::tier::Tiers;
use crate::{SimpleStorage, Value, MEMTABLE_TMP_NAME};

impl SimpleStorage {
    /// Stores `value` under `key`, optionally with a time-to-live.
    ///
    /// Rejects empty keys, keys longer than 1024 bytes, and entries whose
    /// on-disk footprint would exceed the configured block size.
    pub fn put(
        &self,
        key: &[u8],
        value: impl Into<Value>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let entry = Entry::Value(value.into());
        self.check_entry(key, &entry)?;
        let expiration_ms = match ttl {
            Some(ttl) => now_ms() + ttl.as_millis() as u64,
            None => EXPIRATION_NOT_SET,
        };
        self.put_entry(key, entry, expiration_ms)
    }

    /// Deletes `key` by writing a tombstone, whether or not the key exists.
    /// The tombstone shadows every older value and persists through
    /// compaction until the terminal tier drops it.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.put_entry(key, Entry::Removed, EXPIRATION_TOMBSTONE)
    }

    /// Cheap removal: tombstones the key in the memtable when it is there
    /// (returning `true`); otherwise queues a background task that flips the
    /// tombstone inside whichever SST holds the key, bounded by the current
    /// sequence number.
    pub fn remove_async(&self, key: &[u8]) -> Result<bool> {
        {
            let tiers = self.shared.write_tiers();
            if tiers.mem.remove(key) {
                return Ok(true);
            }
        }
        let max_seq = self.shared.seq.load(Ordering::SeqCst);
        self.shared.enqueue(Task::RemoveSst {
            key: key.to_vec(),
            max_seq,
        })?;
        Ok(false)
    }

    /// Serializes the memtable into a new level-0 SST now, if it holds
    /// anything.
    pub fn flush(&self) -> Result<()> {
        let mut tiers = self.shared.write_tiers();
        if !tiers.mem.is_empty() {
            self.flush_locked(&mut tiers)?;
        }
        Ok(())
    }

    /// Queues a rewrite of the terminal tier that physically drops tombstones
    /// and expired entries.
    pub fn shrink(&self) -> Result<()> {
        self.shared.enqueue(Task::Shrink)
    }

    fn check_entry(&self, key: &[u8], entry: &Entry) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("key must not be empty".to_owned()));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(Error::InvalidArgument(format!(
                "key of {} bytes exceeds the maximum of {MAX_KEY_LEN}",
                key.len()
            )));
        }
        let size = on_disk_entry_size(key.len(), entry) + BLOCK_COUNT_SIZE;
        if size > self.shared.config.block_size {
            return Err(Error::InvalidArgument(format!(
                "entry of {size} bytes exceeds the block size {}",
                self.shared.config.block_size
            )));
        }
        Ok(())
    }

    fn put_entry(&self, key: &[u8], entry: Entry, expiration_ms: u64) -> Result<()> {
        let mut tiers = self.shared.write_tiers();
        tiers.mem.put(key.to_vec(), entry, expiration_ms);
        if tiers.mem.full() {
            self.flush_locked(&mut tiers)?;
        }
        Ok(())
    }

    /// Flush with the writer lock held: serialize the memtable to
    /// `memtable.vsst.tmp`, hand the file to level 0 (which renames it into
    /// place), start a fresh memtable, and queue a merge of level 0.
    pub(crate) fn flush_locked(&self, tiers: &mut Tiers) -> Result<()> {
        let seq = self.shared.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.shared.data_dir.join(MEMTABLE_TMP_NAME);
        let entries = tiers.mem.len();
        let sst = write_from_iter(
            &path,
            self.shared.config.block_size,
            seq,
            true,
            tiers.mem.iter().map(|(key, mem_entry)| {
                Ok((
                    key.clone(),
                    StoredEntry {
                        entry: mem_entry.entry.clone(),
                        expiration_ms: mem_entry.expiration_ms,
                    },
                ))
            }),
        )?;

        if let Some(sst) = sst {
            tiers.files[0].add_ssts(vec![sst])?;
            let max_seq = tiers.files[0].max_seq();
            debug!(seq, entries, "memtable flushed to level 0");
            tiers.mem = MemTable::new(self.shared.config.memtable_size_bytes);
            // the enqueue only fails during shutdown; the merge is re-derived
            // from the file counts after the next open
            let _ = self.shared.enqueue(Task::Merge { level: 1, max_seq });
        } else {
            tiers.mem = MemTable::new(self.shared.config.memtable_size_bytes);
        }
        Ok(())
    }
}
