//! Read path: point lookups and prefix queries.
//!
//! Probes run under the reader lock and walk the tiers in order: memtable,
//! level 0 (newest file first), then the general levels. The first tier that
//! knows the key decides; a tombstone or expired entry in a fresher tier
//! shadows anything below it.

use std::collections::HashSet;

use sstable::EntryStatus;

use crate::error::Result;
use crate::{SimpleStorage, Value};

impl SimpleStorage {
    /// Looks up `key`, returning its typed value or `None` when the key is
    /// unknown, deleted, or expired.
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        let tiers = self.shared.read_tiers();
        if let Some(entry) = tiers.mem.get(key) {
            return Ok(entry.into_value());
        }
        for tier in &tiers.files {
            if let Some(entry) = tier.get(key)? {
                return Ok(entry.into_value());
            }
        }
        Ok(None)
    }

    /// Whether `key` currently holds a live value.
    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        let tiers = self.shared.read_tiers();
        match tiers.mem.status(key) {
            EntryStatus::Exists => return Ok(true),
            EntryStatus::Removed => return Ok(false),
            EntryStatus::NotFound => {}
        }
        for tier in &tiers.files {
            match tier.status(key)? {
                EntryStatus::Exists => return Ok(true),
                EntryStatus::Removed => return Ok(false),
                EntryStatus::NotFound => {}
            }
        }
        Ok(false)
    }

    /// Up to `max_results` live keys starting with `prefix`, deduplicated
    /// across tiers. Order within the result is unspecified.
    pub fn keys_with_prefix(&self, prefix: &[u8], max_results: usize) -> Result<Vec<Vec<u8>>> {
        let tiers = self.shared.read_tiers();
        let mut result: Vec<Vec<u8>> = Vec::new();
        let mut seen: HashSet<Vec<u8>> = HashSet::new();

        for key in tiers.mem.keys_with_prefix(prefix, max_results) {
            if seen.insert(key.clone()) {
                result.push(key);
            }
        }
        for tier in &tiers.files {
            if result.len() >= max_results {
                break;
            }
            for key in tier.keys_with_prefix(prefix, max_results - result.len())? {
                if seen.insert(key.clone()) {
                    result.push(key);
                    if result.len() >= max_results {
                        break;
                    }
                }
            }
        }
        Ok(result)
    }

    /// Calls `f` for every live key starting with `prefix` (each key once,
    /// even when present in several tiers) until `f` returns `false`.
    pub fn for_each_key_with_prefix(
        &self,
        prefix: &[u8],
        mut f: impl FnMut(&[u8]) -> bool,
    ) -> Result<()> {
        let tiers = self.shared.read_tiers();
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut dedup = |key: &[u8]| -> bool {
            if seen.insert(key.to_vec()) {
                f(key)
            } else {
                true
            }
        };

        if !tiers.mem.for_each_key_with_prefix(prefix, &mut dedup) {
            return Ok(());
        }
        for tier in &tiers.files {
            if !tier.for_each_key_with_prefix(prefix, &mut dedup)? {
                return Ok(());
            }
        }
        Ok(())
    }
}
