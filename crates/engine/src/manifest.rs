//! Storage configuration and the `manifest.json` document that pins it to a
//! data directory.
//!
//! The manifest is written once when a directory is initialized. On every
//! later open the values stored there override whatever the caller passed:
//! block size and friends are properties of the on-disk data, not of the
//! process.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use sstable::{
    MAX_BLOCK_SIZE, MAX_MEMTABLE_SIZE, MIN_BLOCK_SIZE, MIN_L0_FILES, MIN_MEMTABLE_SIZE,
};

use crate::error::{Error, Result};

pub(crate) const MANIFEST_FILENAME: &str = "manifest.json";
const STORAGE_TYPE: &str = "SimpleStorage";

/// Tuning knobs of the storage engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Approximate on-disk footprint at which the memtable is flushed.
    pub memtable_size_bytes: usize,
    /// Number of level-0 files that triggers a merge into level 1.
    pub l0_max_files: usize,
    /// Data block size of every SST written by this storage.
    pub block_size: usize,
    /// Period of the background shrink timer; 0 disables it.
    pub shrink_timer_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memtable_size_bytes: 64 * 1024 * 1024,
            l0_max_files: 4,
            block_size: 128 * 1024,
            shrink_timer_minutes: 0,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ManifestDoc {
    #[serde(rename = "type")]
    storage_type: String,
    memtable_size_bytes: u64,
    l0_max_files: u64,
    block_size: u64,
    #[serde(default)]
    shrink_timer_minutes: u64,
}

/// Loads the manifest from `data_dir`, creating it from `config` on first
/// open. Returns the effective, validated configuration.
pub(crate) fn load_or_create(data_dir: &Path, mut config: Config) -> Result<Config> {
    let path = data_dir.join(MANIFEST_FILENAME);
    if path.exists() {
        let data = fs::read(&path)?;
        let doc: ManifestDoc = serde_json::from_slice(&data).map_err(|e| {
            Error::InvalidArgument(format!("unreadable manifest {}: {e}", path.display()))
        })?;
        if doc.storage_type != STORAGE_TYPE {
            return Err(Error::InvalidArgument(format!(
                "manifest type {:?} is not a {STORAGE_TYPE} manifest",
                doc.storage_type
            )));
        }
        config.memtable_size_bytes = doc.memtable_size_bytes as usize;
        config.l0_max_files = doc.l0_max_files as usize;
        config.block_size = doc.block_size as usize;
        config.shrink_timer_minutes = doc.shrink_timer_minutes;
        validate(&config)?;
    } else {
        validate(&config)?;
        let doc = ManifestDoc {
            storage_type: STORAGE_TYPE.to_owned(),
            memtable_size_bytes: config.memtable_size_bytes as u64,
            l0_max_files: config.l0_max_files as u64,
            block_size: config.block_size as u64,
            shrink_timer_minutes: config.shrink_timer_minutes,
        };
        let json = serde_json::to_vec_pretty(&doc)
            .map_err(|e| Error::InvalidArgument(format!("manifest encode: {e}")))?;
        fs::write(&path, json)?;
    }
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let memtable = config.memtable_size_bytes as u64;
    if !(MIN_MEMTABLE_SIZE..=MAX_MEMTABLE_SIZE).contains(&memtable) {
        return Err(Error::InvalidArgument(format!(
            "memtable_size_bytes {memtable} outside [{MIN_MEMTABLE_SIZE}, {MAX_MEMTABLE_SIZE}]"
        )));
    }
    if config.l0_max_files < MIN_L0_FILES {
        return Err(Error::InvalidArgument(format!(
            "l0_max_files {} below the minimum {MIN_L0_FILES}",
            config.l0_max_files
        )));
    }
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&config.block_size) {
        return Err(Error::InvalidArgument(format!(
            "block_size {} outside [{MIN_BLOCK_SIZE}, {MAX_BLOCK_SIZE}]",
            config.block_size
        )));
    }
    Ok(())
}
