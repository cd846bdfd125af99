//! # SSTable — typed sorted string table files
//!
//! On-disk storage files for the storage engine. When the in-memory memtable
//! fills up it is serialized into an SST; background compaction merges SSTs
//! from one tier into the next. Files are append-only while being built and
//! read-mostly afterwards; the single permitted in-place mutation is
//! flipping an entry's type byte to `REMOVED` (a one-byte overwrite).
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER                                                        │
//! │ "VSSF" (4B) | version (u8 = 1) | seq_num (u64 LE)             │
//! ├───────────────────────────────────────────────────────────────┤
//! │ DATA BLOCKS (each bounded by the configured block size)       │
//! │                                                               │
//! │ entry0 | … | entryK-1 | off0 (u32 LE) … offK-1 | K (u32 LE)   │
//! │                                                               │
//! │ entry: keylen (u16 LE) | key | expiration (u64 LE) |          │
//! │        type (u8) | [vallen (u32 LE) | value-bytes]            │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX BLOCK                                                   │
//! │ per data block: keylen (u16 LE) | min_key | offset (u64 LE)   │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER                                                        │
//! │ index_size (u32 LE)                                           │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The value length field is present only for
//! blob-like types (`STRING`, `U8STRING`, `BLOB`); a `REMOVED` entry carries
//! no value bytes at all. Keys within a block are strictly increasing, blocks
//! are ordered by their min key, and the last block's last key is the file's
//! max key.
//!
//! The expiration field doubles as the deletion marker: `0` means no TTL,
//! `1` marks a tombstone, anything else is an absolute deadline on the
//! process-monotonic millisecond clock (see [`now_ms`]).

mod block;
mod expiry;
mod format;
mod merge;
mod reader;
mod value;
mod writer;

pub use block::{DataBlock, DataBlockBuilder};
pub use expiry::{is_deadline_expired, is_expired, now_ms};
pub use format::{
    BLOCK_COUNT_SIZE, EXPIRATION_NOT_SET, EXPIRATION_TOMBSTONE, MAX_BLOCK_SIZE, MAX_KEY_LEN,
    MAX_MEMTABLE_SIZE, MAX_SST_FILE_SIZE, MIN_BLOCK_SIZE, MIN_L0_FILES, MIN_MEMTABLE_SIZE,
    SST_HEADER_SIZE, SST_MAGIC, SST_VERSION,
};
pub use merge::merge;
pub use reader::{SstFile, SstIterator};
pub use value::{on_disk_entry_size, Entry, EntryStatus, StoredEntry, Value, ValueType};
pub use writer::{write_from_iter, SstBuilder};

use std::io;
use thiserror::Error as ThisError;

/// Errors raised by SST readers, writers and the merger.
#[derive(Debug, ThisError)]
pub enum Error {
    /// An underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The file or block violates the on-disk format: bad signature,
    /// out-of-bounds offset or length, unknown type tag. Callers treat the
    /// affected file as unreadable.
    #[error("corrupt sstable: {0}")]
    Corruption(String),

    /// A single entry is larger than the configured data block size.
    #[error("entry of {0} bytes does not fit in a data block")]
    EntryTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn corrupt(msg: impl Into<String>) -> Error {
    Error::Corruption(msg.into())
}

#[cfg(test)]
mod tests;
