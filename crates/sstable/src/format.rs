//! Sizes and reserved values of the on-disk format. Everything here is wire
//! format: changing any constant breaks binary compatibility with existing
//! files.

/// Magic bytes identifying an SST file.
pub const SST_MAGIC: &[u8; 4] = b"VSSF";
/// Current (and only) format version.
pub const SST_VERSION: u8 = 1;
/// signature + version + sequence number
pub const SST_HEADER_SIZE: usize = SST_MAGIC.len() + 1 + 8;

// Data block fields.
pub const KEY_LEN_SIZE: usize = 2;
pub const EXPIRATION_SIZE: usize = 8;
pub const VALUE_TYPE_SIZE: usize = 1;
/// Present only for blob-like values.
pub const VALUE_LEN_SIZE: usize = 4;
pub const OFFSET_ENTRY_SIZE: usize = 4;
pub const BLOCK_COUNT_SIZE: usize = 4;
/// keylen + expiration + type: the fixed part of every entry.
pub const MIN_ENTRY_SIZE: usize = KEY_LEN_SIZE + EXPIRATION_SIZE + VALUE_TYPE_SIZE;
pub const MAX_KEY_LEN: usize = 1024;

// Index block fields.
pub const INDEX_KEY_LEN_SIZE: usize = KEY_LEN_SIZE;
pub const INDEX_OFFSET_SIZE: usize = 8;
/// Trailing u32 holding the index block size in bytes.
pub const INDEX_SIZE_FIELD: usize = 4;

// Reserved expiration encodings.
pub const EXPIRATION_NOT_SET: u64 = 0;
pub const EXPIRATION_TOMBSTONE: u64 = 1;

// Storage-wide bounds shared with the engine configuration.
pub const MAX_SST_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024 - 1;
pub const MIN_MEMTABLE_SIZE: u64 = 4 * 1024 * 1024;
pub const MAX_MEMTABLE_SIZE: u64 = MAX_SST_FILE_SIZE;
pub const MIN_L0_FILES: usize = 2;
pub const MIN_BLOCK_SIZE: usize = 2 * 1024;
pub const MAX_BLOCK_SIZE: usize = 2 * 1024 * 1024;
