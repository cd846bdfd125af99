use crate::*;

mod merge_tests;
mod reader_tests;
mod writer_tests;

/// `(key, live value, no TTL)` in a shape `write_from_iter` accepts.
pub(crate) fn live(key: &str, value: impl Into<Value>) -> (Vec<u8>, StoredEntry) {
    (
        key.as_bytes().to_vec(),
        StoredEntry {
            entry: Entry::Value(value.into()),
            expiration_ms: EXPIRATION_NOT_SET,
        },
    )
}

pub(crate) fn tombstone(key: &str) -> (Vec<u8>, StoredEntry) {
    (
        key.as_bytes().to_vec(),
        StoredEntry {
            entry: Entry::Removed,
            expiration_ms: EXPIRATION_TOMBSTONE,
        },
    )
}

pub(crate) fn write_sst(
    path: &std::path::Path,
    block_size: usize,
    seq: u64,
    entries: Vec<(Vec<u8>, StoredEntry)>,
) -> SstFile {
    write_from_iter(path, block_size, seq, true, entries.into_iter().map(Ok))
        .unwrap()
        .expect("sstable should not be empty")
}
