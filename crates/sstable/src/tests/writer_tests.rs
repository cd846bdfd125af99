use super::{live, tombstone, write_sst};
use crate::*;
use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};
use tempfile::tempdir;

#[test]
fn write_sorted_sequence_then_iterate_back() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("seq.vsst");

    let entries: Vec<_> = (0..500u32)
        .map(|i| live(&format!("key{:05}", i), i))
        .collect();
    // a small block size forces many data blocks
    let sst = write_sst(&path, 2048, 7, entries.clone());

    assert_eq!(sst.seq(), 7);
    assert_eq!(sst.min_key(), b"key00000");
    assert_eq!(sst.max_key(), b"key00499");

    let mut it = sst.iter();
    let mut got = Vec::new();
    while let Some((key, stored)) = it.next_entry()? {
        got.push((key, stored));
    }
    assert_eq!(got.len(), entries.len());
    for ((k, s), (ek, es)) in got.iter().zip(entries.iter()) {
        assert_eq!(k, ek);
        assert_eq!(s, es);
    }
    // strictly increasing keys
    for pair in got.windows(2) {
        assert!(pair[0].0 < pair[1].0);
    }
    Ok(())
}

#[test]
fn header_and_footer_layout() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("layout.vsst");
    write_sst(&path, 4096, 42, vec![live("a", 1u32), live("b", 2u32)]);

    let mut f = std::fs::File::open(&path)?;
    let filesize = f.metadata()?.len();

    let mut magic = [0u8; 4];
    f.read_exact(&mut magic)?;
    assert_eq!(&magic, b"VSSF");
    assert_eq!(f.read_u8()?, 1);
    assert_eq!(f.read_u64::<LittleEndian>()?, 42);

    f.seek(SeekFrom::End(-4))?;
    let index_size = f.read_u32::<LittleEndian>()? as u64;
    assert!(index_size > 0);
    assert!(index_size + 4 + SST_HEADER_SIZE as u64 <= filesize);
    Ok(())
}

#[test]
fn filtered_writer_keeps_or_drops_tombstones() -> Result<()> {
    let dir = tempdir()?;
    let entries = vec![live("a", 1u32), tombstone("b"), live("c", 3u32)];

    let kept = write_from_iter(
        &dir.path().join("kept.vsst"),
        4096,
        1,
        true,
        entries.clone().into_iter().map(Ok),
    )?
    .unwrap();
    assert_eq!(kept.get(b"b")?, Some(Entry::Removed));

    let filtered = write_from_iter(
        &dir.path().join("filtered.vsst"),
        4096,
        1,
        false,
        entries.into_iter().map(Ok),
    )?
    .unwrap();
    assert_eq!(filtered.get(b"b")?, None);
    assert_eq!(filtered.get(b"a")?, Some(Entry::Value(Value::Uint32(1))));
    Ok(())
}

#[test]
fn writer_with_nothing_to_write_leaves_no_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("empty.vsst");

    let out = write_from_iter(
        &path,
        4096,
        1,
        false,
        vec![tombstone("a"), tombstone("b")].into_iter().map(Ok),
    )?;
    assert!(out.is_none());
    assert!(!path.exists());
    Ok(())
}

#[test]
fn entry_larger_than_block_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let mut builder = SstBuilder::new(dir.path().join("big.vsst"), 2048, 1)?;
    let huge = Entry::Value(Value::Blob(vec![0u8; 4096]));
    let err = builder.add(b"big", &huge, 0).unwrap_err();
    assert!(matches!(err, Error::EntryTooLarge(_)));
    Ok(())
}

#[test]
fn block_boundaries_respect_block_size() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("blocks.vsst");
    let entries: Vec<_> = (0..100u32)
        .map(|i| live(&format!("k{:03}", i), vec![0xAB; 100]))
        .collect();
    let sst = write_sst(&path, 2048, 3, entries);

    // every key still resolves after the multi-block split
    for i in 0..100u32 {
        let key = format!("k{:03}", i);
        assert!(matches!(
            sst.get(key.as_bytes())?,
            Some(Entry::Value(Value::Blob(_)))
        ));
    }
    Ok(())
}
