use super::{live, write_sst};
use crate::*;
use anyhow::Result;
use std::io::Write;
use tempfile::tempdir;

fn sample_sst(path: &std::path::Path) -> SstFile {
    let entries: Vec<_> = (0..200u32)
        .map(|i| live(&format!("key{:04}", i), i))
        .collect();
    write_sst(path, 2048, 5, entries)
}

#[test]
fn reopen_and_get() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.vsst");
    drop(sample_sst(&path));

    let sst = SstFile::open(&path)?;
    assert_eq!(sst.seq(), 5);
    assert_eq!(sst.min_key(), b"key0000");
    assert_eq!(sst.max_key(), b"key0199");

    for i in (0..200u32).step_by(17) {
        let key = format!("key{:04}", i);
        assert_eq!(
            sst.get(key.as_bytes())?,
            Some(Entry::Value(Value::Uint32(i))),
            "key {key}"
        );
        assert_eq!(sst.status(key.as_bytes())?, EntryStatus::Exists);
    }
    assert_eq!(sst.get(b"unknown")?, None);
    assert_eq!(sst.status(b"unknown")?, EntryStatus::NotFound);
    // keys before the first block
    assert_eq!(sst.get(b"aaa")?, None);
    Ok(())
}

#[test]
fn remove_persists_across_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.vsst");
    let sst = sample_sst(&path);

    assert!(sst.remove(b"key0050")?);
    assert_eq!(sst.get(b"key0050")?, Some(Entry::Removed));
    assert_eq!(sst.status(b"key0050")?, EntryStatus::Removed);
    // idempotent, and absent keys report false
    assert!(sst.remove(b"key0050")?);
    assert!(!sst.remove(b"nope")?);
    drop(sst);

    let reopened = SstFile::open(&path)?;
    assert_eq!(reopened.get(b"key0050")?, Some(Entry::Removed));
    assert_eq!(
        reopened.get(b"key0051")?,
        Some(Entry::Value(Value::Uint32(51)))
    );
    Ok(())
}

#[test]
fn prefix_walk_spans_blocks() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.vsst");
    let mut entries: Vec<_> = (0..150u32)
        .map(|i| live(&format!("foo:{:04}", i), vec![0x55; 64]))
        .collect();
    entries.insert(0, live("bar", 1u32));
    entries.push(live("zzz", 2u32));
    let sst = write_sst(&path, 2048, 1, entries);

    let keys = sst.keys_with_prefix(b"foo:", 1000)?;
    assert_eq!(keys.len(), 150);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));

    let keys = sst.keys_with_prefix(b"foo:", 10)?;
    assert_eq!(keys.len(), 10);

    // prefix before the min key with no matches
    assert!(sst.keys_with_prefix(b"aaa", 10)?.is_empty());
    // prefix past the max key
    assert!(sst.keys_with_prefix(b"zzzz", 10)?.is_empty());

    let mut count = 0usize;
    let finished = sst.for_each_key_with_prefix(b"foo:", &mut |_| {
        count += 1;
        count < 25
    })?;
    assert!(!finished);
    assert_eq!(count, 25);
    Ok(())
}

#[test]
fn iteration_matches_index_order() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.vsst");
    let sst = sample_sst(&path);

    let mut it = sst.iter();
    let mut prev: Option<Vec<u8>> = None;
    let mut n = 0usize;
    while let Some((key, _)) = it.next_entry()? {
        if let Some(prev) = &prev {
            assert!(*prev < key);
        }
        prev = Some(key);
        n += 1;
    }
    assert_eq!(n, 200);
    assert_eq!(prev.as_deref(), Some(sst.max_key()));
    Ok(())
}

#[test]
fn shrink_drops_dead_entries() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.vsst");
    let sst = sample_sst(&path);
    sst.remove(b"key0001")?;
    sst.remove(b"key0002")?;

    let shrunk = sst.shrink(2048)?.unwrap();
    assert_eq!(shrunk.get(b"key0001")?, None);
    assert_eq!(shrunk.get(b"key0002")?, None);
    assert_eq!(
        shrunk.get(b"key0003")?,
        Some(Entry::Value(Value::Uint32(3)))
    );
    assert!(shrunk.path().to_string_lossy().ends_with("_cleaned_.tmp"));
    Ok(())
}

#[test]
fn invalid_files_are_rejected() -> Result<()> {
    let dir = tempdir()?;

    // too small
    let tiny = dir.path().join("tiny.vsst");
    std::fs::write(&tiny, b"VS")?;
    assert!(matches!(SstFile::open(&tiny), Err(Error::Corruption(_))));

    // wrong signature
    let bad = dir.path().join("bad.vsst");
    let mut f = std::fs::File::create(&bad)?;
    f.write_all(b"NOPE")?;
    f.write_all(&[1])?;
    f.write_all(&7u64.to_le_bytes())?;
    f.write_all(&0u32.to_le_bytes())?;
    drop(f);
    assert!(matches!(SstFile::open(&bad), Err(Error::Corruption(_))));

    // index size larger than the file
    let crooked = dir.path().join("crooked.vsst");
    let mut f = std::fs::File::create(&crooked)?;
    f.write_all(b"VSSF")?;
    f.write_all(&[1])?;
    f.write_all(&7u64.to_le_bytes())?;
    f.write_all(&u32::MAX.to_le_bytes())?;
    drop(f);
    assert!(matches!(SstFile::open(&crooked), Err(Error::Corruption(_))));
    Ok(())
}

#[test]
fn rename_keeps_reader_usable() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.vsst");
    let mut sst = sample_sst(&path);

    let new_path = dir.path().join("renamed.vsst");
    sst.rename(&new_path)?;
    assert_eq!(sst.path(), new_path);
    assert!(!path.exists());
    assert_eq!(
        sst.get(b"key0000")?,
        Some(Entry::Value(Value::Uint32(0)))
    );
    Ok(())
}
