use super::{live, tombstone, write_sst};
use crate::*;
use anyhow::Result;
use std::path::PathBuf;
use tempfile::tempdir;

fn collect_keys(sst: &SstFile) -> Result<Vec<Vec<u8>>> {
    let mut it = sst.iter();
    let mut keys = Vec::new();
    while let Some((key, _)) = it.next_entry()? {
        keys.push(key);
    }
    Ok(keys)
}

#[test]
fn merge_without_destinations_copies_the_source() -> Result<()> {
    let dir = tempdir()?;
    let src = dir.path().join("src.vsst");
    write_sst(
        &src,
        4096,
        9,
        vec![live("a", 1u32), tombstone("b"), live("c", 3u32)],
    );

    let out = merge(&src, &[], dir.path(), MAX_SST_FILE_SIZE, 4096, true)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].seq(), 9);
    assert_eq!(out[0].get(b"b")?, Some(Entry::Removed));

    let out = merge(&src, &[], dir.path(), MAX_SST_FILE_SIZE, 4096, false)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get(b"b")?, None);
    assert_eq!(out[0].get(b"a")?, Some(Entry::Value(Value::Uint32(1))));
    Ok(())
}

#[test]
fn duplicate_key_resolves_to_larger_sequence() -> Result<()> {
    let dir = tempdir()?;
    let s1 = dir.path().join("s1.vsst");
    let s2 = dir.path().join("s2.vsst");
    write_sst(&s1, 4096, 10, vec![live("dup", 111u32), tombstone("old")]);
    write_sst(&s2, 4096, 99, vec![live("dup", 112u32), live("keep", 5u32)]);

    let out = merge(
        &s1,
        &[s2.clone()],
        dir.path(),
        MAX_SST_FILE_SIZE,
        4096,
        false,
    )?;
    assert_eq!(out.len(), 1);
    // output reuses the smallest input sequence number
    assert_eq!(out[0].seq(), 10);
    assert_eq!(out[0].get(b"dup")?, Some(Entry::Value(Value::Uint32(112))));
    assert_eq!(out[0].get(b"keep")?, Some(Entry::Value(Value::Uint32(5))));
    // tombstones are gone with keep_removed unset
    assert_eq!(out[0].get(b"old")?, None);
    Ok(())
}

#[test]
fn newer_source_value_wins_over_destination() -> Result<()> {
    let dir = tempdir()?;
    let src = dir.path().join("src.vsst");
    let dst = dir.path().join("dst.vsst");
    write_sst(&src, 4096, 50, vec![live("dup", 2u32), live("x", 1u32)]);
    write_sst(&dst, 4096, 10, vec![live("dup", 1u32), live("y", 1u32)]);

    let out = merge(
        &src,
        &[dst.clone()],
        dir.path(),
        MAX_SST_FILE_SIZE,
        4096,
        true,
    )?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get(b"dup")?, Some(Entry::Value(Value::Uint32(2))));
    Ok(())
}

#[test]
fn fresh_tombstone_shadows_older_value_even_when_dropped() -> Result<()> {
    let dir = tempdir()?;
    let src = dir.path().join("src.vsst");
    let dst = dir.path().join("dst.vsst");
    // the newer file deletes "k"; the terminal-tier merge must not resurrect
    // the older value while dropping the tombstone itself
    write_sst(&src, 4096, 20, vec![tombstone("k"), live("other", 1u32)]);
    write_sst(&dst, 4096, 3, vec![live("k", 42u32), live("z", 7u32)]);

    let out = merge(
        &src,
        &[dst.clone()],
        dir.path(),
        MAX_SST_FILE_SIZE,
        4096,
        false,
    )?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get(b"k")?, None);
    assert_eq!(out[0].get(b"other")?, Some(Entry::Value(Value::Uint32(1))));
    assert_eq!(out[0].get(b"z")?, Some(Entry::Value(Value::Uint32(7))));
    Ok(())
}

#[test]
fn expired_entries_are_dropped_even_when_keeping_tombstones() -> Result<()> {
    let dir = tempdir()?;
    let src = dir.path().join("src.vsst");
    let dst = dir.path().join("dst.vsst");
    let expired = (
        b"stale".to_vec(),
        StoredEntry {
            entry: Entry::Value(Value::Uint32(1)),
            expiration_ms: 2, // long past
        },
    );
    write_sst(&src, 4096, 8, vec![live("a", 1u32), expired, tombstone("t")]);
    write_sst(&dst, 4096, 2, vec![live("a", 0u32), live("m", 3u32)]);

    let out = merge(
        &src,
        &[dst.clone()],
        dir.path(),
        MAX_SST_FILE_SIZE,
        4096,
        true,
    )?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get(b"stale")?, None);
    // the tombstone survives with keep_removed set
    assert_eq!(out[0].get(b"t")?, Some(Entry::Removed));
    assert_eq!(out[0].get(b"a")?, Some(Entry::Value(Value::Uint32(1))));
    Ok(())
}

#[test]
fn disjoint_single_destination_concatenates_blocks() -> Result<()> {
    let dir = tempdir()?;
    let src = dir.path().join("src.vsst");
    let dst = dir.path().join("dst.vsst");
    // src strictly after dst
    write_sst(
        &src,
        2048,
        30,
        (0..50u32).map(|i| live(&format!("n{:03}", i), i)).collect(),
    );
    write_sst(
        &dst,
        2048,
        4,
        (0..50u32).map(|i| live(&format!("a{:03}", i), i)).collect(),
    );

    let out = merge(
        &src,
        &[dst.clone()],
        dir.path(),
        MAX_SST_FILE_SIZE,
        2048,
        true,
    )?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].seq(), 4);
    assert_eq!(out[0].min_key(), b"a000");
    assert_eq!(out[0].max_key(), b"n049");

    let keys = collect_keys(&out[0])?;
    assert_eq!(keys.len(), 100);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[test]
fn oversized_merge_rolls_to_multiple_outputs() -> Result<()> {
    let dir = tempdir()?;
    let src = dir.path().join("src.vsst");
    let d1 = dir.path().join("d1.vsst");
    let d2 = dir.path().join("d2.vsst");

    let value = vec![0xCD; 512];
    write_sst(
        &src,
        2048,
        40,
        (0..40u32)
            .map(|i| live(&format!("k{:03}", i * 2), value.clone()))
            .collect(),
    );
    write_sst(
        &d1,
        2048,
        11,
        (0..20u32)
            .map(|i| live(&format!("k{:03}", i * 2 + 1), value.clone()))
            .collect(),
    );
    write_sst(
        &d2,
        2048,
        12,
        (20..40u32)
            .map(|i| live(&format!("k{:03}", i * 2 + 1), value.clone()))
            .collect(),
    );

    let dsts = vec![d1.clone(), d2.clone()];
    let out = merge(&src, &dsts, dir.path(), 24 * 1024, 2048, true)?;
    assert!(out.len() >= 2, "expected a rollover, got {} file(s)", out.len());
    assert!(out.len() <= dsts.len() + 1);

    // sequence numbers are the sorted input sequences, smallest first
    let seqs: Vec<u64> = out.iter().map(SstFile::seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seqs[0], 11);

    // the union of outputs holds every key exactly once, globally sorted
    let mut all = Vec::new();
    for sst in &out {
        all.extend(collect_keys(sst)?);
    }
    assert_eq!(all.len(), 80);
    assert!(all.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[test]
fn merge_where_everything_dies_produces_no_output() -> Result<()> {
    let dir = tempdir()?;
    let src = dir.path().join("src.vsst");
    write_sst(&src, 4096, 6, vec![tombstone("a"), tombstone("b")]);

    let out = merge(
        &src,
        &[],
        dir.path(),
        MAX_SST_FILE_SIZE,
        4096,
        false,
    )?;
    assert!(out.is_empty());
    // no stray .tmp left behind
    let leftovers: Vec<PathBuf> = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|x| x == "tmp").unwrap_or(false))
        .collect();
    assert!(leftovers.is_empty(), "leftovers: {:?}", leftovers);
    Ok(())
}
