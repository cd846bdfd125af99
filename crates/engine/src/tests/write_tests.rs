use super::helpers::open_storage;
use crate::{Error, Value};
use anyhow::Result;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn put_and_get_u32() -> Result<()> {
    let dir = tempdir()?;
    let db = open_storage(dir.path());

    db.put(b"my_key", 12345u32, None)?;
    assert_eq!(db.get(b"my_key")?, Some(Value::Uint32(12345)));
    Ok(())
}

#[test]
fn exists_and_remove() -> Result<()> {
    let dir = tempdir()?;
    let db = open_storage(dir.path());

    db.put(b"test_key", 123456789u64, None)?;
    assert!(db.exists(b"test_key")?);

    db.remove(b"test_key")?;
    assert!(!db.exists(b"test_key")?);
    assert_eq!(db.get(b"test_key")?, None);
    Ok(())
}

#[test]
fn put_and_get_string_types() -> Result<()> {
    let dir = tempdir()?;
    let db = open_storage(dir.path());

    db.put(b"test key", "Значение с Unicode 👋", None)?;
    assert_eq!(
        db.get(b"test key")?,
        Some(Value::U8String("Значение с Unicode 👋".to_owned()))
    );

    db.put(b"raw", Value::String(vec![0xC0, 0xFF, 0x00]), None)?;
    assert_eq!(db.get(b"raw")?, Some(Value::String(vec![0xC0, 0xFF, 0x00])));

    db.put(b"blob", vec![1u8, 2, 3], None)?;
    assert_eq!(db.get(b"blob")?, Some(Value::Blob(vec![1, 2, 3])));

    db.put(b"float", 2.5f64, None)?;
    assert_eq!(db.get(b"float")?, Some(Value::Double(2.5)));
    Ok(())
}

#[test]
fn overwrite_returns_latest_value() -> Result<()> {
    let dir = tempdir()?;
    let db = open_storage(dir.path());

    db.put(b"k", 1u32, None)?;
    db.put(b"k", 2u32, None)?;
    db.put(b"k", 3i64, None)?;
    assert_eq!(db.get(b"k")?, Some(Value::Int64(3)));
    Ok(())
}

#[test]
fn remove_of_unknown_key_still_tombstones() -> Result<()> {
    let dir = tempdir()?;
    let db = open_storage(dir.path());

    db.remove(b"never_put")?;
    assert!(!db.exists(b"never_put")?);
    assert_eq!(db.get(b"never_put")?, None);
    Ok(())
}

#[test]
fn invalid_arguments_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    let db = open_storage(dir.path());

    assert!(matches!(
        db.put(b"", 1u32, None),
        Err(Error::InvalidArgument(_))
    ));

    let long_key = vec![b'k'; 1025];
    assert!(matches!(
        db.put(&long_key, 1u32, None),
        Err(Error::InvalidArgument(_))
    ));
    // exactly at the limit is fine
    db.put(&long_key[..1024], 1u32, None)?;

    // an entry bigger than the configured block size
    let huge = vec![0u8; 256 * 1024];
    assert!(matches!(
        db.put(b"huge", huge, None),
        Err(Error::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn remove_async_hits_the_memtable_first() -> Result<()> {
    let dir = tempdir()?;
    let db = open_storage(dir.path());

    db.put(b"resident", 1u32, None)?;
    assert!(db.remove_async(b"resident")?);
    assert!(!db.exists(b"resident")?);

    // unknown key: deferred to the background, nothing to find
    assert!(!db.remove_async(b"absent")?);
    db.wait_all_async();
    assert!(!db.exists(b"absent")?);
    Ok(())
}

#[test]
fn flush_and_shrink_smoke() -> Result<()> {
    let dir = tempdir()?;
    let db = open_storage(dir.path());

    db.put(b"key1", 42u32, None)?;
    db.flush()?;
    db.shrink()?;
    db.wait_all_async();
    assert_eq!(db.get(b"key1")?, Some(Value::Uint32(42)));
    Ok(())
}

#[test]
fn ttl_expires_entries() -> Result<()> {
    let dir = tempdir()?;
    let db = open_storage(dir.path());

    db.put(b"abc1", 1u32, Some(Duration::from_millis(5)))?;
    db.put(b"abc2", 2u32, Some(Duration::from_millis(5)))?;
    db.put(b"abc3", 3u32, Some(Duration::from_millis(5)))?;
    std::thread::sleep(Duration::from_millis(10));
    db.put(b"abc5", 5u32, None)?;

    assert_eq!(db.get(b"abc1")?, None);
    assert!(!db.exists(b"abc2")?);
    let keys = db.keys_with_prefix(b"abc", 1000)?;
    assert_eq!(keys, vec![b"abc5".to_vec()]);
    Ok(())
}
