use super::helpers::init_tracing;
use crate::{Config, Error, SimpleStorage, Value};
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn manifest_is_written_on_first_open() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let _db = SimpleStorage::open(dir.path(), Config::default())?;

    let manifest = std::fs::read_to_string(dir.path().join("manifest.json"))?;
    let doc: serde_json::Value = serde_json::from_str(&manifest)?;
    assert_eq!(doc["type"], "SimpleStorage");
    assert_eq!(doc["memtable_size_bytes"], 64 * 1024 * 1024);
    assert_eq!(doc["l0_max_files"], 4);
    assert_eq!(doc["block_size"], 128 * 1024);
    Ok(())
}

#[test]
fn existing_manifest_overrides_the_passed_config() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    {
        let db = SimpleStorage::open(
            dir.path(),
            Config {
                block_size: 16 * 1024,
                ..Config::default()
            },
        )?;
        db.put(b"k", 1u32, None)?;
        db.flush()?;
    }

    // reopen with a different block size: the stored one wins, so an entry
    // that fits 16 KiB blocks but not the passed 4 KiB is still accepted
    let db = SimpleStorage::open(
        dir.path(),
        Config {
            block_size: 4 * 1024,
            ..Config::default()
        },
    )?;
    db.put(b"wide", vec![0u8; 8 * 1024], None)?;
    assert_eq!(db.get(b"k")?, Some(Value::Uint32(1)));
    Ok(())
}

#[test]
fn foreign_manifest_type_is_rejected() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    std::fs::write(
        dir.path().join("manifest.json"),
        r#"{"type":"SomethingElse","memtable_size_bytes":67108864,"l0_max_files":4,"block_size":131072}"#,
    )?;

    assert!(matches!(
        SimpleStorage::open(dir.path(), Config::default()),
        Err(Error::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn out_of_bounds_configs_are_rejected() {
    init_tracing();
    let cases = [
        Config {
            memtable_size_bytes: 1024, // below 4 MiB
            ..Config::default()
        },
        Config {
            l0_max_files: 1,
            ..Config::default()
        },
        Config {
            block_size: 512, // below 2 KiB
            ..Config::default()
        },
        Config {
            block_size: 4 * 1024 * 1024, // above 2 MiB
            ..Config::default()
        },
    ];
    for config in cases {
        let dir = tempdir().unwrap();
        assert!(matches!(
            SimpleStorage::open(dir.path(), config),
            Err(Error::InvalidArgument(_))
        ));
    }
}

#[test]
fn garbage_manifest_is_rejected() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    std::fs::write(dir.path().join("manifest.json"), b"not json at all")?;
    assert!(matches!(
        SimpleStorage::open(dir.path(), Config::default()),
        Err(Error::InvalidArgument(_))
    ));
    Ok(())
}
