use super::helpers::{open_small, small_config};
use crate::{SimpleStorage, Value};
use anyhow::Result;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

/// Multithreaded workload: each thread owns a key range and mixes puts,
/// synchronous removes and async removes. After `flush` + `wait_all_async`
/// and a reopen, every key must reflect the last successful operation.
#[test]
fn concurrent_workload_is_consistent_after_reopen() -> Result<()> {
    let dir = tempdir()?;
    let db = Arc::new(open_small(dir.path()));
    let threads = 4u32;
    let keys_per_thread = 2_000u32;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let filler = vec![t as u8; 1024];
                for i in 0..keys_per_thread {
                    let key = format!("t{}-{:05}", t, i);
                    db.put(key.as_bytes(), filler.clone(), None).unwrap();
                    if i % 5 == 0 {
                        db.remove(key.as_bytes()).unwrap();
                    } else if i % 7 == 0 {
                        db.remove_async(key.as_bytes()).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    db.flush()?;
    db.wait_all_async();

    let verify = |db: &SimpleStorage| -> Result<()> {
        for t in 0..threads {
            let filler = vec![t as u8; 1024];
            for i in (0..keys_per_thread).step_by(3) {
                let key = format!("t{}-{:05}", t, i);
                let got = db.get(key.as_bytes())?;
                if i % 5 == 0 || i % 7 == 0 {
                    assert_eq!(got, None, "{key} should be removed");
                } else {
                    assert_eq!(got, Some(Value::Blob(filler.clone())), "{key}");
                }
            }
        }
        Ok(())
    };
    verify(&db)?;

    drop(Arc::try_unwrap(db).ok().expect("sole owner"));
    let db = SimpleStorage::open(dir.path(), small_config())?;
    verify(&db)?;
    Ok(())
}

/// Readers running concurrently with writers never see torn or stale-after-
/// acknowledge state: once a put returns, a subsequent get from any thread
/// observes it.
#[test]
fn concurrent_readers_and_writers() -> Result<()> {
    let dir = tempdir()?;
    let db = Arc::new(open_small(dir.path()));

    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for i in 0..5_000u32 {
                db.put(format!("rw_{:05}", i).as_bytes(), i, None).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in (0..5_000u32).rev() {
                    if let Some(value) = db.get(format!("rw_{:05}", i).as_bytes()).unwrap() {
                        assert_eq!(value, Value::Uint32(i));
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    // after the writer finishes every key reads back
    for i in (0..5_000u32).step_by(271) {
        assert_eq!(
            db.get(format!("rw_{:05}", i).as_bytes())?,
            Some(Value::Uint32(i))
        );
    }
    Ok(())
}
