//! Exclusive advisory lock on the data directory.

use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Holds an exclusive advisory lock on a file for its whole lifetime; the
/// lock is released when the handle is dropped.
pub(crate) struct LockFile {
    #[allow(dead_code)]
    file: std::fs::File,
}

impl LockFile {
    pub(crate) fn acquire(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| Error::LockHeld(path))?;
        Ok(Self { file })
    }
}
