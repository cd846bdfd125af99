use std::io;
use std::path::PathBuf;
use thiserror::Error as ThisError;

/// Errors surfaced by the public storage API.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Empty key, oversized key or entry, or configuration out of bounds.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An on-disk structure failed validation; the affected file is treated
    /// as unreadable.
    #[error("corrupt storage: {0}")]
    Corruption(String),

    /// Another process holds the data directory lock.
    #[error("data directory is locked by another process: {}", .0.display())]
    LockHeld(PathBuf),

    /// The operation was submitted after the engine began shutting down.
    #[error("storage is shutting down")]
    AlreadyStopped,
}

impl From<sstable::Error> for Error {
    fn from(e: sstable::Error) -> Self {
        match e {
            sstable::Error::Io(e) => Error::Io(e),
            sstable::Error::Corruption(msg) => Error::Corruption(msg),
            sstable::Error::EntryTooLarge(size) => {
                Error::InvalidArgument(format!("entry of {size} bytes does not fit in a data block"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
