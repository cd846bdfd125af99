//! Crash-safe record of an in-flight compaction step.
//!
//! A step's effect is two lists: files to delete and files to hand to a tier.
//! The worker commits the journal *after* the new output files exist on disk
//! and *before* it deletes anything or touches the in-memory indexes. After a
//! crash, replaying the journal at open brings the tiers to the committed
//! post-merge state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub(crate) const MERGE_LOG_NAME: &str = "merge_log.sstlog";

#[derive(Default, Serialize, Deserialize)]
struct JournalDoc {
    files_to_remove: Vec<PathBuf>,
    files_to_register: BTreeMap<usize, Vec<PathBuf>>,
}

pub(crate) struct MergeLog {
    path: PathBuf,
    doc: JournalDoc,
}

impl MergeLog {
    /// Loads the journal at `path`, or an empty one if the file is absent.
    pub(crate) fn load(path: PathBuf) -> Result<Self> {
        let doc = if path.exists() {
            let data = fs::read(&path)?;
            serde_json::from_slice(&data)
                .map_err(|e| Error::Corruption(format!("merge journal: {e}")))?
        } else {
            JournalDoc::default()
        };
        Ok(Self { path, doc })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.doc.files_to_remove.is_empty() && self.doc.files_to_register.is_empty()
    }

    pub(crate) fn add_to_remove(&mut self, path: PathBuf) {
        self.doc.files_to_remove.push(path);
    }

    pub(crate) fn add_to_register(&mut self, level: usize, path: PathBuf) {
        self.doc.files_to_register.entry(level).or_default().push(path);
    }

    pub(crate) fn files_to_remove(&self) -> &[PathBuf] {
        &self.doc.files_to_remove
    }

    pub(crate) fn files_to_register(&self) -> &BTreeMap<usize, Vec<PathBuf>> {
        &self.doc.files_to_register
    }

    /// Atomically persists the journal: write to `<path>.tmp`, rename over
    /// the real file.
    pub(crate) fn commit(&self) -> Result<()> {
        let mut tmp = self.path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let _ = fs::remove_file(&tmp);
        let json = serde_json::to_vec_pretty(&self.doc)
            .map_err(|e| Error::Corruption(format!("merge journal encode: {e}")))?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Deletes every file scheduled for removal (missing files are fine),
    /// then the journal itself, and resets the in-memory state for the next
    /// step.
    pub(crate) fn remove_files(&mut self) -> Result<()> {
        for path in &self.doc.files_to_remove {
            remove_if_exists(path)?;
        }
        remove_if_exists(&self.path)?;
        self.doc = JournalDoc::default();
        Ok(())
    }
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
