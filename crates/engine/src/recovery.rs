//! Cold-start recovery: re-apply a committed merge journal and sweep
//! orphaned temporary files.
//!
//! The journal is committed after a step's output files exist on disk but
//! before anything is deleted or registered, so replay works in two halves
//! around the tier scan:
//!
//! 1. Before the scan, delete every doomed file the journal lists. The
//!    outputs that supersede them are guaranteed to exist, and this keeps the
//!    scan from indexing files that are already dead.
//! 2. After the scan, open each registered output that still carries its
//!    temporary name and hand it to its tier (outputs renamed before the
//!    crash were picked up by the scan already), then delete the journal.
//!
//! A crash anywhere in between leaves the journal on disk and the whole
//! sequence re-runs idempotently.

use std::fs;
use std::path::Path;
use tracing::info;

use sstable::SstFile;

use crate::error::Result;
use crate::journal::{remove_if_exists, MergeLog, MERGE_LOG_NAME};
use crate::tier::Tiers;

pub(crate) fn load_journal(data_dir: &Path) -> Result<MergeLog> {
    let journal = MergeLog::load(data_dir.join(MERGE_LOG_NAME))?;
    if !journal.is_empty() {
        info!(
            to_remove = journal.files_to_remove().len(),
            "found a merge journal to replay"
        );
    }
    Ok(journal)
}

/// First half of the replay: delete the files the committed step supersedes.
pub(crate) fn remove_doomed_files(journal: &MergeLog) -> Result<()> {
    for path in journal.files_to_remove() {
        remove_if_exists(path)?;
    }
    Ok(())
}

/// Second half of the replay: register the step's surviving outputs and
/// retire the journal.
pub(crate) fn register_journal_files(journal: &mut MergeLog, tiers: &mut Tiers) -> Result<()> {
    for (&level, paths) in journal.files_to_register() {
        let mut files = Vec::new();
        for path in paths {
            if path.exists() {
                files.push(SstFile::open(path)?);
            }
        }
        if let Some(tier) = tiers.file_mut(level) {
            tier.add_ssts(files)?;
        }
    }
    journal.remove_files()?;
    Ok(())
}

/// Deletes every `*.tmp` under the data directory, tier subdirectories
/// included. Runs after the journal replay, so anything still carrying the
/// extension is an orphan of an interrupted flush, merge or shrink.
pub(crate) fn remove_tmp_files(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            remove_tmp_files(&path)?;
        } else if path.extension().map(|e| e == "tmp").unwrap_or(false) {
            let _ = fs::remove_file(&path);
        }
    }
    Ok(())
}
