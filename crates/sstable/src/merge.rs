//! Compaction primitive: merge one source SST into a run of non-overlapping
//! destination SSTs, producing new tables in an output directory.
//!
//! Duplicate keys are resolved by sequence number (newest wins) *before* the
//! drop rules apply, so a fresh tombstone still shadows an older live value
//! even when tombstones themselves are being dropped. Deadline-expired
//! entries are dropped unconditionally; tombstones only when `keep_removed`
//! is unset (i.e. when merging into the terminal tier).

use std::path::{Path, PathBuf};

use crate::expiry;
use crate::reader::{SstFile, SstIterator};
use crate::value::{Entry, StoredEntry};
use crate::writer::{write_from_iter, SstBuilder};
use crate::{corrupt, Result};

/// Merges the SST at `src_path` into the (pairwise non-overlapping, sorted
/// by min key) destination SSTs, writing `merged_<seq>.tmp` outputs into
/// `out_dir`.
///
/// - With no destinations the source is copied, filtered by the drop rules.
/// - With exactly one destination whose key range does not overlap the
///   source, whole data blocks are concatenated in order without re-encoding.
/// - Otherwise an ordered two-way merge runs the source against the
///   concatenation of the destinations. An output rolls over to the next
///   file when it would exceed `max_file_size - block_size`; outputs reuse
///   the sorted sequence numbers of the inputs (smallest first) and never
///   outnumber `dst_paths.len() + 1`.
pub fn merge(
    src_path: &Path,
    dst_paths: &[PathBuf],
    out_dir: &Path,
    max_file_size: u64,
    block_size: usize,
    keep_removed: bool,
) -> Result<Vec<SstFile>> {
    let src = SstFile::open(src_path)?;

    if dst_paths.is_empty() {
        let out = out_dir.join(format!("merged_{}.tmp", src.seq()));
        return Ok(
            write_from_iter(&out, block_size, src.seq(), keep_removed, src.entries())?
                .into_iter()
                .collect(),
        );
    }

    let mut dst_files = Vec::with_capacity(dst_paths.len());
    for path in dst_paths {
        dst_files.push(SstFile::open(path)?);
    }

    let src_before = src.max_key() < dst_files[0].min_key();
    let src_after = src.min_key() > dst_files[dst_files.len() - 1].max_key();
    if dst_files.len() == 1 && (src_before || src_after) {
        return merge_disjoint(&src, &dst_files[0], out_dir, block_size, src_before);
    }

    let mut seqs: Vec<u64> = std::iter::once(src.seq())
        .chain(dst_files.iter().map(SstFile::seq))
        .collect();
    seqs.sort_unstable();

    let mut out = MergeOutput::new(out_dir.to_path_buf(), seqs, max_file_size, block_size)?;
    let src_seq = src.seq();
    let mut src_it = src.iter();
    let mut chain = ChainIter::new(&dst_files);

    let mut a = src_it.next_entry()?;
    let mut b = chain.next_entry()?;
    loop {
        match (a.take(), b.take()) {
            (Some(x), Some(y)) => match x.0.cmp(&y.0) {
                std::cmp::Ordering::Less => {
                    out.emit(&x.0, &x.1, keep_removed)?;
                    a = src_it.next_entry()?;
                    b = Some(y);
                }
                std::cmp::Ordering::Greater => {
                    out.emit(&y.0, &y.1, keep_removed)?;
                    a = Some(x);
                    b = chain.next_entry()?;
                }
                std::cmp::Ordering::Equal => {
                    if src_seq >= y.2 {
                        out.emit(&x.0, &x.1, keep_removed)?;
                    } else {
                        out.emit(&y.0, &y.1, keep_removed)?;
                    }
                    a = src_it.next_entry()?;
                    b = chain.next_entry()?;
                }
            },
            (Some(x), None) => {
                out.emit(&x.0, &x.1, keep_removed)?;
                a = src_it.next_entry()?;
                b = None;
            }
            (None, Some(y)) => {
                out.emit(&y.0, &y.1, keep_removed)?;
                a = None;
                b = chain.next_entry()?;
            }
            (None, None) => break,
        }
    }
    out.finish()
}

/// Fast path: single destination, disjoint ranges. Whole data blocks are
/// concatenated in key order.
fn merge_disjoint(
    src: &SstFile,
    dst: &SstFile,
    out_dir: &Path,
    block_size: usize,
    src_before: bool,
) -> Result<Vec<SstFile>> {
    let seq = src.seq().min(dst.seq());
    let mut builder = SstBuilder::new(
        out_dir.join(format!("merged_{}.tmp", seq)),
        block_size,
        seq,
    )?;
    let (first, second) = if src_before { (src, dst) } else { (dst, src) };
    copy_blocks(&mut builder, first)?;
    copy_blocks(&mut builder, second)?;
    Ok(vec![builder.finalize()?])
}

fn copy_blocks(builder: &mut SstBuilder, file: &SstFile) -> Result<()> {
    let blocks = file.block_count();
    for i in 0..blocks {
        let data = file.read_block(i)?;
        let max_key = (i == blocks - 1).then(|| file.max_key());
        builder.add_block(file.block_min_key(i), &data, max_key)?;
    }
    Ok(())
}

fn dropped(stored: &StoredEntry, keep_removed: bool) -> bool {
    match stored.entry {
        Entry::Removed => !keep_removed,
        Entry::Value(_) => expiry::is_deadline_expired(stored.expiration_ms),
    }
}

/// Walks the destination files in order; since they are non-overlapping and
/// sorted by min key, their concatenation is globally sorted.
struct ChainIter<'a> {
    files: &'a [SstFile],
    idx: usize,
    it: SstIterator<'a>,
}

impl<'a> ChainIter<'a> {
    fn new(files: &'a [SstFile]) -> Self {
        Self {
            files,
            idx: 0,
            it: files[0].iter(),
        }
    }

    /// Next `(key, entry, seq-of-owning-file)`.
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, StoredEntry, u64)>> {
        loop {
            if let Some((key, stored)) = self.it.next_entry()? {
                return Ok(Some((key, stored, self.files[self.idx].seq())));
            }
            self.idx += 1;
            if self.idx >= self.files.len() {
                return Ok(None);
            }
            self.it = self.files[self.idx].iter();
        }
    }
}

/// Rolls merge output across files, bounding each at
/// `max_file_size - block_size` and reassigning the sorted input sequence
/// numbers in order.
struct MergeOutput {
    out_dir: PathBuf,
    seqs: Vec<u64>,
    seq_idx: usize,
    max_file_size: u64,
    block_size: usize,
    builder: SstBuilder,
    done: Vec<SstFile>,
}

impl MergeOutput {
    fn new(
        out_dir: PathBuf,
        seqs: Vec<u64>,
        max_file_size: u64,
        block_size: usize,
    ) -> Result<Self> {
        let builder = SstBuilder::new(
            out_dir.join(format!("merged_{}.tmp", seqs[0])),
            block_size,
            seqs[0],
        )?;
        Ok(Self {
            out_dir,
            seqs,
            seq_idx: 0,
            max_file_size,
            block_size,
            builder,
            done: Vec::new(),
        })
    }

    fn emit(&mut self, key: &[u8], stored: &StoredEntry, keep_removed: bool) -> Result<()> {
        if dropped(stored, keep_removed) {
            return Ok(());
        }
        if !self.builder.is_empty()
            && self.builder.current_size()
                >= self.max_file_size.saturating_sub(self.block_size as u64)
        {
            self.roll()?;
        }
        self.builder.add(key, &stored.entry, stored.expiration_ms)
    }

    fn roll(&mut self) -> Result<()> {
        self.seq_idx += 1;
        if self.seq_idx >= self.seqs.len() {
            return Err(corrupt(
                "merge produced more outputs than destinations + 1",
            ));
        }
        let seq = self.seqs[self.seq_idx];
        let next = SstBuilder::new(
            self.out_dir.join(format!("merged_{}.tmp", seq)),
            self.block_size,
            seq,
        )?;
        let full = std::mem::replace(&mut self.builder, next);
        self.done.push(full.finalize()?);
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<SstFile>> {
        if self.builder.is_empty() {
            let path = self.builder.path().to_path_buf();
            drop(self.builder);
            let _ = std::fs::remove_file(&path);
        } else {
            self.done.push(self.builder.finalize()?);
        }
        Ok(self.done)
    }
}
