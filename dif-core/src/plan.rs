//! Parallel piece hashing.
//!
//! Piece boundaries depend only on cumulative file lengths, so every piece
//! can be located up front and hashed independently.

use crate::error::{Error, Result};
use crate::fingerprint::PieceDigest;
use crate::piece::piece_count;
use crate::progress::Progress;
use memmap2::Mmap;
use rayon::prelude::*;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Byte layout of an ordered file set: where each file starts in the
/// concatenation.
#[derive(Clone, Debug)]
pub struct PiecePlan {
    piece_length: usize,
    starts: Vec<u64>,
    total: u64,
}

impl PiecePlan {
    pub fn new(lengths: &[u64], piece_length: usize) -> Result<Self> {
        if piece_length == 0 {
            return Err(Error::invalid("piece length must be positive"));
        }
        let mut starts = Vec::with_capacity(lengths.len());
        let mut total = 0u64;
        for &len in lengths {
            starts.push(total);
            total += len;
        }
        Ok(Self { piece_length, starts, total })
    }

    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    pub fn piece_count(&self) -> usize {
        piece_count(self.total, self.piece_length) as usize
    }

    /// Byte range of piece `i` in the concatenation.
    pub fn piece_range(&self, i: usize) -> Range<u64> {
        let start = i as u64 * self.piece_length as u64;
        start..(start + self.piece_length as u64).min(self.total)
    }

    /// `(file index, range within that file)` for every file overlapping piece `i`.
    /// Zero-length files never appear.
    pub fn segments(&self, i: usize) -> Vec<(usize, Range<u64>)> {
        let range = self.piece_range(i);
        // first file whose end is past range.start
        let first = self.starts.partition_point(|&s| s <= range.start).saturating_sub(1);
        let mut out = Vec::new();
        for fi in first..self.starts.len() {
            let fstart = self.starts[fi];
            if fstart >= range.end {
                break;
            }
            let fend = self.starts.get(fi + 1).copied().unwrap_or(self.total);
            let lo = range.start.max(fstart);
            let hi = range.end.min(fend);
            if lo < hi {
                out.push((fi, (lo - fstart)..(hi - fstart)));
            }
        }
        out
    }
}

/// Every file of a set, memory-mapped for the duration of a hashing run.
pub struct MappedFiles {
    paths: Vec<PathBuf>,
    maps: Vec<Option<Mmap>>,
}

impl MappedFiles {
    pub fn open(paths: &[PathBuf]) -> Result<Self> {
        let mut maps = Vec::with_capacity(paths.len());
        for p in paths {
            let f = File::open(p).map_err(|e| Error::io(p, e))?;
            let len = f.metadata().map_err(|e| Error::io(p, e))?.len();
            if len == 0 {
                // empty files cannot be mapped on every platform
                maps.push(None);
                continue;
            }
            // Safety: the files are treated as read-only snapshots; concurrent
            // writers can only change digests, which verification reports.
            let m = unsafe { Mmap::map(&f) }.map_err(|e| Error::io(p, e))?;
            maps.push(Some(m));
        }
        Ok(Self { paths: paths.to_vec(), maps })
    }

    pub fn lengths(&self) -> Vec<u64> {
        self.maps.iter().map(|m| m.as_ref().map_or(0, |m| m.len() as u64)).collect()
    }

    pub fn bytes(&self, i: usize) -> &[u8] {
        self.maps[i].as_deref().unwrap_or(&[])
    }

    pub fn path(&self, i: usize) -> &Path {
        &self.paths[i]
    }

    /// Hash every piece on the rayon pool; output order matches the
    /// streaming reader exactly.
    pub fn digest_pieces(&self, piece_length: usize, progress: &Progress) -> Result<Vec<PieceDigest>> {
        let plan = PiecePlan::new(&self.lengths(), piece_length)?;
        progress.reset(plan.piece_count() as u64, plan.total_bytes());
        let digests = (0..plan.piece_count())
            .into_par_iter()
            .map(|i| -> PieceDigest {
                let mut h = Sha1::new();
                let mut len = 0usize;
                for (fi, r) in plan.segments(i) {
                    let part = &self.bytes(fi)[r.start as usize..r.end as usize];
                    h.update(part);
                    len += part.len();
                }
                progress.piece_done(len);
                h.finalize().into()
            })
            .collect();
        Ok(digests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_skip_empty_files_and_span_boundaries() {
        let plan = PiecePlan::new(&[3, 0, 5, 0], 4).unwrap();
        assert_eq!(plan.piece_count(), 2);
        assert_eq!(plan.segments(0), vec![(0, 0..3), (2, 0..1)]);
        assert_eq!(plan.segments(1), vec![(2, 1..5)]);
    }

    #[test]
    fn empty_set_has_no_pieces() {
        let plan = PiecePlan::new(&[0, 0], 4).unwrap();
        assert_eq!(plan.piece_count(), 0);
        assert_eq!(plan.total_bytes(), 0);
    }
}
