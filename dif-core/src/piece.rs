//! Streaming piece segmentation.
//!
//! Pieces are cut at fixed offsets of the logical concatenation of all
//! sources; a source boundary never ends a piece early. The buffer of a
//! partially filled piece carries over into the next source.

use crate::error::{Error, Result};
use crate::fingerprint::{sha1_digest, PieceDigest};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;

/// Upper bound on how far the piece buffer grows per read. The buffer only
/// ever holds bytes actually read, whatever the piece length.
const READ_CHUNK: usize = 1 << 20;

/// Something the reader can open when it reaches it.
pub trait Source {
    type Reader: Read;

    fn open(&self) -> Result<Self::Reader>;

    /// Human-readable name used in error messages.
    fn label(&self) -> String;
}

impl Source for PathBuf {
    type Reader = File;

    fn open(&self) -> Result<File> {
        File::open(self).map_err(|e| Error::io(self, e))
    }

    fn label(&self) -> String {
        self.display().to_string()
    }
}

impl<'a> Source for &'a [u8] {
    type Reader = &'a [u8];

    fn open(&self) -> Result<&'a [u8]> {
        Ok(self)
    }

    fn label(&self) -> String {
        format!("<{} byte buffer>", self.len())
    }
}

/// One emitted piece, borrowed from the reader's buffer.
#[derive(Debug)]
pub struct Piece<'a> {
    pub index: usize,
    pub data: &'a [u8],
    /// Indices of the sources that contributed at least one byte, ascending.
    pub sources: &'a [usize],
}

impl Piece<'_> {
    pub fn digest(&self) -> PieceDigest {
        sha1_digest(self.data)
    }
}

/// Pull-based accumulator over an ordered list of sources.
///
/// At most one source is open at a time; it is dropped as soon as it reports
/// end of file.
pub struct PieceReader<S: Source> {
    piece_length: usize,
    sources: Vec<S>,
    next_source: usize,
    current: Option<(usize, S::Reader)>,
    buf: Vec<u8>,
    contributors: Vec<usize>,
    consumed: Vec<u64>,
    checksums: Option<Vec<Option<md5::Context>>>,
    finished_checksums: Vec<Option<String>>,
    pieces_emitted: usize,
    last_touched: Option<usize>,
}

impl<S: Source> PieceReader<S> {
    pub fn new(sources: Vec<S>, piece_length: usize) -> Result<Self> {
        if piece_length == 0 {
            return Err(Error::invalid("piece length must be positive"));
        }
        let n = sources.len();
        Ok(Self {
            piece_length,
            sources,
            next_source: 0,
            current: None,
            buf: Vec::with_capacity(piece_length.min(READ_CHUNK)),
            contributors: Vec::new(),
            consumed: vec![0; n],
            checksums: None,
            finished_checksums: vec![None; n],
            pieces_emitted: 0,
            last_touched: None,
        })
    }

    /// Also accumulate an MD5 of each source's full content.
    pub fn with_checksums(mut self) -> Self {
        self.checksums = Some((0..self.sources.len()).map(|_| None).collect());
        self
    }

    pub fn next_piece(&mut self) -> Result<Option<Piece<'_>>> {
        self.buf.clear();
        self.contributors.clear();

        while self.buf.len() < self.piece_length {
            if self.current.is_none() {
                if self.next_source >= self.sources.len() {
                    break;
                }
                let idx = self.next_source;
                self.next_source += 1;
                let reader = self.sources[idx].open()?;
                if let Some(sums) = self.checksums.as_mut() {
                    sums[idx] = Some(md5::Context::new());
                }
                self.current = Some((idx, reader));
            }
            let Some((idx, reader)) = self.current.as_mut() else {
                break;
            };
            let idx = *idx;
            let filled = self.buf.len();
            let want = (self.piece_length - filled).min(READ_CHUNK);
            self.buf.resize(filled + want, 0);
            let read = reader.read(&mut self.buf[filled..]);
            let n = match read {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    self.buf.truncate(filled);
                    continue;
                }
                Err(e) => return Err(Error::io(self.sources[idx].label(), e)),
            };
            self.buf.truncate(filled + n);
            if n == 0 {
                self.current = None;
                if let Some(ctx) = self.checksums.as_mut().and_then(|sums| sums[idx].take()) {
                    self.finished_checksums[idx] = Some(format!("{:x}", ctx.compute()));
                }
                continue;
            }
            if let Some(ctx) = self.checksums.as_mut().and_then(|sums| sums[idx].as_mut()) {
                ctx.consume(&self.buf[filled..filled + n]);
            }
            self.consumed[idx] += n as u64;
            if self.contributors.last() != Some(&idx) {
                self.contributors.push(idx);
            }
            self.last_touched = Some(idx);
        }

        if self.buf.is_empty() {
            return Ok(None);
        }
        let index = self.pieces_emitted;
        self.pieces_emitted += 1;
        Ok(Some(Piece { index, data: &self.buf, sources: &self.contributors }))
    }

    /// Drain the reader, returning every piece digest in order.
    pub fn digest_all(&mut self) -> Result<Vec<PieceDigest>> {
        let mut out = Vec::new();
        while let Some(piece) = self.next_piece()? {
            out.push(piece.digest());
        }
        Ok(out)
    }

    /// Bytes read so far from each source, in source order.
    pub fn consumed(&self) -> &[u64] {
        &self.consumed
    }

    /// MD5 hex of each fully read source; `None` until the source hits EOF
    /// or when checksums are disabled.
    pub fn checksums(&self) -> &[Option<String>] {
        &self.finished_checksums
    }

    /// Last source that contributed bytes to any piece.
    pub fn last_touched(&self) -> Option<usize> {
        self.last_touched
    }

    pub fn sources(&self) -> &[S] {
        &self.sources
    }
}

/// Number of pieces covering `total` bytes.
pub fn piece_count(total: u64, piece_length: usize) -> u64 {
    total.div_ceil(piece_length as u64)
}
