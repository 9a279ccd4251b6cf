use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::descriptor::{ContentDescriptor, Envelope, FileEntry, Layout, MAX_PIECE_LENGTH};
use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, PieceDigest};
use crate::path_safety::lexical_absolute;
use crate::piece::{piece_count, PieceReader};
use crate::plan::MappedFiles;
use crate::progress::Progress;
use crate::tree;

pub const DEFAULT_PIECE_LENGTH: usize = 262_144;

#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub piece_length: usize,
    pub announce: String,
    pub announce_list: Option<Vec<Vec<String>>>,
    pub comment: Option<String>,
    pub http_seeds: Option<Vec<String>>,
    /// Hash pieces on the rayon pool from memory-mapped files.
    pub parallel: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            piece_length: DEFAULT_PIECE_LENGTH,
            announce: String::new(),
            announce_list: None,
            comment: None,
            http_seeds: None,
            parallel: false,
        }
    }
}

impl BuildOptions {
    /// Structural checks done before any file is touched.
    pub fn validate(&self) -> Result<()> {
        if self.piece_length == 0 {
            return Err(Error::invalid("piece length must be positive"));
        }
        if self.piece_length as u64 > MAX_PIECE_LENGTH {
            return Err(Error::invalid(format!("piece length must not exceed {MAX_PIECE_LENGTH}")));
        }
        if let Some(tiers) = &self.announce_list {
            for tier in tiers {
                let first = tier
                    .first()
                    .ok_or_else(|| Error::invalid("announce-list must be a list of non-empty lists"))?;
                let has_scheme = url::Url::parse(first).map(|u| !u.scheme().is_empty()).unwrap_or(false);
                if !has_scheme {
                    return Err(Error::invalid(format!("no scheme present for url {first:?}")));
                }
            }
        }
        Ok(())
    }
}

/// A freshly built envelope and the fingerprint of its descriptor.
#[derive(Clone, Debug)]
pub struct BuiltDescriptor {
    pub envelope: Envelope,
    pub fingerprint: Fingerprint,
}

impl BuiltDescriptor {
    /// Persist the envelope; `None` writes `<name>.torrent` in the current directory.
    pub fn write(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => self.envelope.default_file_name(),
        };
        self.envelope.write(&path)?;
        info!("wrote descriptor {}", path.display());
        Ok(path)
    }
}

pub struct DescriptorBuilder {
    opts: BuildOptions,
    progress: Progress,
}

impl DescriptorBuilder {
    pub fn new(opts: BuildOptions) -> Self {
        Self { opts, progress: Progress::new(false) }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.opts
    }

    pub fn build(&self, path: &Path) -> Result<BuiltDescriptor> {
        self.opts.validate()?;
        let root = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
        // a symlinked root keeps the link's own name
        let name = root_name(&lexical_absolute(path)?)?;
        let meta = fs::metadata(&root).map_err(|e| Error::io(&root, e))?;

        self.progress.set_stage("Hashing");
        self.progress.start();
        let hashed = if meta.is_dir() { self.hash_tree(&root) } else { self.hash_single(&root) };
        self.progress.stop();
        let (layout, pieces) = hashed?;

        let info = ContentDescriptor { name, piece_length: self.opts.piece_length as u64, layout, pieces };
        let fingerprint = info.fingerprint();
        info!("{}: {} piece(s), fingerprint {}", root.display(), info.pieces.len(), fingerprint);
        let envelope = Envelope {
            announce: self.opts.announce.clone(),
            announce_list: self.opts.announce_list.clone(),
            creation_date: chrono::Utc::now().timestamp(),
            comment: self.opts.comment.clone(),
            http_seeds: self.opts.http_seeds.clone(),
            info,
        };
        Ok(BuiltDescriptor { envelope, fingerprint })
    }

    fn hash_single(&self, file: &Path) -> Result<(Layout, Vec<PieceDigest>)> {
        let sources = vec![file.to_path_buf()];
        if self.opts.parallel {
            let maps = MappedFiles::open(&sources)?;
            let pieces = maps.digest_pieces(self.opts.piece_length, &self.progress)?;
            let length = maps.lengths()[0];
            let md5sum = Some(format!("{:x}", md5::compute(maps.bytes(0))));
            return Ok((Layout::Single { length, md5sum }, pieces));
        }
        let mut reader = PieceReader::new(sources, self.opts.piece_length)?.with_checksums();
        let pieces = self.drain(&mut reader, fs_len(file))?;
        let length = reader.consumed()[0];
        let md5sum = reader.checksums()[0].clone();
        Ok((Layout::Single { length, md5sum }, pieces))
    }

    fn hash_tree(&self, root: &Path) -> Result<(Layout, Vec<PieceDigest>)> {
        let entries = tree::enumerate(root)?;
        let paths: Vec<PathBuf> = entries.iter().map(|e| e.abs_path.clone()).collect();
        let (lengths, pieces) = if self.opts.parallel {
            let maps = MappedFiles::open(&paths)?;
            for i in 0..paths.len() {
                debug!("mapped {} ({} bytes)", maps.path(i).display(), maps.bytes(i).len());
            }
            let pieces = maps.digest_pieces(self.opts.piece_length, &self.progress)?;
            (maps.lengths(), pieces)
        } else {
            let expected: u64 = paths.iter().map(|p| fs_len(p)).sum();
            let mut reader = PieceReader::new(paths, self.opts.piece_length)?;
            let pieces = self.drain(&mut reader, expected)?;
            (reader.consumed().to_vec(), pieces)
        };
        let files = entries
            .into_iter()
            .zip(lengths)
            .map(|(e, length)| FileEntry { path: e.segments, length, md5sum: Some(e.order_key) })
            .collect();
        Ok((Layout::Multi { files }, pieces))
    }

    fn drain(&self, reader: &mut PieceReader<PathBuf>, expected_bytes: u64) -> Result<Vec<PieceDigest>> {
        self.progress.reset(piece_count(expected_bytes, self.opts.piece_length), expected_bytes);
        let mut pieces = Vec::new();
        while let Some(piece) = reader.next_piece()? {
            self.progress.piece_done(piece.data.len());
            pieces.push(piece.digest());
        }
        Ok(pieces)
    }
}

/// UTF-8 base name of an absolute path.
pub(crate) fn root_name(abs: &Path) -> Result<String> {
    abs.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::invalid(format!("{} has no UTF-8 base name", abs.display())))
}

fn fs_len(p: &Path) -> u64 {
    fs::metadata(p).map(|m| m.len()).unwrap_or(0)
}

/// Build the fingerprint of `path` with default options, optionally writing
/// `<name>.torrent` into the current directory.
pub fn create_fingerprint(path: &Path, write_descriptor: bool) -> Result<String> {
    let built = DescriptorBuilder::new(BuildOptions::default()).build(path)?;
    if write_descriptor {
        built.write(None)?;
    }
    Ok(built.fingerprint.to_hex())
}
