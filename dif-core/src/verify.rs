use crate::build::{root_name, BuildOptions, DescriptorBuilder};
use crate::descriptor::{ContentDescriptor, Envelope, Layout};
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::path_safety::{lexical_absolute, validate_path, validate_segment, PathPolicy};
use crate::piece::PieceReader;
use log::{debug, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Piece-level comparison of on-disk data against a descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct PieceCheck {
    pub pieces_ok: u64,
    pub pieces_bad: u64,
    pub pieces_expected: u64,
    pub pieces_found: u64,
    /// Files that contributed bytes to at least one bad piece, in the order
    /// they were detected, relative to the directory holding the descriptor's
    /// root name. Attribution is per piece, not per byte: when a bad piece
    /// spans several small files, every one of them is listed even if only
    /// one holds the damaged byte.
    pub corrupted: Vec<PathBuf>,
}

impl PieceCheck {
    pub fn is_clean(&self) -> bool {
        self.pieces_bad == 0 && self.pieces_expected == self.pieces_found
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub expected: Fingerprint,
    pub computed: Fingerprint,
    /// The verdict: fresh fingerprint of the data equals `expected`.
    pub fingerprint_ok: bool,
    /// Whether the descriptor file itself carries `expected`; `None` without a descriptor.
    pub descriptor_ok: Option<bool>,
    pub pieces: Option<PieceCheck>,
}

impl VerifyReport {
    pub fn corrupted(&self) -> &[PathBuf] {
        self.pieces.as_ref().map(|p| p.corrupted.as_slice()).unwrap_or(&[])
    }
}

#[derive(Clone, Debug, Default)]
pub struct VerifyOptions {
    /// Used to rebuild the fingerprint; the piece length is taken from the
    /// descriptor when one is supplied.
    pub build: BuildOptions,
    pub policy: PathPolicy,
}

pub struct Verifier {
    descriptor: ContentDescriptor,
    policy: PathPolicy,
}

impl Verifier {
    pub fn new(descriptor: ContentDescriptor) -> Self {
        Self { descriptor, policy: PathPolicy::default() }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(Envelope::read(path)?.info))
    }

    pub fn with_policy(mut self, policy: PathPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn descriptor(&self) -> &ContentDescriptor {
        &self.descriptor
    }

    /// Stream the described files found under `base` and compare every
    /// piece with the stored digest.
    pub fn check_pieces(&self, base: &Path) -> Result<PieceCheck> {
        let d = &self.descriptor;
        validate_segment(&d.name)?;
        if let Layout::Multi { files } = &d.layout {
            for f in files {
                f.path.iter().try_for_each(|s| validate_segment(s))?;
            }
        }
        let rels = d.relative_files();
        let paths = rels
            .iter()
            .map(|r| validate_path(base, r, self.policy))
            .collect::<Result<Vec<_>>>()?;
        for p in &paths {
            // missing files are an error, not corruption
            fs::metadata(p).map_err(|e| Error::io(p, e))?;
        }
        let piece_length = usize::try_from(d.piece_length)
            .map_err(|_| Error::invalid(format!("piece length {} too large", d.piece_length)))?;

        let mut reader = PieceReader::new(paths, piece_length)?;
        let mut flagged = vec![false; rels.len()];
        let mut order = Vec::new();
        let mut flag = |i: usize, flagged: &mut Vec<bool>| {
            if !flagged[i] {
                flagged[i] = true;
                order.push(i);
            }
        };
        let (mut ok, mut bad, mut found) = (0u64, 0u64, 0u64);
        while let Some(piece) = reader.next_piece()? {
            found += 1;
            if d.pieces.get(piece.index) == Some(&piece.digest()) {
                ok += 1;
            } else {
                bad += 1;
                debug!("piece {} mismatch (sources {:?})", piece.index, piece.sources);
                for &s in piece.sources {
                    flag(s, &mut flagged);
                }
            }
        }
        let expected = d.pieces.len() as u64;
        if expected != found {
            debug!("piece count mismatch: stored {expected}, found {found}");
            if let Some(last) = reader.last_touched().or_else(|| rels.len().checked_sub(1)) {
                flag(last, &mut flagged);
            }
        }

        let corrupted: Vec<PathBuf> = order.into_iter().map(|i| rels[i].clone()).collect();
        for c in &corrupted {
            warn!("{} seems to be corrupted!", c.display());
        }
        Ok(PieceCheck { pieces_ok: ok, pieces_bad: bad, pieces_expected: expected, pieces_found: found, corrupted })
    }
}

/// Check the data at `root` against `expected`.
///
/// With a descriptor, every described file is also checked piece by piece
/// and corrupted files are reported; the verdict is still fingerprint
/// equality.
pub fn verify(
    root: &Path,
    expected: &Fingerprint,
    descriptor: Option<&Path>,
    opts: &VerifyOptions,
) -> Result<VerifyReport> {
    let mut build = opts.build.clone();
    let (pieces, descriptor_ok) = match descriptor {
        None => (None, None),
        Some(dp) => {
            let verifier = Verifier::from_file(dp)?.with_policy(opts.policy);
            fs::metadata(root).map_err(|e| Error::io(root, e))?;
            let root_abs = lexical_absolute(root)?;
            let name = root_name(&root_abs)?;
            if name != verifier.descriptor().name {
                return Err(Error::invalid(format!(
                    "descriptor describes {:?} but the data root is named {:?}",
                    verifier.descriptor().name,
                    name
                )));
            }
            let base = root_abs
                .parent()
                .ok_or_else(|| Error::invalid(format!("{} has no parent directory", root_abs.display())))?;
            let check = verifier.check_pieces(base)?;
            build.piece_length = usize::try_from(verifier.descriptor().piece_length)
                .map_err(|_| Error::invalid("descriptor piece length too large"))?;
            let descriptor_fp = verifier.descriptor().fingerprint();
            if descriptor_fp != *expected {
                warn!("descriptor {} has fingerprint {}, not {}", dp.display(), descriptor_fp, expected);
            }
            (Some(check), Some(descriptor_fp == *expected))
        }
    };
    let computed = DescriptorBuilder::new(build).build(root)?.fingerprint;
    Ok(VerifyReport { expected: *expected, computed, fingerprint_ok: computed == *expected, descriptor_ok, pieces })
}

/// Verify `path` against a hex fingerprint with default options.
pub fn verify_data(path: &Path, fingerprint: &str, descriptor_path: Option<&Path>) -> Result<bool> {
    let expected: Fingerprint = fingerprint.parse()?;
    Ok(verify(path, &expected, descriptor_path, &VerifyOptions::default())?.fingerprint_ok)
}
