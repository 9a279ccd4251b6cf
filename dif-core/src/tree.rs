use crate::error::{Error, Result};
use log::debug;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// A regular file found under a directory root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the root, one text segment per component.
    pub segments: Vec<String>,
    pub abs_path: PathBuf,
    /// Lowercase hex MD5 of the `/`-joined segments.
    pub order_key: String,
}

/// Ordering key of a relative path. Files are laid out in ascending key
/// order, not path order; existing descriptors depend on this.
pub fn order_key(segments: &[String]) -> String {
    format!("{:x}", md5::compute(segments.join("/")))
}

/// Every regular file under `root`, sorted by [`order_key`].
///
/// Symlinks to regular files are hashed through and a dangling symlink is
/// an error. Directory symlinks and special files are skipped.
pub fn enumerate(root: &Path) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    for ent in walkdir::WalkDir::new(root).min_depth(1) {
        let ent = ent.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            match e.into_io_error() {
                Some(io) => Error::io(path, io),
                None => Error::invalid(format!("filesystem loop under {}", root.display())),
            }
        })?;
        let p = ent.path();
        let ft = ent.file_type();
        // file symlinks are hashed through; directory symlinks are not descended
        let is_file = ft.is_file() || (ft.is_symlink() && fs::metadata(p).map_err(|e| Error::io(p, e))?.is_file());
        if !is_file {
            continue;
        }
        let rel = pathdiff::diff_paths(p, root)
            .ok_or_else(|| Error::invalid(format!("{} is not under {}", p.display(), root.display())))?;
        let segments = segments_of(&rel)?;
        let order_key = order_key(&segments);
        entries.push(TreeEntry { segments, abs_path: p.to_path_buf(), order_key });
    }
    entries.sort_by(|a, b| a.order_key.cmp(&b.order_key).then_with(|| a.segments.cmp(&b.segments)));
    debug!("enumerated {} file(s) under {}", entries.len(), root.display());
    Ok(entries)
}

fn segments_of(rel: &Path) -> Result<Vec<String>> {
    rel.components()
        .map(|c| match c {
            Component::Normal(s) => s
                .to_str()
                .map(str::to_string)
                .ok_or_else(|| Error::invalid(format!("non-UTF-8 file name in {}", rel.display()))),
            other => Err(Error::invalid(format!(
                "unexpected component {:?} in {}",
                other.as_os_str(),
                rel.display()
            ))),
        })
        .collect()
}
