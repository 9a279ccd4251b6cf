use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

#[derive(Clone, Copy, Debug, Default)]
pub struct PathPolicy {
    pub follow_symlinks: bool,
}

/// Resolve a descriptor-supplied relative path under `base`.
///
/// Rejects absolute paths, root/prefix components and `..`. Without
/// `follow_symlinks` any symlinked component is refused; with it, the
/// canonical target must stay under `base`.
pub fn validate_path(base: &Path, rel: &Path, policy: PathPolicy) -> Result<PathBuf> {
    if rel.is_absolute() {
        return Err(unsafe_path(format!("absolute paths are not allowed: {:?}", rel)));
    }
    for comp in rel.components() {
        match comp {
            Component::ParentDir => {
                return Err(unsafe_path(format!("parent traversal not allowed: {:?}", rel)))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_path(format!("rooted path not allowed: {:?}", rel)))
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    let candidate = base.join(rel);
    if !policy.follow_symlinks {
        let mut cur = base.to_path_buf();
        for comp in rel.components() {
            cur = cur.join(comp);
            if let Ok(m) = std::fs::symlink_metadata(&cur) {
                if m.file_type().is_symlink() {
                    return Err(unsafe_path(format!("symlink in path (not following): {:?}", cur)));
                }
            }
        }
        Ok(candidate)
    } else {
        let base_can = std::fs::canonicalize(base).map_err(|e| Error::io(base, e))?;
        let cand_can = std::fs::canonicalize(&candidate).map_err(|e| Error::io(&candidate, e))?;
        if !cand_can.starts_with(&base_can) {
            return Err(unsafe_path(format!("path escapes root: {:?}", rel)));
        }
        Ok(cand_can)
    }
}

/// Absolute form of `path` with `.` and `..` resolved textually. Symlinks
/// are left in place, so the last component keeps the caller's name.
pub fn lexical_absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_err(|e| Error::io(path, e))?.join(path)
    };
    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// Check one recorded path segment: non-empty, a single normal component.
pub fn validate_segment(seg: &str) -> Result<()> {
    let mut comps = Path::new(seg).components();
    match (comps.next(), comps.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(unsafe_path(format!("bad path segment {:?}", seg))),
    }
}

fn unsafe_path(msg: String) -> Error {
    Error::UnsafePath(msg)
}
