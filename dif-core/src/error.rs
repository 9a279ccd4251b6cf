use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("i/o error on '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("bencode: {0}")]
    Codec(String),

    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("unsafe path: {0}")]
    UnsafePath(String),
}

impl Error {
    /// Attach `path` to an I/O failure, promoting `NotFound` to [`Error::FileNotFound`].
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == io::ErrorKind::NotFound {
            Error::FileNotFound { path }
        } else {
            Error::Io { path, source }
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
