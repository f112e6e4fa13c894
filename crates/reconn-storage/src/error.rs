use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing object store could not be reached or refused the request.
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    #[error("object not found: {container}/{name}")]
    NotFound { container: String, name: String },

    /// The local cache directory is missing, not a directory, or not writable.
    #[error("local i/o error at {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid object name: {0:?}")]
    InvalidName(String),
}

impl StorageError {
    pub(crate) fn local(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }
}
