//! Artifact storage for the reconn platform.
//!
//! Audio samples, voice models, and synthesized speech live in an object
//! store (one container per artifact kind) and are memoized on local disk
//! by [`ArtifactCache`]. The object store itself sits behind the
//! [`ObjectStore`] trait with two backends: a directory tree
//! ([`FsObjectStore`]) and an HTTP blob service addressed with a shared
//! access signature ([`HttpBlobStore`]).

mod cache;
mod error;
mod fs;
mod http;

pub use cache::ArtifactCache;
pub use error::StorageError;
pub use fs::FsObjectStore;
pub use http::HttpBlobStore;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

/// Remote object storage, addressed by container and object name.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Streams the object's content into `dest`, returning the byte count.
    async fn download_to(
        &self,
        container: &str,
        name: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError>;

    /// Uploads the content of an open local file.
    async fn upload_file(
        &self,
        container: &str,
        name: &str,
        file: tokio::fs::File,
    ) -> Result<(), StorageError>;

    /// Uploads an in-memory buffer.
    async fn upload_buffer(
        &self,
        container: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError>;
}

/// Rejects object names that would escape a container or a local directory.
pub(crate) fn check_name(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}
