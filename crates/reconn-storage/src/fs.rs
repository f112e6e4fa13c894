//! Object store backed by a directory tree: `<root>/<container>/<name>`.
//!
//! Suitable for a single host or a shared network mount.

use crate::{check_name, ObjectStore, StorageError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn object_path(&self, container: &str, name: &str) -> Result<PathBuf, StorageError> {
        check_name(container)?;
        check_name(name)?;
        Ok(self.root.join(container).join(name))
    }

    async fn container_dir(&self, container: &str) -> Result<PathBuf, StorageError> {
        let dir = self.root.join(container);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", dir.display(), e)))?;
        Ok(dir)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn download_to(
        &self,
        container: &str,
        name: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError> {
        let path = self.object_path(container, name)?;
        let mut source = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    container: container.to_string(),
                    name: name.to_string(),
                })
            }
            Err(e) => {
                return Err(StorageError::Unavailable(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let copied = tokio::io::copy(&mut source, &mut *dest)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", path.display(), e)))?;
        dest.flush()
            .await
            .map_err(|e| StorageError::Unavailable(format!("flush failed: {}", e)))?;
        Ok(copied)
    }

    async fn upload_file(
        &self,
        container: &str,
        name: &str,
        mut file: tokio::fs::File,
    ) -> Result<(), StorageError> {
        let path = self.object_path(container, name)?;
        self.container_dir(container).await?;
        let mut dest = tokio::fs::File::create(&path)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", path.display(), e)))?;
        tokio::io::copy(&mut file, &mut dest)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", path.display(), e)))?;
        dest.flush()
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    async fn upload_buffer(
        &self,
        container: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let path = self.object_path(container, name)?;
        self.container_dir(container).await?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", path.display(), e)))
    }
}
