//! Local memoization of remote artifacts.
//!
//! `fetch` downloads an object at most once per local directory: a
//! non-empty file at the destination path is trusted as a prior download.
//! Downloads land in a temporary sibling first and are renamed into place,
//! so a concurrent reader never observes a half-written file.

use crate::{check_name, ObjectStore, StorageError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct ArtifactCache {
    store: Arc<dyn ObjectStore>,
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Ensures `container/name` is present in `local_dir` and returns its path.
    pub async fn fetch(
        &self,
        container: &str,
        name: &str,
        local_dir: &Path,
    ) -> Result<PathBuf, StorageError> {
        check_name(name)?;
        ensure_dir(local_dir).await?;

        let path = local_dir.join(name);
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_file() && meta.len() > 0 {
                tracing::debug!(container, name, "artifact cache hit");
                return Ok(path);
            }
        }

        let part = local_dir.join(format!(
            ".{}.part-{}-{}",
            name,
            std::process::id(),
            PART_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        match self.download(container, name, &part).await {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::rename(&part, &path).await {
                    let _ = tokio::fs::remove_file(&part).await;
                    return Err(StorageError::local(&path, e));
                }
                tracing::info!(container, name, bytes, "fetched artifact");
                Ok(path)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn download(
        &self,
        container: &str,
        name: &str,
        part: &Path,
    ) -> Result<u64, StorageError> {
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| StorageError::local(part, e))?;
        let bytes = self.store.download_to(container, name, &mut file).await?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::local(part, e))?;
        Ok(bytes)
    }

    /// Writes `bytes` to `local_dir/name` and uploads them to `container/name`.
    pub async fn publish(
        &self,
        container: &str,
        name: &str,
        local_dir: &Path,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        check_name(name)?;
        ensure_dir(local_dir).await?;

        let path = local_dir.join(name);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| StorageError::local(&path, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| StorageError::local(&path, e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::local(&path, e))?;

        self.store.upload_buffer(container, name, bytes).await?;
        tracing::info!(container, name, bytes = bytes.len(), "published artifact");
        Ok(path)
    }

    /// Uploads an existing `local_dir/name` to `container/name`.
    pub async fn publish_from_local_file(
        &self,
        container: &str,
        name: &str,
        local_dir: &Path,
    ) -> Result<PathBuf, StorageError> {
        check_name(name)?;
        let path = local_dir.join(name);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| StorageError::local(&path, e))?;
        self.store.upload_file(container, name, file).await?;
        tracing::info!(container, name, "published local artifact");
        Ok(path)
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(StorageError::local(
            dir,
            std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
        )),
        Err(e) => Err(StorageError::local(dir, e)),
    }
}
