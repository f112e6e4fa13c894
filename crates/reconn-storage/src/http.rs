//! Object store speaking the blob-service REST dialect:
//! `GET`/`PUT {endpoint}/{container}/{name}?{sas}` with block-blob uploads.

use crate::{check_name, ObjectStore, StorageError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";

/// Uploads of large voice models can be slow.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct HttpBlobStore {
    client: Client,
    endpoint: String,
    sas_token: String,
}

impl fmt::Debug for HttpBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBlobStore")
            .field("endpoint", &self.endpoint)
            .field("sas_token", &"[REDACTED]")
            .finish()
    }
}

impl HttpBlobStore {
    /// Creates a store rooted at `endpoint`. `sas_token` is appended as the
    /// query string of every request; pass an empty string for none.
    pub fn new(
        endpoint: impl Into<String>,
        sas_token: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Unavailable(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            sas_token: sas_token.into().trim_start_matches('?').to_string(),
        })
    }

    fn url(&self, container: &str, name: &str) -> Result<String, StorageError> {
        check_name(container)?;
        check_name(name)?;
        let mut url = format!("{}/{}/{}", self.endpoint, container, name);
        if !self.sas_token.is_empty() {
            url.push('?');
            url.push_str(&self.sas_token);
        }
        Ok(url)
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        body: reqwest::Body,
        len: Option<u64>,
    ) -> Result<(), StorageError> {
        let mut request = self
            .client
            .put(self.url(container, name)?)
            .header(BLOB_TYPE_HEADER, "BlockBlob")
            .body(body);
        if let Some(len) = len {
            request = request.header(reqwest::header::CONTENT_LENGTH, len);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StorageError::Unavailable(format!(
                "upload of {container}/{name} rejected with status {}",
                response.status()
            )));
        }
        tracing::debug!(container, name, "uploaded blob");
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for HttpBlobStore {
    async fn download_to(
        &self,
        container: &str,
        name: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError> {
        let mut response = self
            .client
            .get(self.url(container, name)?)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(StorageError::NotFound {
                    container: container.to_string(),
                    name: name.to_string(),
                })
            }
            status if !status.is_success() => {
                return Err(StorageError::Unavailable(format!(
                    "download of {container}/{name} failed with status {status}"
                )))
            }
            _ => {}
        }

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?
        {
            dest.write_all(&chunk)
                .await
                .map_err(|e| StorageError::Unavailable(format!("write failed: {e}")))?;
            written += chunk.len() as u64;
        }
        dest.flush()
            .await
            .map_err(|e| StorageError::Unavailable(format!("flush failed: {e}")))?;
        Ok(written)
    }

    async fn upload_file(
        &self,
        container: &str,
        name: &str,
        file: tokio::fs::File,
    ) -> Result<(), StorageError> {
        let len = file.metadata().await.ok().map(|m| m.len());
        self.put(container, name, reqwest::Body::from(file), len)
            .await
    }

    async fn upload_buffer(
        &self,
        container: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.put(
            container,
            name,
            reqwest::Body::from(bytes.to_vec()),
            Some(bytes.len() as u64),
        )
        .await
    }
}
