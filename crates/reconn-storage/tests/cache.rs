use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use reconn_storage::{ArtifactCache, FsObjectStore, HttpBlobStore, ObjectStore, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWrite;

/// Wraps a store and counts downloads.
struct CountingStore {
    inner: FsObjectStore,
    downloads: AtomicUsize,
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn download_to(
        &self,
        container: &str,
        name: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.inner.download_to(container, name, dest).await
    }

    async fn upload_file(
        &self,
        container: &str,
        name: &str,
        file: tokio::fs::File,
    ) -> Result<(), StorageError> {
        self.inner.upload_file(container, name, file).await
    }

    async fn upload_buffer(
        &self,
        container: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.inner.upload_buffer(container, name, bytes).await
    }
}

fn counting(root: &std::path::Path) -> Arc<CountingStore> {
    Arc::new(CountingStore {
        inner: FsObjectStore::new(root),
        downloads: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn fetch_downloads_once() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(remote.path().join("samples")).unwrap();
    std::fs::write(remote.path().join("samples/a.wav"), b"RIFF-sample").unwrap();

    let store = counting(remote.path());
    let cache = ArtifactCache::new(store.clone());

    let first = cache.fetch("samples", "a.wav", local.path()).await.unwrap();
    let second = cache.fetch("samples", "a.wav", local.path()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(std::fs::read(&first).unwrap(), b"RIFF-sample");
    assert_eq!(store.downloads.load(Ordering::SeqCst), 1);

    // no temp files left behind
    let entries: Vec<_> = std::fs::read_dir(local.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn zero_byte_file_is_downloaded_again() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(remote.path().join("models")).unwrap();
    std::fs::write(remote.path().join("models/m.npz"), b"model").unwrap();
    std::fs::write(local.path().join("m.npz"), b"").unwrap();

    let store = counting(remote.path());
    let cache = ArtifactCache::new(store.clone());
    let path = cache.fetch("models", "m.npz", local.path()).await.unwrap();

    assert_eq!(std::fs::read(path).unwrap(), b"model");
    assert_eq!(store.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_remote_object_leaves_no_partial_file() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(Arc::new(FsObjectStore::new(remote.path())));

    let err = cache
        .fetch("samples", "nope.wav", local.path())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }), "{err}");
    assert_eq!(std::fs::read_dir(local.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_local_dir_is_a_local_error() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(Arc::new(FsObjectStore::new(remote.path())));

    let err = cache
        .fetch("samples", "a.wav", &local.path().join("absent"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::LocalIo { .. }), "{err}");
}

#[tokio::test]
async fn unreachable_store_is_unavailable() {
    let local = tempfile::tempdir().unwrap();
    let store = HttpBlobStore::new("http://127.0.0.1:1", "").unwrap();
    let cache = ArtifactCache::new(Arc::new(store));

    let err = cache
        .fetch("samples", "a.wav", local.path())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)), "{err}");
}

#[tokio::test]
async fn publish_writes_locally_and_remotely() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(Arc::new(FsObjectStore::new(remote.path())));

    let path = cache
        .publish("output", "reply-1.wav", local.path(), b"speech")
        .await
        .unwrap();

    assert_eq!(path, local.path().join("reply-1.wav"));
    assert_eq!(std::fs::read(&path).unwrap(), b"speech");
    assert_eq!(
        std::fs::read(remote.path().join("output/reply-1.wav")).unwrap(),
        b"speech"
    );
}

#[tokio::test]
async fn publish_from_local_file_uploads_existing_file() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    std::fs::write(local.path().join("sample-3.npz"), b"weights").unwrap();
    let cache = ArtifactCache::new(Arc::new(FsObjectStore::new(remote.path())));

    cache
        .publish_from_local_file("models", "sample-3.npz", local.path())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read(remote.path().join("models/sample-3.npz")).unwrap(),
        b"weights"
    );
}

#[tokio::test]
async fn invalid_names_are_rejected_before_io() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(Arc::new(FsObjectStore::new(remote.path())));

    let err = cache
        .publish("output", "../escape.wav", local.path(), b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidName(_)));
}

type Blobs = Arc<Mutex<HashMap<String, Vec<u8>>>>;

async fn get_blob(
    State(blobs): State<Blobs>,
    AxumPath((container, name)): AxumPath<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Vec<u8>, StatusCode> {
    if query.get("sig").map(String::as_str) != Some("secret") {
        return Err(StatusCode::FORBIDDEN);
    }
    blobs
        .lock()
        .unwrap()
        .get(&format!("{container}/{name}"))
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

async fn put_blob(
    State(blobs): State<Blobs>,
    AxumPath((container, name)): AxumPath<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if headers.get("x-ms-blob-type").and_then(|v| v.to_str().ok()) != Some("BlockBlob") {
        return StatusCode::BAD_REQUEST;
    }
    blobs
        .lock()
        .unwrap()
        .insert(format!("{container}/{name}"), body.to_vec());
    StatusCode::CREATED
}

#[tokio::test]
async fn http_store_round_trips_through_blob_service() {
    let blobs: Blobs = Arc::default();
    let router = Router::new()
        .route("/{container}/{name}", get(get_blob).put(put_blob))
        .with_state(blobs.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let store = HttpBlobStore::new(format!("http://{addr}/"), "?sig=secret").unwrap();
    let local = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(Arc::new(store));

    cache
        .publish("output", "reply-9.wav", local.path(), b"audio-bytes")
        .await
        .unwrap();
    assert_eq!(
        blobs.lock().unwrap().get("output/reply-9.wav").cloned(),
        Some(b"audio-bytes".to_vec())
    );

    let other = tempfile::tempdir().unwrap();
    let path = cache
        .fetch("output", "reply-9.wav", other.path())
        .await
        .unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"audio-bytes");

    let err = cache
        .fetch("output", "missing.wav", other.path())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }), "{err}");
}

#[test]
fn http_store_debug_hides_the_signature() {
    let store = HttpBlobStore::new("http://blob.local", "sig=secret").unwrap();
    let debug = format!("{store:?}");
    assert!(!debug.contains("secret"));
}
