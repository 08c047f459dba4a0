//! The blob store seam: list, upload, download and link objects in a bucket.
//!
//! Handlers only ever see `Arc<dyn BlobStore>`; the concrete backend is
//! picked once at startup.

use async_trait::async_trait;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    StorageUnavailable(String),
    #[error("object `{name}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, name: String },
    #[error("local file `{}` is missing", .0.display())]
    LocalFileMissing(PathBuf),
    #[error("invalid object name: {0}")]
    InvalidObjectName(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A flat bucket namespace of named blobs.
///
/// Each call is a single round trip to the backend; nothing is cached or
/// retried. Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Every object name in the bucket, in backend order.
    async fn list_names(&self, bucket: &str) -> StorageResult<Vec<String>>;

    /// Read `local_path` in full and store it as `name`, replacing any
    /// existing object of that name.
    async fn upload(
        &self,
        bucket: &str,
        local_path: &Path,
        name: &str,
        content_type: Option<&str>,
    ) -> StorageResult<()>;

    /// Fetch `name` into `local_path`, overwriting whatever is there.
    async fn download(&self, bucket: &str, name: &str, local_path: &Path)
    -> StorageResult<PathBuf>;

    /// Backend-specific public URL. Pure formatting, no I/O.
    fn public_url(&self, bucket: &str, name: &str) -> String;
}

pub type SharedBlobStore = Arc<dyn BlobStore>;

/// Read a local file for upload, mapping a missing file to `LocalFileMissing`.
pub(crate) async fn read_local(local_path: &Path) -> StorageResult<Vec<u8>> {
    tokio::fs::read(local_path).await.map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            StorageError::LocalFileMissing(local_path.to_path_buf())
        } else {
            StorageError::Io(err)
        }
    })
}
