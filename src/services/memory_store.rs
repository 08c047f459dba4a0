//! In-process blob store. Used by tests and the `memory` backend option.

use super::blob_store::{BlobStore, StorageError, StorageResult, read_local};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::{fs, sync::RwLock};

#[derive(Clone, Debug)]
pub struct StoredBlob {
    pub data: Bytes,
    #[allow(dead_code)] // only read back by tests
    pub content_type: Option<String>,
}

/// Buckets are created implicitly on first upload.
#[derive(Default)]
pub struct MemoryBlobStore {
    buckets: RwLock<HashMap<String, HashMap<String, StoredBlob>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read access for assertions.
    #[cfg(test)]
    pub async fn get(&self, bucket: &str, name: &str) -> Option<StoredBlob> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(name))
            .cloned()
    }

    #[cfg(test)]
    pub async fn insert(&self, bucket: &str, name: &str, data: impl Into<Bytes>) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(
                name.to_string(),
                StoredBlob {
                    data: data.into(),
                    content_type: None,
                },
            );
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list_names(&self, bucket: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .buckets
            .read()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn upload(
        &self,
        bucket: &str,
        local_path: &Path,
        name: &str,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let data = read_local(local_path).await?;
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(
                name.to_string(),
                StoredBlob {
                    data: Bytes::from(data),
                    content_type: content_type.map(str::to_string),
                },
            );
        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        name: &str,
        local_path: &Path,
    ) -> StorageResult<PathBuf> {
        let blob = self
            .buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(name))
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            })?;
        fs::write(local_path, &blob.data).await?;
        Ok(local_path.to_path_buf())
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("memory://{}/{}", bucket, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_download_returns_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.jpg");
        let dst = dir.path().join("dst.jpg");
        fs::write(&src, b"\xff\xd8jpeg bytes").await.unwrap();

        let store = MemoryBlobStore::new();
        store
            .upload("bucket", &src, "cat.jpg", Some("image/jpeg"))
            .await
            .unwrap();

        let out = store.download("bucket", "cat.jpg", &dst).await.unwrap();
        assert_eq!(out, dst);
        assert_eq!(fs::read(&dst).await.unwrap(), b"\xff\xd8jpeg bytes");
        assert_eq!(store.list_names("bucket").await.unwrap(), vec!["cat.jpg"]);
        assert_eq!(
            store.get("bucket", "cat.jpg").await.unwrap().content_type.as_deref(),
            Some("image/jpeg")
        );
    }

    #[tokio::test]
    async fn overwrite_keeps_a_single_object() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let store = MemoryBlobStore::new();

        fs::write(&src, b"first").await.unwrap();
        store.upload("b", &src, "x.jpg", None).await.unwrap();
        fs::write(&src, b"second").await.unwrap();
        store.upload("b", &src, "x.jpg", None).await.unwrap();

        assert_eq!(store.list_names("b").await.unwrap().len(), 1);
        assert_eq!(store.get("b", "x.jpg").await.unwrap().data, "second");
    }

    #[tokio::test]
    async fn missing_object_and_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryBlobStore::new();

        let err = store
            .download("b", "missing.jpg", &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound { .. }));

        let err = store
            .upload("b", &dir.path().join("nope"), "x.jpg", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::LocalFileMissing(_)));
    }

    #[tokio::test]
    async fn buckets_are_isolated() {
        let store = MemoryBlobStore::new();
        store.insert("a", "one.jpg", "1").await;
        assert!(store.list_names("b").await.unwrap().is_empty());
        assert_eq!(store.public_url("a", "one.jpg"), "memory://a/one.jpg");
    }
}
