//! LocalBlobStore — a bucket kept on this machine: metadata in SQLite,
//! payloads on disk sharded beneath `base_path/{bucket}/{shard}/{shard}/{name}`.

use super::blob_store::{BlobStore, StorageError, StorageResult};
use crate::models::object::{ObjectRecord, validate_object_name};
use async_trait::async_trait;
use chrono::Utc;
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");
const READ_CHUNK: usize = 64 * 1024;

#[derive(Clone)]
pub struct LocalBlobStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    fn ensure_name_safe(name: &str) -> StorageResult<()> {
        validate_object_name(name).map_err(StorageError::InvalidObjectName)
    }

    /// Two-level shard identifiers from MD5(bucket/name).
    fn object_shards(bucket: &str, name: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, name));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket: &str, name: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, name);
        let mut path = self.base_path.clone();
        path.push(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(name);
        path
    }

    async fn fetch_record(&self, bucket: &str, name: &str) -> StorageResult<ObjectRecord> {
        sqlx::query_as::<_, ObjectRecord>(
            "SELECT bucket, name, content_type, size_bytes, etag, last_modified
             FROM objects WHERE bucket = ? AND name = ?",
        )
        .bind(bucket)
        .bind(name)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn list_names(&self, bucket: &str) -> StorageResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM objects WHERE bucket = ?")
            .bind(bucket)
            .fetch_all(&*self.db)
            .await?;
        Ok(names)
    }

    /// Copies the local file into a temp file beside its final location,
    /// hashing as it goes, then renames it into place and upserts metadata.
    async fn upload(
        &self,
        bucket: &str,
        local_path: &Path,
        name: &str,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        Self::ensure_name_safe(name)?;

        let mut source = File::open(local_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::LocalFileMissing(local_path.to_path_buf())
            } else {
                StorageError::Io(err)
            }
        })?;

        let file_path = self.object_path(bucket, name);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let copied = copy_hashing(&mut source, &tmp_path).await;
        let (size_bytes, etag) = match copied {
            Ok(v) => v,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO objects (bucket, name, content_type, size_bytes, etag, last_modified)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket, name) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(bucket)
        .bind(name)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        debug!(bucket, name, size_bytes, etag = %etag, "stored object");
        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        name: &str,
        local_path: &Path,
    ) -> StorageResult<PathBuf> {
        Self::ensure_name_safe(name)?;
        self.fetch_record(bucket, name).await?;

        let file_path = self.object_path(bucket, name);
        fs::copy(&file_path, local_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    name: name.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;
        Ok(local_path.to_path_buf())
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("file://{}", self.object_path(bucket, name).display())
    }
}

/// Copy `source` into a new file at `dest`, returning its size and MD5.
async fn copy_hashing(source: &mut File, dest: &Path) -> io::Result<(i64, String)> {
    let mut file = File::create(dest).await?;
    let mut digest = Context::new();
    let mut size_bytes: i64 = 0;
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        size_bytes += n as i64;
        digest.consume(&buf[..n]);
        file.write_all(&buf[..n]).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok((size_bytes, format!("{:x}", digest.compute())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store_in(dir: &Path) -> LocalBlobStore {
        // An in-memory database lives per connection, so pin the pool to one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = LocalBlobStore::new(Arc::new(pool), dir.join("objects"));
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn round_trip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let src = dir.path().join("upload.jpg");
        let out = dir.path().join("download.jpg");

        fs::write(&src, b"version one").await.unwrap();
        store
            .upload("photos", &src, "cat.jpg", Some("image/jpeg"))
            .await
            .unwrap();
        fs::write(&src, b"version two").await.unwrap();
        store
            .upload("photos", &src, "cat.jpg", Some("image/jpeg"))
            .await
            .unwrap();

        assert_eq!(store.list_names("photos").await.unwrap(), vec!["cat.jpg"]);
        store.download("photos", "cat.jpg", &out).await.unwrap();
        assert_eq!(fs::read(&out).await.unwrap(), b"version two");

        let record = store.fetch_record("photos", "cat.jpg").await.unwrap();
        assert_eq!(record.size_bytes, 11);
        assert_eq!(record.etag, format!("{:x}", md5::compute(b"version two")));
        assert_eq!(record.content_type.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn missing_objects_and_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;

        let err = store
            .download("photos", "missing.jpg", &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound { .. }));

        let err = store
            .upload("photos", &dir.path().join("absent"), "x.jpg", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::LocalFileMissing(_)));
    }

    #[tokio::test]
    async fn rejects_names_that_escape_the_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let src = dir.path().join("src");
        fs::write(&src, b"x").await.unwrap();

        let err = store
            .upload("photos", &src, "../escape.jpg", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidObjectName(_)));
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let src = dir.path().join("src");
        fs::write(&src, b"x").await.unwrap();

        store.upload("a", &src, "one.jpg", None).await.unwrap();
        store.upload("b", &src, "two.jpg", None).await.unwrap();

        assert_eq!(store.list_names("a").await.unwrap(), vec!["one.jpg"]);
        assert!(store.public_url("a", "one.jpg").starts_with("file://"));
        assert!(store.public_url("a", "one.jpg").ends_with("one.jpg"));
    }
}
