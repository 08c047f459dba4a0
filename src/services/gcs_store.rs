//! Google Cloud Storage backend speaking the JSON API over `reqwest`.
//!
//! One `GcsBlobStore` (and its connection pool) is built at startup and
//! shared by every request. The endpoint can point at an emulator.

use super::blob_store::{BlobStore, StorageError, StorageResult, read_local};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url, header};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const PUBLIC_HOST: &str = "https://storage.googleapis.com";

#[derive(Clone)]
pub struct GcsBlobStore {
    client: Client,
    endpoint: Url,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

impl GcsBlobStore {
    pub fn new(endpoint: &str, access_token: Option<String>) -> StorageResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|err| {
            StorageError::StorageUnavailable(format!("invalid endpoint `{}`: {}", endpoint, err))
        })?;
        Ok(Self {
            client: Client::new(),
            endpoint,
            access_token,
        })
    }

    fn url(&self, segments: &[&str]) -> StorageResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                StorageError::StorageUnavailable(format!(
                    "endpoint `{}` cannot carry a path",
                    self.endpoint
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn unavailable(err: reqwest::Error) -> StorageError {
    warn!(
        "GCS request failed: {err} (timeout={}, connect={})",
        err.is_timeout(),
        err.is_connect()
    );
    StorageError::StorageUnavailable(err.to_string())
}

async fn status_error(context: &str, response: reqwest::Response) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(300).collect();
    StorageError::StorageUnavailable(format!("{} returned {}: {}", context, status, body))
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    /// Follows `nextPageToken` so the whole bucket is returned.
    async fn list_names(&self, bucket: &str) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.url(&["storage", "v1", "b", bucket, "o"])?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let response = self
                .authorize(self.client.get(url))
                .send()
                .await
                .map_err(unavailable)?;
            if !response.status().is_success() {
                return Err(status_error("list objects", response).await);
            }

            let page: ObjectList = response.json().await.map_err(unavailable)?;
            names.extend(page.items.into_iter().map(|item| item.name));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(bucket, count = names.len(), "listed bucket");
        Ok(names)
    }

    async fn upload(
        &self,
        bucket: &str,
        local_path: &Path,
        name: &str,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let data = read_local(local_path).await?;
        let mut url = self.url(&["upload", "storage", "v1", "b", bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", name);

        let response = self
            .authorize(self.client.post(url))
            .header(
                header::CONTENT_TYPE,
                content_type.unwrap_or("application/octet-stream"),
            )
            .body(data)
            .send()
            .await
            .map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(status_error("upload object", response).await);
        }

        debug!(bucket, name, "uploaded object");
        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        name: &str,
        local_path: &Path,
    ) -> StorageResult<PathBuf> {
        let mut url = self.url(&["storage", "v1", "b", bucket, "o", name])?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(status_error("download object", response).await);
        }

        let bytes = response.bytes().await.map_err(unavailable)?;
        fs::write(local_path, &bytes).await?;
        Ok(local_path.to_path_buf())
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("{}/{}/{}", PUBLIC_HOST, bucket, name)
    }
}
