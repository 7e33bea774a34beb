use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Url};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::StorageError;

/// Cloud object storage as seen by the importer and the assembly pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Public URL an object is served from.
    fn public_url(&self, object_name: &str) -> String;

    /// Fail fast when the bucket is unreachable or the credentials are rejected.
    async fn check_bucket(&self) -> Result<(), StorageError>;

    /// Upload a local file, overwriting any object with the same name.
    async fn upload_file(&self, local_path: &Path, object_name: &str) -> Result<(), StorageError>;

    async fn upload_bytes(&self, data: Bytes, object_name: &str) -> Result<(), StorageError>;

    /// Download an object into `dest`, returning the number of bytes written.
    async fn download_to(&self, object_name: &str, dest: &Path) -> Result<u64, StorageError>;
}

pub fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Google Cloud Storage over its JSON upload API and public object URLs.
pub struct GcsStore {
    client: Client,
    bucket: String,
    access_token: Option<String>,
    api_base: Url,
    public_base: Url,
}

impl GcsStore {
    pub fn new(config: &StorageConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build storage HTTP client")?;
        Ok(GcsStore {
            client,
            bucket: config.bucket.clone(),
            access_token: config.access_token.clone(),
            api_base: Url::parse(&config.api_base)
                .with_context(|| format!("Invalid storage API base {}", config.api_base))?,
            public_base: Url::parse(&config.public_base)
                .with_context(|| format!("Invalid storage public base {}", config.public_base))?,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `base` with `segments` appended, each percent-encoded as one path segment.
    fn join_segments<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn object_url(&self, object_name: &str) -> Url {
        Self::join_segments(
            &self.public_base,
            std::iter::once(self.bucket.as_str()).chain(object_name.split('/')),
        )
    }

    fn upload_url(&self, object_name: &str) -> Url {
        let mut url = Self::join_segments(
            &self.api_base,
            ["upload", "storage", "v1", "b", self.bucket.as_str(), "o"],
        );
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object_name);
        url
    }

    async fn send_upload(
        &self,
        object_name: &str,
        body: reqwest::Body,
        content_length: Option<u64>,
    ) -> Result<(), StorageError> {
        let mut request = self
            .client
            .post(self.upload_url(object_name))
            .header(reqwest::header::CONTENT_TYPE, content_type_for(object_name))
            .body(body);
        if let Some(len) = content_length {
            request = request.header(reqwest::header::CONTENT_LENGTH, len);
        }

        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                status: status.as_u16(),
                object: object_name.to_string(),
                body,
            });
        }
        debug!("Uploaded gs://{}/{}", self.bucket, object_name);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn public_url(&self, object_name: &str) -> String {
        self.object_url(object_name).to_string()
    }

    async fn check_bucket(&self) -> Result<(), StorageError> {
        let url = Self::join_segments(&self.api_base, ["storage", "v1", "b", self.bucket.as_str()]);
        let response = self.authorize(self.client.get(url)).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(StorageError::Status {
                status: status.as_u16(),
                object: self.bucket.clone(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    async fn upload_file(&self, local_path: &Path, object_name: &str) -> Result<(), StorageError> {
        let file = tokio::fs::File::open(local_path).await?;
        let len = file.metadata().await?.len();
        let stream = FramedRead::new(file, BytesCodec::new()).map(|chunk| chunk.map(|b| b.freeze()));
        self.send_upload(object_name, reqwest::Body::wrap_stream(stream), Some(len))
            .await
    }

    async fn upload_bytes(&self, data: Bytes, object_name: &str) -> Result<(), StorageError> {
        let len = data.len() as u64;
        self.send_upload(object_name, reqwest::Body::from(data), Some(len))
            .await
    }

    async fn download_to(&self, object_name: &str, dest: &Path) -> Result<u64, StorageError> {
        let response = self
            .authorize(self.client.get(self.object_url(object_name)))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                status: status.as_u16(),
                object: object_name.to_string(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}
