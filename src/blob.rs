//! Blob storage for images referenced by the configuration (slides, logo,
//! gallery). Uploading returns the public URL that panels store in the
//! document.
//!
//! Object keys are content-addressed, so uploading the same file twice yields
//! the same URL.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Largest accepted upload (10MB)
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Errors that can occur during uploads
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object store returned status {status} for {key}")]
    Status { status: u16, key: String },

    #[error("Upload is empty")]
    Empty,

    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Uploads a file and returns its public URL
#[async_trait]
pub trait BlobUploader: Send + Sync {
    async fn upload(&self, file_name: &str, content_type: &str, data: Bytes) -> BlobResult<String>;
}

/// `sha256(data)` in hex, followed by the lowercased extension of `file_name`
pub fn object_key(file_name: &str, data: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(data));
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}.{}", digest, ext.to_lowercase())
        }
        _ => digest,
    }
}

fn check_size(data: &[u8]) -> BlobResult<()> {
    if data.is_empty() {
        return Err(BlobError::Empty);
    }
    if data.len() > MAX_UPLOAD_BYTES {
        return Err(BlobError::TooLarge {
            size: data.len(),
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// Uploads with `PUT {base_url}/{key}`
#[derive(Debug, Clone)]
pub struct HttpBlobUploader {
    client: Client,
    base_url: String,
    public_url: String,
    token: Option<String>,
}

impl HttpBlobUploader {
    pub fn new(
        base_url: impl Into<String>,
        public_url: impl Into<String>,
        timeout: Duration,
    ) -> BlobResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl BlobUploader for HttpBlobUploader {
    async fn upload(&self, file_name: &str, content_type: &str, data: Bytes) -> BlobResult<String> {
        check_size(&data)?;
        let key = object_key(file_name, &data);
        let url = format!("{}/{}", self.base_url, key);
        debug!("PUT {} ({} bytes)", url, data.len());

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(BlobError::Status {
                status: response.status().as_u16(),
                key,
            });
        }

        info!("Uploaded {} as {}", file_name, key);
        Ok(format!("{}/{}", self.public_url, key))
    }
}

/// A stored object
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub content_type: String,
    pub data: Bytes,
}

/// Keeps uploads in memory; used when no object store is configured
#[derive(Debug)]
pub struct MemoryBlobStore {
    objects: DashMap<String, StoredBlob>,
    public_url: String,
}

impl MemoryBlobStore {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            objects: DashMap::new(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredBlob> {
        self.objects.get(key).map(|b| b.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl BlobUploader for MemoryBlobStore {
    async fn upload(&self, file_name: &str, content_type: &str, data: Bytes) -> BlobResult<String> {
        check_size(&data)?;
        let key = object_key(file_name, &data);
        self.objects.insert(
            key.clone(),
            StoredBlob {
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(format!("{}/{}", self.public_url, key))
    }
}
