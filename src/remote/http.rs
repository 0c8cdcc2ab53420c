//! REST client for a remote document store.
//!
//! Wire format (served by this crate's own `/v1/documents` routes too):
//! - `GET    {base}/v1/documents/{collection}/{key}` → 200 JSON object, or 404
//! - `PATCH  {base}/v1/documents/{collection}/{key}` → merge top-level keys
//! - `PUT    {base}/v1/documents/{collection}/{key}` → replace the document

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{DocumentPath, DocumentStore, SetOptions, StoreError, StoreResult};
use crate::document::Document;

/// Document store reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpDocumentStore {
    /// Create a client whose requests are bounded by `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout,
        })
    }

    /// Send a bearer token with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn document_url(&self, path: &DocumentPath) -> String {
        format!(
            "{}/v1/documents/{}/{}",
            self.base_url, path.collection, path.key
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn map_transport(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Http(err)
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get_document(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        let url = self.document_url(path);
        debug!("GET {}", url);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Status {
                status: response.status().as_u16(),
                path: path.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.map_transport(e))?;
        match serde_json::from_slice::<Value>(&body)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(StoreError::Malformed(path.to_string())),
        }
    }

    async fn set_document(
        &self,
        path: &DocumentPath,
        doc: &Document,
        options: SetOptions,
    ) -> StoreResult<()> {
        let url = self.document_url(path);
        let request = if options.merge {
            self.client.patch(&url)
        } else {
            self.client.put(&url)
        };
        debug!("{} {}", if options.merge { "PATCH" } else { "PUT" }, url);

        let response = self
            .authorize(request.json(doc))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        if !response.status().is_success() {
            return Err(StoreError::Status {
                status: response.status().as_u16(),
                path: path.to_string(),
            });
        }
        Ok(())
    }
}
