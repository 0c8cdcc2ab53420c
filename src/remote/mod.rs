//! Remote document store client.
//!
//! The authoritative copy of the site configuration lives in a document
//! database addressed by `(collection, key)`. This module defines the client
//! contract and an in-memory implementation; [`http`] talks to a store over
//! REST.

pub mod http;

pub use http::HttpDocumentStore;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::document::Document;

/// Errors that can occur talking to a document store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote returned status {status} for {path}")]
    Status { status: u16, path: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed document at {0}: expected a JSON object")]
    Malformed(String),

    #[error("Sled database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metadata encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Location of a document in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentPath {
    pub collection: String,
    pub key: String,
}

impl DocumentPath {
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
        }
    }
}

impl Default for DocumentPath {
    fn default() -> Self {
        Self::new("site", "config")
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.key)
    }
}

/// Write options for [`DocumentStore::set_document`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOptions {
    /// Overwrite only the supplied top-level keys instead of replacing the document
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }

    pub fn replace() -> Self {
        Self { merge: false }
    }
}

/// Client for a remote document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document. `Ok(None)` means it does not exist yet.
    async fn get_document(&self, path: &DocumentPath) -> StoreResult<Option<Document>>;

    /// Write a document, merging top-level keys when `options.merge` is set.
    async fn set_document(
        &self,
        path: &DocumentPath,
        doc: &Document,
        options: SetOptions,
    ) -> StoreResult<()>;
}

/// Apply a write to the existing stored value.
pub fn apply_write(existing: Option<Document>, incoming: &Document, options: SetOptions) -> Document {
    match existing {
        Some(mut current) if options.merge => {
            for (key, value) in incoming {
                current.insert(key.clone(), value.clone());
            }
            current
        }
        _ => incoming.clone(),
    }
}

/// Document store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<DocumentPath, Document>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without going through the async API
    pub fn insert(&self, path: DocumentPath, doc: Document) {
        self.documents.insert(path, doc);
    }

    /// Synchronous snapshot of a stored document
    pub fn snapshot(&self, path: &DocumentPath) -> Option<Document> {
        self.documents.get(path).map(|d| d.clone())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        Ok(self.snapshot(path))
    }

    async fn set_document(
        &self,
        path: &DocumentPath,
        doc: &Document,
        options: SetOptions,
    ) -> StoreResult<()> {
        // Updated in place under the shard lock: readers never see the entry missing
        self.documents
            .entry(path.clone())
            .and_modify(|current| *current = apply_write(Some(std::mem::take(current)), doc, options))
            .or_insert_with(|| apply_write(None, doc, options));
        Ok(())
    }
}
