//! Sled-backed persistence.
//!
//! One embedded database serves two roles: the durable local cache slot the
//! synchronizer hydrates from at startup, and the backing store for the
//! `/v1/documents` endpoints when this process acts as the remote store.

mod sled_store;

pub use sled_store::{SledCache, SledDocumentStore};

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::remote::DocumentPath;

/// Errors that can occur opening storage
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Sled database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Storage initialization failed: {0}")]
    InitFailed(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata stored alongside each document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// `collection/key`
    pub path: String,
    /// Unix timestamp of first write
    pub created_at: i64,
    /// Unix timestamp of last write
    pub updated_at: i64,
    /// Number of writes applied
    pub write_count: u64,
    /// Size of the stored document in bytes
    pub size_bytes: u64,
}

impl DocumentMetadata {
    pub fn new(path: &DocumentPath) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            path: path.to_string(),
            created_at: now,
            updated_at: now,
            write_count: 0,
            size_bytes: 0,
        }
    }
}

/// Configuration for the storage layer
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the Sled database directory
    pub path: String,
    /// Cache size in bytes (default: 64MB)
    pub cache_size: u64,
    /// Flush interval in milliseconds (0 = flush on every write)
    pub flush_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./data/site.sled".to_string(),
            cache_size: 64 * 1024 * 1024,
            flush_interval_ms: 500,
        }
    }
}

impl StorageConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Open (or create) the sled database described by `config`
pub fn open(config: &StorageConfig) -> StorageResult<sled::Db> {
    let path = Path::new(&config.path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::InitFailed(format!("Failed to create directory: {}", e))
        })?;
    }

    let db = sled::Config::new()
        .path(&config.path)
        .cache_capacity(config.cache_size)
        .flush_every_ms(if config.flush_interval_ms > 0 {
            Some(config.flush_interval_ms)
        } else {
            None
        })
        .open()?;

    Ok(db)
}
