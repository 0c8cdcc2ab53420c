//! Local cache of the last-known configuration document.
//!
//! The cache is a single durable slot that can be read synchronously at
//! startup. It is a best-effort mirror: absence and corruption both read as a
//! cache miss.

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::document::Document;

/// Errors that can occur while writing the cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Sled database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Synchronous key-value slot holding one configuration document.
pub trait LocalCache: Send + Sync {
    /// Last written document, or `None` if the slot is empty or unreadable.
    fn read(&self) -> Option<Document>;

    /// Replace the cached document.
    fn write(&self, doc: &Document) -> CacheResult<()>;
}

/// Decode a raw cache entry, treating anything but a JSON object as a miss.
pub(crate) fn decode_entry(raw: &[u8]) -> Option<Document> {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        Ok(other) => {
            debug!("Ignoring cache entry that is not an object: {}", other);
            None
        }
        Err(e) => {
            debug!("Ignoring unparsable cache entry: {}", e);
            None
        }
    }
}

/// In-process cache, used by tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: Mutex<Option<Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with a document
    pub fn with_document(doc: &Document) -> CacheResult<Self> {
        let cache = Self::new();
        cache.write(doc)?;
        Ok(cache)
    }

    /// Pre-populate with raw bytes, which need not be valid
    pub fn with_raw(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            slot: Mutex::new(Some(raw.into())),
        }
    }
}

impl LocalCache for MemoryCache {
    fn read(&self) -> Option<Document> {
        self.slot.lock().as_deref().and_then(decode_entry)
    }

    fn write(&self, doc: &Document) -> CacheResult<()> {
        let bytes = serde_json::to_vec(doc)?;
        *self.slot.lock() = Some(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_cache_is_miss() {
        assert!(MemoryCache::new().read().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let cache = MemoryCache::new();
        let mut doc = Document::new();
        doc.insert("siteName".into(), json!("Acme"));

        cache.write(&doc).unwrap();
        assert_eq!(cache.read(), Some(doc));
    }

    #[test]
    fn test_corrupt_entry_is_miss() {
        assert!(MemoryCache::with_raw(b"{not json".to_vec()).read().is_none());
        assert!(MemoryCache::with_raw(b"[1,2,3]".to_vec()).read().is_none());
    }
}
