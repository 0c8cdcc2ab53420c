//! Sled implementations of the local cache and the document store.
//!
//! Documents are stored as JSON bytes keyed by `collection/key`; metadata
//! records are bincode-encoded in a separate tree. The cache slot lives in
//! its own tree so a process can act as both cache owner and remote store.

use async_trait::async_trait;
use sled::{Db, Tree};
use tracing::debug;

use super::DocumentMetadata;
use crate::cache::{decode_entry, CacheResult, LocalCache};
use crate::document::Document;
use crate::remote::{apply_write, DocumentPath, DocumentStore, SetOptions, StoreError, StoreResult};

/// Tree names for different data types
const TREE_DOCUMENTS: &str = "documents";
const TREE_METADATA: &str = "metadata";
const TREE_CACHE: &str = "cache";

/// Sled-based document store
#[derive(Clone)]
pub struct SledDocumentStore {
    db: Db,
    documents: Tree,
    metadata: Tree,
}

impl SledDocumentStore {
    pub fn new(db: &Db) -> StoreResult<Self> {
        Ok(Self {
            db: db.clone(),
            documents: db.open_tree(TREE_DOCUMENTS)?,
            metadata: db.open_tree(TREE_METADATA)?,
        })
    }

    /// Load a document
    pub fn load(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        match self.documents.get(path.to_string().as_bytes())? {
            Some(bytes) => match serde_json::from_slice(&bytes)? {
                serde_json::Value::Object(map) => Ok(Some(map)),
                _ => Err(StoreError::Malformed(path.to_string())),
            },
            None => Ok(None),
        }
    }

    /// Apply a write atomically and return the stored result
    pub fn save(
        &self,
        path: &DocumentPath,
        doc: &Document,
        options: SetOptions,
    ) -> StoreResult<Document> {
        let key = path.to_string();
        let stored = self.documents.update_and_fetch(key.as_bytes(), |old| {
            let existing = old.and_then(decode_entry);
            // Serializing a JSON object map cannot fail.
            serde_json::to_vec(&apply_write(existing, doc, options)).ok()
        })?;

        let bytes = stored.ok_or_else(|| StoreError::Malformed(key.clone()))?;
        let mut meta = self
            .get_metadata(path)?
            .unwrap_or_else(|| DocumentMetadata::new(path));
        meta.updated_at = chrono::Utc::now().timestamp();
        meta.write_count += 1;
        meta.size_bytes = bytes.len() as u64;
        self.save_metadata(&meta)?;

        debug!("Stored {} ({} bytes, merge={})", key, bytes.len(), options.merge);

        decode_entry(&bytes).ok_or(StoreError::Malformed(key))
    }

    /// Save document metadata
    pub fn save_metadata(&self, meta: &DocumentMetadata) -> StoreResult<()> {
        let bytes = bincode::serialize(meta)?;
        self.metadata.insert(meta.path.as_bytes(), bytes)?;
        Ok(())
    }

    /// Load document metadata
    pub fn get_metadata(&self, path: &DocumentPath) -> StoreResult<Option<DocumentMetadata>> {
        match self.metadata.get(path.to_string().as_bytes())? {
            Some(bytes) => {
                let meta = bincode::deserialize(&bytes)?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Force flush all pending writes to disk
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SledDocumentStore {
    async fn get_document(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        self.load(path)
    }

    async fn set_document(
        &self,
        path: &DocumentPath,
        doc: &Document,
        options: SetOptions,
    ) -> StoreResult<()> {
        self.save(path, doc, options).map(|_| ())
    }
}

impl Drop for SledDocumentStore {
    fn drop(&mut self) {
        // Attempt to flush on drop, but don't panic
        let _ = self.flush();
    }
}

/// Durable cache slot in a sled tree
#[derive(Clone)]
pub struct SledCache {
    tree: Tree,
    slot: String,
}

impl SledCache {
    pub fn new(db: &Db, slot: impl Into<String>) -> sled::Result<Self> {
        Ok(Self {
            tree: db.open_tree(TREE_CACHE)?,
            slot: slot.into(),
        })
    }
}

impl LocalCache for SledCache {
    fn read(&self) -> Option<Document> {
        match self.tree.get(self.slot.as_bytes()) {
            Ok(Some(bytes)) => decode_entry(&bytes),
            Ok(None) => None,
            Err(e) => {
                debug!("Cache slot {} unreadable: {}", self.slot, e);
                None
            }
        }
    }

    fn write(&self, doc: &Document) -> CacheResult<()> {
        let bytes = serde_json::to_vec(doc)?;
        self.tree.insert(self.slot.as_bytes(), bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{open, StorageConfig};
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn test_db() -> (TempDir, Db) {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path().join("test.sled").to_string_lossy().to_string());
        let db = open(&config).unwrap();
        (dir, db)
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_document_not_found() {
        let (_dir, db) = test_db();
        let store = SledDocumentStore::new(&db).unwrap();
        assert!(store.load(&DocumentPath::default()).unwrap().is_none());
    }

    #[test]
    fn test_merge_and_replace_writes() {
        let (_dir, db) = test_db();
        let store = SledDocumentStore::new(&db).unwrap();
        let path = DocumentPath::default();

        store
            .save(&path, &doc(json!({ "siteName": "Acme", "tagline": "Hi" })), SetOptions::merge())
            .unwrap();
        let merged = store
            .save(&path, &doc(json!({ "siteName": "Acme Ltd" })), SetOptions::merge())
            .unwrap();
        assert_eq!(merged, doc(json!({ "siteName": "Acme Ltd", "tagline": "Hi" })));

        let replaced = store
            .save(&path, &doc(json!({ "gallery": [] })), SetOptions::replace())
            .unwrap();
        assert_eq!(replaced, doc(json!({ "gallery": [] })));
        assert_eq!(store.load(&path).unwrap(), Some(replaced));
    }

    #[test]
    fn test_metadata_tracks_writes() {
        let (_dir, db) = test_db();
        let store = SledDocumentStore::new(&db).unwrap();
        let path = DocumentPath::new("site", "config");

        for i in 0..3 {
            store
                .save(&path, &doc(json!({ "n": i })), SetOptions::merge())
                .unwrap();
        }

        let meta = store.get_metadata(&path).unwrap().unwrap();
        assert_eq!(meta.path, "site/config");
        assert_eq!(meta.write_count, 3);
        assert!(meta.size_bytes > 0);
        assert_eq!(store.documents.len(), 1);
    }

    #[test]
    fn test_cache_slot_round_trip() {
        let (_dir, db) = test_db();
        let cache = SledCache::new(&db, "site/config").unwrap();

        assert!(cache.read().is_none());
        let snapshot = doc(json!({ "siteName": "Cached" }));
        cache.write(&snapshot).unwrap();
        assert_eq!(cache.read(), Some(snapshot));
    }

    #[test]
    fn test_corrupt_cache_slot_is_miss() {
        let (_dir, db) = test_db();
        db.open_tree(TREE_CACHE)
            .unwrap()
            .insert("site/config", &b"\xff\x00garbage"[..])
            .unwrap();

        let cache = SledCache::new(&db, "site/config").unwrap();
        assert!(cache.read().is_none());
    }

    #[test]
    fn test_cache_and_store_are_independent() {
        let (_dir, db) = test_db();
        let store = SledDocumentStore::new(&db).unwrap();
        let cache = SledCache::new(&db, "site/config").unwrap();

        cache.write(&doc(json!({ "from": "cache" }))).unwrap();
        assert!(store.load(&DocumentPath::default()).unwrap().is_none());
    }
}
