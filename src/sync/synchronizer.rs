//! The config synchronizer.
//!
//! State transitions:
//! - `new`/`mount`: cache (or defaults) → published, `is_loaded = true`
//! - `refresh`: remote merged over defaults → published + cached, unless a
//!   save happened while the read was in flight
//! - `save`: caller's document → published + cached, remote write detached
//!
//! Nothing here returns an error or panics because a collaborator failed.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn, Instrument};

use super::{SyncEvent, SyncOptions};
use crate::cache::LocalCache;
use crate::document::{merge_over_defaults, Document, SiteConfig};
use crate::remote::{DocumentStore, SetOptions, StoreError};

/// Result of a single [`ConfigSync::refresh`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Remote document merged and published
    Applied { changed: bool },
    /// Read failed or timed out; config untouched
    Failed,
    /// A save landed while the read was in flight; result dropped
    Discarded,
}

/// Single owner of the shared site configuration
pub struct ConfigSync {
    options: SyncOptions,
    cache: Arc<dyn LocalCache>,
    store: Arc<dyn DocumentStore>,
    state_tx: watch::Sender<Arc<SiteConfig>>,
    events_tx: broadcast::Sender<SyncEvent>,
    loaded: AtomicBool,
    last_fetch: RwLock<Option<DateTime<Utc>>>,
    /// Bumped by every save; a refresh only publishes if it is unchanged
    save_epoch: AtomicU64,
    /// Serializes the local (publish + cache) half of saves and refreshes
    publish_lock: Mutex<()>,
}

impl ConfigSync {
    /// Hydrate from the local cache without touching the network.
    pub fn new(
        options: SyncOptions,
        cache: Arc<dyn LocalCache>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let initial = match cache.read() {
            Some(cached) => {
                debug!("Hydrated {} from local cache", options.document);
                merge_over_defaults(&cached)
            }
            None => SiteConfig::default(),
        };

        let (state_tx, _) = watch::channel(Arc::new(initial));
        let (events_tx, _) = broadcast::channel(options.event_capacity.max(1));

        Self {
            options,
            cache,
            store,
            state_tx,
            events_tx,
            loaded: AtomicBool::new(true),
            last_fetch: RwLock::new(None),
            save_epoch: AtomicU64::new(0),
            publish_lock: Mutex::new(()),
        }
    }

    /// Hydrate synchronously, then start a background refresh.
    ///
    /// When this returns, [`get`](Self::get) already yields a complete config.
    pub fn mount(
        options: SyncOptions,
        cache: Arc<dyn LocalCache>,
        store: Arc<dyn DocumentStore>,
    ) -> Arc<Self> {
        let sync = Arc::new(Self::new(options, cache, store));
        sync.spawn_refresh();
        sync
    }

    /// Current configuration snapshot
    pub fn get(&self) -> Arc<SiteConfig> {
        self.state_tx.borrow().clone()
    }

    /// Receiver that observes every published configuration
    pub fn subscribe(&self) -> watch::Receiver<Arc<SiteConfig>> {
        self.state_tx.subscribe()
    }

    /// Diagnostic event stream
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events_tx.subscribe()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Time of the last successful remote read
    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        *self.last_fetch.read()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run [`refresh`](Self::refresh) on the current runtime without waiting.
    pub fn spawn_refresh(self: &Arc<Self>) -> Option<JoinHandle<RefreshOutcome>> {
        match Handle::try_current() {
            Ok(handle) => {
                let this = Arc::clone(self);
                Some(handle.spawn(async move { this.refresh().await }.in_current_span()))
            }
            Err(_) => {
                warn!("No async runtime; refresh of {} skipped", self.options.document);
                None
            }
        }
    }

    /// Fetch the remote document, merge it over defaults and publish it.
    pub async fn refresh(&self) -> RefreshOutcome {
        let path = &self.options.document;
        let epoch = self.save_epoch.load(Ordering::Acquire);

        let fetched = match timeout(self.options.request_timeout, self.store.get_document(path)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.options.request_timeout)),
        };

        let remote = match fetched {
            Ok(doc) => doc.unwrap_or_default(),
            Err(e) => return self.refresh_failed(e.to_string()),
        };

        let merged = merge_over_defaults(&remote);

        let changed = {
            let _guard = self.publish_lock.lock();
            if self.save_epoch.load(Ordering::Acquire) != epoch {
                None
            } else {
                let changed = self.state_tx.send_if_modified(|current| {
                    if **current == merged {
                        false
                    } else {
                        *current = Arc::new(merged.clone());
                        true
                    }
                });
                self.write_cache(&merged.to_document());
                *self.last_fetch.write() = Some(Utc::now());
                Some(changed)
            }
        };

        match changed {
            Some(changed) => {
                debug!("Refreshed {} (changed: {})", path, changed);
                self.emit(SyncEvent::Refreshed { changed });
                RefreshOutcome::Applied { changed }
            }
            None => {
                debug!("Discarding refresh of {}: superseded by a save", path);
                self.emit(SyncEvent::RefreshDiscarded);
                RefreshOutcome::Discarded
            }
        }
    }

    /// Apply `next` locally right away and schedule the remote write.
    ///
    /// `next` must be a complete configuration (the caller merges its own
    /// section edits into a copy of [`get`](Self::get)). Never blocks on the
    /// network; remote failure does not roll back the local state.
    pub fn save(&self, next: SiteConfig) {
        let doc = next.to_document();
        {
            let _guard = self.publish_lock.lock();
            self.save_epoch.fetch_add(1, Ordering::AcqRel);
            self.state_tx.send_replace(Arc::new(next));
            self.write_cache(&doc);
        }
        self.emit(SyncEvent::Saved);
        self.schedule_background_write(doc);
    }

    /// Fire-and-forget merge-write of `doc` to the remote store.
    ///
    /// The task is detached: nobody joins it, its outcome is only logged and
    /// emitted as an event, and it is lost if the process exits first.
    fn schedule_background_write(&self, doc: Document) {
        let store = Arc::clone(&self.store);
        let path = self.options.document.clone();
        let events = self.events_tx.clone();
        let limit = self.options.request_timeout;

        let write = async move {
            let result = match timeout(limit, store.set_document(&path, &doc, SetOptions::merge())).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(limit)),
            };
            match result {
                Ok(()) => {
                    info!("Saved {} to remote store", path);
                    let _ = events.send(SyncEvent::WriteCompleted);
                }
                Err(e) => {
                    warn!("Background write of {} failed: {}", path, e);
                    let _ = events.send(SyncEvent::WriteFailed {
                        reason: e.to_string(),
                    });
                }
            }
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(write.in_current_span());
            }
            Err(_) => warn!(
                "No async runtime; remote write of {} skipped",
                self.options.document
            ),
        }
    }

    fn refresh_failed(&self, reason: String) -> RefreshOutcome {
        warn!("Refresh of {} failed, keeping current config: {}", self.options.document, reason);
        self.emit(SyncEvent::RefreshFailed { reason });
        RefreshOutcome::Failed
    }

    fn write_cache(&self, doc: &Document) {
        if let Err(e) = self.cache.write(doc) {
            warn!("Failed to write local cache for {}: {}", self.options.document, e);
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }
}
