//! Shared-configuration synchronization.
//!
//! One [`ConfigSync`] owns the in-memory site configuration for a process.
//! It hydrates from the local cache synchronously, refreshes from the remote
//! document store in the background, and applies saves optimistically:
//! local state and cache first, remote write detached.

mod synchronizer;

pub use synchronizer::{ConfigSync, RefreshOutcome};

use serde::Serialize;
use std::time::Duration;

use crate::remote::DocumentPath;

/// Settings for a [`ConfigSync`]
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Singleton document holding the site configuration
    pub document: DocumentPath,
    /// Upper bound on each remote read or write
    pub request_timeout: Duration,
    /// Capacity of the diagnostic event channel
    pub event_capacity: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            document: DocumentPath::default(),
            request_timeout: Duration::from_secs(10),
            event_capacity: 256,
        }
    }
}

impl SyncOptions {
    pub fn new(document: DocumentPath) -> Self {
        Self {
            document,
            ..Default::default()
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Diagnostic events emitted by the synchronizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A remote read was merged and published
    Refreshed { changed: bool },
    /// A remote read failed; the current config was kept
    RefreshFailed { reason: String },
    /// A remote read finished after a newer save and was dropped
    RefreshDiscarded,
    /// A save was applied locally
    Saved,
    /// A background remote write landed
    WriteCompleted,
    /// A background remote write failed; local state was kept
    WriteFailed { reason: String },
}
