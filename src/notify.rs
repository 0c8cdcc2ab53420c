//! Toast-style user feedback.
//!
//! Editor-facing code reports outcomes through a [`Notifier`]. The
//! synchronizer itself never notifies: its failures are logged only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A single user-visible message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub id: Uuid,
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

/// Sink for user notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);

    /// Live feed of notices, for sinks that fan out to subscribers
    fn subscribe(&self) -> Option<broadcast::Receiver<Notice>> {
        None
    }
}

/// Writes notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success | NoticeLevel::Info => info!("notice: {}", notice.message),
            NoticeLevel::Warning => warn!("notice: {}", notice.message),
            NoticeLevel::Error => error!("notice: {}", notice.message),
        }
    }
}

/// Fans notices out to subscribers (the SSE stream) and logs them
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: broadcast::Sender<Notice>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

impl Default for ChannelNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        TracingNotifier.notify(notice.clone());
        // No subscribers is fine
        let _ = self.tx.send(notice);
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<Notice>> {
        Some(self.tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_serialization() {
        let notice = Notice::success("Settings saved");
        let json = serde_json::to_value(&notice).unwrap();

        assert_eq!(json["level"], "success");
        assert_eq!(json["message"], "Settings saved");
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let notifier = ChannelNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.notify(Notice::error("Upload failed"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.level, NoticeLevel::Error);
        assert_eq!(received.message, "Upload failed");
    }

    #[tokio::test]
    async fn test_subscribe_through_trait_object() {
        let channel: Box<dyn Notifier> = Box::new(ChannelNotifier::default());
        let mut rx = channel.subscribe().unwrap();
        channel.notify(Notice::success("via trait"));
        assert_eq!(rx.recv().await.unwrap().message, "via trait");

        let tracing_only: Box<dyn Notifier> = Box::new(TracingNotifier);
        assert!(tracing_only.subscribe().is_none());
    }

    #[test]
    fn test_channel_notifier_without_subscribers() {
        ChannelNotifier::new(4).notify(Notice::success("nobody listening"));
    }
}
