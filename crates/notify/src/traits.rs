//! Notifier trait definition and shared error types.

use std::collections::BTreeMap;

use courtside_core::Alert;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    /// Flat key/value facts about the alert (subscriber, threshold, counts).
    pub metadata: BTreeMap<String, String>,
    /// The alert this notification was rendered from.
    pub alert: Alert,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>, alert: Alert) -> Self {
        let snap = &alert.snapshot;
        let metadata = BTreeMap::from([
            ("subscriber_id".to_string(), alert.subscriber_id.clone()),
            ("threshold".to_string(), alert.threshold.to_string()),
            ("in_use".to_string(), snap.in_use.to_string()),
            ("capacity".to_string(), snap.capacity.to_string()),
            ("location".to_string(), snap.location.clone()),
            ("retrieved_at".to_string(), snap.retrieved_at.to_rfc3339()),
        ]);
        Self {
            subject: subject.into(),
            body: body.into(),
            metadata,
            alert,
        }
    }

    pub fn subscriber_id(&self) -> &str {
        &self.alert.subscriber_id
    }
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "webhook", "log").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub subscriber_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
