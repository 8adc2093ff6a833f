//! Routes alerts to configured channels.
//!
//! The dispatcher renders each alert once and delivers it to every channel.
//! Individual channel failures don't block other channels, and failed
//! deliveries are not retried.

use tokio::sync::mpsc::UnboundedReceiver;

use courtside_core::Alert;

use crate::templating::AlertRenderer;
use crate::traits::{DispatchResult, Notification, Notifier};

/// Fans alerts out to a fixed set of channels.
pub struct AlertDispatcher {
    channels: Vec<Box<dyn Notifier>>,
    renderer: AlertRenderer,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self {
            channels,
            renderer: AlertRenderer::default(),
        }
    }

    pub fn with_renderer(mut self, renderer: AlertRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel_name()).collect()
    }

    /// Deliver a notification to all channels.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        if self.channels.is_empty() {
            tracing::debug!("No notification channels configured");
            return Vec::new();
        }

        let subscriber_id = notification.subscriber_id();
        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        subscriber_id,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        subscriber_id,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                subscriber_id: subscriber_id.to_string(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }

    /// Render and deliver one alert. Rendering failures are logged and
    /// produce no deliveries.
    pub async fn dispatch_alert(&self, alert: &Alert) -> Vec<DispatchResult> {
        match self.renderer.render(alert) {
            Ok(notification) => self.dispatch(&notification).await,
            Err(e) => {
                tracing::error!(
                    subscriber_id = %alert.subscriber_id,
                    error = %e,
                    "failed to render alert"
                );
                Vec::new()
            }
        }
    }

    /// Drain `alerts` until every sender is dropped. Returns the number of
    /// alerts processed.
    pub async fn run(self, mut alerts: UnboundedReceiver<Alert>) -> usize {
        tracing::info!(channels = ?self.channel_names(), "alert dispatcher started");
        let mut processed = 0;
        while let Some(alert) = alerts.recv().await {
            self.dispatch_alert(&alert).await;
            processed += 1;
        }
        tracing::info!(processed, "alert channel closed, dispatcher exiting");
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NotifyError;
    use courtside_core::OccupancySnapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockNotifier {
        name: String,
        send_count: Arc<AtomicUsize>,
        should_fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err(NotifyError::Config("mock failure".to_string()))
            } else {
                Ok(())
            }
        }
        fn channel_name(&self) -> &str {
            &self.name
        }
    }

    fn mock(name: &str, count: &Arc<AtomicUsize>, should_fail: bool) -> Box<dyn Notifier> {
        Box::new(MockNotifier {
            name: name.to_string(),
            send_count: count.clone(),
            should_fail,
        })
    }

    fn alert(subscriber: &str) -> Alert {
        Alert {
            subscriber_id: subscriber.to_string(),
            threshold: 5,
            snapshot: OccupancySnapshot {
                capacity: 8,
                in_use: 5,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn dispatch_to_all_channels() {
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let dispatcher =
            AlertDispatcher::new(vec![mock("a", &count_a, false), mock("b", &count_b, false)]);

        let results = dispatcher.dispatch_alert(&alert("alice")).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success && r.subscriber_id == "alice"));
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn partial_failure_doesnt_block() {
        let failed = Arc::new(AtomicUsize::new(0));
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher =
            AlertDispatcher::new(vec![mock("fail", &failed, true), mock("ok", &count, false)]);

        let results = dispatcher.dispatch_alert(&alert("alice")).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert_eq!(results[0].error.as_deref(), Some("Configuration error: mock failure"));
        assert!(results[1].success);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // No retry of the failed channel.
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_channels_returns_empty() {
        let dispatcher = AlertDispatcher::new(Vec::new());
        assert!(dispatcher.dispatch_alert(&alert("alice")).await.is_empty());
    }

    #[tokio::test]
    async fn run_drains_until_senders_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = AlertDispatcher::new(vec![mock("a", &count, false)]);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let handle = tokio::spawn(dispatcher.run(rx));
        tx.send(alert("alice")).unwrap();
        tx.send(alert("bob")).unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
