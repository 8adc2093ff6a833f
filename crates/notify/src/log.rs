//! Notifier that writes alerts to the tracing log.

use tracing::info;

use crate::traits::{Notification, Notifier, NotifyError};

/// Always-available channel; useful when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            subscriber_id = notification.subscriber_id(),
            threshold = notification.alert.threshold,
            in_use = notification.alert.snapshot.in_use,
            capacity = notification.alert.snapshot.capacity,
            subject = %notification.subject,
            "occupancy alert"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
