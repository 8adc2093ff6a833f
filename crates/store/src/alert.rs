//! Threshold-crossing detection and the alert hand-off capability.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

use courtside_core::{Alert, OccupancySnapshot, SubscriberId};

// ── Debounced rising-edge evaluation ────────────────────────────────

/// Alert evaluation state: the debounce window and when an alert last fired.
///
/// The debounce is global, not per subscriber. Lives inside the store's
/// locked state next to the subscription map.
#[derive(Debug, Clone)]
pub struct AlertState {
    debounce: Duration,
    last_alert: Option<DateTime<Utc>>,
}

impl AlertState {
    /// `Duration::ZERO` disables debouncing.
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            last_alert: None,
        }
    }

    pub fn last_alert(&self) -> Option<DateTime<Utc>> {
        self.last_alert
    }

    /// Compare `prior` against `current` for every subscriber.
    ///
    /// A subscriber alerts when `prior.in_use < threshold <= current.in_use`.
    /// Nothing is evaluated when `current` has no capacity data or when the
    /// last alert fired less than the debounce window before `now`. Results
    /// are sorted by subscriber id.
    pub fn evaluate(
        &mut self,
        prior: &OccupancySnapshot,
        current: &OccupancySnapshot,
        subscriptions: &HashMap<SubscriberId, i64>,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        if !current.has_capacity() {
            return Vec::new();
        }

        if let Some(last) = self.last_alert {
            let window =
                chrono::Duration::from_std(self.debounce).unwrap_or(chrono::Duration::zero());
            if now.signed_duration_since(last) < window {
                return Vec::new();
            }
        }

        let mut alerts: Vec<Alert> = subscriptions
            .iter()
            .filter(|(_, threshold)| prior.in_use < **threshold && current.in_use >= **threshold)
            .map(|(id, &threshold)| Alert {
                subscriber_id: id.clone(),
                threshold,
                snapshot: current.clone(),
            })
            .collect();

        if alerts.is_empty() {
            return alerts;
        }

        alerts.sort_by(|a, b| a.subscriber_id.cmp(&b.subscriber_id));
        self.last_alert = Some(now);
        alerts
    }
}

// ── Alert sink ──────────────────────────────────────────────────────

/// Receives alerts produced by the store.
///
/// Called after the store lock is released. Implementations must not block:
/// delivery belongs to the consumer on the other side.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alerts: &[Alert]);
}

impl<F> AlertSink for F
where
    F: Fn(&[Alert]) + Send + Sync,
{
    fn emit(&self, alerts: &[Alert]) {
        self(alerts)
    }
}

/// Forwards alerts onto an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelAlertSink {
    /// Create a sink and the receiver the consumer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn emit(&self, alerts: &[Alert]) {
        for alert in alerts {
            if self.tx.send(alert.clone()).is_err() {
                warn!(
                    dropped = alerts.len(),
                    "alert receiver closed, dropping alerts"
                );
                return;
            }
        }
    }
}
