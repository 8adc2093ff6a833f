//! Event retention policies.
//!
//! Without a policy the event map only ever grows; upserts never delete.

use std::time::Duration;

use chrono::{DateTime, Utc};

use courtside_core::Event;

/// Decides whether a stored event may be dropped.
pub trait RetentionPolicy: Send + Sync {
    fn is_expired(&self, event: &Event, now: DateTime<Utc>) -> bool;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Drops events whose `end` lies more than `horizon` before `now`.
#[derive(Debug, Clone, Copy)]
pub struct EndedBefore {
    horizon: Duration,
}

impl EndedBefore {
    pub fn new(horizon: Duration) -> Self {
        Self { horizon }
    }
}

impl RetentionPolicy for EndedBefore {
    fn is_expired(&self, event: &Event, now: DateTime<Utc>) -> bool {
        let cutoff = chrono::Duration::from_std(self.horizon)
            .ok()
            .and_then(|h| now.checked_sub_signed(h));
        match cutoff {
            Some(cutoff) => event.end < cutoff,
            None => false,
        }
    }

    fn describe(&self) -> String {
        format!("ended more than {}s ago", self.horizon.as_secs())
    }
}
