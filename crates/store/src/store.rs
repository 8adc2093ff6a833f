//! [`Store`], the single shared consistency domain.
//!
//! Mutations (`set_snapshot`, `upsert_events`, `subscribe`, `unsubscribe`,
//! `purge_expired`) take the write lock; reads take the read lock and hand
//! back owned copies. No I/O and no alert delivery happens under the lock.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use courtside_core::{Alert, Event, OccupancySnapshot, SubscriberId};

use crate::alert::{AlertSink, AlertState};
use crate::retention::RetentionPolicy;

/// Default minimum gap between two alert emissions.
pub const DEFAULT_ALERT_DEBOUNCE: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct StoreState {
    snapshot: OccupancySnapshot,
    events: HashMap<String, Event>,
    subscriptions: HashMap<SubscriberId, i64>,
    alerts: AlertState,
}

/// Outcome of an [`Store::upsert_events`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertSummary {
    pub added: usize,
    pub updated: usize,
    /// Events stored after the upsert.
    pub total: usize,
}

/// Latest occupancy snapshot, deduplicated events and alert subscriptions.
pub struct Store {
    state: RwLock<StoreState>,
    sink: Option<Arc<dyn AlertSink>>,
    retention: Option<Box<dyn RetentionPolicy>>,
}

impl Store {
    /// Create an empty store with the given alert debounce window.
    pub fn new(alert_debounce: Duration) -> Self {
        Self {
            state: RwLock::new(StoreState {
                snapshot: OccupancySnapshot::default(),
                events: HashMap::new(),
                subscriptions: HashMap::new(),
                alerts: AlertState::new(alert_debounce),
            }),
            sink: None,
            retention: None,
        }
    }

    /// Route threshold alerts to `sink`.
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Enable [`purge_expired`](Store::purge_expired).
    pub fn with_retention(mut self, policy: Box<dyn RetentionPolicy>) -> Self {
        self.retention = Some(policy);
        self
    }

    // Every critical section is a plain swap or copy, so a panicking holder
    // cannot leave the state half-written.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Occupancy ───────────────────────────────────────────────────

    /// Replace the current snapshot, evaluating threshold alerts against
    /// the one it replaces.
    ///
    /// Alerts are handed to the configured sink after the lock is released
    /// and also returned to the caller.
    pub fn set_snapshot(&self, snapshot: OccupancySnapshot) -> Vec<Alert> {
        self.set_snapshot_at(snapshot, Utc::now())
    }

    /// [`set_snapshot`](Store::set_snapshot) with an explicit evaluation
    /// instant for the debounce clock.
    pub fn set_snapshot_at(&self, snapshot: OccupancySnapshot, now: DateTime<Utc>) -> Vec<Alert> {
        let (capacity, in_use) = (snapshot.capacity, snapshot.in_use);

        let alerts = {
            let mut guard = self.write();
            let state = &mut *guard;
            let prior = std::mem::replace(&mut state.snapshot, snapshot);
            state
                .alerts
                .evaluate(&prior, &state.snapshot, &state.subscriptions, now)
        };

        for alert in &alerts {
            info!(
                subscriber_id = %alert.subscriber_id,
                threshold = alert.threshold,
                in_use,
                capacity,
                "threshold crossed"
            );
        }
        info!(capacity, in_use, alerts = alerts.len(), "updated occupancy snapshot");

        if !alerts.is_empty() {
            if let Some(sink) = &self.sink {
                sink.emit(&alerts);
            }
        }
        alerts
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> OccupancySnapshot {
        self.read().snapshot.clone()
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Insert events with unknown ids, overwrite events with known ids.
    ///
    /// Applying the same batch twice leaves the same state as applying it once.
    /// Entries sharing an id within one batch collapse to a single event: the
    /// latest `retrieved_at` wins, with remaining ties broken on the event's
    /// fields, so the order of the batch never changes the outcome. Counts in
    /// the summary are per distinct id.
    pub fn upsert_events(&self, batch: Vec<Event>) -> UpsertSummary {
        let mut incoming: HashMap<String, Event> = HashMap::with_capacity(batch.len());
        for event in batch {
            match incoming.entry(event.id.clone()) {
                Entry::Occupied(mut slot) => {
                    if supersedes(&event, slot.get()) {
                        slot.insert(event);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(event);
                }
            }
        }

        let mut summary = UpsertSummary::default();
        let mut overwritten = Vec::new();
        {
            let mut state = self.write();
            for (id, event) in incoming {
                match state.events.insert(id, event) {
                    Some(previous) => {
                        summary.updated += 1;
                        overwritten.push(previous);
                    }
                    None => summary.added += 1,
                }
            }
            summary.total = state.events.len();
        }

        for previous in &overwritten {
            debug!(id = %previous.id, title = %previous.title, "updated event");
        }

        info!(
            added = summary.added,
            updated = summary.updated,
            total = summary.total,
            "upserted events"
        );
        summary
    }

    /// Events overlapping `[as_of, as_of + window_days)`, ordered by start
    /// then id.
    ///
    /// A non-positive window yields nothing.
    pub fn list_upcoming(&self, as_of: DateTime<Utc>, window_days: i64) -> Vec<Event> {
        if window_days <= 0 {
            return Vec::new();
        }
        let until = TimeDelta::try_days(window_days)
            .and_then(|d| as_of.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut upcoming: Vec<Event> = self
            .read()
            .events
            .values()
            .filter(|e| e.overlaps(as_of, until))
            .cloned()
            .collect();

        upcoming.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        upcoming
    }

    pub fn get_event(&self, id: &str) -> Option<Event> {
        self.read().events.get(id).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.read().events.len()
    }

    /// Drop events the retention policy considers expired. Returns how many
    /// were removed; always 0 without a policy.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let Some(policy) = &self.retention else {
            return 0;
        };

        let (removed, total) = {
            let mut state = self.write();
            let before = state.events.len();
            state.events.retain(|_, e| !policy.is_expired(e, now));
            (before - state.events.len(), state.events.len())
        };

        if removed > 0 {
            info!(removed, total, policy = %policy.describe(), "purged expired events");
        }
        removed
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Register or replace a subscriber's alert threshold.
    ///
    /// A threshold of `0` is not "disabled": every reading satisfies it, so
    /// the subscriber only sees an edge after a negative reading.
    pub fn subscribe(&self, subscriber_id: impl Into<SubscriberId>, threshold: i64) {
        let subscriber_id = subscriber_id.into();
        self.write()
            .subscriptions
            .insert(subscriber_id.clone(), threshold);
        info!(subscriber_id = %subscriber_id, threshold, "subscriber registered");
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, subscriber_id: &str) -> bool {
        let removed = self.write().subscriptions.remove(subscriber_id).is_some();
        info!(subscriber_id = %subscriber_id, removed, "subscriber removed");
        removed
    }

    /// Point-in-time copy of the subscription map.
    pub fn subscribers(&self) -> HashMap<SubscriberId, i64> {
        self.read().subscriptions.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.read().subscriptions.len()
    }

    /// When an alert last fired, if ever.
    pub fn last_alert(&self) -> Option<DateTime<Utc>> {
        self.read().alerts.last_alert()
    }
}

/// Whether `candidate` replaces `current` when both share an id in one batch.
fn supersedes(candidate: &Event, current: &Event) -> bool {
    let key = |e: &Event| (e.retrieved_at, e.start, e.end);
    key(candidate)
        .cmp(&key(current))
        .then_with(|| candidate.source_url.cmp(&current.source_url))
        .then_with(|| candidate.title.cmp(&current.title))
        .then_with(|| candidate.location.cmp(&current.location))
        .then_with(|| candidate.tags.cmp(&current.tags))
        == Ordering::Greater
}

impl Default for Store {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_DEBOUNCE)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("Store")
            .field("events", &state.events.len())
            .field("subscriptions", &state.subscriptions.len())
            .field("has_sink", &self.sink.is_some())
            .field("has_retention", &self.retention.is_some())
            .finish()
    }
}
