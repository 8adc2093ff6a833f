use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Subscriber identity as handed out by the command layer.
pub type SubscriberId = String;

/// Latest occupancy reading for a facility.
///
/// `capacity == 0` means the source had no capacity data. `in_use` is kept
/// exactly as reported, even when it falls outside `0..=capacity`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OccupancySnapshot {
    pub retrieved_at: DateTime<Utc>,
    pub location: String,
    pub capacity: i64,
    pub in_use: i64,
    pub details: String,
    /// Source payload kept for diagnostics only.
    pub raw: Option<serde_json::Value>,
}

impl OccupancySnapshot {
    /// Whether the snapshot carries usable capacity data.
    pub fn has_capacity(&self) -> bool {
        self.capacity != 0
    }

    /// Free units. Negative when the source over-reports usage.
    pub fn available(&self) -> i64 {
        self.capacity - self.in_use
    }

    /// Percentage of free units, or `None` without capacity data.
    pub fn availability_pct(&self) -> Option<f64> {
        if !self.has_capacity() {
            return None;
        }
        Some(self.available() as f64 / self.capacity as f64 * 100.0)
    }
}

/// A scheduled facility event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Content-derived identity, see [`event_id`].
    pub id: String,
    pub title: String,
    pub location: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub source_url: String,
    pub tags: BTreeSet<String>,
    pub retrieved_at: DateTime<Utc>,
}

impl Event {
    /// Build an event, deriving its id from title, interval and location.
    pub fn new<Tz: TimeZone>(
        title: impl Into<String>,
        location: impl Into<String>,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Self {
        let title = title.into();
        let location = location.into();
        let start = start.with_timezone(&Utc);
        let end = end.with_timezone(&Utc);
        Self {
            id: event_id(&title, &start, &end, &location),
            title,
            location,
            start,
            end,
            source_url: String::new(),
            tags: BTreeSet::new(),
            retrieved_at: Utc::now(),
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retrieved_at(mut self, at: DateTime<Utc>) -> Self {
        self.retrieved_at = at;
        self
    }

    /// Whether `[start, end)` overlaps `[from, until)`.
    pub fn overlaps(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> bool {
        self.end > from && self.start < until
    }
}

/// Stable deduplication key for an event.
///
/// SHA-256 hex digest of `title|start|end|location`, lower-cased, with both
/// instants rendered as UTC RFC 3339 at second precision. Casing of title and
/// location, and the offset the instants were expressed in, do not matter.
pub fn event_id<Tz1: TimeZone, Tz2: TimeZone>(
    title: &str,
    start: &DateTime<Tz1>,
    end: &DateTime<Tz2>,
    location: &str,
) -> String {
    let key = format!(
        "{}|{}|{}|{}",
        title,
        start
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        end
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        location,
    )
    .to_lowercase();
    let digest = Sha256::digest(key.as_bytes());
    format!("{digest:x}")
}

/// A rising-edge threshold crossing for one subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub subscriber_id: SubscriberId,
    pub threshold: i64,
    pub snapshot: OccupancySnapshot,
}
