//! Synthetic sources for running without network access.
//!
//! Output depends only on the clock and zone, so the same instant always
//! produces the same data.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveTime, Utc};
use tokio::time::Instant;
use tracing::debug;

use courtside_core::{Event, OccupancySnapshot, ScheduleZone, SourceDescriptor, SourceKind};

use crate::traits::{EventFetcher, FetchError, OccupancyFetcher};

pub const FALLBACK_COURTS: i64 = 8;
pub const FALLBACK_LOCATION: &str = "SJSU Fitness Center";
pub const FALLBACK_TAG: &str = "fallback";
const FALLBACK_DAYS: u64 = 7;

struct Template {
    title: &'static str,
    hour: u32,
    minute: u32,
    minutes: i64,
}

const TEMPLATES: &[Template] = &[
    Template { title: "Badminton Open Play", hour: 9, minute: 0, minutes: 120 },
    Template { title: "Badminton Club Practice", hour: 18, minute: 0, minutes: 60 },
    Template { title: "Badminton Tournament", hour: 14, minute: 0, minutes: 180 },
];

/// Courts in use by local hour of day.
fn courts_in_use(hour: u32) -> i64 {
    match hour {
        6..=8 => 2,
        9..=11 => 4,
        12..=13 => 6,
        14..=17 => 5,
        18..=20 => 7,
        21..=22 => 3,
        _ => 1,
    }
}

/// Occupancy following a typical weekday curve.
pub fn fallback_snapshot(now: DateTime<Utc>, zone: &ScheduleZone) -> OccupancySnapshot {
    let in_use = courts_in_use(zone.local_hour(now));
    OccupancySnapshot {
        retrieved_at: now,
        location: "Mac Gym".to_string(),
        capacity: FALLBACK_COURTS,
        in_use,
        details: format!(
            "Mac Gym Badminton Courts: {in_use}/{FALLBACK_COURTS} in use (fallback data)"
        ),
        raw: None,
    }
}

/// Two or three sessions per day for the next week, skipping any that have
/// already started.
pub fn fallback_events(now: DateTime<Utc>, zone: &ScheduleZone) -> Vec<Event> {
    let today = zone.local_date(now);
    let mut events = Vec::new();

    for day in 0..FALLBACK_DAYS {
        let Some(date) = today.checked_add_days(Days::new(day)) else {
            break;
        };
        let per_day = 2 + (day as usize % 2);

        for template in TEMPLATES.iter().take(per_day) {
            let Some(time) = NaiveTime::from_hms_opt(template.hour, template.minute, 0) else {
                continue;
            };
            let Some(start) = zone.localize(date.and_time(time)) else {
                continue;
            };
            if start < now {
                continue;
            }
            let end = start + chrono::Duration::minutes(template.minutes);
            events.push(
                Event::new(template.title, FALLBACK_LOCATION, start, end)
                    .with_tags(["badminton", FALLBACK_TAG])
                    .with_retrieved_at(now),
            );
        }
    }
    events
}

/// Serves [`fallback_snapshot`] for the current time.
#[derive(Debug, Clone, Copy)]
pub struct FallbackOccupancyFetcher {
    zone: ScheduleZone,
}

impl FallbackOccupancyFetcher {
    pub fn new(zone: ScheduleZone) -> Self {
        Self { zone }
    }
}

#[async_trait]
impl OccupancyFetcher for FallbackOccupancyFetcher {
    async fn fetch_occupancy(
        &self,
        _deadline: Instant,
        source: &SourceDescriptor,
    ) -> Result<OccupancySnapshot, FetchError> {
        debug!(source = %source.name, "serving fallback occupancy");
        Ok(fallback_snapshot(Utc::now(), &self.zone))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fallback
    }
}

/// Serves [`fallback_events`] for the current time.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackEventFetcher;

#[async_trait]
impl EventFetcher for FallbackEventFetcher {
    async fn fetch_events(
        &self,
        _deadline: Instant,
        source: &SourceDescriptor,
        zone: &ScheduleZone,
    ) -> Result<Vec<Event>, FetchError> {
        let events = fallback_events(Utc::now(), zone)
            .into_iter()
            .map(|e| e.with_source_url(source.url.clone()))
            .collect::<Vec<_>>();
        debug!(source = %source.name, count = events.len(), "serving fallback events");
        Ok(events)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fallback
    }
}
