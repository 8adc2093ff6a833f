//! Facility schedule JSON fetcher.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{info, warn};

use courtside_core::{Event, ScheduleZone, SourceDescriptor, SourceKind};

use crate::http::HttpClient;
use crate::traits::{EventFetcher, FetchError};

pub const BADMINTON_TAG: &str = "badminton";

const TITLE_KEYWORDS: &[&str] = &["badminton", "shuttlecock", "racquet", "racket"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%b %d, %Y", "%B %d, %Y"];
const TIME_FORMATS: &[&str] = &["%H:%M", "%I:%M %p", "%I:%M%p", "%H:%M:%S"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    start_time: String,
    #[serde(default)]
    end_time: String,
    #[serde(default)]
    date: String,
    #[serde(default, rename = "type")]
    kind: String,
}

fn is_badminton_title(title: &str) -> bool {
    let title = title.to_lowercase();
    TITLE_KEYWORDS.iter().any(|k| title.contains(k))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(s, f).ok())
}

fn local_instant(
    date: NaiveDate,
    time: &str,
    zone: &ScheduleZone,
) -> Result<DateTime<Utc>, String> {
    let time = parse_time(time).ok_or_else(|| format!("unable to parse time {time:?}"))?;
    zone.localize(date.and_time(time))
        .ok_or_else(|| format!("{date} {time} does not exist in {zone}"))
}

/// Decode a schedule payload into badminton events.
///
/// Entries whose title is not badminton-related are dropped silently.
/// Entries with an unparsable time are skipped with a warning. A missing or
/// unparsable date means "today" in `zone`.
pub fn parse_schedule_payload(
    body: &str,
    zone: &ScheduleZone,
    source_url: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Event>, FetchError> {
    if body.trim_start().starts_with('<') {
        return Err(FetchError::UnexpectedPayload(
            "received HTML instead of JSON".to_string(),
        ));
    }
    let entries: Vec<ScheduleEntry> = serde_json::from_str(body)?;
    let today = zone.local_date(now);

    let mut events = Vec::new();
    for entry in entries {
        if !is_badminton_title(&entry.title) {
            continue;
        }
        let date = parse_date(&entry.date).unwrap_or(today);

        let start = match local_instant(date, &entry.start_time, zone) {
            Ok(t) => t,
            Err(reason) => {
                warn!(event = %entry.title, %reason, "skipping event with bad start time");
                continue;
            }
        };
        let end = match local_instant(date, &entry.end_time, zone) {
            Ok(t) => t,
            Err(reason) => {
                warn!(event = %entry.title, %reason, "skipping event with bad end time");
                continue;
            }
        };

        let mut tags = vec![BADMINTON_TAG.to_string()];
        let kind = entry.kind.trim().to_lowercase();
        if !kind.is_empty() {
            tags.push(kind);
        }

        events.push(
            Event::new(entry.title, entry.location, start, end)
                .with_source_url(source_url)
                .with_tags(tags)
                .with_retrieved_at(now),
        );
    }
    Ok(events)
}

/// Reads a JSON facility schedule over HTTP.
#[derive(Debug, Clone)]
pub struct JsonScheduleFetcher {
    http: HttpClient,
}

impl JsonScheduleFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl EventFetcher for JsonScheduleFetcher {
    async fn fetch_events(
        &self,
        deadline: Instant,
        source: &SourceDescriptor,
        zone: &ScheduleZone,
    ) -> Result<Vec<Event>, FetchError> {
        info!(source = %source.name, url = %source.url, "fetching schedule");
        let fetched = self.http.get_text(&source.url, deadline).await?;
        if fetched.is_html() {
            return Err(FetchError::UnexpectedPayload(format!(
                "{} returned HTML instead of JSON",
                source.name
            )));
        }
        let events = parse_schedule_payload(&fetched.body, zone, &source.url, Utc::now())?;
        info!(source = %source.name, count = events.len(), "parsed schedule");
        Ok(events)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const URL: &str = "https://fitness.example.edu/schedule";

    fn la() -> ScheduleZone {
        ScheduleZone::resolve("America/Los_Angeles")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 16, 0, 0).unwrap()
    }

    #[test]
    fn keeps_only_badminton_titles() {
        let body = r#"[
            {"title": "Badminton Open Play", "location": "Court 3", "date": "2024-07-02",
             "startTime": "18:00", "endTime": "20:00", "type": "Drop-in"},
            {"title": "Yoga Flow", "location": "Studio", "date": "2024-07-02",
             "startTime": "09:00", "endTime": "10:00"}
        ]"#;
        let events = parse_schedule_payload(body, &la(), URL, now()).unwrap();
        assert_eq!(events.len(), 1);

        let ev = &events[0];
        assert_eq!(ev.title, "Badminton Open Play");
        // 18:00 PDT is 01:00 UTC the next day.
        assert_eq!(ev.start, Utc.with_ymd_and_hms(2024, 7, 3, 1, 0, 0).unwrap());
        assert_eq!(ev.end, Utc.with_ymd_and_hms(2024, 7, 3, 3, 0, 0).unwrap());
        assert_eq!(ev.source_url, URL);
        assert!(ev.tags.contains("badminton"));
        assert!(ev.tags.contains("drop-in"));
        assert_eq!(ev.retrieved_at, now());
    }

    #[test]
    fn accepts_each_date_and_time_format() {
        let body = r#"[
            {"title": "Racquet Clinic", "location": "Gym", "date": "07/05/2024",
             "startTime": "6:30 PM", "endTime": "7:30PM"},
            {"title": "Racket Ladder", "location": "Gym", "date": "07-05-2024",
             "startTime": "10:00:00", "endTime": "11:15:30"},
            {"title": "Badminton A", "location": "Gym", "date": "Jul 5, 2024",
             "startTime": "08:00", "endTime": "09:00"},
            {"title": "Badminton B", "location": "Gym", "date": "July 5, 2024",
             "startTime": "12:00", "endTime": "13:00"}
        ]"#;
        let events = parse_schedule_payload(body, &la(), URL, now()).unwrap();
        assert_eq!(events.len(), 4);
        for ev in &events {
            assert_eq!(
                la().local_date(ev.start),
                NaiveDate::from_ymd_opt(2024, 7, 5).unwrap(),
                "{}",
                ev.title
            );
        }
    }

    #[test]
    fn missing_date_means_today_in_zone() {
        let body = r#"[
            {"title": "Badminton", "location": "Gym", "startTime": "19:00", "endTime": "21:00"}
        ]"#;
        let events = parse_schedule_payload(body, &la(), URL, now()).unwrap();
        assert_eq!(la().local_date(events[0].start), la().local_date(now()));
    }

    #[test]
    fn bad_time_skips_entry() {
        let body = r#"[
            {"title": "Badminton", "location": "Gym", "date": "2024-07-02",
             "startTime": "noonish", "endTime": "13:00"},
            {"title": "Badminton", "location": "Gym", "date": "2024-07-02",
             "startTime": "12:00", "endTime": "25:99"},
            {"title": "Badminton", "location": "Gym", "date": "2024-07-02",
             "startTime": "14:00", "endTime": "15:00"}
        ]"#;
        let events = parse_schedule_payload(body, &la(), URL, now()).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn same_entry_yields_same_id() {
        let body = r#"[
            {"title": "Badminton", "location": "Gym", "date": "2024-07-02",
             "startTime": "14:00", "endTime": "15:00"}
        ]"#;
        let later = now() + chrono::Duration::hours(1);
        let a = parse_schedule_payload(body, &la(), URL, now()).unwrap();
        let b = parse_schedule_payload(body, &la(), URL, later).unwrap();
        assert_eq!(a[0].id, b[0].id);
    }

    #[test]
    fn non_array_payload_is_decode_error() {
        let err = parse_schedule_payload(r#"{"events": []}"#, &la(), URL, now()).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
