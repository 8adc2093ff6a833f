//! Occupancy counter JSON fetcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info};

use courtside_core::{OccupancySnapshot, SourceDescriptor, SourceKind};

use crate::http::HttpClient;
use crate::traits::{FetchError, OccupancyFetcher};

/// Label used when the payload does not name a facility.
pub const DEFAULT_LOCATION: &str = "Mac Gym";

/// Location names containing any of these are preferred over other entries.
const PREFERRED_KEYWORDS: &[&str] = &["badminton", "court", "gym"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CounterResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Vec<CounterLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CounterLocation {
    #[serde(default)]
    location_name: String,
    #[serde(default)]
    current_count: i64,
    #[serde(default)]
    max_capacity: i64,
    #[serde(default)]
    last_updated: String,
}

impl CounterLocation {
    fn is_preferred(&self) -> bool {
        let name = self.location_name.to_lowercase();
        PREFERRED_KEYWORDS.iter().any(|k| name.contains(k))
    }
}

/// Turn a counter payload into a snapshot.
///
/// Picks the first location whose name matches a preferred keyword, else the
/// first location. A payload with no locations yields a snapshot with
/// `capacity == 0`, which disables alert evaluation for that cycle.
pub fn parse_occupancy_payload(
    body: &str,
    now: DateTime<Utc>,
) -> Result<OccupancySnapshot, FetchError> {
    if body.trim_start().starts_with('<') {
        return Err(FetchError::UnexpectedPayload(
            "received HTML instead of JSON".to_string(),
        ));
    }

    let raw: serde_json::Value = serde_json::from_str(body)?;
    let response: CounterResponse = serde_json::from_value(raw.clone())?;

    if !response.success {
        return Err(FetchError::Source(if response.message.is_empty() {
            "success=false".to_string()
        } else {
            response.message
        }));
    }

    let mut snapshot = OccupancySnapshot {
        retrieved_at: now,
        location: DEFAULT_LOCATION.to_string(),
        raw: Some(raw),
        ..Default::default()
    };

    let chosen = response
        .data
        .iter()
        .find(|l| l.is_preferred())
        .or_else(|| response.data.first());

    match chosen {
        Some(loc) => {
            snapshot.capacity = loc.max_capacity;
            snapshot.in_use = loc.current_count;
            snapshot.details = format!(
                "{}: {}/{} in use",
                loc.location_name, loc.current_count, loc.max_capacity
            );
            if let Ok(at) = DateTime::parse_from_rfc3339(&loc.last_updated) {
                snapshot.retrieved_at = at.with_timezone(&Utc);
            }
            debug!(
                location = %loc.location_name,
                capacity = loc.max_capacity,
                in_use = loc.current_count,
                preferred = loc.is_preferred(),
                "selected occupancy location"
            );
        }
        None => {
            snapshot.details =
                format!("{DEFAULT_LOCATION} status retrieved (no capacity data available)");
        }
    }

    Ok(snapshot)
}

/// Reads a JSON occupancy counter over HTTP.
#[derive(Debug, Clone)]
pub struct JsonOccupancyFetcher {
    http: HttpClient,
}

impl JsonOccupancyFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl OccupancyFetcher for JsonOccupancyFetcher {
    async fn fetch_occupancy(
        &self,
        deadline: Instant,
        source: &SourceDescriptor,
    ) -> Result<OccupancySnapshot, FetchError> {
        info!(source = %source.name, url = %source.url, "fetching occupancy");
        let fetched = self.http.get_text(&source.url, deadline).await?;
        if fetched.is_html() {
            return Err(FetchError::UnexpectedPayload(format!(
                "{} returned HTML instead of JSON",
                source.name
            )));
        }
        parse_occupancy_payload(&fetched.body, Utc::now())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 17, 0, 0).unwrap()
    }

    #[test]
    fn prefers_keyword_location() {
        let body = r#"{
            "success": true,
            "data": [
                {"locationName": "Weight Room", "currentCount": 30, "maxCapacity": 60},
                {"locationName": "Badminton Courts", "currentCount": 5, "maxCapacity": 8,
                 "lastUpdated": "2024-05-01T16:58:00Z"}
            ]
        }"#;
        let snap = parse_occupancy_payload(body, now()).unwrap();
        assert_eq!(snap.capacity, 8);
        assert_eq!(snap.in_use, 5);
        assert_eq!(snap.details, "Badminton Courts: 5/8 in use");
        assert_eq!(snap.location, DEFAULT_LOCATION);
        assert_eq!(
            snap.retrieved_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 16, 58, 0).unwrap()
        );
        assert!(snap.raw.is_some());
    }

    #[test]
    fn falls_back_to_first_location() {
        let body = r#"{"success": true, "data": [
            {"locationName": "Pool", "currentCount": 12, "maxCapacity": 40,
             "lastUpdated": "garbage"},
            {"locationName": "Track", "currentCount": 3, "maxCapacity": 50}
        ]}"#;
        let snap = parse_occupancy_payload(body, now()).unwrap();
        assert_eq!(snap.capacity, 40);
        assert_eq!(snap.in_use, 12);
        assert_eq!(snap.retrieved_at, now());
    }

    #[test]
    fn empty_data_is_no_capacity_snapshot() {
        let snap = parse_occupancy_payload(r#"{"success": true, "data": []}"#, now()).unwrap();
        assert_eq!(snap.capacity, 0);
        assert!(!snap.has_capacity());
        assert!(snap.details.contains("no capacity data"));
    }

    #[test]
    fn success_false_is_source_error() {
        let err = parse_occupancy_payload(r#"{"success": false, "message": "maintenance"}"#, now())
            .unwrap_err();
        assert!(matches!(err, FetchError::Source(ref m) if m == "maintenance"));
    }

    #[test]
    fn html_body_rejected() {
        let err = parse_occupancy_payload("<html><body>login</body></html>", now()).unwrap_err();
        assert!(matches!(err, FetchError::UnexpectedPayload(_)));
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let err = parse_occupancy_payload("{\"success\": tru", now()).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn over_capacity_kept_verbatim() {
        let body = r#"{"success": true, "data": [
            {"locationName": "Main Gym", "currentCount": 11, "maxCapacity": 8}
        ]}"#;
        let snap = parse_occupancy_payload(body, now()).unwrap();
        assert_eq!(snap.in_use, 11);
        assert_eq!(snap.available(), -3);
    }
}
