//! Fetcher capability consumed by the scheduler, plus the stock fetchers.
//!
//! This crate provides:
//! - [`OccupancyFetcher`] / [`EventFetcher`] traits with deadline semantics
//! - [`HttpClient`], a GET helper with bounded retry that honours the deadline
//! - JSON fetchers for the occupancy counter and the facility schedule
//! - Synthetic fallback fetchers for running without network access
//! - Selection of the fetcher variant from the declared [`SourceKind`]

pub mod fallback;
pub mod http;
pub mod occupancy;
pub mod schedule;
pub mod traits;

use std::sync::Arc;

use courtside_core::{ScheduleZone, SourceKind};

pub use fallback::{FallbackEventFetcher, FallbackOccupancyFetcher};
pub use http::{FetchedBody, HttpClient};
pub use occupancy::JsonOccupancyFetcher;
pub use schedule::JsonScheduleFetcher;
pub use traits::{EventFetcher, FetchError, OccupancyFetcher};

/// Pick the occupancy fetcher for a declared source kind.
pub fn occupancy_fetcher(
    kind: SourceKind,
    http: &HttpClient,
    zone: ScheduleZone,
) -> Arc<dyn OccupancyFetcher> {
    match kind {
        SourceKind::Json => Arc::new(JsonOccupancyFetcher::new(http.clone())),
        SourceKind::Fallback => Arc::new(FallbackOccupancyFetcher::new(zone)),
    }
}

/// Pick the schedule fetcher for a declared source kind.
pub fn event_fetcher(kind: SourceKind, http: &HttpClient) -> Arc<dyn EventFetcher> {
    match kind {
        SourceKind::Json => Arc::new(JsonScheduleFetcher::new(http.clone())),
        SourceKind::Fallback => Arc::new(FallbackEventFetcher),
    }
}
