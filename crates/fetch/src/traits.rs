//! Fetcher traits and shared error types.

use async_trait::async_trait;
use tokio::time::Instant;

use courtside_core::{Event, OccupancySnapshot, ScheduleZone, SourceDescriptor, SourceKind};

/// Errors a fetch cycle can end with. All of them are recoverable: the
/// scheduler logs them and keeps serving the previous data.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),

    #[error("JSON decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("source reported failure: {0}")]
    Source(String),
}

/// Produces the current occupancy snapshot for a source.
///
/// Implementations must return promptly once `deadline` passes and must not
/// retry past it.
#[async_trait]
pub trait OccupancyFetcher: Send + Sync {
    async fn fetch_occupancy(
        &self,
        deadline: Instant,
        source: &SourceDescriptor,
    ) -> Result<OccupancySnapshot, FetchError>;

    /// Payload kind this fetcher understands.
    fn kind(&self) -> SourceKind;
}

/// Produces the events currently published by a schedule source.
///
/// Wall-clock times in the payload are interpreted in `zone`.
#[async_trait]
pub trait EventFetcher: Send + Sync {
    async fn fetch_events(
        &self,
        deadline: Instant,
        source: &SourceDescriptor,
        zone: &ScheduleZone,
    ) -> Result<Vec<Event>, FetchError>;

    fn kind(&self) -> SourceKind;
}
