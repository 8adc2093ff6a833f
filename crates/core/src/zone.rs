//! Timezone resolution for schedules and local event times.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Offset used when the configured IANA name cannot be resolved (UTC-08:00).
pub const FALLBACK_UTC_OFFSET_SECS: i32 = -8 * 3_600;

/// Zone that cron schedules and local event times are interpreted in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleZone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl ScheduleZone {
    /// Resolve an IANA zone name.
    ///
    /// Never fails: an unknown name falls back to a fixed UTC-08:00 offset
    /// and logs a warning.
    pub fn resolve(name: &str) -> Self {
        match name.trim().parse::<Tz>() {
            Ok(tz) => ScheduleZone::Named(tz),
            Err(e) => {
                let fixed = Self::fallback_offset();
                warn!(
                    timezone = %name,
                    error = %e,
                    offset = %fixed,
                    "unknown timezone, falling back to fixed offset"
                );
                ScheduleZone::Fixed(fixed)
            }
        }
    }

    pub fn utc() -> Self {
        ScheduleZone::Fixed(Utc.fix())
    }

    fn fallback_offset() -> FixedOffset {
        FixedOffset::east_opt(FALLBACK_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
    }

    /// Interpret a wall-clock time in this zone.
    ///
    /// Ambiguous times (DST fall-back) resolve to the earlier instant;
    /// non-existent times (DST spring-forward gap) yield `None`.
    pub fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            ScheduleZone::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|d| d.with_timezone(&Utc)),
            ScheduleZone::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .earliest()
                .map(|d| d.with_timezone(&Utc)),
        }
    }

    /// Calendar date of `at` in this zone.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        self.local_naive(at).date()
    }

    /// Hour of day of `at` in this zone.
    pub fn local_hour(&self, at: DateTime<Utc>) -> u32 {
        self.local_naive(at).hour()
    }

    fn local_naive(&self, at: DateTime<Utc>) -> NaiveDateTime {
        match self {
            ScheduleZone::Named(tz) => at.with_timezone(tz).naive_local(),
            ScheduleZone::Fixed(offset) => at.with_timezone(offset).naive_local(),
        }
    }
}

impl fmt::Display for ScheduleZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleZone::Named(tz) => write!(f, "{}", tz.name()),
            ScheduleZone::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}
