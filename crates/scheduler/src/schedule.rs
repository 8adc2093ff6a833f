//! Job schedule expressions: `@every <duration>` or cron.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;

use courtside_core::{parse_duration, ScheduleZone};

const EVERY_PREFIX: &str = "@every";

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("empty schedule expression")]
    Empty,

    #[error("invalid interval in {expr:?}: expected e.g. `@every 2m`")]
    InvalidInterval { expr: String },

    #[error("interval in {expr:?} must be greater than zero")]
    ZeroInterval { expr: String },

    #[error("invalid cron expression {expr:?}: {source}")]
    Cron {
        expr: String,
        #[source]
        source: cron::error::Error,
    },
}

/// When a job fires.
#[derive(Debug, Clone)]
pub enum JobSchedule {
    /// Fixed interval measured from the previous fire.
    Every(Duration),
    /// Calendar schedule, evaluated in the configured zone.
    Cron(Box<Schedule>),
}

impl JobSchedule {
    /// Parse `@every 2m`, a 5- or 6-field cron expression, or a shortcut
    /// such as `@hourly`.
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(ScheduleError::Empty);
        }

        if let Some(rest) = trimmed.strip_prefix(EVERY_PREFIX) {
            let interval = parse_duration(rest).ok_or_else(|| ScheduleError::InvalidInterval {
                expr: trimmed.to_string(),
            })?;
            if interval.is_zero() {
                return Err(ScheduleError::ZeroInterval {
                    expr: trimmed.to_string(),
                });
            }
            return Ok(JobSchedule::Every(interval));
        }

        Schedule::from_str(&normalize_cron(trimmed))
            .map(|s| JobSchedule::Cron(Box::new(s)))
            .map_err(|source| ScheduleError::Cron {
                expr: trimmed.to_string(),
                source,
            })
    }

    /// First fire strictly after `after`, or `None` if the schedule has no
    /// further occurrences.
    pub fn next_after(&self, after: DateTime<Utc>, zone: &ScheduleZone) -> Option<DateTime<Utc>> {
        match self {
            JobSchedule::Every(interval) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                after.checked_add_signed(step)
            }
            JobSchedule::Cron(schedule) => match zone {
                ScheduleZone::Named(tz) => schedule
                    .after(&after.with_timezone(tz))
                    .next()
                    .map(|t| t.with_timezone(&Utc)),
                ScheduleZone::Fixed(offset) => schedule
                    .after(&after.with_timezone(offset))
                    .next()
                    .map(|t| t.with_timezone(&Utc)),
            },
        }
    }

    /// Next fire for a job whose previous fire was `last`, evaluated at `now`.
    ///
    /// Fixed intervals stay on the grid anchored at the previous fire, so the
    /// cadence does not slip by the execution time; grid points already at or
    /// before `now` are skipped. Cron picks the first occurrence after the
    /// later of `last` and `now`.
    pub fn next_fire(
        &self,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        zone: &ScheduleZone,
    ) -> Option<DateTime<Utc>> {
        match (self, last) {
            (JobSchedule::Every(interval), Some(last)) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                let step_ms = step.num_milliseconds().max(1);
                let next = last.checked_add_signed(step)?;
                if next > now {
                    return Some(next);
                }
                let missed = (now - next).num_milliseconds() / step_ms + 1;
                let skip = step.checked_mul(i32::try_from(missed).ok()?)?;
                next.checked_add_signed(skip)
            }
            (_, last) => self.next_after(last.map_or(now, |l| l.max(now)), zone),
        }
    }
}

impl fmt::Display for JobSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSchedule::Every(d) => write!(f, "{EVERY_PREFIX} {}s", d.as_secs()),
            JobSchedule::Cron(s) => write!(f, "{s}"),
        }
    }
}

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
/// Configuration uses standard 5-field cron: `min hour day-of-month month day-of-week`.
fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        // Already 6-field or a shortcut; pass through as-is.
        trimmed.to_string()
    }
}
