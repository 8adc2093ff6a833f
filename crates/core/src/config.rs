use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::ConfigError;
use crate::zone::ScheduleZone;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Reads a profiled key: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
/// Empty values count as unset.
struct Profiled<F> {
    profile: String,
    lookup: F,
}

impl<F> Profiled<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn opt(&self, key: &str) -> Option<String> {
        let get = |k: &str| (self.lookup)(k).filter(|v| !v.trim().is_empty());
        if !self.profile.is_empty() {
            if let Some(v) = get(&format!("{}_{}", self.profile, key)) {
                return Some(v);
            }
        }
        get(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn secs(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        match self.opt(key) {
            None => Ok(Duration::from_secs(default)),
            Some(v) => v
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::Invalid {
                    key,
                    value: v,
                    reason: e.to_string(),
                }),
        }
    }

    fn kind(&self, key: &'static str) -> Result<SourceKind, ConfigError> {
        match self.opt(key) {
            None => Ok(SourceKind::Json),
            Some(v) => v.parse().map_err(|reason| ConfigError::Invalid {
                key,
                value: v,
                reason,
            }),
        }
    }
}

// ── Source descriptors ────────────────────────────────────────

/// Declared payload kind of an external source. Picks the fetcher variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Json,
    /// Synthetic data, no network access.
    Fallback,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(SourceKind::Json),
            "fallback" => Ok(SourceKind::Fallback),
            other => Err(format!("unknown source kind '{other}' (expected json or fallback)")),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Json => write!(f, "json"),
            SourceKind::Fallback => write!(f, "fallback"),
        }
    }
}

/// What a fetcher needs to know about the source it reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Short label used in logs, e.g. "macgym".
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
}

/// One refreshed source: where it lives, how often and how long to wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: Option<String>,
    pub kind: SourceKind,
    /// Cron expression or `@every <duration>`.
    pub schedule: String,
    /// Deadline for a single fetch cycle.
    pub timeout: Duration,
}

impl SourceConfig {
    pub fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            name: self.name.clone(),
            url: self.url.clone().unwrap_or_default(),
            kind: self.kind,
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    /// IANA timezone name for schedules and local event times.
    pub timezone: String,
    pub occupancy: SourceConfig,
    pub events: SourceConfig,
    /// Upper bound of the random delay before the first tick.
    pub startup_jitter: Duration,
    /// Minimum gap between two alert emissions.
    pub alert_debounce: Duration,
    /// Events that ended longer ago than this are purged; `None` keeps all.
    pub event_retention: Option<Duration>,
    pub alert_webhook_url: Option<String>,
    /// Upper bound for draining in-flight jobs on shutdown.
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `COURTSIDE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = lookup("COURTSIDE_PROFILE")
            .unwrap_or_default()
            .trim()
            .to_uppercase();
        let p = Profiled { profile, lookup };

        let event_retention = match p.opt("EVENT_RETENTION") {
            None => parse_duration("30d"),
            Some(v) if v.trim().eq_ignore_ascii_case("off") => None,
            Some(v) => Some(parse_duration(&v).ok_or_else(|| ConfigError::Invalid {
                key: "EVENT_RETENTION",
                value: v.clone(),
                reason: "expected a duration like 30d or 12h".to_string(),
            })?),
        };

        Ok(Self {
            timezone: p.or("TIMEZONE", "America/Los_Angeles"),
            occupancy: SourceConfig {
                name: "macgym".to_string(),
                url: p.opt("MACGYM_URL"),
                kind: p.kind("MACGYM_SOURCE_KIND")?,
                schedule: p.or("REFRESH_MACGYM_CRON", "@every 2m"),
                timeout: p.secs("MACGYM_TIMEOUT_SECS", 30)?,
            },
            events: SourceConfig {
                name: "fitness".to_string(),
                url: p.opt("FITNESS_URL"),
                kind: p.kind("FITNESS_SOURCE_KIND")?,
                schedule: p.or("REFRESH_EVENTS_CRON", "@every 30m"),
                timeout: p.secs("EVENTS_TIMEOUT_SECS", 60)?,
            },
            startup_jitter: p.secs("STARTUP_JITTER_SECS", 30)?,
            alert_debounce: p.secs("ALERT_DEBOUNCE_SECS", 60)?,
            event_retention,
            alert_webhook_url: p.opt("ALERT_WEBHOOK_URL"),
            shutdown_timeout: p.secs("SHUTDOWN_TIMEOUT_SECS", 10)?,
            profile: p.profile,
        })
    }

    /// Check that every JSON source has a URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.occupancy.kind == SourceKind::Json && self.occupancy.url.is_none() {
            return Err(ConfigError::Missing("MACGYM_URL"));
        }
        if self.events.kind == SourceKind::Json && self.events.url.is_none() {
            return Err(ConfigError::Missing("FITNESS_URL"));
        }
        Ok(())
    }

    pub fn zone(&self) -> ScheduleZone {
        ScheduleZone::resolve(&self.timezone)
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  timezone:    {}", self.timezone);
        for source in [&self.occupancy, &self.events] {
            tracing::info!(
                "  {:<11} kind={}, schedule={}, timeout={}s, url={}",
                format!("{}:", source.name),
                source.kind,
                source.schedule,
                source.timeout.as_secs(),
                source.url.as_deref().unwrap_or("(none)"),
            );
        }
        tracing::info!(
            "  alerts:      debounce={}s, webhook={}",
            self.alert_debounce.as_secs(),
            if self.alert_webhook_url.is_some() { "configured" } else { "(none)" },
        );
        tracing::info!(
            "  retention:   {}",
            self.event_retention
                .map(|d| format!("{}s", d.as_secs()))
                .unwrap_or_else(|| "off".to_string()),
        );
    }
}
