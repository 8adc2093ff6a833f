//! Background refresh of occupancy and events on independent schedules.
//!
//! Lifecycle: `Created → Started → Running → Stopping → Stopped`, or
//! `Created → Stopped` when stopped before starting. Each job runs in its own
//! loop; a failing or slow job never delays the other. Executions are bounded
//! by a per-job deadline and are never cancelled by `stop()`, which waits for
//! in-flight work to finish.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use courtside_core::{ScheduleZone, SourceDescriptor};
use courtside_fetch::{EventFetcher, OccupancyFetcher};
use courtside_store::Store;

use crate::schedule::JobSchedule;

pub const DEFAULT_STARTUP_JITTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Created,
    Started,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Created => "created",
            SchedulerState::Started => "started",
            SchedulerState::Running => "running",
            SchedulerState::Stopping => "stopping",
            SchedulerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler already started (state: {0})")]
    AlreadyStarted(SchedulerState),

    #[error("scheduler was stopped and cannot be restarted")]
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Upper bound (exclusive) of the random delay before the first tick.
    pub max_startup_jitter: Duration,
    /// Zone cron expressions are evaluated in.
    pub zone: ScheduleZone,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_startup_jitter: DEFAULT_STARTUP_JITTER,
            zone: ScheduleZone::utc(),
        }
    }
}

/// One scheduled job: what to fetch, when, with which fetcher and how long
/// each execution may take.
pub struct JobSpec<F: ?Sized> {
    pub source: SourceDescriptor,
    pub schedule: JobSchedule,
    pub fetcher: Arc<F>,
    pub deadline: Duration,
}

pub type OccupancyJob = JobSpec<dyn OccupancyFetcher>;
pub type EventsJob = JobSpec<dyn EventFetcher>;

impl<F: ?Sized> JobSpec<F> {
    pub fn new(
        source: SourceDescriptor,
        schedule: JobSchedule,
        fetcher: Arc<F>,
        deadline: Duration,
    ) -> Self {
        Self {
            source,
            schedule,
            fetcher,
            deadline,
        }
    }
}

impl<F: ?Sized> Clone for JobSpec<F> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            schedule: self.schedule.clone(),
            fetcher: self.fetcher.clone(),
            deadline: self.deadline,
        }
    }
}

impl<F: ?Sized> fmt::Debug for JobSpec<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("source", &self.source)
            .field("schedule", &self.schedule.to_string())
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// Counters for one job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStats {
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
    /// Failures caused by the deadline expiring.
    pub timeouts: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub occupancy: JobStats,
    pub events: JobStats,
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Occupancy,
    Events,
}

impl JobKind {
    fn name(self) -> &'static str {
        match self {
            JobKind::Occupancy => "occupancy",
            JobKind::Events => "events",
        }
    }
}

enum Outcome {
    Success,
    Failed(String),
    TimedOut,
}

/// Wall time derived from tokio's monotonic clock, so schedule arithmetic
/// and timers agree (including under paused test time).
///
/// Anchored to `Utc::now()` once at construction. Wall-clock steps after
/// that (NTP corrections, host suspend) are not followed, so over long
/// uptimes cron fires can drift from the system clock by the size of those
/// steps. Restarting the worker re-anchors.
#[derive(Debug, Clone, Copy)]
struct Clock {
    utc: DateTime<Utc>,
    instant: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            utc: Utc::now(),
            instant: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.instant.elapsed()).unwrap_or_default();
        self.utc + elapsed
    }

    /// Tokio instant corresponding to `at`; past times map to now.
    fn instant_at(&self, at: DateTime<Utc>) -> Instant {
        let now = self.now();
        let wait = (at - now).to_std().unwrap_or(Duration::ZERO);
        Instant::now() + wait
    }
}

struct Inner {
    config: SchedulerConfig,
    store: Arc<Store>,
    occupancy: OccupancyJob,
    events: EventsJob,
    clock: Clock,
    state: watch::Sender<SchedulerState>,
    shutdown: watch::Sender<bool>,
    stats: Mutex<RunStats>,
}

/// Drives both refresh jobs against a shared [`Store`].
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<Store>,
        occupancy: OccupancyJob,
        events: EventsJob,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Created);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                occupancy,
                events,
                clock: Clock::new(),
                state,
                shutdown,
                stats: Mutex::new(RunStats::default()),
            }),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.inner.state.borrow()
    }

    pub fn run_stats(&self) -> RunStats {
        self.inner.stats().clone()
    }

    /// Begin scheduling. Returns immediately; jobs start ticking after a
    /// random startup jitter. Must be called within a tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut previous = SchedulerState::Created;
        let started = self.inner.state.send_if_modified(|state| {
            previous = *state;
            if *state == SchedulerState::Created {
                *state = SchedulerState::Started;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(match previous {
                SchedulerState::Stopped => SchedulerError::Stopped,
                other => SchedulerError::AlreadyStarted(other),
            });
        }

        info!(
            occupancy = %self.inner.occupancy.schedule,
            events = %self.inner.events.schedule,
            zone = %self.inner.config.zone,
            "scheduler started"
        );
        for (job, source, fetcher) in [
            ("occupancy", &self.inner.occupancy.source, self.inner.occupancy.fetcher.kind()),
            ("events", &self.inner.events.source, self.inner.events.fetcher.kind()),
        ] {
            if source.kind != fetcher {
                warn!(
                    job,
                    source = %source.name,
                    declared = %source.kind,
                    %fetcher,
                    "fetcher does not match the declared source kind"
                );
            }
        }
        tokio::spawn(drive(self.inner.clone()));
        Ok(())
    }

    /// Stop scheduling and wait for in-flight executions to finish.
    ///
    /// Idempotent. Concurrent callers all return once the scheduler reaches
    /// `Stopped`, which the driver task publishes when it exits. Callers
    /// wanting an upper bound wrap this in `tokio::time::timeout`; dropping
    /// the future early does not affect the shutdown already under way.
    pub async fn stop(&self) {
        let mut previous = SchedulerState::Created;
        let begin = self.inner.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                SchedulerState::Created => {
                    *state = SchedulerState::Stopped;
                    true
                }
                SchedulerState::Started | SchedulerState::Running => {
                    *state = SchedulerState::Stopping;
                    true
                }
                SchedulerState::Stopping | SchedulerState::Stopped => false,
            }
        });

        if begin {
            if previous == SchedulerState::Created {
                info!("scheduler stopped before start");
                return;
            }
            info!("stopping scheduler, waiting for in-flight jobs");
            self.inner.shutdown.send_replace(true);
        }

        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|s| *s == SchedulerState::Stopped).await;
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("occupancy", &self.inner.occupancy)
            .field("events", &self.inner.events)
            .finish()
    }
}

impl Inner {
    fn stats(&self) -> MutexGuard<'_, RunStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn schedule(&self, kind: JobKind) -> &JobSchedule {
        match kind {
            JobKind::Occupancy => &self.occupancy.schedule,
            JobKind::Events => &self.events.schedule,
        }
    }

    fn record(&self, kind: JobKind, outcome: &Outcome) {
        let now = self.clock.now();
        let mut stats = self.stats();
        let job = match kind {
            JobKind::Occupancy => &mut stats.occupancy,
            JobKind::Events => &mut stats.events,
        };
        job.runs += 1;
        match outcome {
            Outcome::Success => {
                job.successes += 1;
                job.last_success = Some(now);
            }
            Outcome::Failed(reason) => {
                job.failures += 1;
                job.last_error = Some(reason.clone());
            }
            Outcome::TimedOut => {
                job.failures += 1;
                job.timeouts += 1;
                job.last_error = Some("deadline exceeded".to_string());
            }
        }
    }

    async fn execute(&self, kind: JobKind) -> Outcome {
        match kind {
            JobKind::Occupancy => self.refresh_occupancy().await,
            JobKind::Events => self.refresh_events().await,
        }
    }

    async fn refresh_occupancy(&self) -> Outcome {
        let job = &self.occupancy;
        let deadline = Instant::now() + job.deadline;
        let started = Instant::now();

        let result = tokio::time::timeout_at(
            deadline,
            job.fetcher.fetch_occupancy(deadline, &job.source),
        )
        .await;

        match result {
            Ok(Ok(snapshot)) => {
                let (in_use, capacity) = (snapshot.in_use, snapshot.capacity);
                let alerts = self.store.set_snapshot(snapshot);
                info!(
                    source = %job.source.name,
                    fetcher = %job.fetcher.kind(),
                    in_use,
                    capacity,
                    alerts = alerts.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "occupancy refreshed"
                );
                Outcome::Success
            }
            Ok(Err(e)) => {
                error!(
                    source = %job.source.name,
                    error = %e,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "occupancy refresh failed"
                );
                Outcome::Failed(e.to_string())
            }
            Err(_) => {
                error!(
                    source = %job.source.name,
                    deadline_secs = job.deadline.as_secs(),
                    "occupancy refresh timed out"
                );
                Outcome::TimedOut
            }
        }
    }

    async fn refresh_events(&self) -> Outcome {
        let job = &self.events;
        let deadline = Instant::now() + job.deadline;
        let started = Instant::now();

        let result = tokio::time::timeout_at(
            deadline,
            job.fetcher
                .fetch_events(deadline, &job.source, &self.config.zone),
        )
        .await;

        match result {
            Ok(Ok(events)) => {
                let found = events.len();
                let summary = self.store.upsert_events(events);
                let purged = self.store.purge_expired(self.clock.now());
                info!(
                    source = %job.source.name,
                    fetcher = %job.fetcher.kind(),
                    found,
                    added = summary.added,
                    updated = summary.updated,
                    purged,
                    total = self.store.event_count(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "events refreshed"
                );
                Outcome::Success
            }
            Ok(Err(e)) => {
                error!(
                    source = %job.source.name,
                    error = %e,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "events refresh failed"
                );
                Outcome::Failed(e.to_string())
            }
            Err(_) => {
                error!(
                    source = %job.source.name,
                    deadline_secs = job.deadline.as_secs(),
                    "events refresh timed out"
                );
                Outcome::TimedOut
            }
        }
    }
}

fn startup_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    // A dropped sender also means shutdown.
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Publishes `Stopped` when the driver exits, including on panic.
struct StoppedOnExit(Arc<Inner>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0.state.send_replace(SchedulerState::Stopped);
        info!("scheduler stopped");
    }
}

/// Waits out the startup jitter, then runs both job loops to completion.
async fn drive(inner: Arc<Inner>) {
    let _stopped = StoppedOnExit(inner.clone());
    let mut shutdown = inner.shutdown.subscribe();
    let jitter = startup_jitter(inner.config.max_startup_jitter);
    debug!(jitter_ms = jitter.as_millis() as u64, "waiting for startup jitter");

    tokio::select! {
        biased;
        _ = wait_for_shutdown(&mut shutdown) => return,
        _ = tokio::time::sleep(jitter) => {}
    }

    let running = inner.state.send_if_modified(|state| {
        if *state == SchedulerState::Started {
            *state = SchedulerState::Running;
            true
        } else {
            false
        }
    });
    if !running {
        return;
    }
    info!("scheduler running");

    let mut jobs = JoinSet::new();
    for kind in [JobKind::Occupancy, JobKind::Events] {
        jobs.spawn(run_job(inner.clone(), kind, inner.shutdown.subscribe()));
    }
    while let Some(result) = jobs.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "job loop terminated abnormally");
        }
    }
}

/// Fire `kind` on its schedule until shutdown. Ticks that pass while an
/// execution is still running are skipped rather than queued.
async fn run_job(inner: Arc<Inner>, kind: JobKind, mut shutdown: watch::Receiver<bool>) {
    let zone = inner.config.zone;
    let mut last_fire: Option<DateTime<Utc>> = None;

    loop {
        let now = inner.clock.now();
        let Some(next) = inner.schedule(kind).next_fire(last_fire, now, &zone) else {
            warn!(job = kind.name(), "schedule has no further occurrences");
            wait_for_shutdown(&mut shutdown).await;
            return;
        };
        debug!(job = kind.name(), next = %next, "next run scheduled");

        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => return,
            _ = tokio::time::sleep_until(inner.clock.instant_at(next)) => {}
        }
        last_fire = Some(next);
        if inner.stopping() {
            return;
        }

        let outcome = inner.execute(kind).await;
        inner.record(kind, &outcome);
    }
}
