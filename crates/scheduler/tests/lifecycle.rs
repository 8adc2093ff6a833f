//! Scheduler lifecycle, fault isolation and graceful stop, under paused time.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use courtside_core::{Event, OccupancySnapshot, ScheduleZone, SourceDescriptor, SourceKind};
use courtside_fetch::{EventFetcher, FetchError, OccupancyFetcher};
use courtside_scheduler::{
    EventsJob, JobSchedule, OccupancyJob, Scheduler, SchedulerConfig, SchedulerError,
    SchedulerState,
};
use courtside_store::Store;

#[derive(Default)]
struct FakeOccupancy {
    calls: AtomicUsize,
    completed: AtomicUsize,
    fail: bool,
    delay: Duration,
}

#[async_trait]
impl OccupancyFetcher for FakeOccupancy {
    async fn fetch_occupancy(
        &self,
        _deadline: Instant,
        _source: &SourceDescriptor,
    ) -> Result<OccupancySnapshot, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::Source("counter offline".to_string()));
        }
        Ok(OccupancySnapshot {
            retrieved_at: Utc::now(),
            location: "Mac Gym".to_string(),
            capacity: 8,
            in_use: n,
            details: format!("{n}/8 in use"),
            raw: None,
        })
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fallback
    }
}

#[derive(Default)]
struct FakeEvents {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl EventFetcher for FakeEvents {
    async fn fetch_events(
        &self,
        _deadline: Instant,
        _source: &SourceDescriptor,
        _zone: &ScheduleZone,
    ) -> Result<Vec<Event>, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as i64;
        if self.fail {
            return Err(FetchError::Source("schedule offline".to_string()));
        }
        let start = Utc::now() + chrono::Duration::days(1) + chrono::Duration::hours(n);
        Ok(vec![Event::new(
            "Badminton Open Play",
            "Court 1",
            start,
            start + chrono::Duration::hours(2),
        )])
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fallback
    }
}

fn source(name: &str) -> SourceDescriptor {
    SourceDescriptor {
        name: name.to_string(),
        url: format!("https://{name}.example.edu"),
        kind: SourceKind::Fallback,
    }
}

fn every_10s() -> JobSchedule {
    JobSchedule::parse("@every 10s").unwrap()
}

fn scheduler(
    occupancy: Arc<FakeOccupancy>,
    events: Arc<FakeEvents>,
    jitter: Duration,
) -> (Scheduler, Arc<Store>) {
    scheduler_every(occupancy, events, jitter, every_10s())
}

fn scheduler_every(
    occupancy: Arc<FakeOccupancy>,
    events: Arc<FakeEvents>,
    jitter: Duration,
    schedule: JobSchedule,
) -> (Scheduler, Arc<Store>) {
    let store = Arc::new(Store::default());
    let config = SchedulerConfig {
        max_startup_jitter: jitter,
        zone: ScheduleZone::utc(),
    };
    let occupancy_job = OccupancyJob::new(
        source("macgym"),
        schedule.clone(),
        occupancy,
        Duration::from_secs(30),
    );
    let events_job = EventsJob::new(source("fitness"), schedule, events, Duration::from_secs(60));
    (
        Scheduler::new(config, store.clone(), occupancy_job, events_job),
        store,
    )
}

#[tokio::test(start_paused = true)]
async fn failing_occupancy_does_not_affect_events() {
    let occupancy = Arc::new(FakeOccupancy {
        fail: true,
        ..Default::default()
    });
    let events = Arc::new(FakeEvents::default());
    let (sched, store) = scheduler(occupancy.clone(), events.clone(), Duration::ZERO);

    sched.start().unwrap();
    tokio::time::sleep(Duration::from_secs(35)).await;
    sched.stop().await;

    assert_eq!(occupancy.calls.load(Ordering::SeqCst), 3);
    assert_eq!(events.calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.event_count(), 3);
    assert_eq!(store.snapshot(), OccupancySnapshot::default());

    let stats = sched.run_stats();
    assert_eq!(stats.occupancy.failures, 3);
    assert_eq!(
        stats.occupancy.last_error.as_deref(),
        Some("source reported failure: counter offline")
    );
    assert_eq!(stats.events.successes, 3);
    assert!(stats.events.last_success.is_some());
}

#[tokio::test(start_paused = true)]
async fn failing_events_does_not_affect_occupancy() {
    let occupancy = Arc::new(FakeOccupancy::default());
    let events = Arc::new(FakeEvents {
        fail: true,
        ..Default::default()
    });
    let (sched, store) = scheduler(occupancy.clone(), events.clone(), Duration::ZERO);

    sched.start().unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;
    sched.stop().await;

    assert_eq!(store.snapshot().in_use, 2);
    assert_eq!(store.event_count(), 0);
    assert_eq!(sched.run_stats().events.failures, 2);
    assert_eq!(sched.run_stats().occupancy.successes, 2);
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_is_cut_at_deadline() {
    let occupancy = Arc::new(FakeOccupancy {
        delay: Duration::from_secs(120),
        ..Default::default()
    });
    let events = Arc::new(FakeEvents::default());
    let (sched, store) = scheduler(occupancy.clone(), events.clone(), Duration::ZERO);

    sched.start().unwrap();
    // First fire at 10s, deadline at 40s.
    tokio::time::sleep(Duration::from_secs(45)).await;
    sched.stop().await;

    let stats = sched.run_stats();
    assert_eq!(stats.occupancy.timeouts, 1);
    assert_eq!(occupancy.completed.load(Ordering::SeqCst), 0);
    assert!(!store.snapshot().has_capacity());
    // Events kept ticking while occupancy was stuck.
    assert!(events.calls.load(Ordering::SeqCst) >= 4);
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_in_flight_fetch() {
    let occupancy = Arc::new(FakeOccupancy {
        delay: Duration::from_secs(5),
        ..Default::default()
    });
    let events = Arc::new(FakeEvents::default());
    let (sched, store) = scheduler(occupancy.clone(), events.clone(), Duration::ZERO);

    sched.start().unwrap();
    // Fire at 10s; fetch in flight until 15s.
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(occupancy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(occupancy.completed.load(Ordering::SeqCst), 0);

    let before = Instant::now();
    sched.stop().await;
    assert!(before.elapsed() >= Duration::from_secs(3));
    assert_eq!(sched.state(), SchedulerState::Stopped);
    assert_eq!(occupancy.completed.load(Ordering::SeqCst), 1);
    assert_eq!(store.snapshot().in_use, 1);

    // Nothing runs after stop.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(occupancy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(events.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn interval_cadence_ignores_fetch_duration() {
    let occupancy = Arc::new(FakeOccupancy {
        delay: Duration::from_secs(20),
        ..Default::default()
    });
    let events = Arc::new(FakeEvents::default());
    let (sched, _store) = scheduler_every(
        occupancy.clone(),
        events.clone(),
        Duration::ZERO,
        JobSchedule::parse("@every 60s").unwrap(),
    );

    sched.start().unwrap();
    // Fires at 60s, 120s, ..., 600s.
    tokio::time::sleep(Duration::from_secs(605)).await;
    assert_eq!(occupancy.calls.load(Ordering::SeqCst), 10);
    assert_eq!(events.calls.load(Ordering::SeqCst), 10);
    sched.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_after_abandoned_stop_still_completes() {
    let occupancy = Arc::new(FakeOccupancy {
        delay: Duration::from_secs(25),
        ..Default::default()
    });
    let events = Arc::new(FakeEvents::default());
    let (sched, store) = scheduler(occupancy.clone(), events.clone(), Duration::ZERO);

    sched.start().unwrap();
    // Fire at 10s; fetch in flight until 35s.
    tokio::time::sleep(Duration::from_secs(12)).await;

    let first = tokio::time::timeout(Duration::from_secs(1), sched.stop()).await;
    assert!(first.is_err());
    assert_eq!(sched.state(), SchedulerState::Stopping);

    // The in-flight fetch finishes and the driver reports Stopped on its own.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sched.state(), SchedulerState::Stopped);
    assert_eq!(occupancy.completed.load(Ordering::SeqCst), 1);
    assert_eq!(store.snapshot().in_use, 1);

    let second = tokio::time::timeout(Duration::from_secs(1), sched.stop()).await;
    assert!(second.is_ok());
    assert_eq!(occupancy.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn lifecycle_states_and_double_start() {
    let (sched, _store) = scheduler(
        Arc::new(FakeOccupancy::default()),
        Arc::new(FakeEvents::default()),
        Duration::from_secs(30),
    );
    assert_eq!(sched.state(), SchedulerState::Created);

    sched.start().unwrap();
    assert_eq!(sched.state(), SchedulerState::Started);
    assert_eq!(
        sched.start(),
        Err(SchedulerError::AlreadyStarted(SchedulerState::Started))
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(sched.state(), SchedulerState::Running);
    assert!(matches!(
        sched.start(),
        Err(SchedulerError::AlreadyStarted(SchedulerState::Running))
    ));

    sched.stop().await;
    assert_eq!(sched.state(), SchedulerState::Stopped);
    // Idempotent.
    sched.stop().await;
    assert_eq!(sched.state(), SchedulerState::Stopped);
    assert_eq!(sched.start(), Err(SchedulerError::Stopped));
}

#[tokio::test(start_paused = true)]
async fn stop_during_jitter_runs_nothing() {
    let occupancy = Arc::new(FakeOccupancy::default());
    let events = Arc::new(FakeEvents::default());
    let (sched, _store) = scheduler(occupancy.clone(), events.clone(), Duration::from_secs(30));

    sched.start().unwrap();
    sched.stop().await;
    assert_eq!(sched.state(), SchedulerState::Stopped);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(occupancy.calls.load(Ordering::SeqCst), 0);
    assert_eq!(events.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stop_before_start() {
    let (sched, _store) = scheduler(
        Arc::new(FakeOccupancy::default()),
        Arc::new(FakeEvents::default()),
        Duration::ZERO,
    );
    sched.stop().await;
    assert_eq!(sched.state(), SchedulerState::Stopped);
    assert_eq!(sched.start(), Err(SchedulerError::Stopped));
}
