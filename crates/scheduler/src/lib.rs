//! Periodic refresh of occupancy and events into the shared store.

pub mod schedule;
pub mod scheduler;

pub use schedule::{JobSchedule, ScheduleError};
pub use scheduler::{
    EventsJob, JobSpec, JobStats, OccupancyJob, RunStats, Scheduler, SchedulerConfig,
    SchedulerError, SchedulerState, DEFAULT_STARTUP_JITTER,
};
