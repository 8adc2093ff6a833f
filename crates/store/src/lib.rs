//! Shared in-memory state for occupancy, events and alert subscriptions.
//!
//! This crate provides:
//! - [`Store`], a reader/writer-locked consistency domain safe to query while
//!   refresh jobs mutate it
//! - Rising-edge threshold alert detection with a global debounce
//! - [`AlertSink`] for handing alerts to a consumer without holding the lock
//! - [`RetentionPolicy`] for purging events that ended long ago

pub mod alert;
pub mod retention;
pub mod store;

pub use alert::{AlertSink, AlertState, ChannelAlertSink};
pub use retention::{EndedBefore, RetentionPolicy};
pub use store::{Store, UpsertSummary};
