//! Delivery of occupancy alerts to subscribers.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery channels
//! - Webhook and log notifier implementations
//! - Minijinja rendering of alert subject and body
//! - `AlertDispatcher`, which drains the store's alert channel and fans each
//!   alert out to every channel

pub mod dispatcher;
pub mod log;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::AlertDispatcher;
pub use log::LogNotifier;
pub use templating::AlertRenderer;
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
