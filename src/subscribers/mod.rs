//! # Event subscribers: observability without back-pressure.
//!
//! A [`Subscribe`] implementation receives every engine [`Event`](crate::Event)
//! on its own worker with a bounded queue, so a slow metrics exporter can
//! never stall telemetry ingestion or task execution.
//!
//! - [`Subscribe`] — the extension point for custom handlers
//! - [`SubscriberSet`] — per-subscriber queues + workers + panic isolation
//! - [`LogWriter`] — built-in stdout subscriber (feature `logging`)

mod set;
mod subscriber;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscriber::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
