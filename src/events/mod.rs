//! # Engine events: what happened, in order.
//!
//! The engine is observable through a broadcast [`Bus`] of [`Event`]s.
//! Every component publishes fire-and-forget: ingestion rounds, control
//! writes, callback invocations, pool resizes, and the shutdown timeline
//! all leave a trace here, and [`Subscribe`](crate::Subscribe)
//! implementations consume it without ever blocking the publisher.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

/// Extracts a readable message from a caught panic payload.
///
/// Used wherever the engine isolates a panic (subscriber workers, task
/// workers, reaction invocations) before reporting it as an event.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
