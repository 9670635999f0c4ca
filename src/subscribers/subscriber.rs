//! # Event subscriber trait.
//!
//! Provides [`Subscribe`] — the extension point for plugging custom event
//! handlers into the engine.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Bounded queue** (configurable capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics caught, reported as `SubscriberPanicked`)
//!
//! ## Rules
//! - Slow subscribers only affect themselves (queue overflow → event drop)
//! - Panics do not crash the engine or other subscribers
//! - Subscribers never block the ingestor or the workers
//!
//! ## Overflow behavior
//! When a subscriber's queue is full:
//! 1. The event is **dropped** for this subscriber only
//! 2. A `SubscriberOverflow` event is published (for observability)
//! 3. Other subscribers are **unaffected**

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for engine observability.
///
/// Receives events via a dedicated worker task with a bounded queue.
///
/// ### Implementation requirements
/// - Use async I/O; blocking here only stalls this subscriber's own queue
/// - Handle errors internally, do not panic
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from the subscriber's dedicated worker, sequentially and in
    /// publish order for this subscriber. Panics are caught and reported as
    /// `SubscriberPanicked`.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name for overflow/panic reporting.
    ///
    /// Keep short and descriptive (e.g. `"metrics"`, `"audit"`).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber.
    ///
    /// On overflow the incoming event is dropped for this subscriber and a
    /// `SubscriberOverflow` event is published.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
