//! # Runtime events emitted by the engine.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Ingestion events**: telemetry rounds landing in the data table
//! - **Execution events**: control writes and callback invocations on workers
//! - **Pool events**: worker generation changes
//! - **Shutdown events**: the teardown timeline
//!
//! The [`Event`] struct carries metadata such as the channel, the task
//! label, the callback id, and error messages.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so events can be ordered correctly even when delivered
//! out-of-order through async channels.
//!
//! ## Event flow examples
//!
//! ### One polling round for a subscribed channel
//! ```text
//! SampleIngested{channel}
//!   → [Filter + Fit queued]
//!   → CallbackFired{channel, callback} (per registered reaction, on a worker)
//! ```
//!
//! ### CCCV voltage target reached
//! ```text
//! CallbackFired{channel=1}
//!   → ControlApplied{task="constant_voltage", channel=1}
//! ```
//!
//! ### Shutdown
//! ```text
//! ShutdownRequested → TasksDrained{dropped} → EngineStopped
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of engine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    SubscriberPanicked,
    /// Subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,

    // === Ingestion events ===
    /// A telemetry sample was merged into the data table.
    SampleIngested,
    /// An operation referenced a channel outside the configured bank.
    ChannelRejected,

    // === Execution events ===
    /// A control setpoint was handed off to the front-end.
    ControlApplied,
    /// The front-end rejected a control write.
    ControlFailed,
    /// A reaction ran against a fresh table snapshot.
    CallbackFired,
    /// A queued callback invocation found its reaction unregistered (no-op).
    CallbackSkipped,
    /// A reaction panicked; the worker caught it and moved on.
    CallbackPanicked,
    /// A non-callback task body panicked; the worker caught it and moved on.
    TaskPanicked,

    // === Pool events ===
    /// The worker pool was brought to a new size.
    WorkersResized,

    // === Shutdown events ===
    /// Shutdown was requested; the queue is closing.
    ShutdownRequested,
    /// Pending tasks were drained and dropped during shutdown.
    TasksDrained,
    /// All workers and the ingestor have stopped; the engine is inert.
    EngineStopped,
}

/// Engine event with optional metadata.
///
/// ## Fields
/// - `seq`: unique sequence number for ordering (monotonically increasing)
/// - `at`: wall-clock timestamp (may go backwards due to NTP, use for logging only)
/// - `kind`: event classification
/// - `channel`, `task`, `callback`, `workers`, `dropped`, `error`: optional metadata
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    /// Used to determine event ordering across async boundaries.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards, use for logging only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Channel the event concerns, if applicable.
    pub channel: Option<u32>,
    /// Task label (e.g. `"constant_current"`), if applicable.
    pub task: Option<&'static str>,
    /// Stable callback id, if the event concerns a reaction.
    pub callback: Option<u64>,
    /// Worker count after a resize.
    pub workers: Option<usize>,
    /// Number of tasks dropped by a shutdown drain.
    pub dropped: Option<usize>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            channel: None,
            task: None,
            callback: None,
            workers: None,
            dropped: None,
            error: None,
        }
    }

    /// Attaches a channel id.
    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Attaches a task label.
    pub fn with_task(mut self, label: &'static str) -> Self {
        self.task = Some(label);
        self
    }

    /// Attaches a callback id.
    pub fn with_callback(mut self, id: u64) -> Self {
        self.callback = Some(id);
        self
    }

    /// Attaches a worker count.
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    /// Attaches a dropped-task count.
    pub fn with_dropped(mut self, n: usize) -> Self {
        self.dropped = Some(n);
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Creates a subscriber overflow event.
    ///
    /// Emitted when a subscriber's queue is full and an event is dropped.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_error(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    ///
    /// Emitted when a subscriber panics during event processing.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_error(info)
    }

    /// Returns true for events the fan-out must not re-report on overflow,
    /// to prevent event storms.
    pub(crate) fn is_fanout_internal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
