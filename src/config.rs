//! # Global engine configuration.
//!
//! Provides [`Config`] centralized settings for the orchestration engine.
//!
//! Config is consumed once by [`Orchestrator::builder`](crate::Orchestrator::builder);
//! the engine does not re-read it after startup (the worker count can be
//! changed later via [`Orchestrator::set_worker_count`](crate::Orchestrator::set_worker_count)).
//!
//! ## Sentinel values
//! - `worker_count = 0` → clamped to 1 (an engine with no workers would
//!   accept tasks and never run them)
//! - `bus_capacity = 0` → clamped to 1 (broadcast channels reject zero)

use std::time::Duration;

/// Global configuration for the orchestration engine.
///
/// Defines:
/// - **Channel bank size**: how many hardware channels exist
/// - **Worker pool**: initial number of task workers
/// - **Ingestion cadence**: telemetry polling interval
/// - **Event system**: bus capacity for event delivery
///
/// ## Field semantics
/// - `max_channels`: channel ids are valid in `[0, max_channels)`; fixed at startup
/// - `worker_count`: initial pool size (`0` is clamped to 1)
/// - `poll_interval`: sleep between telemetry polling rounds
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by accessors)
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of hardware channels in the bank.
    ///
    /// Channel ids outside `[0, max_channels)` are rejected with
    /// [`EngineError::UnknownChannel`](crate::EngineError::UnknownChannel).
    /// Fixed for the lifetime of the engine; there is no dynamic discovery.
    pub max_channels: u32,

    /// Initial number of worker tasks draining the queue.
    ///
    /// Can be changed at runtime with `set_worker_count`. A value of `0`
    /// is clamped to 1 at startup.
    pub worker_count: usize,

    /// Interval between telemetry polling rounds.
    ///
    /// The ingestor sleeps this long (cancellably) before each
    /// [`TelemetrySource::poll`](crate::TelemetrySource::poll). In
    /// production this is dictated by the hardware front-end; the default
    /// matches the simulation cadence.
    pub poll_interval: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Subscribers that lag behind more than `bus_capacity` events will
    /// skip older items. Minimum value is 1 (enforced by accessors).
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the worker count clamped to a minimum of 1.
    #[inline]
    pub fn worker_count_clamped(&self) -> usize {
        self.worker_count.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    ///
    /// The `Bus` should use this value to avoid constructing an invalid channel.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns true if `channel` addresses a slot in this configuration.
    #[inline]
    pub fn contains_channel(&self, channel: u32) -> bool {
        channel < self.max_channels
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `max_channels = 32` (one bank)
    /// - `worker_count = 3`
    /// - `poll_interval = 1ms` (simulation cadence)
    /// - `bus_capacity = 1024` (good baseline)
    fn default() -> Self {
        Self {
            max_channels: 32,
            worker_count: 3,
            poll_interval: Duration::from_millis(1),
            bus_capacity: 1024,
        }
    }
}
