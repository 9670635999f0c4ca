//! # External collaborator seams.
//!
//! The engine depends on two trait-shaped ports and nothing else about the
//! hardware:
//!
//! - [`ControlPort`] — setpoint writes toward the channel front-end
//! - [`TelemetrySource`] — batched measurement polling from the front-end
//!
//! Production adapters (RPMsg, serial, whatever the co-processor speaks)
//! live outside this crate; [`sim`] provides in-memory adapters for tests
//! and demos.
//!
//! ## Rules
//! - Control writes are **handoffs**: `Ok(())` means the front-end accepted
//!   the setpoint, not that the channel reached it.
//! - [`TelemetrySource::poll`] may block internally up to a bounded
//!   interval; the ingestor wraps it in a cancellable select so shutdown is
//!   never gated on a quiet front-end.
//! - Ports are shared (`Arc<dyn ...>`) between the orchestrator, the
//!   workers, and any reaction that captures them.

pub mod sim;

use async_trait::async_trait;

use crate::error::ControlError;
use crate::measurement::{ChannelId, Snapshot};

/// Shared handle to a control port.
pub type ControlPortRef = std::sync::Arc<dyn ControlPort>;

/// Shared handle to a telemetry source.
pub type TelemetrySourceRef = std::sync::Arc<dyn TelemetrySource>;

/// Setpoint writes toward the channel front-end.
///
/// Each call hands one setpoint to the hardware; the return value reports
/// local success of the handoff only. Implementations are expected to be
/// non-blocking writes — if a concrete port must block, that blocking is
/// attributed to the worker executing the task.
#[async_trait]
pub trait ControlPort: Send + Sync + 'static {
    /// Drives `channel` at a constant current of `amperes`.
    async fn set_constant_current(
        &self,
        channel: ChannelId,
        amperes: f64,
    ) -> Result<(), ControlError>;

    /// Holds `channel` at a constant voltage of `volts`.
    async fn set_constant_voltage(&self, channel: ChannelId, volts: f64)
        -> Result<(), ControlError>;

    /// Opens the circuit on `channel` (rest state).
    async fn set_rest(&self, channel: ChannelId) -> Result<(), ControlError>;

    /// Turns `channel` off.
    async fn set_off(&self, channel: ChannelId) -> Result<(), ControlError>;
}

/// Batched measurement polling from the front-end.
///
/// One poll returns the channels that produced new data since the last
/// poll, each with its fresh measurements. An empty batch is a normal quiet
/// round.
#[async_trait]
pub trait TelemetrySource: Send + Sync + 'static {
    /// Returns the batch of new samples since the last poll.
    async fn poll(&self) -> Vec<(ChannelId, Snapshot)>;
}
