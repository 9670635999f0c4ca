//! # Error types used by the engine and the control seam.
//!
//! This module defines two main error enums:
//!
//! - [`EngineError`] errors raised by the orchestration engine itself.
//! - [`ControlError`] errors raised by hardware control writes.
//!
//! Both types provide a helper method `as_label` for logs and metrics.
//!
//! Recoverable errors never unwind across the worker loop: they are caught
//! at the task boundary, reported on the event bus, and the worker proceeds.
//! A missing measurement key is not an error at all; [`Snapshot::get`]
//! returns `None` for the callback to interpret.
//!
//! [`Snapshot::get`]: crate::Snapshot::get

use thiserror::Error;

/// # Errors produced by the orchestration engine.
///
/// These represent failures in the scheduling core itself.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The task queue has been closed by shutdown; no further push or pop
    /// will succeed. Workers treat this as the signal to exit their loop.
    #[error("task queue closed by shutdown")]
    QueueClosed,

    /// An operation referenced a channel outside the configured bank.
    #[error("channel {channel} outside configured bank of {max} channels")]
    UnknownChannel {
        /// The offending channel id.
        channel: u32,
        /// The configured bank size (`max_channels`).
        max: u32,
    },

    /// The engine has already been shut down.
    #[error("engine already stopped")]
    Stopped,
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::QueueClosed => "engine_queue_closed",
            EngineError::UnknownChannel { .. } => "engine_unknown_channel",
            EngineError::Stopped => "engine_stopped",
        }
    }
}

/// # Errors produced by the hardware control seam.
///
/// A control write failing means the handoff to the front-end was rejected;
/// the task that issued it still completes, and retrying is the test
/// program's responsibility (via its reactions).
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ControlError {
    /// The front-end rejected the setpoint handoff.
    #[error("control write '{op}' rejected on channel {channel}: {reason}")]
    Rejected {
        /// Channel the write addressed.
        channel: u32,
        /// Short name of the attempted operation (e.g. `constant_current`).
        op: &'static str,
        /// Front-end supplied reason.
        reason: String,
    },
}

impl ControlError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControlError::Rejected { .. } => "control_rejected",
        }
    }

    /// Channel the failed write addressed.
    pub fn channel(&self) -> u32 {
        match self {
            ControlError::Rejected { channel, .. } => *channel,
        }
    }
}
