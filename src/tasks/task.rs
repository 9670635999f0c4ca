//! # Task variants and control operations.
//!
//! [`Task`] is a tagged variant family dispatched in one place (the
//! executor) rather than an open class hierarchy; the genuinely open-ended
//! extension point is the [`Reaction`](crate::Reaction) capability, not the
//! task set.
//!
//! [`ControlOp`] is the payload of [`Task::Control`]: a sequence of
//! setpoint operations executed in order against the control port,
//! short-circuiting on the first failure.

use crate::error::ControlError;
use crate::measurement::{ChannelId, Snapshot};
use crate::ports::ControlPort;
use crate::reactions::CallbackId;
use crate::tasks::TaskPriority;

/// One setpoint operation inside a [`Task::Control`] sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOp {
    /// Drive the channel at a constant current (amperes).
    ConstantCurrent(ChannelId, f64),
    /// Hold the channel at a constant voltage (volts).
    ConstantVoltage(ChannelId, f64),
    /// Open the circuit (rest state).
    Rest(ChannelId),
    /// Turn the channel off.
    Off(ChannelId),
}

impl ControlOp {
    /// Issues this setpoint through `port`.
    pub async fn apply(&self, port: &dyn ControlPort) -> Result<(), ControlError> {
        match self {
            ControlOp::ConstantCurrent(ch, amperes) => {
                port.set_constant_current(*ch, *amperes).await
            }
            ControlOp::ConstantVoltage(ch, volts) => port.set_constant_voltage(*ch, *volts).await,
            ControlOp::Rest(ch) => port.set_rest(*ch).await,
            ControlOp::Off(ch) => port.set_off(*ch).await,
        }
    }

    /// Channel this operation addresses.
    pub fn channel(&self) -> ChannelId {
        match self {
            ControlOp::ConstantCurrent(ch, _)
            | ControlOp::ConstantVoltage(ch, _)
            | ControlOp::Rest(ch)
            | ControlOp::Off(ch) => *ch,
        }
    }
}

/// Unit of schedulable work.
///
/// Tasks are uniquely owned: created by the orchestrator, the ingestor, or
/// a reaction; owned by the queue until popped; then by the executing
/// worker until done.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Hand a constant-current setpoint to the front-end.
    ConstantCurrent { channel: ChannelId, amperes: f64 },
    /// Hand a constant-voltage setpoint to the front-end.
    ConstantVoltage { channel: ChannelId, volts: f64 },
    /// Invoke the reaction registered under `id` with a fresh table
    /// snapshot. A no-op if the reaction has been unregistered meanwhile.
    Callback { channel: ChannelId, id: CallbackId },
    /// Execute a sequence of setpoint operations in order, stopping at the
    /// first failure.
    Control { ops: Vec<ControlOp> },
    /// Smooth the raw sample and merge the result into the data table.
    Filter { channel: ChannelId, raw: Snapshot },
    /// Fit derived quantities (dv/dt) from the raw sample and the tabled
    /// history, merging the result into the data table.
    Fit { channel: ChannelId, raw: Snapshot },
}

impl Task {
    /// Scheduling priority for this variant.
    ///
    /// Callback invocations are `High` so reactions run ahead of the data
    /// backlog; everything else is `Normal`. `Low` is reserved.
    pub fn priority(&self) -> TaskPriority {
        match self {
            Task::Callback { .. } => TaskPriority::High,
            Task::ConstantCurrent { .. }
            | Task::ConstantVoltage { .. }
            | Task::Control { .. }
            | Task::Filter { .. }
            | Task::Fit { .. } => TaskPriority::Normal,
        }
    }

    /// Short static label for events and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Task::ConstantCurrent { .. } => "constant_current",
            Task::ConstantVoltage { .. } => "constant_voltage",
            Task::Callback { .. } => "callback",
            Task::Control { .. } => "control",
            Task::Filter { .. } => "filter",
            Task::Fit { .. } => "fit",
        }
    }

    /// Channel this task concerns, when it concerns exactly one.
    ///
    /// `Control` sequences may span channels; they report the first op's
    /// channel (or `None` when empty).
    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            Task::ConstantCurrent { channel, .. }
            | Task::ConstantVoltage { channel, .. }
            | Task::Callback { channel, .. }
            | Task::Filter { channel, .. }
            | Task::Fit { channel, .. } => Some(*channel),
            Task::Control { ops } => ops.first().map(ControlOp::channel),
        }
    }
}
