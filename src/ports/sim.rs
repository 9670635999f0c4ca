//! # In-memory port adapters for tests and demos.
//!
//! - [`SimControlPort`] records every setpoint handoff and can be scripted
//!   to reject writes, standing in for the hardware front-end.
//! - [`ScriptedTelemetry`] is a [`TelemetrySource`] fed round-by-round
//!   through a [`TelemetryFeed`] handle.
//!
//! Both are deliberately simple: tests drive rounds explicitly and assert
//! on the recorded call log.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::ControlError;
use crate::measurement::{ChannelId, Snapshot};
use crate::ports::{ControlPort, TelemetrySource};

/// One recorded control handoff.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    ConstantCurrent(ChannelId, f64),
    ConstantVoltage(ChannelId, f64),
    Rest(ChannelId),
    Off(ChannelId),
}

impl SimCall {
    fn op(&self) -> &'static str {
        match self {
            SimCall::ConstantCurrent(..) => "constant_current",
            SimCall::ConstantVoltage(..) => "constant_voltage",
            SimCall::Rest(..) => "rest",
            SimCall::Off(..) => "off",
        }
    }

    fn channel(&self) -> ChannelId {
        match self {
            SimCall::ConstantCurrent(c, _)
            | SimCall::ConstantVoltage(c, _)
            | SimCall::Rest(c)
            | SimCall::Off(c) => *c,
        }
    }
}

/// Control port that records calls instead of talking to hardware.
#[derive(Default)]
pub struct SimControlPort {
    calls: Mutex<Vec<SimCall>>,
    rejected: Mutex<HashSet<ChannelId>>,
}

impl SimControlPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write to `channel` fail with
    /// [`ControlError::Rejected`]. Used to exercise the error path.
    pub async fn reject_channel(&self, channel: ChannelId) {
        self.rejected.lock().await.insert(channel);
    }

    /// Returns a copy of the recorded calls, in handoff order.
    pub async fn calls(&self) -> Vec<SimCall> {
        self.calls.lock().await.clone()
    }

    /// Returns how many recorded calls match `pred`.
    pub async fn count(&self, pred: impl Fn(&SimCall) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|c| pred(c)).count()
    }

    async fn record(&self, call: SimCall) -> Result<(), ControlError> {
        if self.rejected.lock().await.contains(&call.channel()) {
            return Err(ControlError::Rejected {
                channel: call.channel(),
                op: call.op(),
                reason: "scripted rejection".to_string(),
            });
        }
        self.calls.lock().await.push(call);
        Ok(())
    }
}

#[async_trait]
impl ControlPort for SimControlPort {
    async fn set_constant_current(
        &self,
        channel: ChannelId,
        amperes: f64,
    ) -> Result<(), ControlError> {
        self.record(SimCall::ConstantCurrent(channel, amperes)).await
    }

    async fn set_constant_voltage(
        &self,
        channel: ChannelId,
        volts: f64,
    ) -> Result<(), ControlError> {
        self.record(SimCall::ConstantVoltage(channel, volts)).await
    }

    async fn set_rest(&self, channel: ChannelId) -> Result<(), ControlError> {
        self.record(SimCall::Rest(channel)).await
    }

    async fn set_off(&self, channel: ChannelId) -> Result<(), ControlError> {
        self.record(SimCall::Off(channel)).await
    }
}

/// Producer half of a [`ScriptedTelemetry`] pair.
///
/// Cheap to clone; dropping every clone makes subsequent polls return
/// empty batches (a permanently quiet front-end).
#[derive(Clone)]
pub struct TelemetryFeed {
    tx: mpsc::UnboundedSender<Vec<(ChannelId, Snapshot)>>,
}

impl TelemetryFeed {
    /// Queues one polling round.
    ///
    /// ```
    /// # let (_src, feed) = cellvisor::ScriptedTelemetry::channel();
    /// feed.round([(1, &[("voltage", 3.5), ("current", 2.0)][..])]);
    /// ```
    pub fn round<'a>(&self, batch: impl IntoIterator<Item = (ChannelId, &'a [(&'a str, f64)])>) {
        let batch: Vec<(ChannelId, Snapshot)> = batch
            .into_iter()
            .map(|(ch, pairs)| (ch, pairs.iter().map(|(k, v)| (*k, *v)).collect()))
            .collect();
        let _ = self.tx.send(batch);
    }

    /// Queues one polling round from pre-built snapshots.
    pub fn round_snapshots(&self, batch: Vec<(ChannelId, Snapshot)>) {
        let _ = self.tx.send(batch);
    }
}

/// Telemetry source that replays rounds queued through a [`TelemetryFeed`].
pub struct ScriptedTelemetry {
    rx: Mutex<mpsc::UnboundedReceiver<Vec<(ChannelId, Snapshot)>>>,
}

impl ScriptedTelemetry {
    /// Creates a source and its feed handle.
    pub fn channel() -> (Self, TelemetryFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx: Mutex::new(rx) }, TelemetryFeed { tx })
    }

    /// Convenience for builders that want `Arc<dyn TelemetrySource>` directly.
    pub fn arc() -> (Arc<Self>, TelemetryFeed) {
        let (src, feed) = Self::channel();
        (Arc::new(src), feed)
    }
}

#[async_trait]
impl TelemetrySource for ScriptedTelemetry {
    async fn poll(&self) -> Vec<(ChannelId, Snapshot)> {
        let mut rx = self.rx.lock().await;
        match rx.try_recv() {
            Ok(batch) => batch,
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sim_port_records_in_order() {
        let port = SimControlPort::new();
        port.set_constant_current(1, 2.0).await.unwrap();
        port.set_rest(1).await.unwrap();
        assert_eq!(
            port.calls().await,
            vec![SimCall::ConstantCurrent(1, 2.0), SimCall::Rest(1)]
        );
    }

    #[tokio::test]
    async fn sim_port_scripted_rejection() {
        let port = SimControlPort::new();
        port.reject_channel(2).await;
        let err = port.set_off(2).await.unwrap_err();
        assert_eq!(err.as_label(), "control_rejected");
        assert!(port.calls().await.is_empty());
    }

    #[tokio::test]
    async fn scripted_telemetry_replays_rounds() {
        let (src, feed) = ScriptedTelemetry::channel();
        feed.round([(0, &[("voltage", 3.3)][..])]);

        let batch = src.poll().await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].0, 0);
        assert_eq!(batch[0].1.get("voltage"), Some(3.3));

        // Quiet round once the queue is empty.
        assert!(src.poll().await.is_empty());
    }
}
