//! # Execute a single task.
//!
//! [`ExecContext`] bundles the shared services a worker needs and dispatches
//! one [`Task`] at a time. Every recoverable failure is caught here, reported
//! on the bus with channel/task context, and swallowed; the worker loop
//! never sees an error (see the propagation policy in [`crate::error`]).
//!
//! ## Dispatch semantics
//! ```text
//! ConstantCurrent / ConstantVoltage:
//!   port write → ControlApplied | ControlFailed
//!
//! Control{ops}:
//!   apply in order → stop at first failure → ControlFailed
//!
//! Callback{channel, id}:
//!   registry.get(id) → gone       → CallbackSkipped (not an error)
//!                    → present    → table snapshot → on_sample()
//!                                   → CallbackFired | CallbackPanicked
//!
//! Filter{channel, raw}:
//!   first-order low-pass of voltage/current/temperature → "*_ema" keys
//!
//! Fit{channel, raw}:
//!   dv/dt against the previous fit reference → "dvdt" key
//! ```
//!
//! Both kernels merge their results back through
//! [`ChannelTable::update`], so downstream reactions read derived values
//! from the same snapshot as the raw ones.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::events::{panic_message, Bus, Event, EventKind};
use crate::measurement::{ChannelId, Snapshot};
use crate::ports::ControlPortRef;
use crate::reactions::{CallbackId, ReactionRegistry};
use crate::table::ChannelTable;
use crate::tasks::{ControlOp, Task};

/// Smoothing factor of the filter kernel's exponential moving average.
const FILTER_ALPHA: f64 = 0.2;

/// Measurements the filter kernel smooths when present.
const FILTERED_KEYS: [&str; 3] = ["voltage", "current", "temperature"];

/// Shared services handed to every worker.
pub(crate) struct ExecContext {
    pub port: ControlPortRef,
    pub table: Arc<ChannelTable>,
    pub registry: Arc<ReactionRegistry>,
    pub bus: Bus,
}

impl ExecContext {
    /// Executes one task to completion.
    ///
    /// Never returns an error: recoverable failures are published and the
    /// task counts as done.
    pub async fn execute(&self, task: Task) {
        match task {
            Task::ConstantCurrent { channel, amperes } => {
                self.apply_op(ControlOp::ConstantCurrent(channel, amperes), "constant_current")
                    .await;
            }
            Task::ConstantVoltage { channel, volts } => {
                self.apply_op(ControlOp::ConstantVoltage(channel, volts), "constant_voltage")
                    .await;
            }
            Task::Control { ops } => {
                for op in ops {
                    if !self.apply_op(op, "control").await {
                        break;
                    }
                }
            }
            Task::Callback { channel, id } => self.invoke_callback(channel, id).await,
            Task::Filter { channel, raw } => self.run_filter(channel, &raw).await,
            Task::Fit { channel, raw } => self.run_fit(channel, &raw).await,
        }
    }

    /// Hands one setpoint to the front-end; returns false on rejection.
    async fn apply_op(&self, op: ControlOp, label: &'static str) -> bool {
        let channel = op.channel();
        match op.apply(self.port.as_ref()).await {
            Ok(()) => {
                self.bus.publish(
                    Event::now(EventKind::ControlApplied)
                        .with_task(label)
                        .with_channel(channel),
                );
                true
            }
            Err(e) => {
                self.bus.publish(
                    Event::now(EventKind::ControlFailed)
                        .with_task(label)
                        .with_channel(channel)
                        .with_error(e.to_string()),
                );
                false
            }
        }
    }

    /// Invokes the reaction registered under `id` with a fresh snapshot.
    ///
    /// A missing reaction is the normal outcome of unregistration racing an
    /// already-queued invocation: the task completes as a quiet no-op.
    async fn invoke_callback(&self, channel: ChannelId, id: CallbackId) {
        let reaction = match self.registry.get(channel, id).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                self.bus.publish(
                    Event::now(EventKind::CallbackSkipped)
                        .with_channel(channel)
                        .with_callback(id.0),
                );
                return;
            }
            Err(e) => {
                self.reject_channel(channel, &e);
                return;
            }
        };

        let snapshot = match self.table.snapshot(channel).await {
            Ok(s) => s,
            Err(e) => {
                self.reject_channel(channel, &e);
                return;
            }
        };

        let fut = reaction.on_sample(channel, &snapshot);
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(()) => {
                self.bus.publish(
                    Event::now(EventKind::CallbackFired)
                        .with_channel(channel)
                        .with_callback(id.0),
                );
            }
            Err(panic_err) => {
                self.bus.publish(
                    Event::now(EventKind::CallbackPanicked)
                        .with_channel(channel)
                        .with_callback(id.0)
                        .with_error(panic_message(&*panic_err)),
                );
            }
        }
    }

    /// Filter kernel: first-order low-pass over the raw sample.
    ///
    /// For each smoothed measurement `k` present in `raw`, maintains
    /// `k_ema = alpha * raw[k] + (1 - alpha) * previous k_ema`, seeding the
    /// average with the raw value on the first round.
    async fn run_filter(&self, channel: ChannelId, raw: &Snapshot) {
        let prev = match self.table.snapshot(channel).await {
            Ok(s) => s,
            Err(e) => {
                self.reject_channel(channel, &e);
                return;
            }
        };

        let mut derived = Snapshot::new();
        for key in FILTERED_KEYS {
            if let Some(x) = raw.get(key) {
                let ema_key = format!("{key}_ema");
                let prev_ema = prev.get(&ema_key).unwrap_or(x);
                derived.set(ema_key, FILTER_ALPHA * x + (1.0 - FILTER_ALPHA) * prev_ema);
            }
        }

        if !derived.is_empty() {
            if let Err(e) = self.table.update(channel, &derived).await {
                self.reject_channel(channel, &e);
            }
        }
    }

    /// Fit kernel: dv/dt estimate from consecutive fitted samples.
    ///
    /// The table keys `fit_ref_voltage` / `fit_ref_timestamp` hold the
    /// previous fit's raw values; the first fit on a channel only seeds
    /// them. Rounds without a timestamp (or with a non-advancing one) leave
    /// `dvdt` untouched.
    async fn run_fit(&self, channel: ChannelId, raw: &Snapshot) {
        let (Some(v), Some(t)) = (raw.get("voltage"), raw.get("timestamp")) else {
            return;
        };

        let prev = match self.table.snapshot(channel).await {
            Ok(s) => s,
            Err(e) => {
                self.reject_channel(channel, &e);
                return;
            }
        };

        let mut derived = Snapshot::new();
        if let (Some(v_ref), Some(t_ref)) =
            (prev.get("fit_ref_voltage"), prev.get("fit_ref_timestamp"))
        {
            let dt = t - t_ref;
            if dt > 0.0 {
                derived.set("dvdt", (v - v_ref) / dt);
            }
        }
        derived.set("fit_ref_voltage", v);
        derived.set("fit_ref_timestamp", t);

        if let Err(e) = self.table.update(channel, &derived).await {
            self.reject_channel(channel, &e);
        }
    }

    fn reject_channel(&self, channel: ChannelId, err: &crate::error::EngineError) {
        self.bus.publish(
            Event::now(EventKind::ChannelRejected)
                .with_channel(channel)
                .with_error(err.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::sim::{SimCall, SimControlPort};
    use crate::reactions::ReactionFn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(port: Arc<SimControlPort>) -> ExecContext {
        ExecContext {
            port,
            table: Arc::new(ChannelTable::new(4)),
            registry: Arc::new(ReactionRegistry::new(4)),
            bus: Bus::new(64),
        }
    }

    #[tokio::test]
    async fn control_sequence_short_circuits() {
        let port = Arc::new(SimControlPort::new());
        port.reject_channel(1).await;
        let ctx = ctx(Arc::clone(&port));

        ctx.execute(Task::Control {
            ops: vec![
                ControlOp::Rest(0),
                ControlOp::Rest(1), // rejected
                ControlOp::Off(2),  // must not run
            ],
        })
        .await;

        assert_eq!(port.calls().await, vec![SimCall::Rest(0)]);
    }

    #[tokio::test]
    async fn stale_callback_is_a_noop() {
        let port = Arc::new(SimControlPort::new());
        let ctx = ctx(Arc::clone(&port));

        let id = ctx
            .registry
            .register(
                0,
                ReactionFn::arc("never", |_: ChannelId, _: Snapshot| async {}),
            )
            .await
            .unwrap();
        ctx.registry.unregister(0, id).await.unwrap();

        // Executes cleanly despite the reaction being gone.
        ctx.execute(Task::Callback { channel: 0, id }).await;
        assert!(port.calls().await.is_empty());
    }

    #[tokio::test]
    async fn callback_sees_table_snapshot() {
        let port = Arc::new(SimControlPort::new());
        let ctx = ctx(Arc::clone(&port));

        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        let id = ctx
            .registry
            .register(
                2,
                ReactionFn::arc("observer", move |_: ChannelId, sample: Snapshot| {
                    let seen = Arc::clone(&seen2);
                    async move {
                        if sample.get("voltage") == Some(3.9) {
                            seen.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }),
            )
            .await
            .unwrap();

        let sample: Snapshot = [("voltage", 3.9)].into_iter().collect();
        ctx.table.update(2, &sample).await.unwrap();
        ctx.execute(Task::Callback { channel: 2, id }).await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn filter_kernel_seeds_then_smooths() {
        let port = Arc::new(SimControlPort::new());
        let ctx = ctx(port);

        let r1: Snapshot = [("voltage", 4.0)].into_iter().collect();
        ctx.table.update(0, &r1).await.unwrap();
        ctx.execute(Task::Filter {
            channel: 0,
            raw: r1,
        })
        .await;
        let snap = ctx.table.snapshot(0).await.unwrap();
        assert_eq!(snap.get("voltage_ema"), Some(4.0));

        let r2: Snapshot = [("voltage", 3.0)].into_iter().collect();
        ctx.table.update(0, &r2).await.unwrap();
        ctx.execute(Task::Filter {
            channel: 0,
            raw: r2,
        })
        .await;
        let snap = ctx.table.snapshot(0).await.unwrap();
        let expected = FILTER_ALPHA * 3.0 + (1.0 - FILTER_ALPHA) * 4.0;
        assert!((snap.get("voltage_ema").unwrap() - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn fit_kernel_estimates_dvdt() {
        let port = Arc::new(SimControlPort::new());
        let ctx = ctx(port);

        let r1: Snapshot = [("voltage", 3.5), ("timestamp", 1.0)].into_iter().collect();
        ctx.execute(Task::Fit {
            channel: 0,
            raw: r1,
        })
        .await;
        // First fit only seeds the reference.
        assert_eq!(ctx.table.snapshot(0).await.unwrap().get("dvdt"), None);

        let r2: Snapshot = [("voltage", 3.7), ("timestamp", 2.0)].into_iter().collect();
        ctx.execute(Task::Fit {
            channel: 0,
            raw: r2,
        })
        .await;
        let dvdt = ctx.table.snapshot(0).await.unwrap().get("dvdt").unwrap();
        assert!((dvdt - 0.2).abs() < 1e-12);
    }
}
