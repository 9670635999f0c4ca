//! # Non-blocking event fan-out to multiple subscribers.
//!
//! [`SubscriberSet`] distributes engine events to all registered
//! subscribers without ever blocking the publisher. The shape of the
//! mechanism is dictated by two engine invariants, not by convenience:
//! the ingestor and the workers publish from hot paths and must never wait
//! on an observer, and one misbehaving observer must never take down
//! telemetry ingestion. That forces exactly this structure: one bounded
//! queue and one dedicated worker per subscriber, `try_send` delivery with
//! drop-and-report on overflow, and a panic fence around every handler
//! call. Anything simpler (direct calls, one shared queue, unbounded
//! buffering) would let an observer stall or starve the engine.
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │
//!     ├──► [outlet 1: bounded queue] ──► worker 1 ──► subscriber1.on_event()
//!     │                                      └──────► panic → SubscriberPanicked
//!     ├──► [outlet 2: bounded queue] ──► worker 2 ──► subscriber2.on_event()
//!     └──► [outlet N: bounded queue] ──► worker N ──► subscriberN.on_event()
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process event N while B processes N+5
//! - **Per-subscriber FIFO**: each subscriber sees events in publish order
//! - **Overflow**: the event is dropped for that subscriber only, `SubscriberOverflow` is published
//! - **Isolation**: a slow or panicking subscriber does not affect the others

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{panic_message, Bus, Event};
use crate::subscribers::Subscribe;

/// Delivery endpoint for one subscriber: its queue sender plus the name
/// used when reporting drops.
struct Outlet {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for event subscribers.
pub struct SubscriberSet {
    outlets: Vec<Outlet>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set, opening one outlet per subscriber.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (outlets, workers) = subs
            .into_iter()
            .map(|sub| spawn_outlet(sub, bus.clone()))
            .unzip();

        Self {
            outlets,
            workers,
            bus,
        }
    }

    /// Emits an owned event to all subscribers.
    ///
    /// Wraps the event in an `Arc` once and delegates to
    /// [`emit_arc`](Self::emit_arc); use that directly when the event is
    /// already shared.
    pub fn emit(&self, event: Event) {
        self.emit_arc(Arc::new(event));
    }

    /// Emits a shared event to all subscribers.
    ///
    /// Delivery is `try_send` per outlet: a full or closed queue drops the
    /// event for that subscriber only and publishes `SubscriberOverflow`
    /// with the reason. Overflow reporting is suppressed when the incoming
    /// event is itself `SubscriberOverflow` or `SubscriberPanicked`, so a
    /// saturated observer cannot trigger an event storm.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let internal = event.is_fanout_internal();

        for outlet in &self.outlets {
            let reason = match outlet.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !internal {
                self.bus
                    .publish(Event::subscriber_overflow(outlet.name, reason));
            }
        }
    }

    /// Gracefully shuts down all subscriber workers.
    ///
    /// Drops the outlets (workers observe queue closure and finish their
    /// backlog) and awaits every worker task.
    pub async fn shutdown(self) {
        drop(self.outlets);

        for h in self.workers {
            let _ = h.await;
        }
    }
}

/// Opens the bounded queue for one subscriber and spawns its worker.
///
/// Queue capacity comes from [`Subscribe::queue_capacity`], clamped to a
/// minimum of 1.
fn spawn_outlet(sub: Arc<dyn Subscribe>, bus: Bus) -> (Outlet, JoinHandle<()>) {
    let name = sub.name();
    let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
    let worker = tokio::spawn(outlet_worker(sub, rx, bus));
    (Outlet { name, tx }, worker)
}

/// Drains one subscriber's queue until it closes.
///
/// Every handler call runs behind `catch_unwind`: a panic is reported as
/// `SubscriberPanicked` and the worker moves on to the next event.
async fn outlet_worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(ev.as_ref()))
            .catch_unwind()
            .await;
        if let Err(panic_err) = handled {
            bus.publish(Event::subscriber_panicked(
                sub.name(),
                panic_message(&*panic_err),
            ));
        }
    }
}
