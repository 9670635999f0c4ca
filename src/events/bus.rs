//! # Event bus for broadcasting engine events.
//!
//! [`Bus`] is a wrapper around [`tokio::sync::broadcast`] that lets the
//! ingestor, the workers, and the orchestrator broadcast [`Event`]s to any
//! number of subscribers simultaneously.
//!
//! ## Key characteristics:
//! - **Broadcast semantics**: all active subscribers receive a clone of each event
//! - **Non-persistent**: events are lost if there are no active subscribers
//! - **Bounded capacity**: old events are dropped when the channel is full
//!
//! Publishing is fire-and-forget: the engine runs identically with zero
//! observers attached.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for engine events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// When capacity is exceeded, the oldest unsent events are dropped and
    /// lagging subscribers observe a skip.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no active subscribers the event is dropped silently;
    /// the engine operates without observers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe all future events.
    ///
    /// Each call creates an independent receiver; every subscriber gets a
    /// clone of every published event.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
