//! # TelemetryIngestor: the dedicated polling loop.
//!
//! One spawned task owns the telemetry seam. Per round it polls the source,
//! commits each sample to the data table, and fans work out to the queue.
//! It never invokes a reaction inline — reactions always run on the worker
//! pool, at `High` priority, so a long-running reaction cannot stall
//! ingestion.
//!
//! ## Round shape
//! ```text
//! loop {
//!   sleep(poll_interval)                 (cancellable)
//!   batch = source.poll()               (cancellable)
//!   for (channel, sample) in batch {
//!     table.update(channel, sample)     ── committed before any task below
//!     publish SampleIngested
//!     queue.push(Filter)  ┐
//!     queue.push(Fit)     ┘ every channel, subscribed or not
//!     if subscribed(channel) {
//!       for (id, _) in registry.snapshot(channel) {    (registration order)
//!         queue.push(Callback{channel, id})
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! ## Rules
//! - The table update **happens-before** every task pushed for the same
//!   round: a callback popped later always observes the committed sample.
//! - Callback tasks are pushed in registration order within a round; across
//!   rounds the queue's sequence numbers preserve order.
//! - Data tasks go to **all** channels; subscription gates callbacks only.
//! - A closed queue means shutdown has begun: the loop stands down
//!   immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::ports::TelemetrySourceRef;
use crate::reactions::ReactionRegistry;
use crate::table::ChannelTable;
use crate::tasks::{Task, TaskQueue};

/// Dedicated telemetry polling loop.
pub(crate) struct TelemetryIngestor {
    source: TelemetrySourceRef,
    table: Arc<ChannelTable>,
    registry: Arc<ReactionRegistry>,
    queue: Arc<TaskQueue>,
    bus: Bus,
    poll_interval: Duration,
}

impl TelemetryIngestor {
    pub fn new(
        source: TelemetrySourceRef,
        table: Arc<ChannelTable>,
        registry: Arc<ReactionRegistry>,
        queue: Arc<TaskQueue>,
        bus: Bus,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            table,
            registry,
            queue,
            bus,
            poll_interval,
        }
    }

    /// Runs polling rounds until cancellation or queue closure.
    pub async fn run(self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = time::sleep(self.poll_interval) => {}
            }

            let batch = tokio::select! {
                _ = token.cancelled() => break,
                batch = self.source.poll() => batch,
            };

            for (channel, sample) in batch {
                if !self.ingest(channel, sample).await {
                    return;
                }
            }
        }
    }

    /// Commits one sample and fans out its work.
    ///
    /// Returns false once the queue is closed (shutdown in progress).
    async fn ingest(&self, channel: u32, sample: crate::measurement::Snapshot) -> bool {
        if let Err(e) = self.table.update(channel, &sample).await {
            self.bus.publish(
                Event::now(EventKind::ChannelRejected)
                    .with_channel(channel)
                    .with_error(e.to_string()),
            );
            return true;
        }

        self.bus
            .publish(Event::now(EventKind::SampleIngested).with_channel(channel));

        let filter = Task::Filter {
            channel,
            raw: sample.clone(),
        };
        let fit = Task::Fit {
            channel,
            raw: sample,
        };
        if self.queue.push(filter).is_err() || self.queue.push(fit).is_err() {
            return false;
        }

        if matches!(self.table.is_subscribed(channel), Ok(true)) {
            if let Ok(entries) = self.registry.snapshot(channel).await {
                for (id, _) in entries {
                    if self.queue.push(Task::Callback { channel, id }).is_err() {
                        return false;
                    }
                }
            }
        }

        true
    }
}
