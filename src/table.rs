//! # Per-channel data table.
//!
//! Maps every channel of the bank to its latest measurement [`Snapshot`]
//! and a subscription flag. One writer (the ingestor) merges incoming
//! samples; many readers (workers executing callbacks and data tasks) take
//! coherent copies.
//!
//! ## Rules
//! - Each channel has its own lock: an update on channel 3 never contends
//!   with a snapshot of channel 7.
//! - A merge is atomic with respect to readers — a reader sees the
//!   pre-merge or the post-merge state, never a partial merge.
//! - The subscription flag is an independent atomic; flipping it does not
//!   touch the readings lock.
//! - Key-sets only grow: [`Snapshot::merge`] inserts and overwrites, never
//!   removes.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use crate::error::EngineError;
use crate::measurement::{ChannelId, Snapshot};

/// One channel's slot: readings under a lock, subscription bit beside it.
struct Slot {
    readings: RwLock<Snapshot>,
    subscribed: AtomicBool,
}

/// Table of latest measurements and subscription flags for a fixed bank of
/// channels.
pub struct ChannelTable {
    slots: Vec<Slot>,
}

impl ChannelTable {
    /// Creates a table for `max_channels` channels, all empty and
    /// unsubscribed.
    pub fn new(max_channels: u32) -> Self {
        Self {
            slots: (0..max_channels)
                .map(|_| Slot {
                    readings: RwLock::new(Snapshot::new()),
                    subscribed: AtomicBool::new(false),
                })
                .collect(),
        }
    }

    fn slot(&self, channel: ChannelId) -> Result<&Slot, EngineError> {
        self.slots
            .get(channel as usize)
            .ok_or(EngineError::UnknownChannel {
                channel,
                max: self.slots.len() as u32,
            })
    }

    /// Merges `incoming` into the channel's snapshot key-by-key.
    ///
    /// Held write lock makes the merge atomic for readers.
    pub async fn update(&self, channel: ChannelId, incoming: &Snapshot) -> Result<(), EngineError> {
        let slot = self.slot(channel)?;
        slot.readings.write().await.merge(incoming);
        Ok(())
    }

    /// Returns a coherent copy of the channel's snapshot.
    pub async fn snapshot(&self, channel: ChannelId) -> Result<Snapshot, EngineError> {
        Ok(self.slot(channel)?.readings.read().await.clone())
    }

    /// Enables callback fan-out for `channel`.
    pub fn subscribe(&self, channel: ChannelId) -> Result<(), EngineError> {
        self.slot(channel)?.subscribed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Disables callback fan-out for `channel`.
    pub fn unsubscribe(&self, channel: ChannelId) -> Result<(), EngineError> {
        self.slot(channel)?
            .subscribed
            .store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Returns the subscription flag for `channel`.
    pub fn is_subscribed(&self, channel: ChannelId) -> Result<bool, EngineError> {
        Ok(self.slot(channel)?.subscribed.load(Ordering::SeqCst))
    }

    /// Clears every subscription flag. Used by shutdown.
    pub fn unsubscribe_all(&self) {
        for slot in &self.slots {
            slot.subscribed.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_is_visible_to_snapshot() {
        let table = ChannelTable::new(4);
        let sample: Snapshot = [("voltage", 3.5), ("current", 2.0)].into_iter().collect();
        table.update(1, &sample).await.unwrap();

        let snap = table.snapshot(1).await.unwrap();
        assert_eq!(snap.get("voltage"), Some(3.5));
        assert_eq!(snap.get("current"), Some(2.0));

        // Other channels untouched.
        assert!(table.snapshot(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn merge_keeps_earlier_keys() {
        let table = ChannelTable::new(1);
        let first: Snapshot = [("voltage", 3.5), ("temperature", 25.0)]
            .into_iter()
            .collect();
        let second: Snapshot = [("voltage", 3.6)].into_iter().collect();

        table.update(0, &first).await.unwrap();
        table.update(0, &second).await.unwrap();

        let snap = table.snapshot(0).await.unwrap();
        assert_eq!(snap.get("voltage"), Some(3.6));
        assert_eq!(snap.get("temperature"), Some(25.0));
    }

    #[tokio::test]
    async fn subscribe_round_trip() {
        let table = ChannelTable::new(2);
        assert!(!table.is_subscribed(1).unwrap());
        table.subscribe(1).unwrap();
        assert!(table.is_subscribed(1).unwrap());
        assert!(!table.is_subscribed(0).unwrap());
        table.unsubscribe(1).unwrap();
        assert!(!table.is_subscribed(1).unwrap());
    }

    #[tokio::test]
    async fn unknown_channel_is_rejected() {
        let table = ChannelTable::new(2);
        assert_eq!(
            table.subscribe(9).unwrap_err(),
            EngineError::UnknownChannel { channel: 9, max: 2 }
        );
        assert!(table.snapshot(2).await.is_err());
    }
}
