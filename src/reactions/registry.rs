//! # Per-channel reaction registry with stable ids.
//!
//! For each channel the registry keeps an ordered list of
//! `(CallbackId, reaction)` entries. Ids are issued from a per-channel
//! monotone counter and **never reused** within a session, so a reaction can
//! unregister itself or a sibling from inside its own body without racing
//! concurrent inserts; positional removal could not.
//!
//! ## Rules
//! - `snapshot(channel)` is a **point-in-time copy** in registration order;
//!   the ingestor iterates the copy while reactions freely mutate the live
//!   registry.
//! - Unregistration cancels **future** fan-outs only. A callback task
//!   already queued for a removed id executes as a no-op (the executor's
//!   `get` comes back empty).
//! - Removal is idempotent: unregistering an unknown id is a quiet `false`.

use tokio::sync::RwLock;

use crate::error::EngineError;
use crate::measurement::ChannelId;
use crate::reactions::ReactionRef;

/// Stable identifier of one registered reaction on one channel.
///
/// Issued at registration from a per-channel monotone counter; an id is
/// never reused within a session, even after its entry is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub u64);

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cb#{}", self.0)
    }
}

/// Per-channel state: the issue counter and the live entries.
#[derive(Default)]
struct ChannelReactions {
    next_id: u64,
    entries: Vec<(CallbackId, ReactionRef)>,
}

/// Registry of reactions for a fixed bank of channels.
pub struct ReactionRegistry {
    channels: Vec<RwLock<ChannelReactions>>,
}

impl ReactionRegistry {
    /// Creates a registry for `max_channels` channels.
    pub fn new(max_channels: u32) -> Self {
        Self {
            channels: (0..max_channels)
                .map(|_| RwLock::new(ChannelReactions::default()))
                .collect(),
        }
    }

    fn slot(&self, channel: ChannelId) -> Result<&RwLock<ChannelReactions>, EngineError> {
        self.channels
            .get(channel as usize)
            .ok_or(EngineError::UnknownChannel {
                channel,
                max: self.channels.len() as u32,
            })
    }

    /// Appends `reaction` for `channel` and returns its stable id.
    pub async fn register(
        &self,
        channel: ChannelId,
        reaction: ReactionRef,
    ) -> Result<CallbackId, EngineError> {
        self.register_with(channel, |_| reaction).await
    }

    /// Registers a reaction built from its own id.
    ///
    /// The constructor runs under the registry lock, so the entry becomes
    /// visible to the ingestor only after the reaction (id included) is
    /// fully built. This is the supported way to write self-unregistering
    /// reactions.
    pub async fn register_with<F>(
        &self,
        channel: ChannelId,
        make: F,
    ) -> Result<CallbackId, EngineError>
    where
        F: FnOnce(CallbackId) -> ReactionRef,
    {
        let mut state = self.slot(channel)?.write().await;
        let id = CallbackId(state.next_id);
        state.next_id += 1;
        let reaction = make(id);
        state.entries.push((id, reaction));
        Ok(id)
    }

    /// Removes the entry with `id`, if present.
    ///
    /// Returns `true` when an entry was removed. The id is retired either
    /// way — subsequent registrations keep counting upward.
    pub async fn unregister(&self, channel: ChannelId, id: CallbackId) -> Result<bool, EngineError> {
        let mut state = self.slot(channel)?.write().await;
        let before = state.entries.len();
        state.entries.retain(|(eid, _)| *eid != id);
        Ok(state.entries.len() != before)
    }

    /// Drops every reaction registered for `channel`.
    pub async fn unregister_all(&self, channel: ChannelId) -> Result<(), EngineError> {
        self.slot(channel)?.write().await.entries.clear();
        Ok(())
    }

    /// Drops every reaction on every channel. Used by shutdown.
    pub async fn clear_all(&self) {
        for slot in &self.channels {
            slot.write().await.entries.clear();
        }
    }

    /// Returns a point-in-time copy of `channel`'s entries in registration
    /// order.
    ///
    /// The copy is safe to iterate while reactions mutate the live registry.
    pub async fn snapshot(
        &self,
        channel: ChannelId,
    ) -> Result<Vec<(CallbackId, ReactionRef)>, EngineError> {
        Ok(self.slot(channel)?.read().await.entries.clone())
    }

    /// Looks up the reaction registered under `id`, if it still exists.
    pub async fn get(
        &self,
        channel: ChannelId,
        id: CallbackId,
    ) -> Result<Option<ReactionRef>, EngineError> {
        Ok(self
            .slot(channel)?
            .read()
            .await
            .entries
            .iter()
            .find(|(eid, _)| *eid == id)
            .map(|(_, r)| r.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactions::ReactionFn;

    fn noop() -> ReactionRef {
        ReactionFn::arc("noop", |_: u32, _: crate::Snapshot| async {})
    }

    #[tokio::test]
    async fn ids_are_monotone_and_never_reused() {
        let reg = ReactionRegistry::new(2);
        let a = reg.register(0, noop()).await.unwrap();
        let b = reg.register(0, noop()).await.unwrap();
        assert!(b > a);

        assert!(reg.unregister(0, a).await.unwrap());
        let c = reg.register(0, noop()).await.unwrap();
        assert!(c > b, "retired ids must not come back");

        // Counters are per-channel.
        let other = reg.register(1, noop()).await.unwrap();
        assert_eq!(other, CallbackId(0));
    }

    #[tokio::test]
    async fn snapshot_preserves_registration_order() {
        let reg = ReactionRegistry::new(1);
        let a = reg.register(0, noop()).await.unwrap();
        let b = reg.register(0, noop()).await.unwrap();
        let c = reg.register(0, noop()).await.unwrap();

        let ids: Vec<CallbackId> = reg
            .snapshot(0)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[tokio::test]
    async fn register_unregister_round_trip() {
        let reg = ReactionRegistry::new(1);
        let before: Vec<CallbackId> = reg
            .snapshot(0)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let id = reg.register(0, noop()).await.unwrap();
        assert!(reg.unregister(0, id).await.unwrap());

        let after: Vec<CallbackId> = reg
            .snapshot(0)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(before, after);

        // Removing again is a quiet no-op.
        assert!(!reg.unregister(0, id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_channel_is_rejected() {
        let reg = ReactionRegistry::new(2);
        let err = reg.register(2, noop()).await.unwrap_err();
        assert_eq!(err, EngineError::UnknownChannel { channel: 2, max: 2 });
    }

    #[tokio::test]
    async fn get_after_unregister_is_none() {
        let reg = ReactionRegistry::new(1);
        let id = reg.register(0, noop()).await.unwrap();
        assert!(reg.get(0, id).await.unwrap().is_some());
        reg.unregister_all(0).await.unwrap();
        assert!(reg.get(0, id).await.unwrap().is_none());
    }
}
