//! # Reaction abstraction for telemetry-driven logic.
//!
//! Defines the core [`Reaction`] trait for async callbacks invoked with a
//! channel id and a coherent snapshot of that channel's data.
//!
//! - **[`Reaction`]** — trait for implementing reactions
//! - **[`ReactionRef`]** — shared handle (`Arc<dyn Reaction>`) owned by the registry
//! - **[`ReactionFn`]** — function-backed implementation wrapping closures
//!
//! ## Rules
//! - Reactions run on the worker pool with `High` priority; two invocations
//!   for the same channel **can** execute in parallel on different workers.
//!   Implementations needing strict serialization must serialize internally
//!   (e.g. a `Mutex` over their captured state).
//! - A reaction may enqueue tasks and mutate the registry from inside its
//!   own body, including unregistering itself.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::measurement::{ChannelId, Snapshot};

/// Shared handle to a reaction.
///
/// Reactions are owned by the engine's per-channel registry; the handle
/// keeps an already-dequeued invocation valid even if the entry is
/// unregistered concurrently.
pub type ReactionRef = Arc<dyn Reaction>;

/// Telemetry-driven callback.
///
/// Invoked on a worker with the most recent table snapshot for the channel.
#[async_trait]
pub trait Reaction: Send + Sync + 'static {
    /// Reacts to a fresh snapshot of `channel`.
    ///
    /// The snapshot is a point-in-time copy; reading it never races the
    /// ingestor. Missing keys read as `None` — a reaction must tolerate
    /// early rounds where its variables have not been measured yet.
    async fn on_sample(&self, channel: ChannelId, sample: &Snapshot);

    /// Returns a short name for events and diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Function-backed reaction implementation.
///
/// Wraps a closure that *creates* a new future per invocation, so there is
/// no hidden shared state between rounds; shared state must be captured
/// explicitly (e.g. via `Arc`).
pub struct ReactionFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ReactionFn<F> {
    /// Creates a new function-backed reaction.
    ///
    /// Prefer [`ReactionFn::arc`] when you immediately need a [`ReactionRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the reaction and returns it as a shared handle.
    ///
    /// ```
    /// use cellvisor::{ChannelId, ReactionFn, ReactionRef, Snapshot};
    ///
    /// let watcher: ReactionRef =
    ///     ReactionFn::arc("voltage-watcher", |_channel: ChannelId, sample: Snapshot| async move {
    ///         if sample.get("voltage").is_some_and(|v| v >= 4.2) {
    ///             // switch phases, unregister, ...
    ///         }
    ///     });
    /// assert_eq!(watcher.name(), "voltage-watcher");
    /// ```
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Reaction for ReactionFn<F>
where
    F: Fn(ChannelId, Snapshot) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_sample(&self, channel: ChannelId, sample: &Snapshot) {
        (self.f)(channel, sample.clone()).await;
    }

    fn name(&self) -> &str {
        &self.name
    }
}
