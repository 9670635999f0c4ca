//! # Orchestrator: the engine façade.
//!
//! Owns the queue, the data table, the reaction registry, the worker pool,
//! the ingestor, and the event fan-out, and exposes the test-initiation
//! entry points. Each initiator is a thin composition over the core
//! (subscribe the channel, seed control tasks, register reactions); the
//! non-trivial logic lives in the reactions themselves.
//!
//! ## Shutdown timeline
//! ```text
//! shutdown()
//!   ├─► publish ShutdownRequested
//!   ├─► close queue (pop → QueueClosed everywhere)
//!   ├─► cancel runtime token (ingestor stands down)
//!   ├─► join ingestor, retire + join workers
//!   ├─► drain queue → publish TasksDrained{dropped}
//!   ├─► clear registry, clear subscription flags
//!   ├─► publish EngineStopped
//!   └─► flush + stop subscriber fan-out
//! ```
//! Idempotent: the second call returns immediately with a zero drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::pool::WorkerPool;
use crate::error::EngineError;
use crate::events::{Bus, Event, EventKind};
use crate::measurement::{ChannelId, Snapshot};
use crate::ports::ControlPortRef;
use crate::reactions::{CallbackId, ReactionFn, ReactionRef, ReactionRegistry};
use crate::subscribers::SubscriberSet;
use crate::table::ChannelTable;
use crate::tasks::{ControlOp, Task, TaskQueue};

/// Fraction of the charge current below which the CV phase of a CCCV test
/// considers the cell full and rests the channel.
const CV_TAPER_FRACTION: f64 = 0.05;

/// One step-limit: terminate the test when `key` reaches `threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepLimit {
    /// Measurement name to watch (e.g. `"voltage"`, `"temperature"`).
    pub key: String,
    /// Inclusive threshold; the limit fires when `sample[key] >= threshold`.
    pub threshold: f64,
}

impl StepLimit {
    pub fn new(key: impl Into<String>, threshold: f64) -> Self {
        Self {
            key: key.into(),
            threshold,
        }
    }
}

/// Concurrent orchestration engine for a bank of battery test channels.
///
/// Constructed via [`Orchestrator::builder`]; all methods take `&self` and
/// the engine is shared as `Arc<Orchestrator>` between the caller and any
/// reaction that captures its components.
pub struct Orchestrator {
    cfg: Config,
    queue: Arc<TaskQueue>,
    table: Arc<ChannelTable>,
    registry: Arc<ReactionRegistry>,
    port: ControlPortRef,
    bus: Bus,
    pool: WorkerPool,
    runtime_token: CancellationToken,
    fanout_token: CancellationToken,
    ingestor: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    fanout: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Orchestrator {
    /// Starts building an engine from `cfg`.
    pub fn builder(cfg: Config) -> super::builder::OrchestratorBuilder {
        super::builder::OrchestratorBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: Config,
        queue: Arc<TaskQueue>,
        table: Arc<ChannelTable>,
        registry: Arc<ReactionRegistry>,
        port: ControlPortRef,
        bus: Bus,
        pool: WorkerPool,
        runtime_token: CancellationToken,
        fanout_token: CancellationToken,
        ingestor: JoinHandle<()>,
        fanout: JoinHandle<()>,
    ) -> Self {
        Self {
            cfg,
            queue,
            table,
            registry,
            port,
            bus,
            pool,
            runtime_token,
            fanout_token,
            ingestor: tokio::sync::Mutex::new(Some(ingestor)),
            fanout: tokio::sync::Mutex::new(Some(fanout)),
            stopped: AtomicBool::new(false),
        }
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.stopped.load(Ordering::SeqCst) {
            Err(EngineError::Stopped)
        } else {
            Ok(())
        }
    }

    // ---------------------------
    // Test initiators
    // ---------------------------

    /// Runs a constant-current / constant-voltage charge on `channel`.
    ///
    /// Seeds a constant-current setpoint of `amperes`, then:
    /// - a **voltage watcher** switches the channel to constant voltage the
    ///   first time `voltage >= volts`, unregisters itself, and installs a
    ///   **CV-phase watcher** that rests the channel once the current tapers
    ///   below 5% of `amperes`;
    /// - a **step-limit watcher** (when `step_limits` is non-empty) ends the
    ///   test on the first limit hit: every reaction on the channel is
    ///   unregistered, the channel is unsubscribed and rested.
    pub async fn run_cccv(
        &self,
        channel: ChannelId,
        amperes: f64,
        volts: f64,
        step_limits: Vec<StepLimit>,
    ) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.table.subscribe(channel)?;
        self.queue.push(Task::ConstantCurrent { channel, amperes })?;

        let queue = Arc::clone(&self.queue);
        let registry = Arc::clone(&self.registry);
        let table = Arc::clone(&self.table);
        self.registry
            .register_with(channel, move |my_id| {
                let fired = Arc::new(AtomicBool::new(false));
                ReactionFn::arc(
                    "cccv-voltage-watcher",
                    move |ch: ChannelId, sample: Snapshot| {
                        let queue = Arc::clone(&queue);
                        let registry = Arc::clone(&registry);
                        let table = Arc::clone(&table);
                        let fired = Arc::clone(&fired);
                        async move {
                            let Some(v) = sample.get("voltage") else {
                                return;
                            };
                            if v < volts || fired.swap(true, Ordering::SeqCst) {
                                return;
                            }

                            let _ = queue.push(Task::ConstantVoltage { channel: ch, volts });

                            // Install the successor only when the self-removal
                            // actually happened; if a step-limit cleared the
                            // channel meanwhile, the test is over.
                            let removed = registry.unregister(ch, my_id).await.unwrap_or(false);
                            if !removed {
                                return;
                            }

                            let cv_watcher = cv_phase_watcher(
                                Arc::clone(&queue),
                                Arc::clone(&registry),
                                Arc::clone(&table),
                                amperes,
                            );
                            let _ = registry.register(ch, cv_watcher).await;
                        }
                    },
                )
            })
            .await?;

        if !step_limits.is_empty() {
            self.register_step_limits(channel, step_limits).await?;
        }
        Ok(())
    }

    /// Runs a direct-current internal measurement on `channel`.
    ///
    /// Seeds a constant-current pulse of `amperes` and registers a watcher
    /// that baselines the first voltage sample, then merges an internal
    /// resistance estimate `(baseline - v) / amperes` into the table under
    /// the `"resistance"` key on every later round.
    pub async fn run_dcim(&self, channel: ChannelId, amperes: f64) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.table.subscribe(channel)?;
        self.queue.push(Task::ConstantCurrent { channel, amperes })?;

        let table = Arc::clone(&self.table);
        let baseline: Arc<tokio::sync::Mutex<Option<f64>>> =
            Arc::new(tokio::sync::Mutex::new(None));
        let watcher: ReactionRef = ReactionFn::arc(
            "dcim-resistance-watcher",
            move |ch: ChannelId, sample: Snapshot| {
                let table = Arc::clone(&table);
                let baseline = Arc::clone(&baseline);
                async move {
                    let Some(v) = sample.get("voltage") else {
                        return;
                    };
                    let mut base = baseline.lock().await;
                    match *base {
                        None => *base = Some(v),
                        Some(v0) if amperes != 0.0 => {
                            let mut derived = Snapshot::new();
                            derived.set("resistance", (v0 - v) / amperes);
                            let _ = table.update(ch, &derived).await;
                        }
                        Some(_) => {}
                    }
                }
            });
        self.registry.register(channel, watcher).await?;
        Ok(())
    }

    /// Puts `channel` to rest (open circuit), ending whatever ran on it.
    ///
    /// Clears the channel's reactions, unsubscribes it, and routes the rest
    /// setpoint through the queue so it serializes with queued control
    /// work.
    pub async fn run_rest(&self, channel: ChannelId) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.registry.unregister_all(channel).await?;
        self.table.unsubscribe(channel)?;
        self.queue.push(Task::Control {
            ops: vec![ControlOp::Rest(channel)],
        })
    }

    /// Registers the step-limit watcher for `run_cccv`.
    async fn register_step_limits(
        &self,
        channel: ChannelId,
        limits: Vec<StepLimit>,
    ) -> Result<(), EngineError> {
        let queue = Arc::clone(&self.queue);
        let registry = Arc::clone(&self.registry);
        let table = Arc::clone(&self.table);
        let fired = Arc::new(AtomicBool::new(false));
        let watcher: ReactionRef =
            ReactionFn::arc("step-limit-watcher", move |ch: ChannelId, sample: Snapshot| {
                let queue = Arc::clone(&queue);
                let registry = Arc::clone(&registry);
                let table = Arc::clone(&table);
                let fired = Arc::clone(&fired);
                let limits = limits.clone();
                async move {
                    let hit = limits
                        .iter()
                        .any(|l| sample.get(&l.key).is_some_and(|v| v >= l.threshold));
                    if !hit || fired.swap(true, Ordering::SeqCst) {
                        return;
                    }
                    let _ = registry.unregister_all(ch).await;
                    let _ = table.unsubscribe(ch);
                    let _ = queue.push(Task::Control {
                        ops: vec![ControlOp::Rest(ch)],
                    });
                }
            });
        self.registry.register(channel, watcher).await?;
        Ok(())
    }

    // ---------------------------
    // Core surface
    // ---------------------------

    /// Enqueues an arbitrary task.
    pub fn enqueue(&self, task: Task) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.queue.push(task)
    }

    /// Enables callback fan-out for `channel`.
    pub fn subscribe_channel(&self, channel: ChannelId) -> Result<(), EngineError> {
        self.table.subscribe(channel)
    }

    /// Disables callback fan-out for `channel`.
    pub fn unsubscribe_channel(&self, channel: ChannelId) -> Result<(), EngineError> {
        self.table.unsubscribe(channel)
    }

    /// Returns the subscription flag for `channel`.
    pub fn is_subscribed(&self, channel: ChannelId) -> Result<bool, EngineError> {
        self.table.is_subscribed(channel)
    }

    /// Returns a coherent copy of `channel`'s latest measurements.
    pub async fn snapshot(&self, channel: ChannelId) -> Result<Snapshot, EngineError> {
        self.table.snapshot(channel).await
    }

    /// Registers `reaction` on `channel`; returns its stable id.
    pub async fn register_reaction(
        &self,
        channel: ChannelId,
        reaction: ReactionRef,
    ) -> Result<CallbackId, EngineError> {
        self.ensure_running()?;
        self.registry.register(channel, reaction).await
    }

    /// Registers a reaction built from its own id.
    ///
    /// The constructor runs under the registry lock, so the entry becomes
    /// visible to the ingestor only after the reaction (id included) is
    /// fully built. This is the supported way to write self-unregistering
    /// reactions.
    pub async fn register_reaction_with<F>(
        &self,
        channel: ChannelId,
        make: F,
    ) -> Result<CallbackId, EngineError>
    where
        F: FnOnce(CallbackId) -> ReactionRef,
    {
        self.ensure_running()?;
        self.registry.register_with(channel, make).await
    }

    /// Removes the reaction registered under `id`; returns whether an entry
    /// was removed.
    pub async fn unregister_reaction(
        &self,
        channel: ChannelId,
        id: CallbackId,
    ) -> Result<bool, EngineError> {
        self.registry.unregister(channel, id).await
    }

    /// Removes every reaction registered for `channel`.
    pub async fn unregister_all_reactions(&self, channel: ChannelId) -> Result<(), EngineError> {
        self.registry.unregister_all(channel).await
    }

    /// Brings the worker pool to exactly `n` workers.
    ///
    /// Re-invoking with the current count is a no-op; otherwise the running
    /// generation finishes its in-flight tasks and a fresh one takes over
    /// the queue.
    pub async fn set_worker_count(&self, n: usize) -> Result<usize, EngineError> {
        self.ensure_running()?;
        Ok(self.pool.resize(n.max(1)).await)
    }

    /// Returns the live worker count.
    pub async fn worker_count(&self) -> usize {
        self.pool.worker_count().await
    }

    /// Engine configuration (fixed at startup).
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Event bus handle; call [`Bus::subscribe`] to observe engine events
    /// ad hoc (prefer a [`Subscribe`](crate::Subscribe) via the builder for
    /// anything long-lived).
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    // ---------------------------
    // Shutdown
    // ---------------------------

    /// Stops the engine and returns the number of drained (never executed)
    /// tasks.
    ///
    /// Idempotent: subsequent calls return 0 immediately. After return no
    /// worker or ingestor task is live, the queue is empty, and no reaction
    /// remains registered.
    pub async fn shutdown(&self) -> usize {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return 0;
        }

        self.bus.publish(Event::now(EventKind::ShutdownRequested));
        self.queue.close();
        self.runtime_token.cancel();

        if let Some(handle) = self.ingestor.lock().await.take() {
            let _ = handle.await;
        }
        self.pool.join_all().await;

        let dropped = self.queue.drain().len();
        self.bus
            .publish(Event::now(EventKind::TasksDrained).with_dropped(dropped));

        self.registry.clear_all().await;
        self.table.unsubscribe_all();
        self.bus.publish(Event::now(EventKind::EngineStopped));

        // Stop the fan-out last so subscribers see the full timeline.
        self.fanout_token.cancel();
        if let Some(handle) = self.fanout.lock().await.take() {
            let _ = handle.await;
        }

        dropped
    }

    /// Blocks until the process receives a termination signal, then shuts
    /// the engine down. Returns the drained-task count.
    pub async fn run_until_signal(&self) -> std::io::Result<usize> {
        super::signals::wait_for_shutdown_signal().await?;
        Ok(self.shutdown().await)
    }

    /// Keeps the control port alive for reactions that capture it through
    /// the orchestrator.
    pub fn control_port(&self) -> ControlPortRef {
        Arc::clone(&self.port)
    }
}

/// Builds the CV-phase watcher installed once a CCCV test switches to
/// constant voltage.
///
/// Considers the cell full when the charge current tapers below
/// [`CV_TAPER_FRACTION`] of the seed current, then ends the test: clears
/// the channel's reactions, unsubscribes it, and rests it.
fn cv_phase_watcher(
    queue: Arc<TaskQueue>,
    registry: Arc<ReactionRegistry>,
    table: Arc<ChannelTable>,
    amperes: f64,
) -> ReactionRef {
    let fired = Arc::new(AtomicBool::new(false));
    ReactionFn::arc(
        "cccv-cv-phase-watcher",
        move |ch: ChannelId, sample: Snapshot| {
            let queue = Arc::clone(&queue);
            let registry = Arc::clone(&registry);
            let table = Arc::clone(&table);
            let fired = Arc::clone(&fired);
            async move {
                let Some(i) = sample.get("current") else {
                    return;
                };
                if i.abs() > amperes.abs() * CV_TAPER_FRACTION || fired.swap(true, Ordering::SeqCst)
                {
                    return;
                }
                let _ = registry.unregister_all(ch).await;
                let _ = table.unsubscribe(ch);
                let _ = queue.push(Task::Control {
                    ops: vec![ControlOp::Rest(ch)],
                });
            }
        },
    )
}

/// Spawns the bus → subscriber-set pump.
///
/// Runs until the stop token fires, then flushes events published before
/// the stop and joins the subscriber workers.
pub(crate) fn spawn_fanout(
    subs: SubscriberSet,
    bus: &Bus,
    token: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(ev),
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        }

        // Deliver the shutdown timeline that was published just before the
        // stop signal.
        loop {
            match rx.try_recv() {
                Ok(ev) => subs.emit(ev),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        subs.shutdown().await;
    })
}
