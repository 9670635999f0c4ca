//! # Worker pool: generation-based task drain.
//!
//! A generation is a set of worker tasks sharing one retire token. Each
//! worker loops `pop → execute`, observing the retire token only between
//! tasks, so an in-flight task always completes.
//!
//! ## Resize contract
//! `resize(m)` brings the live count to exactly `m` by the simplest correct
//! protocol: cancel the current generation's retire token, join every
//! worker, then spawn `m` fresh workers under a new token. Queued but
//! unexecuted tasks stay in the queue and are picked up by the new
//! generation; nothing is lost. Re-invoking with the current count is a
//! no-op.
//!
//! ## Rules
//! - A worker exits on retire **or** on queue closure (shutdown).
//! - Task bodies are wrapped in `catch_unwind`: a panicking task is
//!   reported as `TaskPanicked` and the worker proceeds to the next task.
//! - The pool state lock is held across the join phase, serializing
//!   concurrent resizes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::exec::ExecContext;
use crate::events::{panic_message, Bus, Event, EventKind};
use crate::tasks::TaskQueue;

struct PoolState {
    workers: Vec<JoinHandle<()>>,
    retire: CancellationToken,
}

/// Resizable set of queue-draining workers.
pub(crate) struct WorkerPool {
    queue: Arc<TaskQueue>,
    ctx: Arc<ExecContext>,
    bus: Bus,
    state: tokio::sync::Mutex<PoolState>,
}

impl WorkerPool {
    /// Creates an empty pool; call [`resize`](Self::resize) to spawn the
    /// first generation.
    pub fn new(queue: Arc<TaskQueue>, ctx: Arc<ExecContext>, bus: Bus) -> Self {
        Self {
            queue,
            ctx,
            bus,
            state: tokio::sync::Mutex::new(PoolState {
                workers: Vec::new(),
                retire: CancellationToken::new(),
            }),
        }
    }

    /// Brings the live worker count to exactly `target`.
    ///
    /// No-op when `target` equals the current count. Otherwise the current
    /// generation is retired (in-flight tasks complete), joined, and
    /// `target` fresh workers are spawned.
    pub async fn resize(&self, target: usize) -> usize {
        let mut state = self.state.lock().await;
        if state.workers.len() == target {
            return target;
        }

        state.retire.cancel();
        for handle in state.workers.drain(..) {
            let _ = handle.await;
        }

        state.retire = CancellationToken::new();
        for _ in 0..target {
            let child = state.retire.child_token();
            state.workers.push(spawn_worker(
                Arc::clone(&self.queue),
                Arc::clone(&self.ctx),
                self.bus.clone(),
                child,
            ));
        }

        self.bus
            .publish(Event::now(EventKind::WorkersResized).with_workers(target));
        target
    }

    /// Returns the current live worker count.
    pub async fn worker_count(&self) -> usize {
        self.state.lock().await.workers.len()
    }

    /// Retires and joins every worker. Used by shutdown (the queue is
    /// closed separately).
    pub async fn join_all(&self) {
        let mut state = self.state.lock().await;
        state.retire.cancel();
        for handle in state.workers.drain(..) {
            let _ = handle.await;
        }
    }
}

/// One worker: drain the queue until retire or closure.
fn spawn_worker(
    queue: Arc<TaskQueue>,
    ctx: Arc<ExecContext>,
    bus: Bus,
    retire: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let task = tokio::select! {
                _ = retire.cancelled() => break,
                popped = queue.pop() => match popped {
                    Ok(task) => task,
                    Err(_closed) => break,
                },
            };

            let label = task.label();
            let fut = ctx.execute(task);
            if let Err(panic_err) = AssertUnwindSafe(fut).catch_unwind().await {
                bus.publish(
                    Event::now(EventKind::TaskPanicked)
                        .with_task(label)
                        .with_error(panic_message(&*panic_err)),
                );
            }
        }
    })
}
