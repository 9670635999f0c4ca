//! # Concurrent priority task queue.
//!
//! Max-priority queue with FIFO tie-breaking, shared by the orchestrator,
//! the ingestor, reactions (producers) and the worker pool (consumers).
//!
//! ## Ordering
//! Strictly by [`TaskPriority`] descending; ties broken by ascending
//! enqueue sequence number, so equal-priority tasks come out in the order
//! they went in.
//!
//! ## Availability signal
//! A [`tokio::sync::Semaphore`] mirrors the heap length: `push` adds a
//! permit, `pop` consumes one before touching the heap. Closing the
//! semaphore is the shutdown signal: every blocked and every future `pop`
//! observes [`EngineError::QueueClosed`], while the heap keeps the pending
//! tasks for [`drain`](TaskQueue::drain).
//!
//! ## Rules
//! - `pop` never returns a task whose priority is dominated by another
//!   currently queued.
//! - After `close`, `pop` reports closed even while tasks remain; those
//!   tasks belong to the drain.
//! - `pop` is cancel-safe: a task leaves the heap in the same poll that
//!   returns it, so select-based callers cannot lose work.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use tokio::sync::Semaphore;

use crate::error::EngineError;
use crate::tasks::{Task, TaskPriority};

/// Heap entry: task plus its scheduling key.
struct Entry {
    priority: TaskPriority,
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    /// Max-heap by priority; among equals the **lower** sequence number is
    /// the greater entry, so FIFO order survives the heap.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Heap plus the enqueue sequence counter, guarded by one mutex.
struct QueueState {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

/// Concurrent max-priority task queue with FIFO tie-break and a shutdown
/// signal.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    ready: Semaphore,
}

impl TaskQueue {
    /// Creates an empty open queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            ready: Semaphore::new(0),
        }
    }

    /// Enqueues `task` at its variant priority.
    ///
    /// Non-blocking. Fails with [`EngineError::QueueClosed`] once the queue
    /// has been closed; producers treat that as the signal to stand down.
    pub fn push(&self, task: Task) -> Result<(), EngineError> {
        if self.ready.is_closed() {
            return Err(EngineError::QueueClosed);
        }
        {
            let mut state = self.state.lock().expect("task queue mutex poisoned");
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(Entry {
                priority: task.priority(),
                seq,
                task,
            });
        }
        self.ready.add_permits(1);
        Ok(())
    }

    /// Removes and returns the highest-priority task, waiting while the
    /// queue is empty.
    ///
    /// Returns [`EngineError::QueueClosed`] once [`close`](Self::close) has
    /// been called, including for tasks still queued — those are reserved
    /// for [`drain`](Self::drain).
    pub async fn pop(&self) -> Result<Task, EngineError> {
        let permit = self
            .ready
            .acquire()
            .await
            .map_err(|_| EngineError::QueueClosed)?;
        permit.forget();

        let mut state = self.state.lock().expect("task queue mutex poisoned");
        match state.heap.pop() {
            Some(entry) => Ok(entry.task),
            // A permit without a task means push/pop accounting broke; the
            // scheduler cannot continue from here.
            None => panic!("task queue invariant violated: ready permit with empty heap"),
        }
    }

    /// Closes the queue: wakes every blocked `pop` with
    /// [`EngineError::QueueClosed`] and rejects further pushes.
    ///
    /// Idempotent. Pending tasks stay queued for [`drain`](Self::drain).
    pub fn close(&self) {
        self.ready.close();
    }

    /// Removes and returns all pending tasks in scheduling order.
    pub fn drain(&self) -> Vec<Task> {
        let mut state = self.state.lock().expect("task queue mutex poisoned");
        let mut out = Vec::with_capacity(state.heap.len());
        while let Some(entry) = state.heap.pop() {
            out.push(entry.task);
        }
        out
    }

    /// Number of tasks currently queued.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .expect("task queue mutex poisoned")
            .heap
            .len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
