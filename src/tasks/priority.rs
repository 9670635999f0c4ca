//! # Three-level task priority.
//!
//! Callback invocations outrank everything else so that reactions observe
//! fresh data promptly even under a backlog of data-processing work; `Low`
//! is reserved for background work.

/// Priority attached to every task.
///
/// Total order: `High > Normal > Low`. Among equal priorities the queue
/// preserves enqueue order (FIFO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    /// Reserved for background work.
    Low,
    /// Control and data-processing tasks.
    Normal,
    /// Callback invocations.
    High,
}
