//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [sample] channel=1
//! [control] task=constant_current channel=1
//! [control-failed] task=constant_voltage channel=1 err="bus stalled"
//! [callback] channel=1 id=0
//! [callback-skipped] channel=1 id=0
//! [workers] count=4
//! [shutdown-requested]
//! [drained] dropped=12
//! [stopped]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Not intended for production use —
/// implement a custom [`Subscribe`] for structured logging or metrics.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::SampleIngested => {
                if let Some(ch) = e.channel {
                    println!("[sample] channel={ch}");
                }
            }
            EventKind::ChannelRejected => {
                println!("[channel-rejected] channel={:?} err={:?}", e.channel, e.error);
            }
            EventKind::ControlApplied => {
                println!("[control] task={:?} channel={:?}", e.task, e.channel);
            }
            EventKind::ControlFailed => {
                println!(
                    "[control-failed] task={:?} channel={:?} err={:?}",
                    e.task, e.channel, e.error
                );
            }
            EventKind::CallbackFired => {
                println!("[callback] channel={:?} id={:?}", e.channel, e.callback);
            }
            EventKind::CallbackSkipped => {
                println!("[callback-skipped] channel={:?} id={:?}", e.channel, e.callback);
            }
            EventKind::CallbackPanicked => {
                println!(
                    "[callback-panicked] channel={:?} id={:?} err={:?}",
                    e.channel, e.callback, e.error
                );
            }
            EventKind::TaskPanicked => {
                println!("[task-panicked] task={:?} err={:?}", e.task, e.error);
            }
            EventKind::WorkersResized => {
                if let Some(n) = e.workers {
                    println!("[workers] count={n}");
                }
            }
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested]");
            }
            EventKind::TasksDrained => {
                println!("[drained] dropped={:?}", e.dropped);
            }
            EventKind::EngineStopped => {
                println!("[stopped]");
            }
            EventKind::SubscriberOverflow => {
                println!("[subscriber-overflow] {:?}", e.error);
            }
            EventKind::SubscriberPanicked => {
                println!("[subscriber-panicked] {:?} err={:?}", e.task, e.error);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
