//! # cellvisor
//!
//! **Cellvisor** is a concurrent orchestration engine for battery test
//! channels.
//!
//! An electrochemical test is not a single call: it is a state machine that
//! issues control commands (constant current, constant voltage, rest, off)
//! to a hardware front-end, continuously ingests telemetry samples from that
//! front-end, and reacts to the samples by issuing further commands or
//! terminating the test. Cellvisor provides the task-and-callback core that
//! makes such procedures composable.
//!
//! ## Features
//!
//! | Area             | Description                                                       | Key types / traits                           |
//! |------------------|-------------------------------------------------------------------|----------------------------------------------|
//! | **Scheduling**   | Priority task queue (FIFO among equals) drained by a worker pool. | [`Task`], [`TaskPriority`]                   |
//! | **Ingestion**    | Dedicated telemetry loop updating per-channel snapshots.          | [`TelemetrySource`], [`Snapshot`]            |
//! | **Reactions**    | Per-channel callbacks with stable ids, fired on the worker pool.  | [`Reaction`], [`ReactionFn`], [`CallbackId`] |
//! | **Control**      | Hardware seam for channel setpoints.                              | [`ControlPort`], [`ControlOp`]               |
//! | **Procedures**   | Test initiators composing the core (CCCV, DCIM, rest).            | [`Orchestrator`], [`StepLimit`]              |
//! | **Observer API** | Hook into engine events (logging, metrics, custom subscribers).   | [`Subscribe`], [`Event`], [`EventKind`]      |
//! | **Errors**       | Typed errors for the engine and the control seam.                 | [`EngineError`], [`ControlError`]            |
//! | **Configuration**| Centralized runtime settings.                                     | [`Config`]                                   |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber _(demo/reference only)_.
//!
//! ```no_run
//! use std::sync::Arc;
//! use cellvisor::{Config, Orchestrator, SimControlPort, ScriptedTelemetry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.max_channels = 4;
//!     cfg.worker_count = 2;
//!
//!     let port = Arc::new(SimControlPort::new());
//!     let (telemetry, feed) = ScriptedTelemetry::channel();
//!
//!     let engine = Orchestrator::builder(cfg)
//!         .with_control_port(port.clone())
//!         .with_telemetry(Arc::new(telemetry))
//!         .build()
//!         .await;
//!
//!     // Charge channel 1 at 2 A until 4.2 V, then hold.
//!     engine.run_cccv(1, 2.0, 4.2, Vec::new()).await?;
//!
//!     // Drive one simulated telemetry round.
//!     feed.round([(1, &[("voltage", 3.9), ("current", 2.0)][..])]);
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod config;
mod core;
mod error;
mod events;
mod measurement;
mod ports;
mod reactions;
mod subscribers;
mod table;
mod tasks;

// ---- Public re-exports ----

pub use crate::core::{Orchestrator, OrchestratorBuilder, StepLimit};
pub use config::Config;
pub use error::{ControlError, EngineError};
pub use events::{Bus, Event, EventKind};
pub use measurement::{ChannelId, Snapshot};
pub use ports::sim::{ScriptedTelemetry, SimCall, SimControlPort, TelemetryFeed};
pub use ports::{ControlPort, ControlPortRef, TelemetrySource, TelemetrySourceRef};
pub use reactions::{CallbackId, Reaction, ReactionFn, ReactionRef};
pub use subscribers::Subscribe;
pub use tasks::{ControlOp, Task, TaskPriority};

// Optional: expose a simple built-in stdout subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
