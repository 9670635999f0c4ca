//! Engine core: wiring and lifecycle.
//!
//! This module contains the embedded implementation of the cellvisor
//! engine. The public API re-exported from here is [`Orchestrator`],
//! [`OrchestratorBuilder`] and [`StepLimit`]; everything else is an
//! internal building block the orchestrator wires together.
//!
//! ## Files & responsibilities
//! - **orchestrator.rs**: public façade; owns the queue, table, registry,
//!   pool, ingestor and fan-out; exposes the test initiators (`run_cccv`,
//!   `run_dcim`, `run_rest`), the registration/subscription surface, pool
//!   resizing, and the idempotent shutdown.
//! - **builder.rs**: collects config + ports + subscribers, constructs the
//!   components, spawns the moving parts.
//! - **ingestor.rs**: the dedicated telemetry loop — poll, commit to the
//!   table, fan out Filter/Fit for every channel and Callback tasks for
//!   subscribed ones.
//! - **pool.rs**: generation-based worker pool; drop-and-respawn resize;
//!   catch_unwind around task bodies.
//! - **exec.rs**: dispatch of one task — port writes, ordered control
//!   sequences, snapshot-then-invoke callbacks, filter/fit kernels.
//! - **signals.rs**: cross-platform OS signal handling for
//!   `run_until_signal`.
//!
//! ## Wiring (module-level flow)
//! ```text
//! Application code
//!   └─ Orchestrator::builder(cfg)
//!        .with_control_port(port).with_telemetry(source).build()
//!
//! build()
//!   ├─ spawn fan-out listener ── Bus ──► SubscriberSet ──► Subscribe impls
//!   ├─ spawn TelemetryIngestor
//!   └─ spawn worker generation (Config::worker_count)
//!
//! TelemetryIngestor (one task)
//!   loop: sleep(poll_interval) → source.poll()
//!     per (channel, sample):
//!       table.update ── happens-before ──┐
//!       queue.push(Filter), push(Fit)    │ all channels
//!       if subscribed(channel):          │
//!         push(Callback) per registry entry, registration order
//!
//! Worker (N tasks, one generation)
//!   loop: queue.pop() ── priority desc, FIFO ties ──► exec::execute
//!     Callback: registry.get → table.snapshot → reaction.on_sample
//!               (reaction may push tasks / mutate registry / end the test)
//!
//! shutdown()
//!   publish ShutdownRequested → close queue → cancel runtime token
//!   → join ingestor + workers → drain → clear registry + flags
//!   → publish EngineStopped → flush + stop fan-out
//! ```
//!
//! ## Notes
//! - Event ordering is maintained via a global monotonic sequence number.
//! - Reactions never run on the ingestor; they are queued at `High`
//!   priority and executed by workers against point-in-time snapshots.
//! - Two invocations for the same channel can run on different workers in
//!   parallel; reactions needing strict serialization serialize internally.

mod builder;
mod exec;
mod ingestor;
mod orchestrator;
mod pool;
mod signals;

pub use builder::OrchestratorBuilder;
pub use orchestrator::{Orchestrator, StepLimit};
