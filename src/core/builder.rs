//! # Builder wiring the engine together.
//!
//! [`OrchestratorBuilder`] collects the configuration, the two hardware
//! ports, and any event subscribers, then `build()` constructs every
//! runtime component and spawns the moving parts: the subscriber fan-out,
//! the telemetry ingestor, and the first worker generation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::exec::ExecContext;
use crate::core::ingestor::TelemetryIngestor;
use crate::core::orchestrator::{spawn_fanout, Orchestrator};
use crate::core::pool::WorkerPool;
use crate::events::Bus;
use crate::ports::{ControlPortRef, TelemetrySourceRef};
use crate::reactions::ReactionRegistry;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::table::ChannelTable;
use crate::tasks::TaskQueue;

/// Builder for constructing an [`Orchestrator`].
pub struct OrchestratorBuilder {
    cfg: Config,
    port: Option<ControlPortRef>,
    source: Option<TelemetrySourceRef>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl OrchestratorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            port: None,
            source: None,
            subscribers: Vec::new(),
        }
    }

    /// Sets the control port adapter (required).
    pub fn with_control_port(mut self, port: ControlPortRef) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the telemetry source adapter (required).
    pub fn with_telemetry(mut self, source: TelemetrySourceRef) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive engine events through dedicated workers with
    /// bounded queues; the engine runs identically with none attached.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the engine and starts it.
    ///
    /// Spawns the subscriber fan-out, the telemetry ingestor, and the
    /// initial worker generation; must run inside a tokio runtime.
    ///
    /// # Panics
    /// If the control port or the telemetry source was not provided —
    /// the engine cannot exist without its hardware seams.
    pub async fn build(self) -> Arc<Orchestrator> {
        let port = self
            .port
            .expect("OrchestratorBuilder requires a control port (with_control_port)");
        let source = self
            .source
            .expect("OrchestratorBuilder requires a telemetry source (with_telemetry)");

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let queue = Arc::new(TaskQueue::new());
        let table = Arc::new(ChannelTable::new(self.cfg.max_channels));
        let registry = Arc::new(ReactionRegistry::new(self.cfg.max_channels));

        let runtime_token = CancellationToken::new();
        let fanout_token = CancellationToken::new();

        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let fanout = spawn_fanout(subs, &bus, fanout_token.clone());

        let ctx = Arc::new(ExecContext {
            port: Arc::clone(&port),
            table: Arc::clone(&table),
            registry: Arc::clone(&registry),
            bus: bus.clone(),
        });
        let pool = WorkerPool::new(Arc::clone(&queue), ctx, bus.clone());
        pool.resize(self.cfg.worker_count_clamped()).await;

        let ingestor = TelemetryIngestor::new(
            Arc::clone(&source),
            Arc::clone(&table),
            Arc::clone(&registry),
            Arc::clone(&queue),
            bus.clone(),
            self.cfg.poll_interval,
        );
        let ingestor_handle = tokio::spawn(ingestor.run(runtime_token.child_token()));

        Arc::new(Orchestrator::new_internal(
            self.cfg,
            queue,
            table,
            registry,
            port,
            bus,
            pool,
            runtime_token,
            fanout_token,
            ingestor_handle,
            fanout,
        ))
    }
}
