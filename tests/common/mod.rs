//! Shared test rig: an engine wired to simulation ports plus polling
//! helpers.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cellvisor::{
    Config, Event, Orchestrator, ScriptedTelemetry, SimControlPort, TelemetryFeed,
};

pub struct Rig {
    pub engine: Arc<Orchestrator>,
    pub port: Arc<SimControlPort>,
    pub feed: TelemetryFeed,
}

/// Builds and starts an engine over simulation ports.
pub async fn rig(max_channels: u32, workers: usize) -> Rig {
    let cfg = Config {
        max_channels,
        worker_count: workers,
        poll_interval: Duration::from_millis(1),
        ..Config::default()
    };

    let port = Arc::new(SimControlPort::new());
    let (telemetry, feed) = ScriptedTelemetry::channel();
    let engine = Orchestrator::builder(cfg)
        .with_control_port(port.clone())
        .with_telemetry(Arc::new(telemetry))
        .build()
        .await;

    Rig { engine, port, feed }
}

/// Polls `cond` every millisecond until it holds; gives up after ~2s.
pub async fn wait_until<F, Fut>(mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..2000 {
        if cond().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    false
}

/// Collects every engine event into a shared log.
pub fn spawn_event_log(engine: &Orchestrator) -> Arc<Mutex<Vec<Event>>> {
    let mut rx = engine.bus().subscribe();
    let log: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => sink.lock().unwrap().push(ev),
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    });
    log
}
