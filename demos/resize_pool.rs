//! Resizing the worker pool under load.
//!
//! Enqueues a burst of control tasks, grows the pool mid-stream, shrinks it
//! back, and shows that every queued task still reaches the front-end.
//!
//! Run with: `cargo run --example resize_pool`

use std::sync::Arc;
use std::time::Duration;

use cellvisor::{Config, Orchestrator, ScriptedTelemetry, SimControlPort, Task};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config {
        max_channels: 8,
        worker_count: 2,
        ..Config::default()
    };

    let port = Arc::new(SimControlPort::new());
    let (telemetry, _feed) = ScriptedTelemetry::channel();

    let engine = Orchestrator::builder(cfg)
        .with_control_port(port.clone())
        .with_telemetry(Arc::new(telemetry))
        .build()
        .await;

    println!("workers: {}", engine.worker_count().await);

    for ch in 0..8u32 {
        for _ in 0..50 {
            engine.enqueue(Task::ConstantCurrent {
                channel: ch,
                amperes: 1.5,
            })?;
        }
    }

    engine.set_worker_count(6).await?;
    println!("workers after grow: {}", engine.worker_count().await);

    while port.calls().await.len() < 400 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    println!("all 400 setpoints delivered");

    engine.set_worker_count(1).await?;
    println!("workers after shrink: {}", engine.worker_count().await);

    engine.shutdown().await;
    Ok(())
}
