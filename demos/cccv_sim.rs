//! CCCV charge over simulated telemetry.
//!
//! Wires the engine to the simulation ports, starts a CCCV procedure on one
//! channel, and replays a telemetry trace where the cell voltage climbs to
//! the target and the current then tapers off. Engine events stream to
//! stdout through the built-in `LogWriter`.
//!
//! Run with: `cargo run --example cccv_sim --features logging`

use std::sync::Arc;
use std::time::Duration;

use cellvisor::{Config, LogWriter, Orchestrator, ScriptedTelemetry, SimControlPort, StepLimit};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config {
        max_channels: 4,
        worker_count: 2,
        poll_interval: Duration::from_millis(1),
        ..Config::default()
    };

    let port = Arc::new(SimControlPort::new());
    let (telemetry, feed) = ScriptedTelemetry::channel();

    let engine = Orchestrator::builder(cfg)
        .with_control_port(port.clone())
        .with_telemetry(Arc::new(telemetry))
        .with_subscribers(vec![Arc::new(LogWriter)])
        .build()
        .await;

    engine
        .run_cccv(1, 2.0, 4.2, vec![StepLimit::new("temperature", 60.0)])
        .await?;

    // CC phase: voltage climbs at full current.
    for step in 0..6 {
        let voltage = 3.6 + 0.1 * step as f64;
        feed.round([(
            1,
            &[
                ("voltage", voltage),
                ("current", 2.0),
                ("temperature", 25.0),
                ("timestamp", step as f64),
            ][..],
        )]);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // CV phase: voltage holds, current tapers toward the cutoff.
    for step in 0..6 {
        let current = 2.0 * 0.4_f64.powi(step);
        feed.round([(
            1,
            &[
                ("voltage", 4.2),
                ("current", current),
                ("temperature", 26.0),
                ("timestamp", 6.0 + step as f64),
            ][..],
        )]);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let dropped = engine.shutdown().await;

    println!("---");
    println!("front-end saw: {:?}", port.calls().await);
    println!("drained tasks: {dropped}");
    Ok(())
}
