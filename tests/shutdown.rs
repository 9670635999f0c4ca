//! Shutdown: every enqueued task is either executed or drained, teardown
//! is idempotent, and nothing survives it.

mod common;

use cellvisor::{EngineError, EventKind, Task};

#[tokio::test]
async fn shutdown_accounts_for_every_task() {
    let rig = common::rig(4, 3).await;

    for _ in 0..1000 {
        rig.engine
            .enqueue(Task::ConstantCurrent {
                channel: 0,
                amperes: 2.0,
            })
            .unwrap();
    }

    let dropped = rig.engine.shutdown().await;
    let executed = rig.port.calls().await.len();
    assert_eq!(executed + dropped, 1000);
}

#[tokio::test]
async fn shutdown_is_idempotent_and_leaves_nothing_running() {
    let rig = common::rig(4, 2).await;
    let log = common::spawn_event_log(&rig.engine);

    rig.engine.run_cccv(1, 2.0, 4.2, Vec::new()).await.unwrap();
    rig.engine.run_cccv(2, 1.0, 4.0, Vec::new()).await.unwrap();
    assert!(rig.engine.is_subscribed(1).unwrap());

    let first = rig.engine.shutdown().await;
    let second = rig.engine.shutdown().await;
    assert_eq!(second, 0);
    let _ = first;

    // No workers live, subscriptions cleared, new work refused.
    assert_eq!(rig.engine.worker_count().await, 0);
    assert!(!rig.engine.is_subscribed(1).unwrap());
    assert!(!rig.engine.is_subscribed(2).unwrap());
    assert_eq!(
        rig.engine.enqueue(Task::ConstantCurrent {
            channel: 0,
            amperes: 1.0
        }),
        Err(EngineError::Stopped)
    );
    assert!(matches!(
        rig.engine.run_rest(0).await,
        Err(EngineError::Stopped)
    ));

    // The shutdown timeline reached observers.
    assert!(
        common::wait_until(|| async {
            let events = log.lock().unwrap();
            let requested = events
                .iter()
                .any(|e| e.kind == EventKind::ShutdownRequested);
            let stopped = events.iter().any(|e| e.kind == EventKind::EngineStopped);
            requested && stopped
        })
        .await
    );
}

#[tokio::test]
async fn ingestion_stops_with_the_engine() {
    let rig = common::rig(2, 2).await;
    rig.engine.shutdown().await;

    // Telemetry fed after shutdown goes nowhere: no ingestion, no calls.
    rig.feed.round([(0, &[("voltage", 4.0)][..])]);
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    assert!(rig.engine.snapshot(0).await.unwrap().is_empty());
    assert!(rig.port.calls().await.is_empty());
}
