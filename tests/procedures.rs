//! End-to-end procedure tests on simulated telemetry: CCCV phase
//! transition, step-limit termination, DCIM resistance fitting, rest.

mod common;

use std::time::Duration;

use cellvisor::{EventKind, SimCall, StepLimit};

#[tokio::test]
async fn cccv_switches_to_cv_exactly_once() {
    let rig = common::rig(4, 2).await;
    rig.engine.run_cccv(1, 2.0, 4.2, Vec::new()).await.unwrap();
    assert!(rig.engine.is_subscribed(1).unwrap());

    // The constant-current seed reaches the front-end first.
    assert!(
        common::wait_until(|| async {
            rig.port
                .count(|c| matches!(c, SimCall::ConstantCurrent(1, _)))
                .await
                == 1
        })
        .await
    );

    // Below target: no switch.
    rig.feed.round([(1, &[("voltage", 3.5), ("current", 2.0)][..])]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        rig.port
            .count(|c| matches!(c, SimCall::ConstantVoltage(..)))
            .await,
        0
    );

    // Target reached: exactly one switch to constant voltage.
    rig.feed.round([(1, &[("voltage", 4.2), ("current", 2.0)][..])]);
    assert!(
        common::wait_until(|| async {
            rig.port
                .count(|c| matches!(c, SimCall::ConstantVoltage(1, _)))
                .await
                == 1
        })
        .await
    );

    // Further rounds at target must not produce a second switch: the
    // voltage watcher unregistered itself.
    rig.feed.round([(1, &[("voltage", 4.2), ("current", 2.0)][..])]);
    tokio::time::sleep(Duration::from_millis(30)).await;

    let calls = rig.port.calls().await;
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, SimCall::ConstantCurrent(1, _)))
            .count(),
        1
    );
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, SimCall::ConstantVoltage(1, _)))
            .count(),
        1
    );
    let cc = calls
        .iter()
        .position(|c| matches!(c, SimCall::ConstantCurrent(..)))
        .unwrap();
    let cv = calls
        .iter()
        .position(|c| matches!(c, SimCall::ConstantVoltage(..)))
        .unwrap();
    assert!(cc < cv);

    rig.engine.shutdown().await;
}

#[tokio::test]
async fn cccv_cv_phase_rests_on_current_taper() {
    let rig = common::rig(2, 2).await;
    rig.engine.run_cccv(0, 2.0, 4.2, Vec::new()).await.unwrap();

    rig.feed.round([(0, &[("voltage", 4.2), ("current", 2.0)][..])]);
    assert!(
        common::wait_until(|| async {
            rig.port
                .count(|c| matches!(c, SimCall::ConstantVoltage(0, _)))
                .await
                == 1
        })
        .await
    );

    // CV phase holds while the current is still high.
    rig.feed.round([(0, &[("voltage", 4.2), ("current", 1.0)][..])]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(rig.port.count(|c| matches!(c, SimCall::Rest(0))).await, 0);

    // Current tapers below 5% of the seed current: the test ends.
    rig.feed.round([(0, &[("voltage", 4.2), ("current", 0.05)][..])]);
    assert!(
        common::wait_until(|| async {
            rig.port.count(|c| matches!(c, SimCall::Rest(0))).await == 1
        })
        .await
    );
    assert!(common::wait_until(|| async { !rig.engine.is_subscribed(0).unwrap() }).await);

    rig.engine.shutdown().await;
}

#[tokio::test]
async fn step_limit_terminates_and_silences_channel() {
    let rig = common::rig(4, 2).await;
    rig.engine
        .run_cccv(1, 2.0, 4.2, vec![StepLimit::new("voltage", 4.2)])
        .await
        .unwrap();

    rig.feed.round([(1, &[("voltage", 3.5), ("current", 2.0)][..])]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    rig.feed.round([(1, &[("voltage", 4.2), ("current", 2.0)][..])]);

    // The limit fires: channel rested and unsubscribed.
    assert!(
        common::wait_until(|| async {
            rig.port.count(|c| matches!(c, SimCall::Rest(1))).await == 1
        })
        .await
    );
    assert!(common::wait_until(|| async { !rig.engine.is_subscribed(1).unwrap() }).await);

    // Subsequent rounds reach a silent channel: no further control calls,
    // no callback executions.
    let log = common::spawn_event_log(&rig.engine);
    let calls_before = rig.port.calls().await.len();
    rig.feed.round([(1, &[("voltage", 4.3), ("current", 2.0)][..])]);
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(rig.port.calls().await.len(), calls_before);
    let fired_after = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.kind == EventKind::CallbackFired && e.channel == Some(1))
        .count();
    assert_eq!(fired_after, 0);

    rig.engine.shutdown().await;
}

#[tokio::test]
async fn dcim_merges_resistance_estimate() {
    let rig = common::rig(2, 2).await;
    let log = common::spawn_event_log(&rig.engine);
    rig.engine.run_dcim(0, 2.0).await.unwrap();

    // Baseline round.
    rig.feed.round([(0, &[("voltage", 4.0)][..])]);
    assert!(
        common::wait_until(|| async {
            log.lock()
                .unwrap()
                .iter()
                .any(|e| e.kind == EventKind::CallbackFired && e.channel == Some(0))
        })
        .await
    );

    // Loaded round: resistance = (4.0 - 3.8) / 2.0.
    rig.feed.round([(0, &[("voltage", 3.8)][..])]);
    assert!(
        common::wait_until(|| async {
            rig.engine
                .snapshot(0)
                .await
                .unwrap()
                .get("resistance")
                .is_some_and(|r| (r - 0.1).abs() < 1e-9)
        })
        .await
    );

    rig.engine.shutdown().await;
}

#[tokio::test]
async fn rest_clears_channel_and_rests_it() {
    let rig = common::rig(2, 2).await;
    rig.engine.run_cccv(0, 1.0, 4.2, Vec::new()).await.unwrap();
    assert!(rig.engine.is_subscribed(0).unwrap());

    rig.engine.run_rest(0).await.unwrap();
    assert!(!rig.engine.is_subscribed(0).unwrap());
    assert!(
        common::wait_until(|| async {
            rig.port.count(|c| matches!(c, SimCall::Rest(0))).await == 1
        })
        .await
    );

    rig.engine.shutdown().await;
}
