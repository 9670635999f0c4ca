//! Ingestion fan-out: data tasks for every channel, callbacks gated by
//! subscription, self-unregistration under racing rounds.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cellvisor::{ChannelId, EventKind, ReactionFn, Snapshot};

#[tokio::test]
async fn data_tasks_run_for_all_channels_callbacks_only_for_subscribed() {
    let rig = common::rig(4, 2).await;
    let log = common::spawn_event_log(&rig.engine);

    // A recording reaction on every channel; only channel 2 is subscribed.
    let invoked: Arc<Mutex<Vec<ChannelId>>> = Arc::new(Mutex::new(Vec::new()));
    for ch in 0..4 {
        let sink = Arc::clone(&invoked);
        let reaction = ReactionFn::arc("recorder", move |ch: ChannelId, _: Snapshot| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(ch);
            }
        });
        rig.engine.register_reaction(ch, reaction).await.unwrap();
    }
    rig.engine.subscribe_channel(2).unwrap();

    let round =
        |v: f64, t: f64| -> Vec<(ChannelId, Snapshot)> {
            (0..4)
                .map(|ch| {
                    (
                        ch,
                        [("voltage", v), ("timestamp", t)].into_iter().collect(),
                    )
                })
                .collect()
        };

    rig.feed.round_snapshots(round(4.0, 1.0));
    // Round 1 data tasks land on every channel before round 2 is fed.
    for ch in 0..4 {
        assert!(
            common::wait_until(|| async {
                let snap = rig.engine.snapshot(ch).await.unwrap();
                snap.get("voltage_ema") == Some(4.0)
                    && snap.get("fit_ref_timestamp") == Some(1.0)
            })
            .await
        );
    }

    rig.feed.round_snapshots(round(3.0, 2.0));
    for ch in 0..4 {
        assert!(
            common::wait_until(|| async {
                let snap = rig.engine.snapshot(ch).await.unwrap();
                // One filter execution per round: ema composes exactly once.
                let ema_ok = snap
                    .get("voltage_ema")
                    .is_some_and(|e| (e - (0.2 * 3.0 + 0.8 * 4.0)).abs() < 1e-9);
                // One fit execution per round: dv/dt spans the two rounds.
                let dvdt_ok = snap.get("dvdt").is_some_and(|d| (d + 1.0).abs() < 1e-9);
                ema_ok && dvdt_ok
            })
            .await,
            "derived keys missing on channel {ch}"
        );
    }

    // Callbacks fired for channel 2 only, once per round.
    assert!(common::wait_until(|| async { invoked.lock().unwrap().len() == 2 }).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*invoked.lock().unwrap(), vec![2, 2]);

    let events = log.lock().unwrap();
    assert!(
        events
            .iter()
            .filter(|e| e.kind == EventKind::CallbackFired)
            .all(|e| e.channel == Some(2))
    );
    drop(events);

    rig.engine.shutdown().await;
}

#[tokio::test]
async fn self_unregistering_reaction_fires_once_sibling_every_round() {
    let rig = common::rig(2, 2).await;
    rig.engine.subscribe_channel(0).unwrap();

    let a_count = Arc::new(AtomicUsize::new(0));
    let b_count = Arc::new(AtomicUsize::new(0));

    // A removes itself on its first invocation.
    let engine = Arc::clone(&rig.engine);
    let a = Arc::clone(&a_count);
    rig.engine
        .register_reaction_with(0, move |my_id| {
            ReactionFn::arc("a", move |ch: ChannelId, _: Snapshot| {
                let engine = Arc::clone(&engine);
                let a = Arc::clone(&a);
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    let _ = engine.unregister_reaction(ch, my_id).await;
                }
            })
        })
        .await
        .unwrap();

    let b = Arc::clone(&b_count);
    let b_reaction = ReactionFn::arc("b", move |_: ChannelId, _: Snapshot| {
        let b = Arc::clone(&b);
        async move {
            b.fetch_add(1, Ordering::SeqCst);
        }
    });
    rig.engine.register_reaction(0, b_reaction).await.unwrap();

    for round in 0..10u64 {
        rig.feed
            .round([(0, &[("voltage", 3.5 + round as f64 * 0.01)][..])]);
        let expected = round as usize + 1;
        assert!(
            common::wait_until(|| async { b_count.load(Ordering::SeqCst) == expected }).await,
            "sibling missed round {round}"
        );
    }

    assert_eq!(a_count.load(Ordering::SeqCst), 1);
    assert_eq!(b_count.load(Ordering::SeqCst), 10);

    rig.engine.shutdown().await;
}

#[tokio::test]
async fn stale_callback_task_is_skipped_quietly() {
    let rig = common::rig(2, 2).await;
    let log = common::spawn_event_log(&rig.engine);

    let reaction = ReactionFn::arc("ghost", |_: ChannelId, _: Snapshot| async {});
    let id = rig.engine.register_reaction(0, reaction).await.unwrap();
    assert!(rig.engine.unregister_reaction(0, id).await.unwrap());

    // The invocation referencing the removed id completes as a no-op.
    rig.engine
        .enqueue(cellvisor::Task::Callback { channel: 0, id })
        .unwrap();
    assert!(
        common::wait_until(|| async {
            log.lock()
                .unwrap()
                .iter()
                .any(|e| e.kind == EventKind::CallbackSkipped && e.channel == Some(0))
        })
        .await
    );

    // The engine is unharmed and keeps executing work.
    rig.engine
        .enqueue(cellvisor::Task::ConstantCurrent {
            channel: 0,
            amperes: 1.0,
        })
        .unwrap();
    assert!(common::wait_until(|| async { rig.port.calls().await.len() == 1 }).await);

    rig.engine.shutdown().await;
}
