//! Behavioral tests for the shared readiness waiter, run on tokio's paused clock.

use ika_model_wait::readiness::{
    AddedNode, ChangeBatch, DocumentFeed, HostGlobal, ProbeError, ProbeOutcome, SignalStatus,
    TransientCheckError,
};
use ika_model_wait::{
    Error, ModelReadinessWaiter, ReadinessError, ResolvedBy, WaiterConfig, WaiterState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct GameModel {
    selected_city: u32,
}

type Model = Arc<GameModel>;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

/// fast 50ms for 200ms, then 500ms, give up at 1s
fn short_config() -> WaiterConfig {
    WaiterConfig::new()
        .with_fast_interval(ms(50))
        .with_fast_phase(ms(200))
        .with_slow_interval(ms(500))
        .with_timeout(ms(1000))
}

fn waiter_on(
    global: &Arc<HostGlobal<GameModel>>,
    feed: &DocumentFeed,
    config: WaiterConfig,
) -> ModelReadinessWaiter<Model> {
    ModelReadinessWaiter::<Model>::builder()
        .config(config)
        .probe_arc(global.clone())
        .change_source(feed.clone())
        .build()
        .expect("valid waiter")
}

fn never_ready() -> Result<ProbeOutcome<Model>, ProbeError> {
    Ok(ProbeOutcome::NotReady)
}

fn publish_after(global: &Arc<HostGlobal<GameModel>>, delay: Duration, city: u32) {
    let global = Arc::clone(global);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        global.publish(GameModel {
            selected_city: city,
        });
    });
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_attempt() {
    let global = Arc::new(HostGlobal::new());
    let feed = DocumentFeed::new();
    let waiter = waiter_on(&global, &feed, WaiterConfig::default());

    let signals: Vec<_> = (0..10).map(|_| waiter.wait_for_ready()).collect();
    assert!(signals.iter().all(|s| s.same_signal(&signals[0])));
    assert_eq!(waiter.state(), WaiterState::Waiting);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let waiter = waiter.clone();
            tokio::spawn(async move { waiter.wait_for_ready().await })
        })
        .collect();

    publish_after(&global, ms(2_000), 42);

    let mut models = Vec::new();
    for signal in signals {
        models.push(signal.await.unwrap());
    }
    for handle in handles {
        models.push(handle.await.unwrap().unwrap());
    }

    let published = global.get().unwrap();
    assert!(models.iter().all(|m| Arc::ptr_eq(m, &published)));
    assert_eq!(waiter.snapshot().attempts, 1);
    assert_eq!(feed.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn present_model_resolves_without_scheduling() {
    let global = Arc::new(HostGlobal::new());
    let feed = DocumentFeed::new();
    let waiter = waiter_on(&global, &feed, WaiterConfig::default());
    let published = global.publish(GameModel { selected_city: 1 });

    let signal = waiter.wait_for_ready();
    assert_eq!(signal.status(), SignalStatus::Resolved);
    assert_eq!(feed.subscriber_count(), 0);

    let snap = waiter.snapshot();
    assert_eq!(snap.attempts, 0);
    assert!(!snap.observing);
    assert_eq!(snap.resolved_by, Some(ResolvedBy::Immediate));
    assert!(Arc::ptr_eq(&signal.await.unwrap(), &published));

    // cached: no further probing
    let checks = waiter.snapshot().checks;
    global.clear();
    let again = waiter.wait_for_ready().await.unwrap();
    assert!(Arc::ptr_eq(&again, &published));
    assert_eq!(waiter.snapshot().checks, checks);
}

#[tokio::test(start_paused = true)]
async fn missing_model_times_out_within_one_interval() {
    let global = Arc::new(HostGlobal::new());
    let feed = DocumentFeed::new();
    let waiter = waiter_on(&global, &feed, short_config());

    let start = Instant::now();
    let err = waiter.wait_for_ready().await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(elapsed >= ms(1000), "gave up early at {elapsed:?}");
    assert!(elapsed <= ms(1500), "gave up late at {elapsed:?}");
    assert_eq!(waiter.state(), WaiterState::Idle);
    assert_eq!(waiter.snapshot().timeouts, 1);
    assert_eq!(feed.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn call_after_timeout_starts_fresh_attempt() {
    let global = Arc::new(HostGlobal::new());
    let feed = DocumentFeed::new();
    let waiter = waiter_on(&global, &feed, short_config());

    let first = waiter.wait_for_ready();
    assert!(first.clone().await.unwrap_err().is_timeout());
    assert_eq!(first.status(), SignalStatus::Failed);

    let second = waiter.wait_for_ready();
    assert!(!second.same_signal(&first));
    assert_eq!(second.status(), SignalStatus::Pending);

    publish_after(&global, ms(100), 9);
    let model = second.await.unwrap();
    assert_eq!(model.selected_city, 9);
    assert_eq!(waiter.snapshot().attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_never_reject_before_timeout() {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(GameModel { selected_city: 5 });
    let probe = {
        let calls = Arc::clone(&calls);
        let model = Arc::clone(&model);
        move || -> Result<ProbeOutcome<Model>, ProbeError> {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 100 {
                Ok(ProbeOutcome::Transient(TransientCheckError::new(
                    "Cannot read properties of undefined (reading 'relatedCityData')",
                )))
            } else {
                Ok(ProbeOutcome::Ready(Arc::clone(&model)))
            }
        }
    };
    let waiter = ModelReadinessWaiter::<Model>::builder()
        .config(WaiterConfig::new().with_fast_interval(ms(10)))
        .probe(probe)
        .build()
        .unwrap();

    let resolved = waiter.wait_for_ready().await.unwrap();
    assert!(Arc::ptr_eq(&resolved, &model));

    let snap = waiter.snapshot();
    assert_eq!(snap.transient_errors, 100);
    assert_eq!(snap.checks, 101);
    assert_eq!(snap.timeouts, 0);
}

#[tokio::test(start_paused = true)]
async fn sync_snapshot_tracks_readiness() {
    let ready = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(GameModel { selected_city: 3 });
    let probe = {
        let ready = Arc::clone(&ready);
        let model = Arc::clone(&model);
        move || -> Result<ProbeOutcome<Model>, ProbeError> {
            Ok(if ready.load(Ordering::SeqCst) == 1 {
                ProbeOutcome::Ready(Arc::clone(&model))
            } else {
                ProbeOutcome::NotReady
            })
        }
    };
    let waiter = ModelReadinessWaiter::<Model>::new(probe).unwrap();
    assert!(waiter.sync_snapshot().is_none());

    let signal = waiter.wait_for_ready();
    assert!(waiter.sync_snapshot().is_none());

    ready.store(1, Ordering::SeqCst);
    signal.await.unwrap();
    let snap = waiter.sync_snapshot().expect("cached after resolution");
    assert!(Arc::ptr_eq(&snap, &model));
}

#[tokio::test(start_paused = true)]
async fn sync_snapshot_reads_host_global_directly() {
    let global = Arc::new(HostGlobal::new());
    let feed = DocumentFeed::new();
    let waiter = waiter_on(&global, &feed, WaiterConfig::default());

    assert!(waiter.sync_snapshot().is_none());
    global.publish(GameModel { selected_city: 11 });
    assert_eq!(waiter.sync_snapshot().unwrap().selected_city, 11);
    assert_eq!(waiter.state(), WaiterState::Idle);
}

#[tokio::test(start_paused = true)]
async fn late_model_resolves_on_slow_phase_tick() {
    let global = Arc::new(HostGlobal::new());
    let waiter = ModelReadinessWaiter::<Model>::builder()
        .config(short_config())
        .probe_arc(global.clone())
        .build()
        .unwrap();

    publish_after(&global, ms(600), 7);
    let start = Instant::now();
    let model = waiter.wait_for_ready().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(model.selected_city, 7);
    assert!(elapsed >= ms(700) && elapsed < ms(750), "resolved at {elapsed:?}");
    assert_eq!(
        waiter.snapshot().resolved_by,
        Some(ResolvedBy::Poll {
            phase: 1,
            interval: ms(500)
        })
    );
}

#[tokio::test(start_paused = true)]
async fn script_insertion_triggers_early_check() {
    let global = Arc::new(HostGlobal::new());
    let feed = DocumentFeed::new();
    let config = WaiterConfig::new()
        .with_fast_interval(ms(1000))
        .with_fast_phase(Duration::ZERO)
        .with_slow_interval(ms(1000))
        .with_timeout(ms(10_000));
    let waiter = waiter_on(&global, &feed, config);

    let signal = waiter.wait_for_ready();
    {
        let global = Arc::clone(&global);
        let feed = feed.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ms(300)).await;
            global.publish(GameModel { selected_city: 2 });
            let batch = ChangeBatch::new(vec![AddedNode::script("/js/ikariam-client.js")]);
            for _ in 0..5 {
                feed.publish(&batch);
            }
        });
    }

    let start = Instant::now();
    signal.await.unwrap();
    assert!(start.elapsed() < ms(1000));

    let snap = waiter.snapshot();
    assert_eq!(snap.resolved_by, Some(ResolvedBy::Observation));
    assert_eq!(snap.observation_triggers, 1);
    assert_eq!(snap.state, WaiterState::Ready);
    assert_eq!(feed.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn script_added_right_after_the_call_is_not_missed() {
    let global = Arc::new(HostGlobal::new());
    let feed = DocumentFeed::new();
    let config = WaiterConfig::new()
        .with_fast_interval(ms(1000))
        .with_fast_phase(Duration::ZERO)
        .with_slow_interval(ms(1000))
        .with_timeout(ms(10_000));
    let waiter = waiter_on(&global, &feed, config);

    let signal = waiter.wait_for_ready();
    assert_eq!(feed.subscriber_count(), 1);

    // the attempt task has not run yet
    global.publish(GameModel { selected_city: 1 });
    feed.publish(&ChangeBatch::new(vec![AddedNode::script("/js/ikariam-client.js")]));

    let start = Instant::now();
    let model = signal.await.unwrap();
    assert_eq!(model.selected_city, 1);
    assert!(start.elapsed() < ms(1000));

    let snap = waiter.snapshot();
    assert_eq!(snap.resolved_by, Some(ResolvedBy::Observation));
    assert_eq!(snap.observation_triggers, 1);
    assert!(!snap.observing);
    assert_eq!(feed.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn non_script_changes_do_not_wake_the_wait() {
    let global = Arc::new(HostGlobal::new());
    let feed = DocumentFeed::new();
    let config = WaiterConfig::new()
        .with_fast_interval(ms(1000))
        .with_fast_phase(Duration::ZERO)
        .with_slow_interval(ms(1000))
        .with_timeout(ms(10_000));
    let waiter = waiter_on(&global, &feed, config);

    let signal = waiter.wait_for_ready();
    assert!(waiter.snapshot().observing);
    {
        let global = Arc::clone(&global);
        let feed = feed.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ms(300)).await;
            global.publish(GameModel { selected_city: 4 });
            feed.publish(&ChangeBatch::new(vec![AddedNode::element("div")]));
        });
    }

    let start = Instant::now();
    signal.await.unwrap();
    assert!(start.elapsed() >= ms(1000));
    assert_eq!(waiter.snapshot().observation_triggers, 0);
}

#[tokio::test(start_paused = true)]
async fn unexpected_probe_failure_resets_waiter() {
    let calls = Arc::new(AtomicUsize::new(0));
    let probe = {
        let calls = Arc::clone(&calls);
        move || -> Result<ProbeOutcome<Model>, ProbeError> {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(ProbeOutcome::NotReady),
                1 => Err(ProbeError::new("model has unexpected shape")),
                _ => Ok(ProbeOutcome::Ready(Arc::new(GameModel { selected_city: 8 }))),
            }
        }
    };
    let waiter = ModelReadinessWaiter::<Model>::new(probe).unwrap();

    let err = waiter.wait_for_ready().await.unwrap_err();
    assert!(matches!(
        err.readiness(),
        Some(ReadinessError::Probe { message }) if message == "model has unexpected shape"
    ));
    assert_eq!(waiter.state(), WaiterState::Idle);

    let model = waiter.wait_for_ready().await.unwrap();
    assert_eq!(model.selected_city, 8);
}

#[tokio::test(start_paused = true)]
async fn when_ready_runs_callback_and_propagates_its_error() {
    let global = Arc::new(HostGlobal::new());
    let feed = DocumentFeed::new();
    let waiter = waiter_on(&global, &feed, WaiterConfig::default());

    publish_after(&global, ms(400), 12);
    let city = waiter.when_ready(|m| Ok(m.selected_city)).await.unwrap();
    assert_eq!(city, 12);

    let err = waiter
        .when_ready(|_| -> anyhow::Result<()> { Err(anyhow::anyhow!("navigation bar missing")) })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Callback(_)));
    assert!(err.to_string().contains("navigation bar missing"));
}

#[tokio::test]
async fn when_ready_skips_the_wait_for_a_published_model() {
    let global = Arc::new(HostGlobal::new());
    let feed = DocumentFeed::new();
    let waiter = waiter_on(&global, &feed, WaiterConfig::default());
    global.publish(GameModel { selected_city: 6 });

    let city = waiter.when_ready(|m| Ok(m.selected_city)).await.unwrap();
    assert_eq!(city, 6);
    assert_eq!(waiter.snapshot().attempts, 0);
    assert_eq!(waiter.snapshot().checks, 0);
}

#[test]
fn without_runtime_the_signal_fails_and_waiter_stays_idle() {
    let waiter = ModelReadinessWaiter::<Model>::new(never_ready).unwrap();
    let signal = waiter.wait_for_ready();
    assert_eq!(signal.status(), SignalStatus::Failed);
    assert_eq!(waiter.state(), WaiterState::Idle);

    let err = tokio_test::block_on(signal.wait()).unwrap_err();
    assert!(matches!(
        err.readiness(),
        Some(ReadinessError::Runtime { .. })
    ));
}

#[test]
fn runtime_shutdown_mid_wait_resets_waiter() {
    let global = Arc::new(HostGlobal::new());
    let feed = DocumentFeed::new();
    let waiter = waiter_on(&global, &feed, WaiterConfig::default());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let signal = runtime.block_on(async { waiter.wait_for_ready() });
    assert_eq!(waiter.state(), WaiterState::Waiting);
    assert!(waiter.snapshot().observing);

    drop(runtime);
    assert_eq!(waiter.state(), WaiterState::Idle);
    assert_eq!(signal.status(), SignalStatus::Failed);
    assert!(!waiter.snapshot().observing);
    assert_eq!(feed.subscriber_count(), 0);
}
