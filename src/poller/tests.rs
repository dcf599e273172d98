use super::{spawn, DashboardSnapshot, PollPhase, PollerHandle, PollerSettings, RefreshOutcome};
use crate::channels::{Channel, ChannelKind, Site};
use crate::upstream::{CycleError, TelemetrySource};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Semaphore};
use tokio::time::{Duration, Instant};

type Scripted = Result<Vec<Value>, CycleError>;

#[derive(Clone)]
struct ScriptedSource {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    calls: Arc<AtomicUsize>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSource {
    fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            calls: Arc::new(AtomicUsize::new(0)),
            gate: None,
        }
    }

    /// Each fetch blocks until the test hands out a permit.
    fn gated(script: Vec<Scripted>) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut source = Self::new(script);
        source.gate = Some(gate.clone());
        (source, gate)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn fetch_batch(&self) -> Result<Vec<Value>, CycleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CycleError::NetworkFailure("script exhausted".into())))
    }
}

fn settings(capacity: usize) -> PollerSettings {
    PollerSettings {
        interval: Duration::from_secs(30),
        fetch_timeout: Duration::from_secs(10),
        capacity,
    }
}

fn item(minute: u32, zone1_temp: f64) -> Value {
    json!({
        "time": format!("2025-03-01T10:{minute:02}:00Z"),
        "plant_1_TEMP": zone1_temp,
        "plant_1_HUM": 50.0,
        "tanque_PH": 7.0
    })
}

fn zone1_temp() -> Channel {
    Channel::new(Site::Zone(1), ChannelKind::Temperature)
}

async fn after_cycle(rx: &mut watch::Receiver<DashboardSnapshot>, cycles: u64) -> DashboardSnapshot {
    rx.wait_for(|snapshot| snapshot.cycles >= cycles && snapshot.phase == PollPhase::Idle)
        .await
        .expect("poller alive")
        .clone()
}

async fn stop(handle: &PollerHandle, join: tokio::task::JoinHandle<()>) {
    handle.stop();
    join.await.expect("poller task");
}

#[tokio::test(start_paused = true)]
async fn partial_batch_is_buffered_and_sorted() {
    let source = ScriptedSource::new(vec![Ok(vec![
        item(2, 22.0),
        json!({"plant_1_TEMP": 99.0}),
        item(0, 20.0),
        item(1, 21.0),
    ])]);
    let (handle, join) = spawn(source, settings(10));
    let mut rx = handle.subscribe();

    let snapshot = after_cycle(&mut rx, 1).await;
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.rejected_last_cycle, 1);
    assert_eq!(snapshot.history.len(), 3);
    let temps: Vec<f64> = snapshot
        .history
        .iter()
        .filter_map(|reading| reading.value(zone1_temp()))
        .collect();
    assert_eq!(temps, vec![20.0, 21.0, 22.0]);
    assert_eq!(
        snapshot.latest.as_ref().and_then(|r| r.value(zone1_temp())),
        Some(22.0)
    );
    assert!(snapshot.last_updated.is_some());

    stop(&handle, join).await;
}

#[tokio::test(start_paused = true)]
async fn network_failure_keeps_stale_data() {
    let source = ScriptedSource::new(vec![
        Ok(vec![item(0, 20.0), item(1, 21.0), item(2, 22.0)]),
        Err(CycleError::NetworkFailure("connection refused".into())),
    ]);
    let (handle, join) = spawn(source, settings(10));
    let mut rx = handle.subscribe();

    let first = after_cycle(&mut rx, 1).await;
    assert_eq!(handle.request_refresh(), RefreshOutcome::Queued);
    let second = after_cycle(&mut rx, 2).await;

    assert_eq!(second.latest, first.latest);
    assert_eq!(second.history, first.history);
    assert_eq!(second.last_updated, first.last_updated);
    assert!(matches!(second.error, Some(CycleError::NetworkFailure(_))));

    stop(&handle, join).await;
}

#[tokio::test(start_paused = true)]
async fn fully_rejected_batch_is_an_empty_result() {
    let source = ScriptedSource::new(vec![
        Ok(vec![item(0, 20.0)]),
        Ok(vec![json!({"plant_1_TEMP": 1.0}), json!(42)]),
        Ok(vec![item(1, 21.0)]),
    ]);
    let (handle, join) = spawn(source, settings(10));
    let mut rx = handle.subscribe();

    after_cycle(&mut rx, 1).await;
    handle.request_refresh();
    let failed = after_cycle(&mut rx, 2).await;
    assert_eq!(failed.error, Some(CycleError::EmptyResult { rejected: 2 }));
    assert_eq!(failed.history.len(), 1);
    assert_eq!(failed.rejected_total, 2);

    handle.request_refresh();
    let recovered = after_cycle(&mut rx, 3).await;
    assert!(recovered.error.is_none());
    assert_eq!(recovered.history.len(), 2);

    stop(&handle, join).await;
}

#[tokio::test(start_paused = true)]
async fn overlapping_windows_are_not_appended_twice() {
    let source = ScriptedSource::new(vec![
        Ok(vec![item(0, 20.0), item(1, 21.0)]),
        Ok(vec![
            item(1, 21.0),
            item(2, 22.0),
            item(2, 22.0),
            item(2, 22.5),
            item(0, 20.0),
        ]),
    ]);
    let (handle, join) = spawn(source, settings(10));
    let mut rx = handle.subscribe();

    let first = after_cycle(&mut rx, 1).await;
    assert_eq!(first.skipped_last_cycle, 0);
    handle.request_refresh();
    let snapshot = after_cycle(&mut rx, 2).await;

    let stamps: Vec<_> = snapshot.history.iter().map(|r| r.timestamp()).collect();
    assert_eq!(stamps.len(), 4);
    assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
    let temps: Vec<f64> = snapshot
        .history
        .iter()
        .filter_map(|reading| reading.value(zone1_temp()))
        .collect();
    assert_eq!(temps, vec![20.0, 21.0, 22.0, 22.5]);
    assert_eq!(snapshot.skipped_last_cycle, 3);
    assert_eq!(snapshot.skipped_total, 3);
    assert!(snapshot.error.is_none());

    stop(&handle, join).await;
}

#[tokio::test(start_paused = true)]
async fn readings_sharing_an_instant_are_all_kept() {
    let at = "2025-03-01T10:00:00Z";
    let source = ScriptedSource::new(vec![Ok(vec![
        json!({"time": at, "plant_1_TEMP": 20.0}),
        json!({"time": at, "plant_2_TEMP": 21.0}),
        json!({"time": at, "tanque_PH": 7.0}),
        json!({"plant_3_TEMP": 22.0}),
    ])]);
    let (handle, join) = spawn(source, settings(10));
    let mut rx = handle.subscribe();

    let snapshot = after_cycle(&mut rx, 1).await;
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.history.len(), 3);
    assert_eq!(snapshot.rejected_last_cycle, 1);
    assert_eq!(snapshot.skipped_last_cycle, 0);
    assert_eq!(
        snapshot
            .latest
            .as_ref()
            .and_then(|r| r.value(Channel::new(Site::Tank, ChannelKind::Ph))),
        Some(7.0)
    );

    stop(&handle, join).await;
}

#[tokio::test(start_paused = true)]
async fn capacity_evicts_oldest_readings() {
    let source = ScriptedSource::new(vec![
        Ok((0..4).map(|m| item(m, 20.0 + m as f64)).collect()),
        Ok((4..7).map(|m| item(m, 20.0 + m as f64)).collect()),
    ]);
    let (handle, join) = spawn(source, settings(5));
    let mut rx = handle.subscribe();

    after_cycle(&mut rx, 1).await;
    handle.request_refresh();
    let snapshot = after_cycle(&mut rx, 2).await;

    let temps: Vec<f64> = snapshot
        .history
        .iter()
        .filter_map(|reading| reading.value(zone1_temp()))
        .collect();
    assert_eq!(temps, vec![22.0, 23.0, 24.0, 25.0, 26.0]);

    stop(&handle, join).await;
}

#[tokio::test(start_paused = true)]
async fn cadence_is_constant_after_failures() {
    let source = ScriptedSource::new(vec![
        Err(CycleError::MalformedEnvelope("`success` is not true".into())),
        Err(CycleError::NetworkFailure("reset".into())),
        Ok(vec![item(0, 20.0)]),
    ]);
    let (handle, join) = spawn(source.clone(), settings(10));
    let mut rx = handle.subscribe();
    let started = Instant::now();

    let first = after_cycle(&mut rx, 1).await;
    assert_eq!(first.error.as_ref().map(CycleError::kind), Some("malformed_envelope"));
    assert!(first.latest.is_none());

    let third = after_cycle(&mut rx, 3).await;
    assert!(third.error.is_none());
    assert_eq!(source.calls(), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(60), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(61), "{elapsed:?}");

    stop(&handle, join).await;
}

#[tokio::test(start_paused = true)]
async fn refresh_during_fetch_is_coalesced() {
    let (source, gate) = ScriptedSource::gated(vec![Ok(vec![item(0, 20.0)])]);
    let (handle, join) = spawn(source.clone(), settings(10));
    let mut rx = handle.subscribe();

    rx.wait_for(|snapshot| snapshot.phase == PollPhase::Fetching)
        .await
        .expect("fetching");
    assert_eq!(handle.request_refresh(), RefreshOutcome::Coalesced);
    assert_eq!(handle.request_refresh(), RefreshOutcome::Coalesced);

    gate.add_permits(1);
    let snapshot = after_cycle(&mut rx, 1).await;
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(source.calls(), 1);

    stop(&handle, join).await;
    assert_eq!(source.calls(), 1);
    assert_eq!(handle.request_refresh(), RefreshOutcome::Stopped);
}

#[tokio::test(start_paused = true)]
async fn stop_discards_in_flight_result() {
    let (source, gate) = ScriptedSource::gated(vec![Ok(vec![item(0, 20.0)])]);
    let (handle, join) = spawn(source.clone(), settings(10));
    let mut rx = handle.subscribe();

    rx.wait_for(|snapshot| snapshot.phase == PollPhase::Fetching)
        .await
        .expect("fetching");
    handle.stop();
    gate.add_permits(1);
    join.await.expect("poller task");

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.cycles, 0);
    assert!(snapshot.latest.is_none());
    assert_eq!(snapshot.phase, PollPhase::Idle);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_fetch_times_out_as_network_failure() {
    let (source, _gate) = ScriptedSource::gated(vec![Ok(vec![item(0, 20.0)])]);
    let mut short = settings(10);
    short.fetch_timeout = Duration::from_secs(2);
    let (handle, join) = spawn(source, short);
    let mut rx = handle.subscribe();

    let snapshot = after_cycle(&mut rx, 1).await;
    match snapshot.error {
        Some(CycleError::NetworkFailure(message)) => assert!(message.contains("2000 ms")),
        other => panic!("unexpected error state: {other:?}"),
    }

    stop(&handle, join).await;
}
