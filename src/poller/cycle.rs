use super::buffer::ReadingBuffer;
use super::state::{DashboardSnapshot, PollPhase};
use super::PollerSettings;
use crate::telemetry::normalize_batch;
use crate::upstream::{CycleError, TelemetrySource};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Clone, Copy, Debug)]
enum Trigger {
    Cadence,
    Manual,
}

#[derive(Debug)]
struct CycleReport {
    appended: usize,
    skipped_seen: usize,
    evicted: usize,
    rejected: usize,
}

pub(super) struct PollWorker<S> {
    pub(super) source: S,
    pub(super) settings: PollerSettings,
    pub(super) buffer: ReadingBuffer,
    pub(super) snapshot_tx: watch::Sender<DashboardSnapshot>,
    pub(super) refresh_rx: mpsc::Receiver<()>,
    pub(super) fetching: Arc<AtomicBool>,
    pub(super) cancel: CancellationToken,
}

impl<S: TelemetrySource> PollWorker<S> {
    pub(super) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle = 0u64;

        loop {
            let trigger = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(()) = self.refresh_rx.recv() => Trigger::Manual,
                _ = ticker.tick() => Trigger::Cadence,
            };

            cycle += 1;
            self.fetching.store(true, Ordering::Release);
            // Requests queued just before the flag flipped are served by this fetch.
            while self.refresh_rx.try_recv().is_ok() {}
            self.snapshot_tx
                .send_modify(|snapshot| snapshot.phase = PollPhase::Fetching);

            let span = tracing::debug_span!("poll_cycle", cycle, trigger = ?trigger);
            let outcome = self.fetch().instrument(span).await;
            self.fetching.store(false, Ordering::Release);

            if self.cancel.is_cancelled() {
                tracing::debug!(cycle, "poller stopped during fetch; discarding result");
                break;
            }

            self.apply(cycle, outcome);
            ticker.reset();
        }

        self.snapshot_tx
            .send_modify(|snapshot| snapshot.phase = PollPhase::Idle);
        tracing::info!("telemetry poller stopped");
    }

    async fn fetch(&self) -> Result<Vec<serde_json::Value>, CycleError> {
        match tokio::time::timeout(self.settings.fetch_timeout, self.source.fetch_batch()).await {
            Ok(result) => result,
            Err(_) => Err(CycleError::NetworkFailure(format!(
                "no response within {} ms",
                self.settings.fetch_timeout.as_millis()
            ))),
        }
    }

    fn apply(&mut self, cycle: u64, outcome: Result<Vec<serde_json::Value>, CycleError>) {
        match self.ingest(outcome) {
            Ok(report) => {
                let latest = self.buffer.latest().cloned();
                let history = self.buffer.history();
                tracing::debug!(
                    cycle,
                    appended = report.appended,
                    skipped_seen = report.skipped_seen,
                    evicted = report.evicted,
                    rejected = report.rejected,
                    buffered = history.len(),
                    "telemetry cycle succeeded"
                );
                self.snapshot_tx.send_modify(|snapshot| {
                    snapshot.latest = latest;
                    snapshot.history = history;
                    snapshot.last_updated = Some(Utc::now());
                    snapshot.error = None;
                    snapshot.rejected_last_cycle = report.rejected;
                    snapshot.rejected_total += report.rejected as u64;
                    snapshot.skipped_last_cycle = report.skipped_seen;
                    snapshot.skipped_total += report.skipped_seen as u64;
                    snapshot.cycles += 1;
                    snapshot.phase = PollPhase::Idle;
                });
            }
            Err(err) => {
                tracing::warn!(cycle, kind = err.kind(), error = %err, "telemetry cycle failed; keeping previous data");
                let rejected = match &err {
                    CycleError::EmptyResult { rejected } => *rejected,
                    _ => 0,
                };
                self.snapshot_tx.send_modify(|snapshot| {
                    snapshot.error = Some(err);
                    snapshot.rejected_last_cycle = rejected;
                    snapshot.rejected_total += rejected as u64;
                    snapshot.skipped_last_cycle = 0;
                    snapshot.cycles += 1;
                    snapshot.phase = PollPhase::Idle;
                });
            }
        }
    }

    fn ingest(
        &mut self,
        outcome: Result<Vec<serde_json::Value>, CycleError>,
    ) -> Result<CycleReport, CycleError> {
        let items = outcome?;
        let mut batch = normalize_batch(&items);
        let rejected = batch.rejected.len();
        if batch.readings.is_empty() {
            return Err(CycleError::EmptyResult { rejected });
        }

        batch.readings.sort_by_key(|reading| reading.timestamp());

        // The provider returns an overlapping window each poll. Readings older than the
        // buffer tail, or identical to one already held, were seen before.
        let mut report = CycleReport {
            appended: 0,
            skipped_seen: 0,
            evicted: 0,
            rejected,
        };
        for reading in batch.readings {
            let older = self
                .buffer
                .latest()
                .is_some_and(|tail| reading.timestamp() < tail.timestamp());
            if older || self.buffer.holds(&reading) {
                report.skipped_seen += 1;
                continue;
            }
            report.evicted += self.buffer.append(reading);
            report.appended += 1;
        }
        Ok(report)
    }
}
