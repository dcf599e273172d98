mod buffer;
mod cycle;
mod state;

#[cfg(test)]
mod tests;

pub use buffer::{History, ReadingBuffer};
pub use state::{DashboardSnapshot, PollPhase, RefreshOutcome};

use crate::config::Config;
use crate::upstream::TelemetrySource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug)]
pub struct PollerSettings {
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub capacity: usize,
}

impl PollerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            fetch_timeout: config.fetch_timeout(),
            capacity: config.buffer_capacity,
        }
    }
}

/// Cloneable control surface of the poll task. The task itself owns the buffer.
#[derive(Clone)]
pub struct PollerHandle {
    refresh_tx: mpsc::Sender<()>,
    snapshots: watch::Receiver<DashboardSnapshot>,
    fetching: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl PollerHandle {
    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.snapshots.borrow().clone()
    }

    /// At most one fetch is ever in flight; requests made during a fetch are dropped.
    pub fn request_refresh(&self) -> RefreshOutcome {
        if self.cancel.is_cancelled() {
            return RefreshOutcome::Stopped;
        }
        if self.fetching.load(Ordering::Acquire) {
            return RefreshOutcome::Coalesced;
        }
        match self.refresh_tx.try_send(()) {
            Ok(()) => RefreshOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(())) => RefreshOutcome::Coalesced,
            Err(mpsc::error::TrySendError::Closed(())) => RefreshOutcome::Stopped,
        }
    }

    /// No fetch starts after this; an in-flight one finishes and its result is dropped.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

pub fn spawn<S: TelemetrySource>(source: S, settings: PollerSettings) -> (PollerHandle, JoinHandle<()>) {
    let (refresh_tx, refresh_rx) = mpsc::channel(1);
    let (snapshot_tx, snapshots) = watch::channel(DashboardSnapshot::default());
    let fetching = Arc::new(AtomicBool::new(false));
    let cancel = CancellationToken::new();

    let worker = cycle::PollWorker {
        source,
        settings,
        buffer: ReadingBuffer::new(settings.capacity),
        snapshot_tx,
        refresh_rx,
        fetching: fetching.clone(),
        cancel: cancel.clone(),
    };
    let join = tokio::spawn(worker.run());

    let handle = PollerHandle {
        refresh_tx,
        snapshots,
        fetching,
        cancel,
    };
    (handle, join)
}
