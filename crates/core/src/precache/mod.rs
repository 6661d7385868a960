//! Background resolution of the episodes after a requested one.
//!
//! Tasks are dispatched in submission order to at most `concurrency` workers.
//! Each task claims its cache key in the `StampedeGuard` first, so duplicate
//! submissions for one key never run the matcher twice at the same time.

mod guard;

pub use guard::{GuardPermit, StampedeGuard};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{debug, warn};

use crate::engine::stream_key;
use crate::listing::DownloadRecord;
use crate::metrics::MetricsRecorder;

/// One pending background resolution.
#[derive(Debug, Clone)]
pub struct PrecacheTask {
    pub series_id: String,
    pub episode: u32,
    /// Stream cache key for (series, episode, credential).
    pub key: String,
    /// Listing fetched by the request that triggered this task.
    pub listing: Arc<[DownloadRecord]>,
}

impl PrecacheTask {
    pub fn new(
        series_id: impl Into<String>,
        episode: u32,
        credential: &str,
        listing: Arc<[DownloadRecord]>,
    ) -> Self {
        let series_id = series_id.into();
        let key = stream_key(&series_id, episode, credential);
        Self {
            series_id,
            episode,
            key,
            listing,
        }
    }
}

#[derive(Debug, Error)]
pub enum PrecacheError {
    #[error("Precache task failed: {0}")]
    Failed(String),
}

/// Work performed for one task.
#[async_trait]
pub trait PrecacheRunner: Send + Sync + 'static {
    /// True when `key` already has a live cached result.
    async fn is_cached(&self, key: &str) -> bool;

    /// Resolve and store the result for `task`. Returns the number of streams stored.
    async fn run(&self, task: &PrecacheTask) -> Result<usize, PrecacheError>;
}

/// Queue counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecacheStatus {
    pub concurrency: usize,
    pub queued: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped_guarded: u64,
    pub skipped_cached: u64,
    /// Keys currently held by the stampede guard.
    pub guarded_keys: usize,
}

#[derive(Debug, Default)]
struct QueueStats {
    queued: AtomicU64,
    active: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped_guarded: AtomicU64,
    skipped_cached: AtomicU64,
}

/// Bounded FIFO worker pool for precache tasks.
pub struct PrecacheQueue {
    tx: mpsc::UnboundedSender<PrecacheTask>,
    stats: Arc<QueueStats>,
    guard: Arc<StampedeGuard>,
    settled: Arc<Notify>,
    concurrency: usize,
}

impl PrecacheQueue {
    /// Start the dispatcher on the current tokio runtime.
    pub fn spawn<R: PrecacheRunner>(
        runner: Arc<R>,
        concurrency: usize,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let concurrency = concurrency.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(QueueStats::default());
        let guard = StampedeGuard::new();
        let settled = Arc::new(Notify::new());

        tokio::spawn(dispatch(
            rx,
            runner,
            Arc::new(Semaphore::new(concurrency)),
            Arc::clone(&guard),
            Arc::clone(&stats),
            Arc::clone(&settled),
            metrics,
        ));

        Self {
            tx,
            stats,
            guard,
            settled,
            concurrency,
        }
    }

    /// Enqueue a task. Never blocks.
    pub fn submit(&self, task: PrecacheTask) {
        self.stats.queued.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(task)) = self.tx.send(task) {
            self.stats.queued.fetch_sub(1, Ordering::SeqCst);
            warn!(key = %task.key, "Precache dispatcher stopped, dropping task");
        }
    }

    pub fn guard(&self) -> &Arc<StampedeGuard> {
        &self.guard
    }

    pub fn is_idle(&self) -> bool {
        self.stats.queued.load(Ordering::SeqCst) == 0
            && self.stats.active.load(Ordering::SeqCst) == 0
    }

    /// Wait until nothing is queued or running.
    pub async fn idle(&self) {
        loop {
            let notified = self.settled.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn status(&self) -> PrecacheStatus {
        PrecacheStatus {
            concurrency: self.concurrency,
            queued: self.stats.queued.load(Ordering::Relaxed),
            active: self.stats.active.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            skipped_guarded: self.stats.skipped_guarded.load(Ordering::Relaxed),
            skipped_cached: self.stats.skipped_cached.load(Ordering::Relaxed),
            guarded_keys: self.guard.len(),
        }
    }
}

async fn dispatch<R: PrecacheRunner>(
    mut rx: mpsc::UnboundedReceiver<PrecacheTask>,
    runner: Arc<R>,
    slots: Arc<Semaphore>,
    guard: Arc<StampedeGuard>,
    stats: Arc<QueueStats>,
    settled: Arc<Notify>,
    metrics: Arc<MetricsRecorder>,
) {
    while let Some(task) = rx.recv().await {
        let Ok(slot) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };
        stats.active.fetch_add(1, Ordering::SeqCst);
        stats.queued.fetch_sub(1, Ordering::SeqCst);

        let runner = Arc::clone(&runner);
        let guard = Arc::clone(&guard);
        let stats = Arc::clone(&stats);
        let settled = Arc::clone(&settled);
        let metrics = Arc::clone(&metrics);

        tokio::spawn(async move {
            let key = task.key.clone();
            let outcome = tokio::spawn(execute(
                runner,
                guard,
                Arc::clone(&stats),
                Arc::clone(&metrics),
                task,
            ))
            .await;

            if let Err(e) = outcome {
                warn!(key = %key, error = %e, "Precache task aborted");
                stats.failed.fetch_add(1, Ordering::SeqCst);
                metrics.increment("precache", "failed", 1);
            }

            drop(slot);
            stats.active.fetch_sub(1, Ordering::SeqCst);
            settled.notify_waiters();
        });
    }
    debug!("Precache dispatcher stopped");
}

async fn execute<R: PrecacheRunner>(
    runner: Arc<R>,
    guard: Arc<StampedeGuard>,
    stats: Arc<QueueStats>,
    metrics: Arc<MetricsRecorder>,
    task: PrecacheTask,
) {
    let timer = metrics.start_timer();

    let Some(_permit) = guard.try_acquire(&task.key) else {
        stats.skipped_guarded.fetch_add(1, Ordering::SeqCst);
        metrics.record("precache", timer.elapsed_ms(), &[("skippedGuarded", 1)]);
        return;
    };

    if runner.is_cached(&task.key).await {
        stats.skipped_cached.fetch_add(1, Ordering::SeqCst);
        metrics.record("precache", timer.elapsed_ms(), &[("skippedCached", 1)]);
        return;
    }

    match runner.run(&task).await {
        Ok(streams) => {
            debug!(
                series_id = %task.series_id,
                episode = task.episode,
                streams,
                "Precached episode"
            );
            stats.completed.fetch_add(1, Ordering::SeqCst);
            metrics.record(
                "precache",
                timer.elapsed_ms(),
                &[("completed", 1), ("streams", streams as u64)],
            );
        }
        Err(e) => {
            warn!(
                series_id = %task.series_id,
                episode = task.episode,
                error = %e,
                "Precache task failed"
            );
            stats.failed.fetch_add(1, Ordering::SeqCst);
            metrics.record("precache", timer.elapsed_ms(), &[("failed", 1)]);
        }
    }
}
