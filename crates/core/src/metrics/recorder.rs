use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use super::{STAGE_CALLS, STAGE_COUNTERS, STAGE_DURATION};

/// Measures one stage invocation.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    started: Instant,
}

impl Timer {
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Default, Clone)]
struct StageStats {
    calls: u64,
    total_time_ms: f64,
    counters: BTreeMap<String, u64>,
}

/// Read-only view of one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSnapshot {
    pub calls: u64,
    pub total_time_ms: f64,
    pub avg_time_ms: f64,
    pub counters: BTreeMap<String, u64>,
}

impl StageSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

/// Read-only view of all stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub stages: BTreeMap<String, StageSnapshot>,
}

impl MetricsSnapshot {
    pub fn stage(&self, name: &str) -> Option<&StageSnapshot> {
        self.stages.get(name)
    }

    /// Counter value, zero when the stage or counter was never recorded.
    pub fn counter(&self, stage: &str, counter: &str) -> u64 {
        self.stage(stage).map(|s| s.counter(counter)).unwrap_or(0)
    }

    pub fn calls(&self, stage: &str) -> u64 {
        self.stage(stage).map(|s| s.calls).unwrap_or(0)
    }
}

/// Per-stage call counts, timings and named counters.
///
/// Every record is mirrored into the Prometheus stage collectors.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    stages: Mutex<BTreeMap<String, StageStats>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_timer(&self) -> Timer {
        Timer {
            started: Instant::now(),
        }
    }

    /// Record one invocation of `stage`.
    pub fn record(&self, stage: &str, duration_ms: f64, counters: &[(&str, u64)]) {
        {
            let mut stages = self.lock();
            let stats = stages.entry(stage.to_string()).or_default();
            stats.calls += 1;
            stats.total_time_ms += duration_ms;
            for (name, value) in counters {
                *stats.counters.entry((*name).to_string()).or_insert(0) += value;
            }
        }

        STAGE_CALLS.with_label_values(&[stage]).inc();
        STAGE_DURATION
            .with_label_values(&[stage])
            .observe(duration_ms / 1000.0);
        for (name, value) in counters {
            STAGE_COUNTERS.with_label_values(&[stage, *name]).inc_by(*value);
        }
    }

    /// Bump a named counter without counting a call.
    pub fn increment(&self, stage: &str, counter: &str, value: u64) {
        {
            let mut stages = self.lock();
            let stats = stages.entry(stage.to_string()).or_default();
            *stats.counters.entry(counter.to_string()).or_insert(0) += value;
        }
        STAGE_COUNTERS
            .with_label_values(&[stage, counter])
            .inc_by(value);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stages = self.lock();
        MetricsSnapshot {
            stages: stages
                .iter()
                .map(|(name, stats)| {
                    let avg_time_ms = if stats.calls > 0 {
                        stats.total_time_ms / stats.calls as f64
                    } else {
                        0.0
                    };
                    (
                        name.clone(),
                        StageSnapshot {
                            calls: stats.calls,
                            total_time_ms: stats.total_time_ms,
                            avg_time_ms,
                            counters: stats.counters.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Log one line per stage.
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        if snapshot.stages.is_empty() {
            return;
        }
        for (stage, stats) in &snapshot.stages {
            info!(
                stage = %stage,
                calls = stats.calls,
                avg_ms = stats.avg_time_ms,
                counters = ?stats.counters,
                "Performance summary"
            );
        }
    }

    /// Spawn a loop logging the summary every `interval` until shutdown.
    pub fn spawn_summary_loop(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Metrics summary loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        self.log_summary();
                    }
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, StageStats>> {
        // Counters stay usable after a poisoned lock.
        self.stages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
