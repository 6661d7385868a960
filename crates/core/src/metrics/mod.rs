//! Pipeline metrics.
//!
//! This module provides:
//! - `MetricsRecorder`, the per-stage counters and timings served on `/metrics`
//! - Prometheus collectors mirroring every recorded stage
//! - External service request metrics (Real-Debrid, Kitsu, OpenSubtitles)

mod recorder;

pub use recorder::{MetricsRecorder, MetricsSnapshot, StageSnapshot, Timer};

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Pipeline stages
// =============================================================================

/// Stage duration in seconds.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "carbone_stage_duration_seconds",
            "Duration of resolution pipeline stages",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["stage"], // "request", "listing", "parse", "identity", "batch", "matching", "precache"
    )
    .unwrap()
});

/// Stage invocations total.
pub static STAGE_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("carbone_stage_calls_total", "Total pipeline stage invocations"),
        &["stage"],
    )
    .unwrap()
});

/// Named stage counters (hits, misses, duplicates, errors...).
pub static STAGE_COUNTERS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "carbone_stage_counter_total",
            "Named counters reported by pipeline stages",
        ),
        &["stage", "counter"],
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "carbone_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "carbone_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Observe one external call.
pub fn observe_external(service: &str, operation: &str, seconds: f64, success: bool) {
    EXTERNAL_SERVICE_DURATION
        .with_label_values(&[service, operation])
        .observe(seconds);
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, if success { "success" } else { "error" }])
        .inc();
}

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Stages
        Box::new(STAGE_DURATION.clone()),
        Box::new(STAGE_CALLS.clone()),
        Box::new(STAGE_COUNTERS.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}
