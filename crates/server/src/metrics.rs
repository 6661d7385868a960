//! Prometheus metrics for the HTTP layer.
//!
//! - HTTP request metrics (latency, counts, in flight)
//! - Stream request outcomes
//! - Cache and precache sizes (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "carbone_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("carbone_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "carbone_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Addon Metrics
// =============================================================================

/// Stream requests by outcome (found, empty, missing_key).
pub static STREAM_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("carbone_stream_requests_total", "Stream requests by outcome"),
        &["outcome"],
    )
    .unwrap()
});

/// Catalog preloads triggered.
pub static PRELOADS_TRIGGERED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("carbone_preloads_triggered_total", "Catalog preloads triggered"),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Cache Metrics (collected dynamically)
// =============================================================================

/// Live entries in the stream cache.
pub static STREAM_CACHE_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "carbone_stream_cache_entries",
        "Number of entries in the stream cache",
    )
    .unwrap()
});

/// Entries in the identity cache.
pub static IDENTITY_CACHE_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "carbone_identity_cache_entries",
        "Number of resolved title identities",
    )
    .unwrap()
});

/// Precache tasks waiting for a worker.
pub static PRECACHE_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("carbone_precache_queued", "Number of queued precache tasks").unwrap()
});

/// Precache tasks running.
pub static PRECACHE_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("carbone_precache_active", "Number of running precache tasks").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Addon
    registry
        .register(Box::new(STREAM_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(PRELOADS_TRIGGERED.clone()))
        .unwrap();

    // Caches
    registry
        .register(Box::new(STREAM_CACHE_ENTRIES.clone()))
        .unwrap();
    registry
        .register(Box::new(IDENTITY_CACHE_ENTRIES.clone()))
        .unwrap();
    registry.register(Box::new(PRECACHE_QUEUED.clone())).unwrap();
    registry.register(Box::new(PRECACHE_ACTIVE.clone())).unwrap();

    // Core metrics (pipeline stages, external services)
    for metric in carbone_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Update gauges from current application state before encoding.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let engine = state.engine();
    STREAM_CACHE_ENTRIES.set(engine.streams().cache().len().await as i64);
    IDENTITY_CACHE_ENTRIES.set(engine.identity().len().await as i64);

    if let Some(status) = engine.precache_status() {
        PRECACHE_QUEUED.set(status.queued as i64);
        PRECACHE_ACTIVE.set(status.active as i64);
    }
}

/// Label for requests no route matched.
pub const UNMATCHED_PATH: &str = "unmatched";

/// Metric label for a request path.
///
/// Only route templates are used, so the user config segment (which carries
/// the account credential) shows up as `{config}`. Anything no route matched
/// collapses into `UNMATCHED_PATH`.
pub fn path_label(matched: Option<&str>) -> &str {
    matched.unwrap_or(UNMATCHED_PATH)
}
