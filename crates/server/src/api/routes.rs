use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{addon, handlers, middleware::metrics_middleware};
use crate::metrics::path_label;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Operational routes
    let ops_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        .route("/metrics/prometheus", get(handlers::prometheus_metrics));

    // Addon protocol routes
    let addon_routes = Router::new()
        .route("/manifest.json", get(addon::manifest))
        .route("/{config}/manifest.json", get(addon::configured_manifest))
        .route("/{config}/stream/{kind}/{id}", get(addon::streams))
        .route("/{config}/catalog/{kind}/{id}", get(addon::catalog))
        .route(
            "/{config}/catalog/{kind}/{id}/{extra}",
            get(addon::catalog_with_extra),
        );

    // Spans carry the route template; the raw URI holds the user's key.
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        let path = path_label(
            request
                .extensions()
                .get::<MatchedPath>()
                .map(MatchedPath::as_str),
        );
        tracing::debug_span!("request", method = %request.method(), path = %path)
    });

    // Addon clients run in browsers on other origins.
    Router::new()
        .merge(ops_routes)
        .merge(addon_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(trace)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
