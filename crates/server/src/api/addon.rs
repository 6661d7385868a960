//! Addon protocol handlers: manifest, streams and the cache-warming catalog.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use carbone_core::{config::AddonConfig, StreamCandidate};
use serde::Serialize;
use tracing::{debug, info};

use super::user_config::api_key_from_segment;
use crate::metrics::{PRELOADS_TRIGGERED, STREAM_REQUESTS_TOTAL};
use crate::state::AppState;

const MISSING_KEY_ERROR: &str = "Real-Debrid API key required";

/// Catalog that exists only to trigger a cache preload.
const PRELOAD_CATALOG_ID: &str = "rd-cache-loader";

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub resources: Vec<&'static str>,
    pub types: Vec<&'static str>,
    pub id_prefixes: Vec<&'static str>,
    pub behavior_hints: BehaviorHints,
    pub config: Vec<ConfigField>,
    pub catalogs: Vec<CatalogEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorHints {
    pub configurable: bool,
    pub configuration_required: bool,
    pub cache_max_age: u64,
    pub cache_prefetch: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigField {
    pub key: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: &'static str,
    pub required: bool,
    pub default: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub extra: Vec<CatalogExtra>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogExtra {
    pub name: &'static str,
    pub is_required: bool,
}

#[derive(Debug, Serialize)]
pub struct StreamsResponse {
    pub streams: Vec<StreamCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub metas: Vec<serde_json::Value>,
    pub cache_max_age: u64,
}

impl Manifest {
    pub fn new(addon: &AddonConfig) -> Self {
        Self {
            id: addon.id.clone(),
            version: addon.version.clone(),
            name: addon.name.clone(),
            description: "Streams your RD-downloaded episodes".to_string(),
            resources: vec!["stream"],
            types: vec!["movie", "series", "anime"],
            id_prefixes: vec!["kitsu"],
            behavior_hints: BehaviorHints {
                configurable: true,
                configuration_required: true,
                cache_max_age: 3600,
                cache_prefetch: true,
            },
            config: vec![ConfigField {
                key: "rd_api_key",
                kind: "text",
                title: "Real-Debrid API Key",
                required: true,
                default: "",
            }],
            catalogs: vec![CatalogEntry {
                kind: "series",
                id: PRELOAD_CATALOG_ID,
                name: "RD Cache Loader",
                extra: vec![CatalogExtra {
                    name: "genre",
                    is_required: false,
                }],
            }],
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /manifest.json
pub async fn manifest(State(state): State<Arc<AppState>>) -> Json<Manifest> {
    Json(Manifest::new(&state.config().addon))
}

/// GET /{config}/manifest.json
pub async fn configured_manifest(
    State(state): State<Arc<AppState>>,
    Path(_config): Path<String>,
) -> Json<Manifest> {
    Json(Manifest::new(&state.config().addon))
}

/// GET /{config}/stream/{type}/{id}.json
pub async fn streams(
    State(state): State<Arc<AppState>>,
    Path((config, _kind, id)): Path<(String, String, String)>,
) -> Json<StreamsResponse> {
    let Some(api_key) = api_key_from_segment(&config) else {
        STREAM_REQUESTS_TOTAL.with_label_values(&["missing_key"]).inc();
        return Json(StreamsResponse {
            streams: Vec::new(),
            error: Some(MISSING_KEY_ERROR.to_string()),
        });
    };

    let stream_id = strip_json_suffix(&id);
    debug!(stream_id, "Stream request");
    let streams = state.engine().resolve_streams(stream_id, &api_key).await;

    let outcome = if streams.is_empty() { "empty" } else { "found" };
    STREAM_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();

    Json(StreamsResponse {
        streams,
        error: None,
    })
}

/// GET /{config}/catalog/{type}/{id}.json
///
/// Always returns an empty catalog. With a key, the most recent downloads are
/// preloaded in the background.
pub async fn catalog(
    State(state): State<Arc<AppState>>,
    Path((config, _kind, _id)): Path<(String, String, String)>,
) -> Json<CatalogResponse> {
    preload_catalog(&state, &config)
}

/// GET /{config}/catalog/{type}/{id}/{extra}.json
///
/// Clients append selected extras (e.g. `genre=Action`) as a fourth segment.
pub async fn catalog_with_extra(
    State(state): State<Arc<AppState>>,
    Path((config, _kind, _id, _extra)): Path<(String, String, String, String)>,
) -> Json<CatalogResponse> {
    preload_catalog(&state, &config)
}

fn preload_catalog(state: &AppState, config: &str) -> Json<CatalogResponse> {
    let Some(api_key) = api_key_from_segment(config) else {
        PRELOADS_TRIGGERED.with_label_values(&["missing_key"]).inc();
        return Json(CatalogResponse {
            metas: Vec::new(),
            cache_max_age: 60,
        });
    };

    PRELOADS_TRIGGERED.with_label_values(&["started"]).inc();
    let engine = Arc::clone(state.engine());
    tokio::spawn(async move {
        let submitted = engine.preload_recent(&api_key).await;
        info!(submitted, "Background preload finished");
    });

    Json(CatalogResponse {
        metas: Vec::new(),
        cache_max_age: 3600,
    })
}

fn strip_json_suffix(id: &str) -> &str {
    id.strip_suffix(".json").unwrap_or(id)
}
