//! Addon protocol and operational endpoint tests.
//!
//! Each test builds the real router over mocked collaborators and drives it
//! in-process.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use carbone_core::identity::TitleHit;
use common::{fixtures, TestFixture};

/// `{"rd_api_key":"json-key"}`, percent-encoded.
const ENCODED_JSON_CONFIG: &str = "%7B%22rd_api_key%22%3A%22json-key%22%7D";

async fn seed_show(fixture: &TestFixture) {
    fixture
        .listing
        .set_records(fixtures::listing(&[
            ("Show.S01E02.mkv", "urlA"),
            ("Show.S01E03.mkv", "urlB"),
        ]))
        .await;
    fixture
        .search
        .add_result("Show Season 1", vec![TitleHit::new("8203", "Show")])
        .await;
}

async fn wait_for_listing_calls(fixture: &TestFixture, expected: usize) -> bool {
    for _ in 0..100 {
        if fixture.listing.call_count().await >= expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// =============================================================================
// Manifest
// =============================================================================

#[tokio::test]
async fn test_manifest_without_config() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/manifest.json").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["id"], "io.github.kingclutch23.carbone");
    assert_eq!(response.body["resources"][0], "stream");
    assert_eq!(response.body["idPrefixes"][0], "kitsu");
    assert_eq!(response.body["behaviorHints"]["cacheMaxAge"], 3600);
    assert_eq!(response.body["catalogs"][0]["id"], "rd-cache-loader");
}

#[tokio::test]
async fn test_configured_manifest_matches_plain_manifest() {
    let fixture = TestFixture::new().await;

    let plain = fixture.get("/manifest.json").await;
    let configured = fixture.get("/api-key/manifest.json").await;

    assert_eq!(configured.status, StatusCode::OK);
    assert_eq!(configured.body, plain.body);
}

// =============================================================================
// Streams
// =============================================================================

#[tokio::test]
async fn test_streams_with_raw_key() {
    let fixture = TestFixture::new().await;
    seed_show(&fixture).await;

    let response = fixture.get("/api-key/stream/series/kitsu:8203:2.json").await;

    assert_eq!(response.status, StatusCode::OK);
    let streams = response.body["streams"].as_array().unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0]["url"], "urlA");
    assert!(streams[0]["title"]
        .as_str()
        .unwrap()
        .starts_with("Show.S01E02.mkv"));
    assert!(response.body.get("error").is_none());
    assert_eq!(fixture.listing.credentials().await[0], "api-key");
}

#[tokio::test]
async fn test_streams_with_json_config_segment() {
    let fixture = TestFixture::new().await;
    seed_show(&fixture).await;

    let path = format!("/{}/stream/series/kitsu:8203:3.json", ENCODED_JSON_CONFIG);
    let response = fixture.get(&path).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["streams"][0]["url"], "urlB");
    assert_eq!(fixture.listing.credentials().await[0], "json-key");
}

#[tokio::test]
async fn test_streams_without_key_returns_error() {
    let fixture = TestFixture::new().await;
    seed_show(&fixture).await;

    // `{"rd_api_key":""}`
    let response = fixture
        .get("/%7B%22rd_api_key%22%3A%22%22%7D/stream/series/kitsu:8203:2.json")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["streams"].as_array().unwrap().len(), 0);
    assert_eq!(response.body["error"], "Real-Debrid API key required");
    assert_eq!(fixture.listing.call_count().await, 0);
}

#[tokio::test]
async fn test_streams_invalid_id_is_empty() {
    let fixture = TestFixture::new().await;
    seed_show(&fixture).await;

    let response = fixture.get("/api-key/stream/series/kitsu:8203.json").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["streams"].as_array().unwrap().len(), 0);
    assert!(response.body.get("error").is_none());
    assert_eq!(fixture.listing.call_count().await, 0);
}

#[tokio::test]
async fn test_streams_listing_failure_is_empty() {
    let fixture = TestFixture::new().await;
    seed_show(&fixture).await;
    fixture.listing.set_fail(true).await;

    let response = fixture.get("/bad-key/stream/series/kitsu:8203:2.json").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["streams"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_repeat_stream_request_is_served_from_cache() {
    let fixture = TestFixture::with_config(|config| config.precache.enabled = false).await;
    seed_show(&fixture).await;

    let first = fixture.get("/api-key/stream/series/kitsu:8203:2.json").await;
    let second = fixture.get("/api-key/stream/series/kitsu:8203:2.json").await;

    assert_eq!(first.body, second.body);
    assert_eq!(fixture.listing.call_count().await, 1);
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_catalog_without_key_has_short_cache_age() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .get("/%7B%7D/catalog/series/rd-cache-loader.json")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["metas"].as_array().unwrap().len(), 0);
    assert_eq!(response.body["cacheMaxAge"], 60);
}

#[tokio::test]
async fn test_catalog_with_key_triggers_preload() {
    let fixture = TestFixture::new().await;
    seed_show(&fixture).await;

    let response = fixture
        .get("/api-key/catalog/series/rd-cache-loader.json")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["metas"].as_array().unwrap().len(), 0);
    assert_eq!(response.body["cacheMaxAge"], 3600);

    assert!(
        wait_for_listing_calls(&fixture, 1).await,
        "Preload never listed the account"
    );
    assert_eq!(fixture.listing.credentials().await[0], "api-key");
}

#[tokio::test]
async fn test_catalog_with_extra_segment_triggers_preload() {
    let fixture = TestFixture::new().await;
    seed_show(&fixture).await;

    let response = fixture
        .get("/api-key/catalog/series/rd-cache-loader/genre=Action.json")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["cacheMaxAge"], 3600);
    assert!(
        wait_for_listing_calls(&fixture, 1).await,
        "Preload never listed the account"
    );
}

// =============================================================================
// Operational endpoints
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_hides_guessit_key() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["guessit"]["api_key_configured"], true);
    assert!(!response.text.contains("guessit-secret"));
}

#[tokio::test]
async fn test_metrics_json_reports_stages() {
    let fixture = TestFixture::new().await;
    seed_show(&fixture).await;
    fixture.get("/api-key/stream/series/kitsu:8203:2.json").await;

    let response = fixture.get("/metrics").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["metrics"]["stages"]["request"]["calls"], 1);
    assert!(response.body["uptimeSecs"].is_u64());
    assert!(response.body["startedAt"].is_string());
    assert!(response.body["precache"]["concurrency"].is_u64());
}

#[tokio::test]
async fn test_prometheus_metrics_are_text() {
    let fixture = TestFixture::new().await;
    fixture.get("/api-key/manifest.json").await;

    let response = fixture.get("/metrics/prometheus").await;

    assert_eq!(response.status, StatusCode::OK);
    let content_type = response.headers["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
    assert!(response.text.contains("carbone_http_requests_total"));
    assert!(!response.text.contains("api-key"));
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .get_with_origin("/manifest.json", "https://app.strem.io")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.headers.contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_unrouted_paths_keep_credentials_out_of_metrics() {
    let fixture = TestFixture::new().await;

    let configure = fixture.get("/RDSECRETKEY123/configure").await;
    assert_eq!(configure.status, StatusCode::NOT_FOUND);
    let subtitles = fixture
        .get("/%7B%22rd_api_key%22%3A%22RDJSONSECRET%22%7D/subtitles/series/kitsu:1:2.json")
        .await;
    assert_eq!(subtitles.status, StatusCode::NOT_FOUND);

    let response = fixture.get("/metrics/prometheus").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text.contains(r#"path="unmatched""#));
    assert!(!response.text.contains("RDSECRETKEY123"));
    assert!(!response.text.contains("RDJSONSECRET"));
}
