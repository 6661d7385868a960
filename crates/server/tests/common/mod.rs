//! Common test utilities for in-process API testing with mocks.
//!
//! The fixture builds the real router over a `ResolutionEngine` whose
//! collaborators (listing, filename extraction, title search) are mocks, so
//! the addon protocol can be exercised without Real-Debrid or Kitsu.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use carbone_core::{
    identity::TitleSearch,
    listing::ListingSource,
    parser::FilenameExtractor,
    testing::{MockExtractor, MockListingSource, MockTitleSearch},
    Config, MetricsRecorder, ResolutionEngine,
};
use carbone_server::state::AppState;

/// Re-export fixtures for test convenience
pub use carbone_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_streams() {
///     let fixture = TestFixture::new().await;
///     fixture.listing.set_records(fixtures::listing(&[("Show.S01E02.mkv", "u")])).await;
///
///     let response = fixture.get("/key/stream/series/kitsu:1:2.json").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock listing source - configure the account downloads
    pub listing: Arc<MockListingSource>,
    /// Mock extractor - heuristic parsing with call recording
    pub extractor: Arc<MockExtractor>,
    /// Mock title search - configure Kitsu answers
    pub search: Arc<MockTitleSearch>,
    /// Engine behind the router
    pub engine: Arc<ResolutionEngine>,
    /// Temporary data directory for cache snapshots
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test fixture, letting the caller adjust the config first.
    pub async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let listing = Arc::new(MockListingSource::new());
        let extractor = Arc::new(MockExtractor::heuristic());
        let search = Arc::new(MockTitleSearch::new());

        let mut config = Config::default();
        config.server.host = std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        config.cache.data_dir = temp_dir.path().to_path_buf();
        config.cache.persist_debounce_ms = 20;
        config.guessit.api_key = "guessit-secret".to_string();
        customize(&mut config);

        let engine = ResolutionEngine::new(
            &config,
            Arc::clone(&listing) as Arc<dyn ListingSource>,
            Arc::clone(&extractor) as Arc<dyn FilenameExtractor>,
            Arc::clone(&search) as Arc<dyn TitleSearch>,
            Arc::new(MetricsRecorder::new()),
        );

        let state = Arc::new(AppState::new(config, Arc::clone(&engine)));
        let router = carbone_server::api::create_router(state);

        Self {
            router,
            listing,
            extractor,
            search,
            engine,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Request::builder().method("GET").uri(path)).await
    }

    /// Send a GET request carrying an `Origin` header.
    pub async fn get_with_origin(&self, path: &str, origin: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("GET")
                .uri(path)
                .header("Origin", origin),
        )
        .await
    }

    async fn request(&self, builder: axum::http::request::Builder) -> TestResponse {
        let request = builder.body(Body::empty()).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }
}
