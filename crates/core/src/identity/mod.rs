//! Title and season to canonical series id resolution.

mod kitsu;
mod resolver;

pub use kitsu::KitsuClient;
pub use resolver::{identity_key, IdentityResolver};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One search result from the title catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleHit {
    pub id: String,
    pub canonical_title: String,
}

impl TitleHit {
    pub fn new(id: impl Into<String>, canonical_title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            canonical_title: canonical_title.into(),
        }
    }
}

/// Errors from the title search service.
#[derive(Debug, Error)]
pub enum TitleSearchError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Rate limit exceeded, please wait before retrying")]
    RateLimitExceeded,

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Free-text search over a catalog of series.
#[async_trait]
pub trait TitleSearch: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Up to `limit` hits for `query`, best first.
    async fn search_titles(&self, query: &str, limit: u32)
        -> Result<Vec<TitleHit>, TitleSearchError>;
}
