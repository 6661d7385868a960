//! Account download listings.

mod realdebrid;

pub use realdebrid::RealDebridClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One file visible in the user's cloud account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub filename: String,
    /// Direct download URL.
    pub url: String,
    pub added_at: Option<DateTime<Utc>>,
}

impl DownloadRecord {
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
            added_at: None,
        }
    }

    pub fn added_at(mut self, added_at: DateTime<Utc>) -> Self {
        self.added_at = Some(added_at);
        self
    }
}

/// Errors from a listing source.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Credential rejected by listing service")]
    Unauthorized,

    #[error("Rate limit exceeded, please wait before retrying")]
    RateLimitExceeded,

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Lists the downloads available to an account credential.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Downloads in the order the service returns them (most recent first).
    async fn list_downloads(&self, credential: &str) -> Result<Vec<DownloadRecord>, ListingError>;
}

/// Up to `limit` records, most recently added first.
///
/// Records without a timestamp sort after dated ones and keep their listing order.
pub fn most_recent(records: &[DownloadRecord], limit: usize) -> Vec<DownloadRecord> {
    let mut sorted: Vec<DownloadRecord> = records.to_vec();
    sorted.sort_by(|a, b| b.added_at.cmp(&a.added_at));
    sorted.truncate(limit);
    sorted
}
