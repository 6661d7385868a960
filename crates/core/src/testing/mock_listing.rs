//! Mock listing source for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::listing::{DownloadRecord, ListingError, ListingSource};

/// Mock implementation of the ListingSource trait.
///
/// Provides controllable behavior for testing:
/// - Return a configurable download listing
/// - Track which credentials were used
/// - Simulate service failures
///
/// # Example
///
/// ```rust,ignore
/// use carbone_core::testing::{MockListingSource, fixtures};
///
/// let listing = MockListingSource::new();
/// listing.set_records(fixtures::listing(&[("Show.S01E02.mkv", "https://dl/1")])).await;
///
/// let records = listing.list_downloads("api-key").await?;
/// assert_eq!(records.len(), 1);
/// assert_eq!(listing.credentials().await, vec!["api-key"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockListingSource {
    /// Records returned by every call.
    records: Arc<RwLock<Vec<DownloadRecord>>>,
    /// Credentials passed to each call, in order.
    calls: Arc<RwLock<Vec<String>>>,
    /// When set, calls fail with an unauthorized error.
    fail: Arc<RwLock<bool>>,
}

impl MockListingSource {
    /// Create a mock with an empty listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock returning `records`.
    pub fn with_records(records: Vec<DownloadRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
            ..Default::default()
        }
    }

    /// Replace the listing returned by subsequent calls.
    pub async fn set_records(&self, records: Vec<DownloadRecord>) {
        *self.records.write().await = records;
    }

    /// Make subsequent calls fail (or succeed again).
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    /// Number of listing calls made.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Credentials used, one per call.
    pub async fn credentials(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl ListingSource for MockListingSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_downloads(&self, credential: &str) -> Result<Vec<DownloadRecord>, ListingError> {
        self.calls.write().await.push(credential.to_string());

        if *self.fail.read().await {
            return Err(ListingError::Unauthorized);
        }
        Ok(self.records.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_returns_configured_records() {
        let listing = MockListingSource::with_records(fixtures::listing(&[("a.mkv", "u")]));
        let records = listing.list_downloads("key").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(listing.credentials().await, vec!["key"]);
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let listing = MockListingSource::new();
        listing.set_fail(true).await;
        assert!(matches!(
            listing.list_downloads("key").await,
            Err(ListingError::Unauthorized)
        ));
        assert_eq!(listing.call_count().await, 1);
    }
}
