//! Mock title search for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::identity::{TitleHit, TitleSearch, TitleSearchError};

/// Mock implementation of the TitleSearch trait.
///
/// Results are keyed by the exact query string; unknown queries return no
/// hits. Every query is recorded, including failed ones.
///
/// # Example
///
/// ```rust,ignore
/// use carbone_core::identity::TitleHit;
/// use carbone_core::testing::MockTitleSearch;
///
/// let search = MockTitleSearch::new();
/// search.add_result("Naruto Season 1", vec![TitleHit::new("12345", "Naruto")]).await;
///
/// let hits = search.search_titles("Naruto Season 1", 3).await?;
/// assert_eq!(hits[0].id, "12345");
/// assert_eq!(search.recorded_queries().await, vec!["Naruto Season 1"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTitleSearch {
    results: Arc<RwLock<HashMap<String, Vec<TitleHit>>>>,
    queries: Arc<RwLock<Vec<String>>>,
    fail: Arc<RwLock<bool>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl MockTitleSearch {
    /// Create a mock with no known titles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `hits` for `query`.
    pub async fn add_result(&self, query: &str, hits: Vec<TitleHit>) {
        self.results.write().await.insert(query.to_string(), hits);
    }

    /// Make subsequent searches fail (or succeed again).
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    /// Delay every search by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Number of searches performed.
    pub async fn query_count(&self) -> usize {
        self.queries.read().await.len()
    }

    /// Queries in call order.
    pub async fn recorded_queries(&self) -> Vec<String> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl TitleSearch for MockTitleSearch {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search_titles(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<TitleHit>, TitleSearchError> {
        self.queries.write().await.push(query.to_string());

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail.read().await {
            return Err(TitleSearchError::ApiError {
                status: 503,
                message: "Mock failure".to_string(),
            });
        }

        Ok(self
            .results
            .read()
            .await
            .get(query)
            .map(|hits| hits.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }
}
