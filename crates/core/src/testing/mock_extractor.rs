//! Mock filename extractor for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::parser::{ExtractError, FilenameExtractor, HeuristicExtractor, ParsedFilename};

/// Mock implementation of the FilenameExtractor trait.
///
/// Filenames with a configured result return it. Other filenames return
/// `None`, or the local heuristic's guess when built with [`heuristic`].
///
/// [`heuristic`]: MockExtractor::heuristic
#[derive(Debug, Clone, Default)]
pub struct MockExtractor {
    /// Explicit results by filename.
    results: Arc<RwLock<HashMap<String, ParsedFilename>>>,
    /// Filenames that fail with an API error.
    failing: Arc<RwLock<HashSet<String>>>,
    /// Every filename passed to `parse`, in order.
    calls: Arc<RwLock<Vec<String>>>,
    fail_all: Arc<RwLock<bool>>,
    delay: Arc<RwLock<Option<Duration>>>,
    use_heuristic: bool,
}

impl MockExtractor {
    /// Create a mock that only knows configured results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that falls back to `HeuristicExtractor`.
    pub fn heuristic() -> Self {
        Self {
            use_heuristic: true,
            ..Default::default()
        }
    }

    /// Return `parsed` for `filename`.
    pub async fn set_result(&self, filename: &str, parsed: ParsedFilename) {
        self.results
            .write()
            .await
            .insert(filename.to_string(), parsed);
    }

    /// Delay every call by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Fail every call.
    pub async fn set_fail(&self, fail: bool) {
        *self.fail_all.write().await = fail;
    }

    /// Fail calls for `filename` only.
    pub async fn fail_on(&self, filename: &str) {
        self.failing.write().await.insert(filename.to_string());
    }

    /// Number of parse calls made.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Filenames parsed, in call order.
    pub async fn recorded_calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl FilenameExtractor for MockExtractor {
    async fn parse(&self, filename: &str) -> Result<Option<ParsedFilename>, ExtractError> {
        self.calls.write().await.push(filename.to_string());

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_all.read().await || self.failing.read().await.contains(filename) {
            return Err(ExtractError::ApiError {
                status: 500,
                message: "Mock failure".to_string(),
            });
        }

        if let Some(parsed) = self.results.read().await.get(filename) {
            return Ok(Some(parsed.clone()));
        }
        if self.use_heuristic {
            return Ok(HeuristicExtractor.extract(filename));
        }
        Ok(None)
    }
}
