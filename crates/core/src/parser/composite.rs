use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    normalize_filename, ExtractError, FilenameExtractor, GuessitClient, HeuristicExtractor,
    ParsedFilename,
};
use crate::cache::TtlCache;
use crate::config::{CacheConfig, GuessitConfig};
use crate::metrics::MetricsRecorder;

/// Memoized heuristic parsing with an optional remote fallback.
///
/// The fallback is bounded by `timeout`; a timeout or remote error makes the
/// filename unparsable for this call and is not memoized.
pub struct CompositeExtractor {
    heuristic: HeuristicExtractor,
    remote: Option<Arc<dyn FilenameExtractor>>,
    timeout: Duration,
    memo: TtlCache<Option<ParsedFilename>>,
    metrics: Arc<MetricsRecorder>,
}

impl CompositeExtractor {
    pub fn new(metrics: Arc<MetricsRecorder>, memo_ttl: Duration) -> Self {
        Self {
            heuristic: HeuristicExtractor::new(),
            remote: None,
            timeout: Duration::from_secs(5),
            memo: TtlCache::new(memo_ttl),
            metrics,
        }
    }

    /// Consult `remote` when the heuristic finds nothing.
    pub fn with_remote(mut self, remote: Arc<dyn FilenameExtractor>, timeout: Duration) -> Self {
        self.remote = Some(remote);
        self.timeout = timeout;
        self
    }

    /// Build from configuration. The guessit fallback is attached only when
    /// enabled and an API key is set.
    pub fn from_config(
        guessit: &GuessitConfig,
        cache: &CacheConfig,
        metrics: Arc<MetricsRecorder>,
    ) -> Result<Self, ExtractError> {
        let extractor = Self::new(metrics, cache.parse_memo_ttl());
        if !guessit.enabled || guessit.api_key.is_empty() {
            debug!("Guessit fallback disabled");
            return Ok(extractor);
        }
        let client = GuessitClient::new(guessit)?;
        Ok(extractor.with_remote(Arc::new(client), guessit.timeout()))
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    async fn parse_remote(&self, filename: &str) -> Option<Option<ParsedFilename>> {
        let remote = self.remote.as_ref()?;
        match tokio::time::timeout(self.timeout, remote.parse(filename)).await {
            Ok(Ok(parsed)) => {
                self.metrics.increment("parse", "remote", 1);
                Some(parsed)
            }
            Ok(Err(e)) => {
                warn!(filename, error = %e, "Remote filename parse failed");
                self.metrics.increment("parse", "remoteErrors", 1);
                None
            }
            Err(_) => {
                warn!(
                    filename,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Remote filename parse timed out"
                );
                self.metrics.increment("parse", "timeouts", 1);
                None
            }
        }
    }
}

#[async_trait]
impl FilenameExtractor for CompositeExtractor {
    async fn parse(&self, filename: &str) -> Result<Option<ParsedFilename>, ExtractError> {
        let normalized = normalize_filename(filename);

        if let Some(memoized) = self.memo.get(&normalized).await {
            self.metrics.increment("parse", "memoHits", 1);
            return Ok(memoized);
        }

        if let Some(parsed) = self.heuristic.extract(&normalized) {
            self.metrics.increment("parse", "heuristic", 1);
            self.memo.set(normalized, Some(parsed.clone()), None).await;
            return Ok(Some(parsed));
        }

        if self.remote.is_none() {
            self.memo.set(normalized, None, None).await;
            return Ok(None);
        }

        match self.parse_remote(&normalized).await {
            Some(parsed) => {
                self.memo.set(normalized, parsed.clone(), None).await;
                Ok(parsed)
            }
            None => Ok(None),
        }
    }
}
