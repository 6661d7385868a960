use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::{load_json, save_json, CacheSnapshot, Debouncer, PersistenceError, TtlCache};
use crate::matcher::{StreamCandidate, StreamMatcher};
use crate::precache::{PrecacheError, PrecacheRunner, PrecacheTask};

/// Resolved stream lists with debounced persistence.
pub struct StreamStore {
    cache: TtlCache<Vec<StreamCandidate>>,
    path: PathBuf,
    debouncer: Debouncer,
    stream_ttl: Duration,
    /// Held for the whole snapshot-and-write so writers never share the temp file.
    write_lock: Mutex<()>,
}

impl StreamStore {
    pub fn new(path: PathBuf, default_ttl: Duration, stream_ttl: Duration, debounce: Duration) -> Self {
        Self {
            cache: TtlCache::new(default_ttl),
            path,
            debouncer: Debouncer::new(debounce),
            stream_ttl,
            write_lock: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &TtlCache<Vec<StreamCandidate>> {
        &self.cache
    }

    pub async fn get(&self, key: &str) -> Option<Vec<StreamCandidate>> {
        self.cache.get(key).await
    }

    /// Cache a result. Empty results use the default TTL.
    pub async fn store(self: &Arc<Self>, key: String, candidates: Vec<StreamCandidate>) {
        let ttl = if candidates.is_empty() {
            self.cache.default_ttl()
        } else {
            self.stream_ttl
        };
        self.cache.set(key, candidates, Some(ttl)).await;
        self.mark_dirty();
    }

    /// Schedule a snapshot write after the debounce window.
    pub fn mark_dirty(self: &Arc<Self>) {
        let store = Arc::clone(self);
        self.debouncer.schedule(move || async move {
            if let Err(e) = store.persist().await {
                warn!(error = %e, "Failed to persist stream cache");
            }
        });
    }

    pub fn flush_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Write all live entries. Returns the number written.
    pub async fn persist(&self) -> Result<usize, PersistenceError> {
        let _writing = self.write_lock.lock().await;
        let snapshot = self.cache.snapshot().await;
        save_json(&self.path, &snapshot).await?;
        debug!(entries = snapshot.len(), "Persisted stream cache");
        Ok(snapshot.len())
    }

    /// Load the snapshot file, dropping expired entries.
    pub async fn load(&self) -> Result<usize, PersistenceError> {
        let snapshot: Option<CacheSnapshot<Vec<StreamCandidate>>> = load_json(&self.path).await?;
        match snapshot {
            Some(snapshot) => Ok(self.cache.restore(snapshot).await),
            None => Ok(0),
        }
    }
}

/// Precache work: match the shared listing and store non-empty results.
pub(crate) struct StreamPrecacher {
    pub(crate) matcher: Arc<StreamMatcher>,
    pub(crate) store: Arc<StreamStore>,
}

#[async_trait]
impl PrecacheRunner for StreamPrecacher {
    async fn is_cached(&self, key: &str) -> bool {
        self.store.cache.contains_live(key).await
    }

    async fn run(&self, task: &PrecacheTask) -> Result<usize, PrecacheError> {
        if task.listing.is_empty() {
            return Err(PrecacheError::Failed("empty listing".to_string()));
        }
        let candidates = self
            .matcher
            .match_listing(&task.listing, &task.series_id, task.episode)
            .await;
        let found = candidates.len();
        // An episode not downloaded yet must stay resolvable once it is.
        if found > 0 {
            self.store.store(task.key.clone(), candidates).await;
        }
        Ok(found)
    }
}
