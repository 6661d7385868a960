use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use super::{TitleHit, TitleSearch, TitleSearchError};
use crate::cache::TtlCache;
use crate::metrics::MetricsRecorder;

/// Cache key for a (title, season) pair: `"{title}-{season}"` with the title
/// trimmed, lowercased and internal whitespace collapsed.
pub fn identity_key(title: &str, season: u32) -> String {
    let normalized = title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    format!("{}-{}", normalized, season)
}

/// Outcome of one remote lookup, shared by every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    Found(String),
    Missing,
    Failed,
}

type PendingLookup = Shared<BoxFuture<'static, Lookup>>;

/// Resolves titles to canonical series ids, memoizing hits forever.
///
/// Misses are not cached, so a title the catalog gains later resolves on a
/// later request. Concurrent lookups for the same key await one shared remote
/// search, whatever its outcome.
pub struct IdentityResolver {
    search: Arc<dyn TitleSearch>,
    cache: TtlCache<String>,
    metrics: Arc<MetricsRecorder>,
    page_limit: u32,
    inflight: Arc<Mutex<HashMap<String, PendingLookup>>>,
}

impl IdentityResolver {
    pub fn new(
        search: Arc<dyn TitleSearch>,
        metrics: Arc<MetricsRecorder>,
        page_limit: u32,
    ) -> Self {
        Self {
            search,
            cache: TtlCache::default(),
            metrics,
            page_limit,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Canonical id for `title` in `season`, or `None` when the catalog has no match.
    pub async fn resolve(&self, title: &str, season: u32) -> Option<String> {
        let timer = self.metrics.start_timer();
        let title = title.trim();
        if title.is_empty() {
            return None;
        }

        let key = identity_key(title, season);
        if let Some(id) = self.cache.get(&key).await {
            self.metrics
                .record("identity", timer.elapsed_ms(), &[("cached", 1)]);
            return Some(id);
        }

        let (pending, started_here) = self.join_lookup(&key, title, season);
        let outcome = pending.await;

        let counters: &[(&str, u64)] = match (&outcome, started_here) {
            (_, false) => &[("coalesced", 1)],
            (Lookup::Found(_), true) => &[("remote", 1)],
            (Lookup::Missing, true) => &[("remote", 1), ("misses", 1)],
            (Lookup::Failed, true) => &[("remote", 1), ("errors", 1)],
        };
        self.metrics.record("identity", timer.elapsed_ms(), counters);

        match outcome {
            Lookup::Found(id) => Some(id),
            Lookup::Missing | Lookup::Failed => None,
        }
    }

    /// The in-flight lookup for `key`, starting one if none is running.
    ///
    /// The second value is true when this call started the lookup.
    fn join_lookup(&self, key: &str, title: &str, season: u32) -> (PendingLookup, bool) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(pending) = inflight.get(key) {
            return (pending.clone(), false);
        }

        let search = Arc::clone(&self.search);
        let cache = self.cache.clone();
        let registry = Arc::clone(&self.inflight);
        let page_limit = self.page_limit;
        let lookup_key = key.to_string();
        let title = title.to_string();

        let pending = async move {
            let key = lookup_key;
            // A lookup that just finished may have filled the cache.
            let outcome = match cache.get(&key).await {
                Some(id) => Lookup::Found(id),
                None => match search_remote(&*search, page_limit, &title, season).await {
                    Ok(Some(id)) => {
                        debug!(key = %key, id = %id, "Resolved series id");
                        cache.set_permanent(key.clone(), id.clone()).await;
                        Lookup::Found(id)
                    }
                    Ok(None) => {
                        debug!(key = %key, "No series id found");
                        Lookup::Missing
                    }
                    Err(_) => Lookup::Failed,
                },
            };

            registry
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&key);
            outcome
        }
        .boxed()
        .shared();

        inflight.insert(key.to_string(), pending.clone());
        (pending, true)
    }

    /// Seed a known mapping. `title_season` is an `identity_key`.
    pub async fn insert(&self, title_season: impl Into<String>, id: impl Into<String>) {
        self.cache.set_permanent(title_season, id.into()).await;
    }

    pub async fn len(&self) -> usize {
        self.cache.len().await
    }

    /// `"title-season" -> id` map for persistence.
    pub async fn export(&self) -> BTreeMap<String, String> {
        self.cache
            .snapshot()
            .await
            .into_iter()
            .map(|(key, entry)| (key, entry.value))
            .collect()
    }

    /// Load a persisted map. Returns the number of entries loaded.
    pub async fn import(&self, entries: BTreeMap<String, String>) -> usize {
        let count = entries.len();
        for (key, id) in entries {
            self.cache.set_permanent(key, id).await;
        }
        count
    }
}

/// Query the catalog with season-qualified queries first.
///
/// The first query returning any hits decides the outcome.
async fn search_remote(
    search: &dyn TitleSearch,
    page_limit: u32,
    title: &str,
    season: u32,
) -> Result<Option<String>, TitleSearchError> {
    let queries = [
        format!("{} Season {}", title, season),
        format!("{} {}", title, season),
        title.to_string(),
    ];

    for query in &queries {
        let hits = search
            .search_titles(query, page_limit)
            .await
            .inspect_err(|e| {
                warn!(
                    service = search.name(),
                    query = %query,
                    error = %e,
                    "Title search failed"
                );
            })?;

        if !hits.is_empty() {
            return Ok(select_hit(&hits, title, season).map(|hit| hit.id.clone()));
        }
    }

    Ok(None)
}

/// First hit whose canonical title contains both the title and the season
/// number, else the first hit.
fn select_hit<'a>(hits: &'a [TitleHit], title: &str, season: u32) -> Option<&'a TitleHit> {
    let title = title.to_lowercase();
    let season = season.to_string();
    hits.iter()
        .find(|hit| {
            let canonical = hit.canonical_title.to_lowercase();
            canonical.contains(&title) && canonical.contains(&season)
        })
        .or_else(|| hits.first())
}
