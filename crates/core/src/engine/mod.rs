//! Episode stream resolution.
//!
//! `ResolutionEngine` owns every cache and wires the collaborators together:
//! listing source, filename extraction, identity resolution, matching and the
//! precache queue. Its public entry point never fails; remote and parse errors
//! degrade to an empty result and are logged and counted.

mod store;
mod stream_id;

pub use store::StreamStore;
pub use stream_id::{credential_fingerprint, stream_key, StreamId, StreamIdError};

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{load_json, save_json, PersistenceError};
use crate::config::Config;
use crate::identity::{IdentityResolver, KitsuClient, TitleSearch, TitleSearchError};
use crate::listing::{most_recent, DownloadRecord, ListingError, ListingSource, RealDebridClient};
use crate::matcher::{StreamCandidate, StreamMatcher};
use crate::metrics::{MetricsRecorder, MetricsSnapshot, Timer};
use crate::parser::{CompositeExtractor, ExtractError, FilenameExtractor};
use crate::precache::{PrecacheQueue, PrecacheStatus, PrecacheTask};
use store::StreamPrecacher;

/// Errors building an engine from configuration.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Listing client: {0}")]
    Listing(#[from] ListingError),

    #[error("Title search client: {0}")]
    TitleSearch(#[from] TitleSearchError),

    #[error("Filename extractor: {0}")]
    Extractor(#[from] ExtractError),
}

/// Entry counts restored from disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadedState {
    pub identities: usize,
    pub streams: usize,
}

pub struct ResolutionEngine {
    listing: Arc<dyn ListingSource>,
    extractor: Arc<dyn FilenameExtractor>,
    identity: Arc<IdentityResolver>,
    matcher: Arc<StreamMatcher>,
    streams: Arc<StreamStore>,
    precache: Option<PrecacheQueue>,
    metrics: Arc<MetricsRecorder>,
    identity_path: PathBuf,
    identity_write: tokio::sync::Mutex<()>,
    lookahead: u32,
    preload_limit: usize,
}

impl ResolutionEngine {
    /// Wire an engine from explicit collaborators.
    ///
    /// Must be called inside a tokio runtime when precaching is enabled, since
    /// the queue dispatcher is spawned here.
    pub fn new(
        config: &Config,
        listing: Arc<dyn ListingSource>,
        extractor: Arc<dyn FilenameExtractor>,
        search: Arc<dyn TitleSearch>,
        metrics: Arc<MetricsRecorder>,
    ) -> Arc<Self> {
        let identity = Arc::new(IdentityResolver::new(
            search,
            Arc::clone(&metrics),
            config.kitsu.page_limit,
        ));
        let matcher = Arc::new(StreamMatcher::new(
            Arc::clone(&extractor),
            Arc::clone(&identity),
            Arc::clone(&metrics),
            &config.matcher,
        ));
        let streams = Arc::new(StreamStore::new(
            config.cache.streams_path(),
            config.cache.default_ttl(),
            config.cache.stream_ttl(),
            config.cache.persist_debounce(),
        ));

        let precache = config.precache.enabled.then(|| {
            let runner = Arc::new(StreamPrecacher {
                matcher: Arc::clone(&matcher),
                store: Arc::clone(&streams),
            });
            PrecacheQueue::spawn(runner, config.precache.concurrency, Arc::clone(&metrics))
        });

        info!(
            listing = listing.name(),
            precache = config.precache.enabled,
            lookahead = config.precache.lookahead,
            "Resolution engine initialized"
        );

        Arc::new(Self {
            listing,
            extractor,
            identity,
            matcher,
            streams,
            precache,
            metrics,
            identity_path: config.cache.identity_path(),
            identity_write: tokio::sync::Mutex::new(()),
            lookahead: config.precache.lookahead,
            preload_limit: config.precache.preload_limit,
        })
    }

    /// Build the production collaborators (Real-Debrid, Kitsu, heuristic
    /// extraction with the optional guessit fallback).
    pub fn from_config(
        config: &Config,
        metrics: Arc<MetricsRecorder>,
    ) -> Result<Arc<Self>, EngineError> {
        let listing = Arc::new(RealDebridClient::new(&config.realdebrid)?);
        let search = Arc::new(KitsuClient::new(&config.kitsu)?);
        let extractor = Arc::new(CompositeExtractor::from_config(
            &config.guessit,
            &config.cache,
            Arc::clone(&metrics),
        )?);
        Ok(Self::new(config, listing, extractor, search, metrics))
    }

    /// Streams for `stream_id` (`prefix:series:episode`) in the account behind
    /// `credential`. Never fails; every error path yields an empty list.
    pub async fn resolve_streams(&self, stream_id: &str, credential: &str) -> Vec<StreamCandidate> {
        let timer = self.metrics.start_timer();

        let id = match StreamId::parse(stream_id) {
            Ok(id) => id,
            Err(e) => {
                debug!(stream_id, error = %e, "Rejected stream id");
                self.metrics.record(
                    "request",
                    timer.elapsed_ms(),
                    &[("streamsFound", 0), ("invalidIds", 1)],
                );
                return Vec::new();
            }
        };
        let key = stream_key(&id.series_id, id.episode, credential);

        let cache_timer = self.metrics.start_timer();
        if let Some(cached) = self.streams.get(&key).await {
            self.metrics
                .record("cache", cache_timer.elapsed_ms(), &[("hits", 1)]);
            debug!(stream_id, streams = cached.len(), "Stream cache hit");
            self.record_request(&timer, cached.len());
            return cached;
        }
        self.metrics
            .record("cache", cache_timer.elapsed_ms(), &[("misses", 1)]);

        let listing: Arc<[DownloadRecord]> = match self.fetch_listing(credential).await {
            Some(records) if !records.is_empty() => Arc::from(records),
            _ => {
                self.record_request(&timer, 0);
                return Vec::new();
            }
        };

        let candidates = self
            .matcher
            .match_listing(&listing, &id.series_id, id.episode)
            .await;
        self.streams.store(key, candidates.clone()).await;

        if !candidates.is_empty() {
            self.schedule_lookahead(&id, credential, &listing);
        }

        info!(
            stream_id,
            streams = candidates.len(),
            elapsed_ms = timer.elapsed_ms(),
            "Resolved streams"
        );
        self.record_request(&timer, candidates.len());
        candidates
    }

    /// Warm the caches from the most recently added downloads.
    ///
    /// Each record is parsed and its identity resolved; every resolved
    /// (series, episode) pair is submitted to the precache queue. Returns the
    /// number of tasks submitted.
    pub async fn preload_recent(&self, credential: &str) -> usize {
        let timer = self.metrics.start_timer();
        let Some(records) = self.fetch_listing(credential).await else {
            return 0;
        };
        let recent = most_recent(&records, self.preload_limit);
        let listing: Arc<[DownloadRecord]> = Arc::from(records);

        let mut scheduled: HashSet<(String, u32)> = HashSet::new();
        let mut resolved = 0u64;
        for record in &recent {
            let parsed = match self.extractor.parse(&record.filename).await {
                Ok(Some(parsed)) => parsed,
                Ok(None) => continue,
                Err(e) => {
                    debug!(filename = %record.filename, error = %e, "Preload parse failed");
                    continue;
                }
            };
            let Some(series_id) = self.identity.resolve(&parsed.title, parsed.season).await else {
                continue;
            };
            resolved += 1;

            if !scheduled.insert((series_id.clone(), parsed.episode)) {
                continue;
            }
            if let Some(queue) = &self.precache {
                queue.submit(PrecacheTask::new(
                    series_id,
                    parsed.episode,
                    credential,
                    Arc::clone(&listing),
                ));
            }
        }

        let submitted = if self.precache.is_some() {
            scheduled.len()
        } else {
            0
        };
        info!(
            records = recent.len(),
            resolved,
            submitted,
            "Preloaded recent downloads"
        );
        self.metrics.record(
            "preload",
            timer.elapsed_ms(),
            &[
                ("records", recent.len() as u64),
                ("resolved", resolved),
                ("submitted", submitted as u64),
            ],
        );
        submitted
    }

    /// Restore both snapshots. Unreadable files are logged and skipped.
    pub async fn load_persisted(&self) -> LoadedState {
        let identities = self.load_identity().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load identity cache");
            0
        });
        let streams = self.load_streams().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load stream cache");
            0
        });
        info!(identities, streams, "Loaded persisted caches");
        LoadedState {
            identities,
            streams,
        }
    }

    pub async fn load_identity(&self) -> Result<usize, PersistenceError> {
        let entries: Option<BTreeMap<String, String>> = load_json(&self.identity_path).await?;
        match entries {
            Some(entries) => Ok(self.identity.import(entries).await),
            None => Ok(0),
        }
    }

    pub async fn load_streams(&self) -> Result<usize, PersistenceError> {
        self.streams.load().await
    }

    /// Write the identity map. Returns the number of entries written.
    pub async fn persist_identity(&self) -> Result<usize, PersistenceError> {
        let _writing = self.identity_write.lock().await;
        let entries = self.identity.export().await;
        save_json(&self.identity_path, &entries).await?;
        debug!(entries = entries.len(), "Persisted identity cache");
        Ok(entries.len())
    }

    pub async fn persist_streams(&self) -> Result<usize, PersistenceError> {
        self.streams.persist().await
    }

    /// Write both snapshots now. Used at shutdown.
    pub async fn flush_all(&self) {
        if let Err(e) = self.persist_identity().await {
            warn!(error = %e, "Failed to persist identity cache");
        }
        if let Err(e) = self.persist_streams().await {
            warn!(error = %e, "Failed to persist stream cache");
        }
    }

    /// Schedule a debounced stream snapshot write.
    pub fn mark_streams_dirty(&self) {
        self.streams.mark_dirty();
    }

    /// Spawn a loop writing the identity map every `interval` until shutdown.
    pub fn spawn_identity_flush_loop(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Identity flush loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = self.persist_identity().await {
                            warn!(error = %e, "Periodic identity flush failed");
                        }
                    }
                }
            }
        })
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Queue counters, or `None` when precaching is disabled.
    pub fn precache_status(&self) -> Option<PrecacheStatus> {
        self.precache.as_ref().map(PrecacheQueue::status)
    }

    /// Wait for queued and running precache tasks to finish.
    pub async fn wait_precache_idle(&self) {
        if let Some(queue) = &self.precache {
            queue.idle().await;
        }
    }

    pub fn identity(&self) -> &Arc<IdentityResolver> {
        &self.identity
    }

    pub fn streams(&self) -> &Arc<StreamStore> {
        &self.streams
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    async fn fetch_listing(&self, credential: &str) -> Option<Vec<DownloadRecord>> {
        let timer = self.metrics.start_timer();
        match self.listing.list_downloads(credential).await {
            Ok(records) => {
                self.metrics.record(
                    "listing",
                    timer.elapsed_ms(),
                    &[("items", records.len() as u64)],
                );
                Some(records)
            }
            Err(e) => {
                warn!(source = self.listing.name(), error = %e, "Failed to fetch listing");
                self.metrics
                    .record("listing", timer.elapsed_ms(), &[("errors", 1)]);
                None
            }
        }
    }

    fn schedule_lookahead(&self, id: &StreamId, credential: &str, listing: &Arc<[DownloadRecord]>) {
        let Some(queue) = &self.precache else {
            return;
        };
        for episode in (1..=self.lookahead).filter_map(|n| id.episode.checked_add(n)) {
            queue.submit(PrecacheTask::new(
                id.series_id.clone(),
                episode,
                credential,
                Arc::clone(listing),
            ));
        }
    }

    fn record_request(&self, timer: &Timer, streams: usize) {
        self.metrics.record(
            "request",
            timer.elapsed_ms(),
            &[("streamsFound", streams as u64)],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::TitleHit;
    use crate::testing::{fixtures, MockExtractor, MockListingSource, MockTitleSearch};
    use tempfile::TempDir;

    struct Harness {
        engine: Arc<ResolutionEngine>,
        listing: Arc<MockListingSource>,
        extractor: Arc<MockExtractor>,
        search: Arc<MockTitleSearch>,
        _dir: TempDir,
    }

    fn config(dir: &TempDir, precache: bool) -> Config {
        let mut config = Config::default();
        config.cache.data_dir = dir.path().to_path_buf();
        config.cache.persist_debounce_ms = 20;
        config.precache.enabled = precache;
        config
    }

    fn harness(precache: bool) -> Harness {
        let dir = TempDir::new().unwrap();
        let listing = Arc::new(MockListingSource::new());
        let extractor = Arc::new(MockExtractor::heuristic());
        let search = Arc::new(MockTitleSearch::new());
        let engine = ResolutionEngine::new(
            &config(&dir, precache),
            Arc::clone(&listing) as Arc<dyn ListingSource>,
            Arc::clone(&extractor) as Arc<dyn FilenameExtractor>,
            Arc::clone(&search) as Arc<dyn TitleSearch>,
            Arc::new(MetricsRecorder::new()),
        );
        Harness {
            engine,
            listing,
            extractor,
            search,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_invalid_stream_id_is_empty() {
        let h = harness(false);
        assert!(h.engine.resolve_streams("kitsu:1", "key").await.is_empty());
        assert!(h.engine.resolve_streams("kitsu:1:x", "key").await.is_empty());
        assert_eq!(h.listing.call_count().await, 0);
        assert_eq!(
            h.engine.metrics_snapshot().counter("request", "invalidIds"),
            2
        );
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let h = harness(false);
        h.listing
            .set_records(fixtures::listing(&[("Show.S01E02.mkv", "urlA")]))
            .await;
        h.engine.identity().insert("show-1", "100").await;

        let first = h.engine.resolve_streams("kitsu:100:2", "key").await;
        assert_eq!(first, vec![fixtures::candidate("Show.S01E02.mkv", "urlA")]);
        let parses = h.extractor.call_count().await;

        let second = h.engine.resolve_streams("kitsu:100:2", "key").await;
        assert_eq!(second, first);
        assert_eq!(h.listing.call_count().await, 1);
        assert_eq!(h.extractor.call_count().await, parses);

        let snapshot = h.engine.metrics_snapshot();
        assert_eq!(snapshot.counter("cache", "hits"), 1);
        assert_eq!(snapshot.counter("cache", "misses"), 1);
        assert_eq!(snapshot.counter("request", "streamsFound"), 2);
    }

    #[tokio::test]
    async fn test_credentials_do_not_share_results() {
        let h = harness(false);
        h.listing
            .set_records(fixtures::listing(&[("Show.S01E02.mkv", "urlA")]))
            .await;
        h.engine.identity().insert("show-1", "100").await;

        h.engine.resolve_streams("kitsu:100:2", "alice").await;
        h.engine.resolve_streams("kitsu:100:2", "bob").await;

        assert_eq!(h.listing.call_count().await, 2);
        assert_eq!(h.listing.credentials().await, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_listing_failure_is_not_cached() {
        let h = harness(false);
        h.listing.set_fail(true).await;

        assert!(h.engine.resolve_streams("kitsu:100:2", "key").await.is_empty());
        assert!(h.engine.resolve_streams("kitsu:100:2", "key").await.is_empty());

        assert_eq!(h.listing.call_count().await, 2);
        assert_eq!(h.engine.metrics_snapshot().counter("listing", "errors"), 2);
    }

    #[tokio::test]
    async fn test_missing_episode_caches_empty_result() {
        let h = harness(false);
        h.listing
            .set_records(fixtures::listing(&[("Show.S01E02.mkv", "urlA")]))
            .await;
        h.engine.identity().insert("show-1", "100").await;

        assert!(h.engine.resolve_streams("kitsu:100:9", "key").await.is_empty());
        assert!(h.engine.resolve_streams("kitsu:100:9", "key").await.is_empty());
        assert_eq!(h.listing.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_lookahead_precaches_following_episodes() {
        let h = harness(true);
        h.listing
            .set_records(fixtures::listing(&[
                ("Show.S01E01.mkv", "u1"),
                ("Show.S01E02.mkv", "u2"),
                ("Show.S01E03.mkv", "u3"),
            ]))
            .await;
        h.engine.identity().insert("show-1", "100").await;

        h.engine.resolve_streams("kitsu:100:1", "key").await;
        h.engine.wait_precache_idle().await;

        let status = h.engine.precache_status().unwrap();
        assert_eq!(status.completed, 2);
        assert_eq!(status.guarded_keys, 0);

        // Lookahead covers episodes 2 and 3 only.
        let cache = h.engine.streams().cache();
        assert!(cache.contains_live(&stream_key("100", 2, "key")).await);
        assert!(cache.contains_live(&stream_key("100", 3, "key")).await);
        assert!(!cache.contains_live(&stream_key("100", 4, "key")).await);

        let listing_calls = h.listing.call_count().await;
        let second = h.engine.resolve_streams("kitsu:100:2", "key").await;
        assert_eq!(second[0].url, "u2");
        assert_eq!(h.listing.call_count().await, listing_calls);
    }

    #[tokio::test]
    async fn test_preload_recent_resolves_identities() {
        let h = harness(true);
        h.listing
            .set_records(fixtures::listing(&[
                ("Naruto.S01E05.mkv", "u5"),
                ("Naruto.S01E05.mkv", "u5-dup"),
                ("readme.txt", "txt"),
            ]))
            .await;
        h.search
            .add_result("Naruto Season 1", vec![TitleHit::new("12345", "Naruto")])
            .await;

        let submitted = h.engine.preload_recent("key").await;
        h.engine.wait_precache_idle().await;

        assert_eq!(submitted, 1);
        assert_eq!(
            h.engine.identity().export().await.get("naruto-1"),
            Some(&"12345".to_string())
        );
        assert!(
            h.engine
                .streams()
                .cache()
                .contains_live(&stream_key("12345", 5, "key"))
                .await
        );
    }

    #[tokio::test]
    async fn test_preload_without_precache_only_warms_identity() {
        let h = harness(false);
        h.listing
            .set_records(fixtures::listing(&[("Naruto.S01E05.mkv", "u5")]))
            .await;
        h.engine.identity().insert("naruto-1", "12345").await;

        assert_eq!(h.engine.preload_recent("key").await, 0);
        assert_eq!(h.search.query_count().await, 0);
        assert!(h.engine.precache_status().is_none());
    }

    #[tokio::test]
    async fn test_flush_and_reload() {
        let dir = TempDir::new().unwrap();
        let listing = Arc::new(MockListingSource::new());
        listing
            .set_records(fixtures::listing(&[("Show.S01E02.mkv", "urlA")]))
            .await;

        let build = |listing: Arc<MockListingSource>| {
            ResolutionEngine::new(
                &config(&dir, false),
                listing as Arc<dyn ListingSource>,
                Arc::new(MockExtractor::heuristic()) as Arc<dyn FilenameExtractor>,
                Arc::new(MockTitleSearch::new()) as Arc<dyn TitleSearch>,
                Arc::new(MetricsRecorder::new()),
            )
        };

        let first = build(Arc::clone(&listing));
        first.identity().insert("show-1", "100").await;
        first.resolve_streams("kitsu:100:2", "key").await;
        first.flush_all().await;

        let second = build(Arc::clone(&listing));
        let loaded = second.load_persisted().await;
        assert_eq!(
            loaded,
            LoadedState {
                identities: 1,
                streams: 1
            }
        );

        let streams = second.resolve_streams("kitsu:100:2", "key").await;
        assert_eq!(streams[0].url, "urlA");
        assert_eq!(listing.call_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_identity_writes_all_succeed() {
        let h = harness(false);
        for i in 0..20 {
            h.engine
                .identity()
                .insert(format!("show {}-1", i), i.to_string())
                .await;
        }

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&h.engine);
                tokio::spawn(async move { engine.persist_identity().await })
            })
            .collect();
        for writer in writers {
            assert_eq!(writer.await.unwrap().unwrap(), 20);
        }
        assert_eq!(h.engine.load_identity().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_identity_flush_loop_stops_on_shutdown() {
        let h = harness(false);
        h.engine.identity().insert("show-1", "100").await;
        let (tx, rx) = broadcast::channel(1);

        let handle = Arc::clone(&h.engine)
            .spawn_identity_flush_loop(Duration::from_millis(10), rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(h.engine.load_identity().await.unwrap(), 1);
    }
}
