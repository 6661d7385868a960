//! Key/value store with per-entry expiry.
//!
//! Expired entries are never returned: `get` evicts them on read, and every
//! expiring `set` also schedules a deferred sweep on the current tokio runtime.
//! A sweep only removes the entry it was scheduled for, so a sweep left over
//! from a superseded `set` can never delete a newer value.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::trace;

/// Default lifetime for entries stored without an explicit TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Persisted form of one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry<V> {
    pub value: V,
    /// Absolute expiry in epoch milliseconds. `None` never expires.
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<i64>,
}

/// Ordered snapshot used for persistence.
pub type CacheSnapshot<V> = BTreeMap<String, SnapshotEntry<V>>;

struct Entry<V> {
    value: V,
    expires_at: Option<i64>,
    generation: u64,
    sweep: Option<AbortHandle>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(at) if now_ms >= at)
    }

    fn cancel_sweep(&mut self) {
        if let Some(handle) = self.sweep.take() {
            handle.abort();
        }
    }
}

type EntryMap<V> = RwLock<HashMap<String, Entry<V>>>;

/// Shared TTL cache. Cloning yields another handle to the same entries.
pub struct TtlCache<V> {
    entries: Arc<EntryMap<V>>,
    next_generation: Arc<AtomicU64>,
    default_ttl: Duration,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            next_generation: Arc::clone(&self.next_generation),
            default_ttl: self.default_ttl,
        }
    }
}

impl<V> Default for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the live value for `key`, evicting it if it has expired.
    pub async fn get(&self, key: &str) -> Option<V> {
        let now = now_ms();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            if let Some(mut entry) = entries.remove(key) {
                entry.cancel_sweep();
            }
            trace!(key, "Evicted expired cache entry on read");
        }
        None
    }

    /// True when `key` has an entry that has not expired.
    pub async fn contains_live(&self, key: &str) -> bool {
        let now = now_ms();
        let entries = self.entries.read().await;
        entries.get(key).is_some_and(|e| !e.is_expired(now))
    }

    /// Store `value` under `key` for `ttl`, or the default TTL when `None`.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expires_at = now_ms().saturating_add(duration_ms(ttl));
        self.insert(key.into(), value, Some(expires_at)).await;
    }

    /// Store `value` under `key` with no expiry.
    pub async fn set_permanent(&self, key: impl Into<String>, value: V) {
        self.insert(key.into(), value, None).await;
    }

    pub async fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(mut entry) => {
                entry.cancel_sweep();
                true
            }
            None => false,
        }
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            entry.cancel_sweep();
        }
        entries.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot of all live entries, ordered by key.
    pub async fn snapshot(&self) -> CacheSnapshot<V> {
        let now = now_ms();
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| {
                (
                    key.clone(),
                    SnapshotEntry {
                        value: entry.value.clone(),
                        expires_at: entry.expires_at,
                    },
                )
            })
            .collect()
    }

    /// Load a snapshot, skipping entries that expired while persisted.
    ///
    /// Returns the number of entries restored.
    pub async fn restore(&self, snapshot: CacheSnapshot<V>) -> usize {
        let now = now_ms();
        let mut restored = 0;
        for (key, entry) in snapshot {
            if matches!(entry.expires_at, Some(at) if now >= at) {
                continue;
            }
            self.insert(key, entry.value, entry.expires_at).await;
            restored += 1;
        }
        restored
    }

    async fn insert(&self, key: String, value: V, expires_at: Option<i64>) {
        let mut entries = self.entries.write().await;
        // Generations are taken under the write lock so the last writer holds the newest.
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let sweep = expires_at.and_then(|at| {
            let delay = Duration::from_millis(at.saturating_sub(now_ms()).max(0) as u64);
            schedule_sweep(
                Arc::downgrade(&self.entries),
                key.clone(),
                generation,
                delay,
            )
        });

        let previous = entries.insert(
            key,
            Entry {
                value,
                expires_at,
                generation,
                sweep,
            },
        );
        if let Some(mut previous) = previous {
            previous.cancel_sweep();
        }
    }
}

fn schedule_sweep<V>(
    entries: Weak<EntryMap<V>>,
    key: String,
    generation: u64,
    delay: Duration,
) -> Option<AbortHandle>
where
    V: Send + Sync + 'static,
{
    let handle = tokio::runtime::Handle::try_current().ok()?;
    let task = handle.spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(entries) = entries.upgrade() else {
            return;
        };
        let mut entries = entries.write().await;
        if entries.get(&key).is_some_and(|e| e.generation == generation) {
            entries.remove(&key);
            trace!(key = %key, "Swept expired cache entry");
        }
    });
    Some(task.abort_handle())
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
