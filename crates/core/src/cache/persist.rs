//! JSON snapshot files and debounced flushing.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read a JSON file. A missing file is `Ok(None)`.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Write `value` as pretty JSON, replacing the file atomically.
pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let json = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;

    debug!(path = %path.display(), "Wrote snapshot");
    Ok(())
}

/// Collapses repeated flush requests into one deferred run.
///
/// The pending flag is cleared before the flush runs, so a request arriving
/// while a flush is writing schedules the next one.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    pending: Arc<AtomicBool>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Schedule `flush` after the debounce window.
    ///
    /// Returns false when a flush is already pending or no runtime is
    /// available.
    pub fn schedule<F, Fut>(&self, flush: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.pending.swap(true, Ordering::SeqCst) {
            return false;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.pending.store(false, Ordering::SeqCst);
            return false;
        };

        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            pending.store(false, Ordering::SeqCst);
            flush().await;
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<BTreeMap<String, String>> =
            load_json(&dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("identity.json");

        let mut map = BTreeMap::new();
        map.insert("naruto-1".to_string(), "12345".to_string());
        save_json(&path, &map).await.unwrap();

        let loaded: BTreeMap<String, String> = load_json(&path).await.unwrap().unwrap();
        assert_eq!(loaded, map);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_load_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        let result: Result<Option<BTreeMap<String, String>>, _> = load_json(&path).await;
        assert!(matches!(result, Err(PersistenceError::Json { .. })));
    }

    #[tokio::test]
    async fn test_debouncer_collapses_triggers() {
        let debouncer = Debouncer::new(Duration::from_millis(30));
        let runs = Arc::new(AtomicUsize::new(0));

        let mut scheduled = 0;
        for _ in 0..5 {
            let runs = Arc::clone(&runs);
            if debouncer.schedule(move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
            }) {
                scheduled += 1;
            }
        }
        assert_eq!(scheduled, 1);
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());

        let runs_again = Arc::clone(&runs);
        assert!(debouncer.schedule(move || async move {
            runs_again.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
