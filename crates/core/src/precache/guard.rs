use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of cache keys with in-flight background work.
///
/// Membership check and insert happen under one lock, so two submissions for
/// the same key can never both acquire it.
#[derive(Debug, Default)]
pub struct StampedeGuard {
    keys: Mutex<HashSet<String>>,
}

impl StampedeGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `key`, or `None` when another task already holds it.
    ///
    /// The key is released when the returned permit is dropped, including
    /// during a panic unwind.
    pub fn try_acquire(self: &Arc<Self>, key: &str) -> Option<GuardPermit> {
        if !self.lock().insert(key.to_string()) {
            return None;
        }
        Some(GuardPermit {
            guard: Arc::clone(self),
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.keys.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Holds one key in a `StampedeGuard` until dropped.
#[derive(Debug)]
pub struct GuardPermit {
    guard: Arc<StampedeGuard>,
    key: String,
}

impl GuardPermit {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        self.guard.lock().remove(&self.key);
    }
}
