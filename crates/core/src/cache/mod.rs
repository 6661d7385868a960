//! In-memory caches and their on-disk snapshots.

mod persist;
mod ttl;

pub use persist::{load_json, save_json, Debouncer, PersistenceError};
pub use ttl::{CacheSnapshot, SnapshotEntry, TtlCache, DEFAULT_TTL};
