pub mod cache;
pub mod config;
pub mod engine;
pub mod identity;
pub mod listing;
pub mod matcher;
pub mod metrics;
pub mod parser;
pub mod precache;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use engine::{
    stream_key, EngineError, LoadedState, ResolutionEngine, StreamId, StreamIdError,
};
pub use matcher::StreamCandidate;
pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use precache::PrecacheStatus;
