use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use carbone_core::{Config, ResolutionEngine, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Arc<ResolutionEngine>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<ResolutionEngine>) -> Self {
        Self {
            config,
            engine,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn engine(&self) -> &Arc<ResolutionEngine> {
        &self.engine
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
