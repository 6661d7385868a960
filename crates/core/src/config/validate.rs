use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Matcher batch size and early-exit threshold are positive
/// - Precache concurrency is positive
/// - Guessit rate limit is positive when the fallback is enabled
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.matcher.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "matcher.batch_size must be at least 1".to_string(),
        ));
    }

    if config.matcher.early_exit_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "matcher.early_exit_threshold must be at least 1".to_string(),
        ));
    }

    if config.precache.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "precache.concurrency must be at least 1".to_string(),
        ));
    }

    if config.guessit.enabled && config.guessit.requests_per_second == 0 {
        return Err(ConfigError::ValidationError(
            "guessit.requests_per_second must be at least 1".to_string(),
        ));
    }

    Ok(())
}
