use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker count is at least 1
/// - Retention and conversion timeouts are coherent
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.workers.count == 0 {
        return Err(ConfigError::ValidationError(
            "workers.count must be at least 1".to_string(),
        ));
    }

    if config.retention.retention_hours == 0 {
        return Err(ConfigError::ValidationError(
            "retention.retention_hours must be at least 1".to_string(),
        ));
    }

    if config.converter.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "converter.timeout_secs must be at least 1".to_string(),
        ));
    }

    // A live conversion must never look abandoned to the recovery sweep.
    if config.retention.liveness_timeout_secs <= config.converter.timeout_secs {
        return Err(ConfigError::ValidationError(format!(
            "retention.liveness_timeout_secs ({}) must exceed converter.timeout_secs ({})",
            config.retention.liveness_timeout_secs, config.converter.timeout_secs
        )));
    }

    Ok(())
}
