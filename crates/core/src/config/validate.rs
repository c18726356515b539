use super::{types::Config, ConfigError};
use crate::pool::PoolConfig;

/// Validate configuration
/// Currently validates:
/// - Every pool has a usable concurrency limit, attempt budget and backoff cap
/// - Requeue sleeps and model calls finish before the broker would redeliver
/// - The controller has bills to work on and a non-zero poll interval
/// - Server port is not 0 when the status API is enabled
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let visibility_ms = config.bus.visibility_timeout_ms;

    for (name, pool) in [
        ("question", &config.workers.question),
        ("link_check", &config.workers.link_check),
        ("draft", &config.workers.draft),
    ] {
        validate_pool(name, pool, visibility_ms)?;
    }

    if config.model.timeout_secs.saturating_mul(1000) >= visibility_ms {
        return Err(ConfigError::ValidationError(format!(
            "model.timeout_secs ({}s) must be shorter than bus.visibility_timeout_ms ({}ms)",
            config.model.timeout_secs, visibility_ms
        )));
    }

    if config.controller.bills.is_empty() {
        return Err(ConfigError::ValidationError(
            "controller.bills cannot be empty".to_string(),
        ));
    }

    if config.controller.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "controller.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.server.enabled && config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_pool(name: &str, pool: &PoolConfig, visibility_ms: u64) -> Result<(), ConfigError> {
    if pool.concurrency_limit == 0 {
        return Err(ConfigError::ValidationError(format!(
            "workers.{}.concurrency_limit cannot be 0",
            name
        )));
    }
    if pool.max_attempts == 0 {
        return Err(ConfigError::ValidationError(format!(
            "workers.{}.max_attempts cannot be 0",
            name
        )));
    }
    if pool.backoff_base_ms > pool.backoff_max_ms {
        return Err(ConfigError::ValidationError(format!(
            "workers.{}.backoff_base_ms exceeds backoff_max_ms",
            name
        )));
    }
    if pool.backoff_max_ms >= visibility_ms {
        return Err(ConfigError::ValidationError(format!(
            "workers.{}.backoff_max_ms ({}ms) must be shorter than bus.visibility_timeout_ms ({}ms)",
            name, pool.backoff_max_ms, visibility_ms
        )));
    }
    Ok(())
}
