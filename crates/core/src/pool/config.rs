//! Worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum handlers running at once.
    #[serde(default = "default_concurrency")]
    pub concurrency_limit: usize,

    /// Attempts a task gets before it is routed to the error topic.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay (milliseconds); doubles on every attempt.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Retry delay cap (milliseconds).
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

fn default_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    500
}

fn default_backoff_max() -> u64 {
    10_000 // 10 seconds
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

impl PoolConfig {
    pub fn with_concurrency(mut self, concurrency_limit: usize) -> Self {
        self.concurrency_limit = concurrency_limit;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self.backoff_max_ms = max_ms;
        self
    }

    /// Delay before requeueing a task that failed on `attempt` (0-based):
    /// `base * 2^attempt`, capped at the configured maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let millis = self
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.backoff_max_ms);
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_base_ms, 500);
        assert_eq!(config.backoff_max_ms, 10_000);
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = PoolConfig::default().with_backoff(100, 1_000);
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
        assert_eq!(config.backoff(4), Duration::from_millis(1_000));
        assert_eq!(config.backoff(60), Duration::from_millis(1_000));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: PoolConfig = toml::from_str("max_attempts = 5").unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.concurrency_limit, 4);
    }
}
