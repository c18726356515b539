use serde::{Deserialize, Serialize};

/// Message bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// How long a claimed message stays invisible to the rest of its group
    /// before it is redelivered (milliseconds).
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_ms: u64,

    /// Upper bound on a single long-poll wait (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_visibility_timeout() -> u64 {
    300_000 // 5 minutes
}

fn default_poll_interval() -> u64 {
    250
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_ms: default_visibility_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BusConfig::default();
        assert_eq!(config.visibility_timeout_ms, 300_000);
        assert_eq!(config.poll_interval_ms, 250);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: BusConfig = toml::from_str("visibility_timeout_ms = 1000").unwrap();
        assert_eq!(config.visibility_timeout_ms, 1000);
        assert_eq!(config.poll_interval_ms, 250);
    }
}
