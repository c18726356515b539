//! Controller configuration.

use serde::{Deserialize, Serialize};

/// Bills processed when the config names none.
pub const DEFAULT_BILLS: [&str; 10] = [
    "H.R.1", "H.R.5371", "H.R.5401", "S.2296", "S.24", "S.2882", "S.499", "S.RES.412",
    "H.RES.353", "H.R.1968",
];

/// Configuration for the run controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Bill identifiers to write articles for, e.g. `H.R.1`.
    #[serde(default = "default_bills")]
    pub bills: Vec<String>,

    /// How often the store is polled for bill status (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How often a progress report is logged (milliseconds).
    #[serde(default = "default_report_interval")]
    pub report_interval_ms: u64,

    /// Global deadline for the whole run. Whatever is complete by then is
    /// written out and the rest reported as incomplete.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Pause before retrying after the store stops answering (milliseconds).
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_bills() -> Vec<String> {
    DEFAULT_BILLS.iter().map(|b| b.to_string()).collect()
}

fn default_poll_interval() -> u64 {
    2000 // 2 seconds
}

fn default_report_interval() -> u64 {
    5000 // 5 seconds
}

fn default_run_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_reconnect_delay() -> u64 {
    1000
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bills: default_bills(),
            poll_interval_ms: default_poll_interval(),
            report_interval_ms: default_report_interval(),
            run_timeout_secs: default_run_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

impl ControllerConfig {
    /// Config for the given bills with every interval left at its default.
    pub fn for_bills<I, S>(bills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bills: bills.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_report_interval_ms(mut self, ms: u64) -> Self {
        self.report_interval_ms = ms;
        self
    }

    pub fn with_run_timeout_secs(mut self, secs: u64) -> Self {
        self.run_timeout_secs = secs;
        self
    }

    pub fn with_reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.reconnect_delay_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.bills.len(), 10);
        assert_eq!(config.bills[0], "H.R.1");
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.report_interval_ms, 5000);
        assert_eq!(config.run_timeout_secs, 1800);
        assert_eq!(config.reconnect_delay_ms, 1000);
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            bills = ["S.24"]
            run_timeout_secs = 60
        "#;
        let config: ControllerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.bills, vec!["S.24"]);
        assert_eq!(config.run_timeout_secs, 60);
        assert_eq!(config.poll_interval_ms, 2000);
    }
}
