//! Hyperlink probing.

mod http;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpLinkProber;

#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Answers "does this URL resolve?" with the final HTTP status.
#[async_trait]
pub trait LinkProber: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError>;
}

/// Whether a probed status counts as a working link.
pub fn is_valid_status(status: u16) -> bool {
    (200..300).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_status() {
        assert!(is_valid_status(200));
        assert!(is_valid_status(204));
        assert!(!is_valid_status(301));
        assert!(!is_valid_status(404));
        assert!(!is_valid_status(500));
    }
}
