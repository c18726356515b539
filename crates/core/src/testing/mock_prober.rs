use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::probe::{LinkProber, ProbeError};

/// Scripted link prober. Unscripted URLs answer 200.
#[derive(Default)]
pub struct MockLinkProber {
    statuses: HashMap<String, u16>,
    errors: HashMap<String, ProbeError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockLinkProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn with_error(mut self, url: &str, error: ProbeError) -> Self {
        self.errors.insert(url.to_string(), error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkProber for MockLinkProber {
    async fn probe(&self, url: &str, _timeout: Duration) -> Result<u16, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.errors.get(url) {
            return Err(error.clone());
        }
        Ok(self.statuses.get(url).copied().unwrap_or(200))
    }
}
