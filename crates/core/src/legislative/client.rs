//! Congress.gov v3 API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::LegislativeConfig;
use crate::task::BillId;

use super::cache::ResponseCache;
use super::types::{BillResource, LegislativeError};
use super::LegislativeSource;

/// Congress.gov API client with a response cache in front of it.
///
/// Requests look like `{api_base}/bill/{congress}/{type}/{number}[/{resource}]`
/// with the key passed as the `api_key` query parameter.
pub struct CongressApiClient {
    client: Client,
    api_base: String,
    api_key: String,
    congress: u32,
    cache: ResponseCache,
}

impl CongressApiClient {
    pub fn new(config: &LegislativeConfig) -> Result<Self, LegislativeError> {
        let client = Client::builder()
            .user_agent(concat!("billwire/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            congress: config.congress,
            cache: ResponseCache::new(Duration::from_secs(config.cache_ttl_secs)),
        })
    }

    pub fn congress(&self) -> u32 {
        self.congress
    }

    /// Request path relative to the API base, also used as the cache key.
    pub fn resource_path(&self, bill: &BillId, resource: BillResource) -> String {
        let mut path = format!(
            "/bill/{}/{}/{}",
            self.congress,
            bill.bill_type(),
            bill.number()
        );
        if let Some(segment) = resource.path_segment() {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    async fn request(&self, path: &str) -> Result<serde_json::Value, LegislativeError> {
        let url = format!("{}{}", self.api_base, path);
        debug!("Congress API request: {}", path);

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("format", "json")])
            .send()
            .await?;

        let status = response.status();
        if status == 429 {
            warn!("Congress API rate limit exceeded");
            return Err(LegislativeError::RateLimited);
        }
        if status == 404 {
            return Err(LegislativeError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LegislativeError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| LegislativeError::Decode(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl LegislativeSource for CongressApiClient {
    async fn fetch(
        &self,
        bill: &BillId,
        resource: BillResource,
    ) -> Result<serde_json::Value, LegislativeError> {
        let path = self.resource_path(bill, resource);
        if let Some(cached) = self.cache.get(&path).await {
            return Ok(cached);
        }

        let value = self.request(&path).await?;
        self.cache.insert(path, value.clone()).await;
        Ok(value)
    }
}
