//! Legislative-data source: bill records from the Congress.gov API.

mod cache;
mod client;
mod types;
mod urls;

use async_trait::async_trait;

use crate::task::BillId;

pub use cache::ResponseCache;
pub use client::CongressApiClient;
pub use types::{BillResource, LegislativeError};
pub use urls::{public_bill_url, public_member_url, PublicUrls};

/// Read access to structured bill data.
#[async_trait]
pub trait LegislativeSource: Send + Sync {
    /// Fetch one resource of a bill as the API's JSON document.
    async fn fetch(
        &self,
        bill: &BillId,
        resource: BillResource,
    ) -> Result<serde_json::Value, LegislativeError>;
}
