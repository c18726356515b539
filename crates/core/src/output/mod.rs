//! Run output: articles and the run summary.

mod fs;
mod types;

use async_trait::async_trait;

pub use fs::{render_markdown, FsOutputCollector};
pub use types::{Article, OutputError, RunSummary};

/// Destination for a finished run's results.
#[async_trait]
pub trait OutputCollector: Send + Sync {
    async fn write(&self, articles: &[Article], summary: &RunSummary) -> Result<(), OutputError>;
}
