use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use billwire_core::{pool::PoolStatus, Config, ProgressSnapshot, SanitizedConfig, WorkerPool};

/// Shared application state
pub struct AppState {
    config: Config,
    config_hash: String,
    started_at: DateTime<Utc>,
    snapshot: Arc<RwLock<ProgressSnapshot>>,
    pools: Vec<Arc<WorkerPool>>,
}

impl AppState {
    pub fn new(
        config: Config,
        config_hash: String,
        snapshot: Arc<RwLock<ProgressSnapshot>>,
        pools: Vec<Arc<WorkerPool>>,
    ) -> Self {
        Self {
            config,
            config_hash,
            started_at: Utc::now(),
            snapshot,
            pools,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.read().await.clone()
    }

    pub fn pool_statuses(&self) -> Vec<PoolStatus> {
        self.pools.iter().map(|p| p.status()).collect()
    }
}
