//! Composition root: builds the store, bus, collaborators, pools and
//! controller from a [`Config`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use billwire_core::{
    config::{ModelProvider, StoreBackend},
    pool::PoolStatus,
    ArticleHandler, Config, CongressApiClient, Controller, FsOutputCollector, HttpLinkProber,
    InMemoryBus, InMemoryStateStore, LanguageModel, LegislativeSource, LinkCheckHandler,
    LinkProber, MessageBus, OllamaModel, OutputCollector, PoolConfig, ProgressTracker,
    QuestionHandler, SqliteStateStore, StateStore, TaskHandler, WorkerPool,
};

/// External services the workers talk to.
pub struct Collaborators {
    pub source: Arc<dyn LegislativeSource>,
    pub model: Arc<dyn LanguageModel>,
    pub prober: Arc<dyn LinkProber>,
    pub output: Arc<dyn OutputCollector>,
}

impl Collaborators {
    /// Real adapters: Congress.gov, the configured model provider, HTTP
    /// probes and the filesystem.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = CongressApiClient::new(&config.legislative)
            .context("Failed to create legislative API client")?;
        if config.legislative.api_key.is_empty() {
            info!("No legislative API key configured, requests may be rejected");
        }

        let model: Arc<dyn LanguageModel> = match config.model.provider {
            ModelProvider::Ollama => Arc::new(OllamaModel::from_config(&config.model)),
        };
        info!(model = model.name(), api_base = %config.model.api_base, "Language model configured");

        let prober = HttpLinkProber::new().context("Failed to create link prober")?;

        Ok(Self {
            source: Arc::new(source),
            model,
            prober: Arc::new(prober),
            output: Arc::new(FsOutputCollector::new(config.output.dir.clone())),
        })
    }
}

pub fn build_store(config: &Config) -> Result<Arc<dyn StateStore>> {
    Ok(match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory state store");
            Arc::new(InMemoryStateStore::new())
        }
        StoreBackend::Sqlite => {
            info!(path = ?config.store.path, "Using SQLite state store");
            Arc::new(
                SqliteStateStore::new(&config.store.path)
                    .with_context(|| format!("Failed to open state store at {:?}", config.store.path))?,
            )
        }
    })
}

/// Everything one run needs, wired together.
pub struct Runtime {
    pub tracker: ProgressTracker,
    pub bus: Arc<dyn MessageBus>,
    pub pools: Vec<Arc<WorkerPool>>,
    pub controller: Arc<Controller>,
}

impl Runtime {
    pub fn new(config: &Config, store: Arc<dyn StateStore>, collaborators: Collaborators) -> Self {
        let tracker = ProgressTracker::new(store);
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new(config.bus.clone()));
        let poll_interval = Duration::from_millis(config.bus.poll_interval_ms);

        let handlers: [(PoolConfig, Arc<dyn TaskHandler>); 3] = [
            (
                config.workers.question.clone(),
                Arc::new(QuestionHandler::new(
                    tracker.clone(),
                    Arc::clone(&collaborators.source),
                    Arc::clone(&collaborators.model),
                    &config.model,
                    config.legislative.congress,
                )),
            ),
            (
                config.workers.link_check.clone(),
                Arc::new(LinkCheckHandler::new(
                    tracker.clone(),
                    Arc::clone(&collaborators.prober),
                    Duration::from_secs(config.link_check.probe_timeout_secs),
                )),
            ),
            (
                config.workers.draft.clone(),
                Arc::new(ArticleHandler::new(
                    tracker.clone(),
                    Arc::clone(&collaborators.source),
                )),
            ),
        ];

        let pools = handlers
            .into_iter()
            .map(|(pool_config, handler)| {
                Arc::new(
                    WorkerPool::new(pool_config, Arc::clone(&bus), handler)
                        .with_run_stats(tracker.clone())
                        .with_poll_interval(poll_interval),
                )
            })
            .collect();

        let controller = Arc::new(Controller::new(
            config.controller.clone(),
            tracker.clone(),
            Arc::clone(&bus),
            collaborators.output,
        ));

        Self {
            tracker,
            bus,
            pools,
            controller,
        }
    }

    pub async fn start_pools(&self) -> Result<()> {
        for pool in &self.pools {
            pool.start()
                .await
                .with_context(|| format!("Failed to start {}", pool.name()))?;
        }
        Ok(())
    }

    pub async fn stop_pools(&self) {
        for pool in &self.pools {
            pool.stop().await;
        }
    }

    pub fn pool_statuses(&self) -> Vec<PoolStatus> {
        self.pools.iter().map(|p| p.status()).collect()
    }
}
