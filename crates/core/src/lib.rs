pub mod bus;
pub mod config;
pub mod controller;
pub mod legislative;
pub mod links;
pub mod metrics;
pub mod model;
pub mod output;
pub mod pool;
pub mod probe;
pub mod progress;
pub mod store;
pub mod task;
pub mod testing;
pub mod workers;

pub use bus::{BusConfig, BusError, InMemoryBus, MessageBus};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LogFormat,
    SanitizedConfig, StoreBackend,
};
pub use controller::{Controller, ControllerConfig, ControllerError, ProgressSnapshot, RunReport};
pub use legislative::{CongressApiClient, LegislativeError, LegislativeSource};
pub use model::{LanguageModel, ModelError, OllamaModel};
pub use output::{Article, FsOutputCollector, OutputCollector, RunSummary};
pub use pool::{HandlerError, PoolConfig, PoolStatus, TaskContext, TaskHandler, WorkerPool};
pub use probe::{HttpLinkProber, LinkProber, ProbeError};
pub use progress::{BillProgress, DraftStatus, ProgressTracker};
pub use store::{InMemoryStateStore, SqliteStateStore, StateStore, StoreError};
pub use task::{BillId, Task, TaskKind};
pub use workers::{ArticleHandler, LinkCheckHandler, QuestionHandler};
