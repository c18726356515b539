use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::bus::BusConfig;
use crate::controller::ControllerConfig;
use crate::pool::PoolConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub legislative: LegislativeConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub link_check: LinkCheckConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Status API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Which state store backend to use.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// State store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database file, only read by the sqlite backend.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("billwire.db")
}

/// One pool per task kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkersConfig {
    #[serde(default = "default_question_pool")]
    pub question: PoolConfig,
    #[serde(default = "default_link_check_pool")]
    pub link_check: PoolConfig,
    #[serde(default = "default_draft_pool")]
    pub draft: PoolConfig,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            question: default_question_pool(),
            link_check: default_link_check_pool(),
            draft: default_draft_pool(),
        }
    }
}

fn default_question_pool() -> PoolConfig {
    PoolConfig::default().with_concurrency(12)
}

fn default_link_check_pool() -> PoolConfig {
    PoolConfig::default().with_concurrency(8)
}

fn default_draft_pool() -> PoolConfig {
    PoolConfig::default().with_concurrency(4)
}

/// Congress.gov API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LegislativeConfig {
    #[serde(default = "default_legislative_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    /// Congress number the bill identifiers belong to.
    #[serde(default = "default_congress")]
    pub congress: u32,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for LegislativeConfig {
    fn default() -> Self {
        Self {
            api_base: default_legislative_base(),
            api_key: String::new(),
            congress: default_congress(),
            cache_ttl_secs: default_cache_ttl(),
            timeout_secs: default_request_timeout(),
        }
    }
}

fn default_legislative_base() -> String {
    "https://api.congress.gov/v3".to_string()
}

fn default_congress() -> u32 {
    118
}

fn default_cache_ttl() -> u64 {
    86_400 // 24 hours
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    #[default]
    Ollama,
}

/// Language model configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_model_base")]
    pub api_base: String,
    /// Upper bound on a single generation call.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            model: default_model(),
            api_base: default_model_base(),
            timeout_secs: default_model_timeout(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_model_base() -> String {
    "http://localhost:11434".to_string()
}

fn default_model_timeout() -> u64 {
    180 // 3 minutes
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkCheckConfig {
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for LinkCheckConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Config view safe to log or serve (API key redacted).
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub store: StoreConfig,
    pub workers: WorkersConfig,
    pub controller: ControllerConfig,
    pub legislative_api_base: String,
    pub legislative_api_key_configured: bool,
    pub model: ModelConfig,
    pub output: OutputConfig,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            store: config.store.clone(),
            workers: config.workers.clone(),
            controller: config.controller.clone(),
            legislative_api_base: config.legislative.api_base.clone(),
            legislative_api_key_configured: !config.legislative.api_key.is_empty(),
            model: config.model.clone(),
            output: config.output.clone(),
        }
    }
}
