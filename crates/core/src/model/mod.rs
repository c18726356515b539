//! Language model abstraction.

mod ollama;

use std::time::Duration;

use async_trait::async_trait;

pub use ollama::OllamaModel;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model service unavailable: {0}")]
    Unavailable(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("could not decode model response: {0}")]
    Decode(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Timeout(_) | ModelError::Unavailable(_) | ModelError::EmptyResponse => {
                true
            }
            ModelError::Api { status, .. } => *status == 429 || *status >= 500,
            ModelError::Decode(_) => false,
        }
    }
}

/// One generation call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    /// 0.0 keeps output deterministic.
    pub temperature: f32,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.0,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model name, for logs.
    fn name(&self) -> &str;

    /// Generate text. Implementations must give up after `timeout`.
    async fn generate(&self, request: GenerateRequest, timeout: Duration)
        -> Result<String, ModelError>;
}
