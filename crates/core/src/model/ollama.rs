//! Ollama `/api/generate` client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;
use crate::metrics;

use super::{GenerateRequest, LanguageModel, ModelError};

/// Local Ollama server client. No API key required.
pub struct OllamaModel {
    client: reqwest::Client,
    model: String,
    api_base: String,
}

impl OllamaModel {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.into(),
            api_base: "http://localhost:11434".to_string(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(&config.model).with_api_base(&config.api_base)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, request: GenerateRequest) -> Result<String, ModelError> {
        let body = OllamaRequest {
            model: &self.model,
            prompt: request.prompt,
            system: request.system,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorResponse>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            return Err(ModelError::Api { status, message });
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;

        debug!(
            model = %self.model,
            prompt_tokens = parsed.prompt_eval_count,
            output_tokens = parsed.eval_count,
            "Generation finished"
        );

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    prompt_eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        timeout: Duration,
    ) -> Result<String, ModelError> {
        let result = match tokio::time::timeout(timeout, self.call(request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(timeout)),
        };

        let label = match &result {
            Ok(_) => "success",
            Err(ModelError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        metrics::MODEL_CALLS.with_label_values(&[label]).inc();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let body = OllamaRequest {
            model: "llama3",
            prompt: "Summarize".to_string(),
            system: None,
            stream: false,
            options: OllamaOptions {
                temperature: 0.0,
                num_predict: 512,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama3");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 512);
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_from_config_trims_base() {
        let model = OllamaModel::from_config(&ModelConfig {
            api_base: "http://gpu-box:11434/".to_string(),
            ..Default::default()
        });
        assert_eq!(model.api_base, "http://gpu-box:11434");
        assert_eq!(model.name(), "llama3");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        let model = OllamaModel::new("llama3").with_api_base("http://127.0.0.1:1");
        let err = model
            .generate(GenerateRequest::new("hi"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {:?}", err);
    }
}
