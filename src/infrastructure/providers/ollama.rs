//! Ollama provider adapter: one POST against a local generate endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Instant;

use crate::domain::models::{ModelConfig, OllamaConfig};
use crate::domain::ports::provider::{Provider, ProviderError, ProviderResponse};
use crate::infrastructure::providers::http::{map_status, map_transport_error};

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Adapter for a local Ollama server.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(client: reqwest::Client, config: &OllamaConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn provider_id(&self) -> &str {
        "ollama"
    }

    async fn invoke(
        &self,
        model: &ModelConfig,
        prompt: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let params = &model.default_params;
        let payload = serde_json::json!({
            "model": model.model_id,
            "prompt": prompt,
            "options": {
                "temperature": params.temperature,
                "num_predict": params.max_tokens,
            },
            "stream": false,
        });

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_transport_error(&e, params.timeout_ms.unwrap_or(0)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Server(format!("unparseable response body: {e}")))?;

        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = started.elapsed().as_millis() as u64;
        Ok(ProviderResponse {
            raw_text: generated.response,
            latency_ms,
        })
    }
}
