//! Hugging Face inference endpoint adapter.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;

use crate::domain::models::{HfEndpointConfig, ModelConfig};
use crate::domain::ports::provider::{Provider, ProviderError, ProviderResponse};
use crate::infrastructure::providers::http::{map_status, map_transport_error};

/// Adapter for a text-generation inference endpoint.
pub struct HfEndpointProvider {
    client: reqwest::Client,
    url: String,
    api_token: Option<String>,
}

impl HfEndpointProvider {
    /// `config.url` must be present; config validation enforces this before
    /// the factory runs.
    pub fn new(client: reqwest::Client, config: &HfEndpointConfig) -> Result<Self, ProviderError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| ProviderError::InvalidRequest("hf_endpoint url not set".to_string()))?;
        let api_token = config
            .api_token
            .clone()
            .or_else(|| std::env::var("HUGGINGFACE_API_TOKEN").ok());
        Ok(Self {
            client,
            url,
            api_token,
        })
    }

    /// Endpoints answer in several shapes; try the common ones in order.
    fn extract_text(value: &Value) -> String {
        if let Some(first) = value.as_array().and_then(|items| items.first()) {
            for key in ["generated_text", "text"] {
                if let Some(text) = first.get(key).and_then(Value::as_str) {
                    return text.to_string();
                }
            }
        }
        for key in ["generated_text", "output_text"] {
            if let Some(text) = value.get(key).and_then(Value::as_str) {
                return text.to_string();
            }
        }
        if let Some(first) = value
            .get("outputs")
            .and_then(Value::as_array)
            .and_then(|outputs| outputs.first())
        {
            for key in ["content", "generated_text"] {
                if let Some(text) = first.get(key).and_then(Value::as_str) {
                    return text.to_string();
                }
            }
        }
        String::new()
    }
}

#[async_trait]
impl Provider for HfEndpointProvider {
    fn provider_id(&self) -> &str {
        "hf_endpoint"
    }

    async fn invoke(
        &self,
        model: &ModelConfig,
        prompt: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let params = &model.default_params;
        let mut parameters = serde_json::json!({
            "temperature": params.temperature,
            "max_new_tokens": params.max_tokens,
            "return_full_text": false,
        });
        if let Some(parameters_obj) = parameters.as_object_mut() {
            for (key, value) in &params.extra {
                parameters_obj.insert(key.clone(), value.clone());
            }
        }
        let payload = serde_json::json!({
            "inputs": prompt,
            "parameters": parameters,
        });

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(&e, params.timeout_ms.unwrap_or(0)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Server(format!("unparseable response body: {e}")))?;

        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = started.elapsed().as_millis() as u64;
        Ok(ProviderResponse {
            raw_text: Self::extract_text(&body),
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_from_list_shape() {
        let value = serde_json::json!([{"generated_text": "hello"}]);
        assert_eq!(HfEndpointProvider::extract_text(&value), "hello");
    }

    #[test]
    fn test_extract_text_from_object_shape() {
        let value = serde_json::json!({"generated_text": "hi"});
        assert_eq!(HfEndpointProvider::extract_text(&value), "hi");
    }

    #[test]
    fn test_extract_text_from_outputs_shape() {
        let value = serde_json::json!({"outputs": [{"content": "yo"}]});
        assert_eq!(HfEndpointProvider::extract_text(&value), "yo");
    }

    #[test]
    fn test_extract_text_unknown_shape_is_empty() {
        let value = serde_json::json!({"unexpected": true});
        assert_eq!(HfEndpointProvider::extract_text(&value), "");
    }
}
