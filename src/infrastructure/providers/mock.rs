//! Mock provider for tests and offline runs.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::domain::models::ModelConfig;
use crate::domain::ports::provider::{Provider, ProviderError, ProviderResponse};

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct MockReply {
    /// Raw text to return, when succeeding
    pub raw_text: String,

    /// Error to return instead, when set
    pub error: Option<ProviderError>,

    /// Reported latency
    pub latency_ms: u64,
}

impl Default for MockReply {
    fn default() -> Self {
        Self {
            raw_text: r#"{"label": "partially", "confidence": 0.5}"#.to_string(),
            error: None,
            latency_ms: 5,
        }
    }
}

impl MockReply {
    pub fn success(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            ..Self::default()
        }
    }

    pub fn failure(error: ProviderError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Scripted provider.
///
/// Replies are scripted per model id and consumed in order; when a model's
/// script runs dry (or none was set) the default reply is returned. Every
/// invocation is recorded so tests can assert which (model, prompt) pairs
/// actually reached the provider.
pub struct MockProvider {
    default_reply: MockReply,
    scripts: RwLock<HashMap<String, VecDeque<MockReply>>>,
    invocations: RwLock<Vec<(String, String)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_default_reply(MockReply::default())
    }

    pub fn with_default_reply(default_reply: MockReply) -> Self {
        Self {
            default_reply,
            scripts: RwLock::new(HashMap::new()),
            invocations: RwLock::new(Vec::new()),
        }
    }

    /// Queue replies for a model, consumed one per invocation.
    pub async fn script(&self, model_id: impl Into<String>, replies: Vec<MockReply>) {
        let mut scripts = self.scripts.write().await;
        scripts
            .entry(model_id.into())
            .or_default()
            .extend(replies);
    }

    /// All recorded invocations as (model_id, prompt) pairs.
    pub async fn invocations(&self) -> Vec<(String, String)> {
        self.invocations.read().await.clone()
    }

    /// Number of invocations recorded for one model.
    pub async fn invocation_count(&self, model_id: &str) -> usize {
        self.invocations
            .read()
            .await
            .iter()
            .filter(|(model, _)| model == model_id)
            .count()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn provider_id(&self) -> &str {
        "mock"
    }

    async fn invoke(
        &self,
        model: &ModelConfig,
        prompt: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        self.invocations
            .write()
            .await
            .push((model.model_id.clone(), prompt.to_string()));

        let reply = {
            let mut scripts = self.scripts.write().await;
            scripts
                .get_mut(&model.model_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| self.default_reply.clone())
        };

        match reply.error {
            Some(error) => Err(error),
            None => Ok(ProviderResponse {
                raw_text: reply.raw_text,
                latency_ms: reply.latency_ms,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(model_id: &str) -> ModelConfig {
        ModelConfig {
            model_id: model_id.to_string(),
            provider: "mock".to_string(),
            context_window: 8192,
            default_params: Default::default(),
            capabilities: vec![],
            weight: 1.0,
        }
    }

    #[tokio::test]
    async fn test_scripted_replies_consumed_in_order() {
        let provider = MockProvider::new();
        provider
            .script(
                "m1",
                vec![
                    MockReply::failure(ProviderError::Timeout(10)),
                    MockReply::success("ok"),
                ],
            )
            .await;

        assert!(provider.invoke(&model("m1"), "p").await.is_err());
        let response = provider.invoke(&model("m1"), "p").await.unwrap();
        assert_eq!(response.raw_text, "ok");
        assert_eq!(provider.invocation_count("m1").await, 2);
    }

    #[tokio::test]
    async fn test_default_reply_when_script_dry() {
        let provider = MockProvider::new();
        let response = provider.invoke(&model("m2"), "p").await.unwrap();
        assert!(response.raw_text.contains("partially"));
    }
}
