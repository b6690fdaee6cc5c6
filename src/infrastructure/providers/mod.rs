//! Provider adapters and the tag-based factory that selects them.

pub mod hf_endpoint;
pub mod http;
pub mod mock;
pub mod ollama;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::RunConfig;
use crate::domain::ports::provider::Provider;
use crate::domain::EngineError;

pub use hf_endpoint::HfEndpointProvider;
pub use mock::{MockProvider, MockReply};
pub use ollama::OllamaProvider;

/// Build one adapter per provider tag referenced by the model registry.
///
/// Tags select variants; an unknown tag is a configuration error (config
/// validation catches it first, this is the backstop for programmatic use).
pub fn build_providers(
    config: &RunConfig,
) -> Result<HashMap<String, Arc<dyn Provider>>, EngineError> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_millis(config.scheduler.call_timeout_ms))
        .build()
        .map_err(|e| EngineError::InvalidConfig(format!("failed to build http client: {e}")))?;

    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    for tag in config.provider_tags() {
        let provider: Arc<dyn Provider> = match tag.as_str() {
            "ollama" => Arc::new(OllamaProvider::new(client.clone(), &config.providers.ollama)),
            "hf_endpoint" => Arc::new(
                HfEndpointProvider::new(client.clone(), &config.providers.hf_endpoint)
                    .map_err(|e| EngineError::InvalidConfig(e.to_string()))?,
            ),
            "mock" => Arc::new(MockProvider::new()),
            other => {
                return Err(EngineError::InvalidConfig(format!(
                    "unknown provider tag '{other}'"
                )))
            }
        };
        providers.insert(tag, provider);
    }
    Ok(providers)
}
