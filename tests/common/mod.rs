//! Shared helpers for integration tests.

use async_trait::async_trait;
use std::sync::Arc;

use quorum::domain::models::{ModelConfig, RunConfig, Sample};
use quorum::domain::ports::dataset::{DatasetError, DatasetSource};

/// Fixed in-memory dataset with a stable order.
pub struct StaticDataset {
    samples: Vec<Sample>,
}

impl StaticDataset {
    pub fn new(samples: Vec<Sample>) -> Arc<Self> {
        Arc::new(Self { samples })
    }
}

#[async_trait]
impl DatasetSource for StaticDataset {
    fn dataset_ref(&self) -> &str {
        "static://test"
    }

    async fn load(&self) -> Result<Vec<Sample>, DatasetError> {
        Ok(self.samples.clone())
    }
}

/// N trivially distinct samples.
pub fn samples(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| {
            Sample::new(
                format!("s{i:03}"),
                format!("query {i}"),
                format!("candidate text {i}"),
            )
        })
        .collect()
}

/// A mock-provider model entry.
pub fn mock_model(model_id: &str) -> ModelConfig {
    ModelConfig {
        model_id: model_id.to_string(),
        provider: "mock".to_string(),
        context_window: 8192,
        default_params: Default::default(),
        capabilities: vec![],
        weight: 1.0,
    }
}

/// Config tuned for fast tests: small chunks, instant backoff.
pub fn test_config(models: Vec<ModelConfig>) -> RunConfig {
    let mut config = RunConfig {
        models,
        chunk_size: 2,
        ..RunConfig::default()
    };
    config.retry.max_attempts = 3;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 5;
    config.scheduler.requests_per_second = 10_000.0;
    config.scheduler.call_timeout_ms = 5_000;
    config
}
