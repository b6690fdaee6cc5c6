use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::RunConfig;

/// Known provider adapter tags.
const KNOWN_PROVIDERS: [&str; 3] = ["ollama", "hf_endpoint", "mock"];
const KNOWN_CACHE_BACKENDS: [&str; 2] = ["memory", "sqlite"];
const KNOWN_SINK_BACKENDS: [&str; 2] = ["sqlite", "jsonl"];

/// Configuration validation failures. All fatal: a run never starts with an
/// invalid configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid chunk_size: {0}. Must be at least 1")]
    InvalidChunkSize(usize),

    #[error("Invalid early_exit_threshold: {0}. Must be within (0, 1]")]
    InvalidEarlyExitThreshold(f64),

    #[error("Model registry is empty: at least one model is required")]
    NoModels,

    #[error("Duplicate model_id: {0}")]
    DuplicateModelId(String),

    #[error("Model '{model_id}' has negative weight {weight}")]
    NegativeWeight { model_id: String, weight: f64 },

    #[error("Model '{model_id}' references unknown provider '{provider}'. Known: {known}")]
    UnknownProvider {
        model_id: String,
        provider: String,
        known: String,
    },

    #[error("hf_endpoint provider requires providers.hf_endpoint.url")]
    MissingHfEndpointUrl,

    #[error("Invalid workers_per_provider: {0}. Must be between 1 and 64")]
    InvalidWorkers(usize),

    #[error("Invalid requests_per_second: {0}. Must be positive")]
    InvalidRequestRate(f64),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Unknown cache backend: {0}. Must be one of: memory, sqlite")]
    UnknownCacheBackend(String),

    #[error("Unknown sink backend: {0}. Must be one of: sqlite, jsonl")]
    UnknownSinkBackend(String),

    #[error("Invalid high_disagreement_threshold: {0}. Must be within [0, 1]")]
    InvalidDisagreementThreshold(f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .quorum/config.yaml (project config)
    /// 3. .quorum/local.yaml (local overrides, optional)
    /// 4. Environment variables (QUORUM_* prefix, highest priority)
    pub fn load() -> Result<RunConfig> {
        let config: RunConfig = Figment::new()
            .merge(Serialized::defaults(RunConfig::default()))
            .merge(Yaml::file(".quorum/config.yaml"))
            .merge(Yaml::file(".quorum/local.yaml"))
            .merge(Env::prefixed("QUORUM_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<RunConfig> {
        let config: RunConfig = Figment::new()
            .merge(Serialized::defaults(RunConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("QUORUM_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &RunConfig) -> Result<(), ConfigError> {
        if config.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if let Some(threshold) = config.early_exit_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(ConfigError::InvalidEarlyExitThreshold(threshold));
            }
        }

        if config.models.is_empty() {
            return Err(ConfigError::NoModels);
        }

        let mut seen = std::collections::HashSet::new();
        for model in &config.models {
            if !seen.insert(&model.model_id) {
                return Err(ConfigError::DuplicateModelId(model.model_id.clone()));
            }
            if model.weight < 0.0 {
                return Err(ConfigError::NegativeWeight {
                    model_id: model.model_id.clone(),
                    weight: model.weight,
                });
            }
            if !KNOWN_PROVIDERS.contains(&model.provider.as_str()) {
                return Err(ConfigError::UnknownProvider {
                    model_id: model.model_id.clone(),
                    provider: model.provider.clone(),
                    known: KNOWN_PROVIDERS.join(", "),
                });
            }
        }

        if config
            .models
            .iter()
            .any(|model| model.provider == "hf_endpoint")
            && config.providers.hf_endpoint.url.is_none()
        {
            return Err(ConfigError::MissingHfEndpointUrl);
        }

        let workers = config.scheduler.workers_per_provider;
        if workers == 0 || workers > 64 {
            return Err(ConfigError::InvalidWorkers(workers));
        }

        if config.scheduler.requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidRequestRate(
                config.scheduler.requests_per_second,
            ));
        }

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if !KNOWN_CACHE_BACKENDS.contains(&config.cache.backend.as_str()) {
            return Err(ConfigError::UnknownCacheBackend(config.cache.backend.clone()));
        }

        if !KNOWN_SINK_BACKENDS.contains(&config.sink.backend.as_str()) {
            return Err(ConfigError::UnknownSinkBackend(config.sink.backend.clone()));
        }

        let disagreement = config.aggregation.high_disagreement_threshold;
        if !(0.0..=1.0).contains(&disagreement) {
            return Err(ConfigError::InvalidDisagreementThreshold(disagreement));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ModelConfig;

    fn config_with_models() -> RunConfig {
        let yaml = r"
models:
  - model_id: m1
    provider: mock
";
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_default_config_fails_without_models() {
        let result = ConfigLoader::validate(&RunConfig::default());
        assert!(matches!(result, Err(ConfigError::NoModels)));
    }

    #[test]
    fn test_minimal_valid_config() {
        ConfigLoader::validate(&config_with_models()).expect("minimal config should validate");
    }

    #[test]
    fn test_yaml_parsing_full_config() {
        let yaml = r"
chunk_size: 16
early_exit_threshold: 0.9
models:
  - model_id: deepseek-r1:14b
    provider: ollama
    weight: 2.0
  - model_id: judge-small
    provider: mock
scheduler:
  workers_per_provider: 8
  requests_per_second: 4.0
  call_timeout_ms: 60000
retry:
  max_attempts: 2
  initial_backoff_ms: 100
  max_backoff_ms: 5000
cache:
  backend: sqlite
  path: /tmp/cache.db
aggregation:
  high_disagreement_threshold: 0.4
  weights:
    judge-small: 0.5
";
        let config: RunConfig = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.early_exit_threshold, Some(0.9));
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.scheduler.workers_per_provider, 8);
        assert_eq!(config.cache.backend, "sqlite");
        ConfigLoader::validate(&config).expect("parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_chunk_size() {
        let mut config = config_with_models();
        config.chunk_size = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn test_validate_bad_early_exit_threshold() {
        let mut config = config_with_models();
        config.early_exit_threshold = Some(1.5);
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidEarlyExitThreshold(_))
        ));

        config.early_exit_threshold = Some(0.0);
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_model_id() {
        let mut config = config_with_models();
        config.models.push(ModelConfig {
            model_id: "m1".to_string(),
            provider: "mock".to_string(),
            context_window: 8192,
            default_params: Default::default(),
            capabilities: vec![],
            weight: 1.0,
        });
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::DuplicateModelId(_))
        ));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = config_with_models();
        config.models[0].provider = "openai".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::UnknownProvider { .. })
        ));
    }

    #[test]
    fn test_validate_negative_weight() {
        let mut config = config_with_models();
        config.models[0].weight = -1.0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::NegativeWeight { .. })
        ));
    }

    #[test]
    fn test_validate_hf_endpoint_requires_url() {
        let mut config = config_with_models();
        config.models[0].provider = "hf_endpoint".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::MissingHfEndpointUrl)
        ));

        config.providers.hf_endpoint.url = Some("https://example.test/generate".to_string());
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = config_with_models();
        config.retry.initial_backoff_ms = 30_000;
        config.retry.max_backoff_ms = 10_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(30_000, 10_000))
        ));
    }

    #[test]
    fn test_validate_unknown_backends() {
        let mut config = config_with_models();
        config.cache.backend = "redis".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::UnknownCacheBackend(_))
        ));

        let mut config = config_with_models();
        config.sink.backend = "parquet".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::UnknownSinkBackend(_))
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "chunk_size: 8\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "chunk_size: 64\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: RunConfig = Figment::new()
            .merge(Serialized::defaults(RunConfig::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.chunk_size, 64, "override should win");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.format, "json",
            "base value should persist when not overridden"
        );
    }
}
