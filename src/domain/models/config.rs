use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::model_config::ModelConfig;

/// Immutable run configuration.
///
/// Collected once at startup (defaults, config files, environment) and passed
/// down through every component call; no component reads process-wide state
/// ad hoc.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunConfig {
    /// Number of samples per chunk (the unit of resumable progress)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Early-exit confidence threshold. When set, models are evaluated per
    /// sample in registry order and remaining models are skipped once a
    /// judgement's confidence meets the threshold. `None` disables the
    /// policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_exit_threshold: Option<f64>,

    /// Judge model registry; list order is the early-exit priority order
    #[serde(default)]
    pub models: Vec<ModelConfig>,

    /// Scheduler / worker pool configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Judgement cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Ensemble aggregation configuration
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Prompt rendering configuration
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Provider adapter configuration
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Output sink configuration
    #[serde(default)]
    pub sink: SinkConfig,

    /// Dataset source configuration
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Free-form operator notes recorded on the run manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

const fn default_chunk_size() -> usize {
    32
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            early_exit_threshold: None,
            models: vec![],
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            aggregation: AggregationConfig::default(),
            prompt: PromptConfig::default(),
            providers: ProvidersConfig::default(),
            sink: SinkConfig::default(),
            dataset: DatasetConfig::default(),
            logging: LoggingConfig::default(),
            notes: None,
        }
    }
}

impl RunConfig {
    /// Effective per-model vote weights: registry weights overlaid with the
    /// aggregation weight map. Models absent from both default to 1.0 inside
    /// the aggregator.
    pub fn weight_map(&self) -> HashMap<String, f64> {
        let mut weights: HashMap<String, f64> = self
            .models
            .iter()
            .map(|model| (model.model_id.clone(), model.weight))
            .collect();
        for (model_id, weight) in &self.aggregation.weights {
            weights.insert(model_id.clone(), *weight);
        }
        weights
    }

    /// Provider tags referenced by the model registry, deduplicated in
    /// registration order.
    pub fn provider_tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        for model in &self.models {
            if !tags.contains(&model.provider) {
                tags.push(model.provider.clone());
            }
        }
        tags
    }
}

/// Concurrency and pacing configuration for the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Bounded worker pool size per provider
    #[serde(default = "default_workers_per_provider")]
    pub workers_per_provider: usize,

    /// Sustained request rate per provider (token bucket refill rate)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Per-call timeout in milliseconds (overridable per model)
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

const fn default_workers_per_provider() -> usize {
    4
}

const fn default_requests_per_second() -> f64 {
    8.0
}

const fn default_call_timeout_ms() -> u64 {
    120_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers_per_provider: default_workers_per_provider(),
            requests_per_second: default_requests_per_second(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum attempts per provider call (first attempt included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Judgement cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Backend tag: "memory" or "sqlite"
    #[serde(default = "default_cache_backend")]
    pub backend: String,

    /// Database path for the sqlite backend
    #[serde(default = "default_cache_path")]
    pub path: String,

    /// Maximum entries for the memory backend
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,

    /// Entry TTL in seconds for the memory backend; `None` keeps entries for
    /// the process lifetime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

fn default_cache_backend() -> String {
    "memory".to_string()
}

fn default_cache_path() -> String {
    ".quorum/cache.db".to_string()
}

const fn default_cache_capacity() -> u64 {
    100_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            path: default_cache_path(),
            capacity: default_cache_capacity(),
            ttl_secs: None,
        }
    }
}

/// Ensemble aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AggregationConfig {
    /// Disagreeing fraction above which `high_disagreement` is flagged
    #[serde(default = "default_high_disagreement_threshold")]
    pub high_disagreement_threshold: f64,

    /// Per-model weight overrides (model_id -> weight); overlays the
    /// registry weights
    #[serde(default)]
    pub weights: HashMap<String, f64>,
}

const fn default_high_disagreement_threshold() -> f64 {
    0.5
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            high_disagreement_threshold: default_high_disagreement_threshold(),
            weights: HashMap::new(),
        }
    }
}

/// Prompt rendering configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PromptConfig {
    /// Ask models to include a rationale in their judgement
    #[serde(default)]
    pub reasoning_enabled: bool,

    /// Truncate candidate text to this many characters before rendering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_text_chars: Option<usize>,
}

/// Provider adapter configuration, one section per tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProvidersConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub hf_endpoint: HfEndpointConfig,
}

/// Local Ollama HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OllamaConfig {
    /// Base URL of the Ollama server
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
}

fn default_ollama_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
        }
    }
}

/// Hugging Face inference endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HfEndpointConfig {
    /// Endpoint URL; required when any model uses the `hf_endpoint` tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// API token (also sourced from HUGGINGFACE_API_TOKEN)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

/// Output sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SinkConfig {
    /// Backend tag: "sqlite" or "jsonl"
    #[serde(default = "default_sink_backend")]
    pub backend: String,

    /// Database path (sqlite) or output directory (jsonl)
    #[serde(default = "default_sink_path")]
    pub path: String,
}

fn default_sink_backend() -> String {
    "sqlite".to_string()
}

fn default_sink_path() -> String {
    ".quorum/results.db".to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            backend: default_sink_backend(),
            path: default_sink_path(),
        }
    }
}

/// Dataset source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatasetConfig {
    /// Path to a JSONL file of samples
    #[serde(default = "default_dataset_path")]
    pub path: String,

    /// Evaluate at most this many samples (applied before chunk planning)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

fn default_dataset_path() -> String {
    "dataset.jsonl".to_string()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
            limit: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
