use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for one judge model.
///
/// Loaded once per run from the model registry section of the run config and
/// immutable for the run's duration. The `provider` tag selects which
/// provider adapter executes this model's calls; adapters are looked up by
/// tag at configuration time, never by inheritance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelConfig {
    /// Unique model identifier (e.g. "deepseek-r1:14b")
    pub model_id: String,

    /// Provider tag: "ollama", "hf_endpoint", "mock"
    pub provider: String,

    /// Context window in tokens
    #[serde(default = "default_context_window")]
    pub context_window: u32,

    /// Default sampling parameters for this model
    #[serde(default)]
    pub default_params: ModelParams,

    /// Capability tags (informational, carried into the manifest snapshot)
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Vote weight in the ensemble (non-negative, default 1.0)
    #[serde(default = "default_weight")]
    pub weight: f64,
}

const fn default_context_window() -> u32 {
    8192
}

const fn default_weight() -> f64 {
    1.0
}

/// Sampling parameters passed to the provider on each call.
///
/// These participate in the cache key: two calls with different parameters
/// are different cache entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelParams {
    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout override in milliseconds (falls back to the
    /// scheduler-wide timeout when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Additional provider-specific parameters
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

const fn default_max_tokens() -> u32 {
    256
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_ms: None,
            extra: HashMap::new(),
        }
    }
}

impl ModelParams {
    /// Canonical string form used in cache key derivation.
    ///
    /// Keys are emitted in sorted order so the same parameters always hash
    /// identically regardless of map iteration order.
    pub fn canonical_string(&self) -> String {
        let mut parts = vec![
            format!("temperature={}", self.temperature),
            format!("max_tokens={}", self.max_tokens),
        ];
        if let Some(timeout) = self.timeout_ms {
            parts.push(format!("timeout_ms={timeout}"));
        }
        let mut extra: Vec<_> = self.extra.iter().collect();
        extra.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in extra {
            parts.push(format!("{key}={value}"));
        }
        parts.join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_defaults() {
        let yaml = "model_id: m1\nprovider: ollama\n";
        let config: ModelConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.context_window, 8192);
        assert!((config.weight - 1.0).abs() < f64::EPSILON);
        assert!((config.default_params.temperature - 0.0).abs() < f32::EPSILON);
        assert_eq!(config.default_params.max_tokens, 256);
    }

    #[test]
    fn test_canonical_string_sorts_extra_params() {
        let mut params = ModelParams::default();
        params.extra.insert("top_p".to_string(), serde_json::json!(0.9));
        params.extra.insert("top_k".to_string(), serde_json::json!(40));

        let canonical = params.canonical_string();
        assert_eq!(
            canonical,
            "temperature=0;max_tokens=256;top_k=40;top_p=0.9"
        );
    }
}
