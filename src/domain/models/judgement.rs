use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical label space for a single model's verdict.
///
/// The ordering here is the canonical label ordering used by the aggregator's
/// deterministic tie-break: `relevant` before `partially` before
/// `irrelevant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeLabel {
    Relevant,
    Partially,
    Irrelevant,
}

impl JudgeLabel {
    /// All labels in canonical (tie-break) order.
    pub const CANONICAL_ORDER: [Self; 3] = [Self::Relevant, Self::Partially, Self::Irrelevant];

    /// Parse a label case-insensitively; `None` for anything outside the
    /// canonical space.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "relevant" => Some(Self::Relevant),
            "partially" => Some(Self::Partially),
            "irrelevant" => Some(Self::Irrelevant),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relevant => "relevant",
            Self::Partially => "partially",
            Self::Irrelevant => "irrelevant",
        }
    }
}

impl fmt::Display for JudgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warning codes attached to judgements by the engine.
pub mod warning {
    /// Raw output did not contain a parseable judgement
    pub const PARSE_FAILURE: &str = "parse_failure";
    /// Parsed label was outside the canonical label space
    pub const LABEL_OUT_OF_DOMAIN: &str = "label_out_of_domain";
    /// Parsed confidence was outside [0, 1]
    pub const CONFIDENCE_OUT_OF_RANGE: &str = "confidence_out_of_range";
    /// Cache backend failed; call proceeded as a miss
    pub const CACHE_DEGRADED: &str = "cache_degraded";
    /// Transient failures persisted past the maximum attempt count
    pub const PROVIDER_EXHAUSTED: &str = "provider_exhausted";
    /// A permanent provider failure aborted the call
    pub const PROVIDER_REJECTED: &str = "provider_rejected";
}

/// One model's verdict on one sample.
///
/// At most one judgement exists per (`sample_id`, `model_id`) within a run;
/// once written it is immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Judgement {
    pub sample_id: String,
    pub model_id: String,
    pub provider: String,

    /// Canonical verdict label
    pub label: JudgeLabel,

    /// Optional raw score reported by the model (informational; confidence
    /// alone drives voting and early exit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Model-reported confidence in [0, 1]
    pub confidence: f64,

    /// Optional free-text rationale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,

    /// Raw provider output retained for auditing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,

    /// Wall-clock latency of the provider call(s), milliseconds
    pub latency_ms: u64,

    /// Provider attempts consumed (>= 1 for any provider-backed judgement)
    pub attempts: u32,

    /// True when this judgement came from the cache; the provider was not
    /// invoked and `attempts` reflects the original computation
    pub cache_hit: bool,

    /// Ordered warnings accumulated while producing this judgement
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Judgement {
    /// Re-tag a cached judgement as a hit for the current call.
    pub fn into_cache_hit(mut self) -> Self {
        self.cache_hit = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse_case_insensitive() {
        assert_eq!(JudgeLabel::parse("Relevant"), Some(JudgeLabel::Relevant));
        assert_eq!(JudgeLabel::parse(" PARTIALLY "), Some(JudgeLabel::Partially));
        assert_eq!(JudgeLabel::parse("irrelevant"), Some(JudgeLabel::Irrelevant));
        assert_eq!(JudgeLabel::parse("maybe"), None);
    }

    #[test]
    fn test_label_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&JudgeLabel::Partially).unwrap(),
            "\"partially\""
        );
    }

    #[test]
    fn test_into_cache_hit_preserves_attempts() {
        let judgement = Judgement {
            sample_id: "s1".to_string(),
            model_id: "m1".to_string(),
            provider: "mock".to_string(),
            label: JudgeLabel::Relevant,
            score: None,
            confidence: 0.9,
            rationale: None,
            raw_text: None,
            latency_ms: 12,
            attempts: 2,
            cache_hit: false,
            warnings: vec![],
        };

        let hit = judgement.into_cache_hit();
        assert!(hit.cache_hit);
        assert_eq!(hit.attempts, 2);
    }
}
