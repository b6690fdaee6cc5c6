use serde::{Deserialize, Serialize};
use std::fmt;

use super::judgement::JudgeLabel;

/// Final verdict for a sample: a canonical label, or an explicit abstention
/// when no judgements were available to vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalLabel {
    Relevant,
    Partially,
    Irrelevant,
    /// Abstain sentinel: the ensemble could not produce a verdict
    Abstain,
}

impl From<JudgeLabel> for FinalLabel {
    fn from(label: JudgeLabel) -> Self {
        match label {
            JudgeLabel::Relevant => Self::Relevant,
            JudgeLabel::Partially => Self::Partially,
            JudgeLabel::Irrelevant => Self::Irrelevant,
        }
    }
}

impl fmt::Display for FinalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Relevant => "relevant",
            Self::Partially => "partially",
            Self::Irrelevant => "irrelevant",
            Self::Abstain => "abstain",
        };
        f.write_str(s)
    }
}

/// Flags attached to ensemble results.
pub mod flag {
    /// The early-exit policy skipped one or more models for this sample
    pub const EARLY_EXIT_APPLIED: &str = "early_exit_applied";
    /// The judgement set was empty; the result is an abstention
    pub const INSUFFICIENT_VOTES: &str = "insufficient_votes";
    /// The disagreeing fraction exceeded the configured threshold
    pub const HIGH_DISAGREEMENT: &str = "high_disagreement";
}

/// How much the contributing judgements disagreed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DisagreementMetrics {
    /// Fraction of judgements whose label differs from `final_label`
    pub disagreeing_fraction: f64,

    /// max - min of confidences among contributing judgements
    pub confidence_spread: f64,
}

impl DisagreementMetrics {
    /// Metrics for an empty judgement set.
    pub const fn empty() -> Self {
        Self {
            disagreeing_fraction: 0.0,
            confidence_spread: 0.0,
        }
    }
}

/// The combined verdict across models for one sample.
///
/// Produced exactly once per sample per run, after its contributing
/// judgements are finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EnsembleResult {
    pub sample_id: String,

    /// Winning label, or [`FinalLabel::Abstain`]
    pub final_label: FinalLabel,

    /// Normalized winning weight share in [0, 1]; 0.0 on abstention
    pub final_confidence: f64,

    pub disagreement_metrics: DisagreementMetrics,

    /// Ordered flags (see [`flag`])
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

impl EnsembleResult {
    pub fn is_abstention(&self) -> bool {
        self.final_label == FinalLabel::Abstain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_label_from_judge_label() {
        assert_eq!(FinalLabel::from(JudgeLabel::Relevant), FinalLabel::Relevant);
        assert_eq!(
            FinalLabel::from(JudgeLabel::Irrelevant),
            FinalLabel::Irrelevant
        );
    }

    #[test]
    fn test_abstain_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&FinalLabel::Abstain).unwrap(),
            "\"abstain\""
        );
    }
}
