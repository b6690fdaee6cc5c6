//! Ensemble aggregator: weighted majority vote over a sample's judgements.
//!
//! Aggregation is a pure function of its input judgement set; re-running it
//! on the same set yields the identical result, which auditing relies on.

use std::collections::HashMap;
use tracing::debug;

use crate::domain::models::{
    flag, DisagreementMetrics, EnsembleResult, FinalLabel, JudgeLabel, Judgement,
};

/// Combines per-model judgements into one verdict per sample.
#[derive(Debug, Clone)]
pub struct EnsembleAggregator {
    /// model_id -> vote weight; absent models default to 1.0
    weights: HashMap<String, f64>,

    /// Disagreeing fraction above which `high_disagreement` is flagged
    high_disagreement_threshold: f64,
}

impl EnsembleAggregator {
    pub fn new(weights: HashMap<String, f64>, high_disagreement_threshold: f64) -> Self {
        Self {
            weights,
            high_disagreement_threshold,
        }
    }

    fn weight_of(&self, model_id: &str) -> f64 {
        self.weights.get(model_id).copied().unwrap_or(1.0)
    }

    /// Aggregate a sample's judgements into an [`EnsembleResult`].
    ///
    /// An empty judgement set yields the abstain sentinel with the
    /// `insufficient_votes` flag rather than an error: a sample always gets
    /// exactly one output record. `early_exit` is propagated from the
    /// scheduler.
    pub fn aggregate(
        &self,
        sample_id: &str,
        judgements: &[Judgement],
        early_exit: bool,
    ) -> EnsembleResult {
        let mut flags = Vec::new();
        if early_exit {
            flags.push(flag::EARLY_EXIT_APPLIED.to_string());
        }

        if judgements.is_empty() {
            flags.push(flag::INSUFFICIENT_VOTES.to_string());
            return EnsembleResult {
                sample_id: sample_id.to_string(),
                final_label: FinalLabel::Abstain,
                final_confidence: 0.0,
                disagreement_metrics: DisagreementMetrics::empty(),
                flags,
            };
        }

        // Weighted sum and raw vote count per label, in canonical order.
        let mut weighted_sums = [0.0_f64; 3];
        let mut raw_votes = [0_usize; 3];
        for judgement in judgements {
            let slot = label_slot(judgement.label);
            weighted_sums[slot] += self.weight_of(&judgement.model_id) * judgement.confidence;
            raw_votes[slot] += 1;
        }

        // Highest weighted sum wins; ties prefer more raw votes, then the
        // label earliest in canonical order. Strict `>` comparisons walking
        // canonical order give exactly that.
        let mut winner = 0;
        for slot in 1..3 {
            if weighted_sums[slot] > weighted_sums[winner]
                || (weighted_sums[slot] == weighted_sums[winner]
                    && raw_votes[slot] > raw_votes[winner])
            {
                winner = slot;
            }
        }
        let final_label = JudgeLabel::CANONICAL_ORDER[winner];

        let total_weight: f64 = weighted_sums.iter().sum();
        let final_confidence = if total_weight > 0.0 {
            (weighted_sums[winner] / total_weight).clamp(0.0, 1.0)
        } else {
            // All-zero confidences: the winner carries no weight share.
            0.0
        };

        let disagreeing = judgements
            .iter()
            .filter(|judgement| judgement.label != final_label)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let disagreeing_fraction = disagreeing as f64 / judgements.len() as f64;

        let confidences = judgements.iter().map(|judgement| judgement.confidence);
        let max = confidences.clone().fold(f64::MIN, f64::max);
        let min = confidences.fold(f64::MAX, f64::min);
        let confidence_spread = max - min;

        if disagreeing_fraction > self.high_disagreement_threshold {
            flags.push(flag::HIGH_DISAGREEMENT.to_string());
        }

        debug!(
            sample_id,
            %final_label,
            final_confidence,
            disagreeing_fraction,
            "aggregated ensemble verdict"
        );

        EnsembleResult {
            sample_id: sample_id.to_string(),
            final_label: final_label.into(),
            final_confidence,
            disagreement_metrics: DisagreementMetrics {
                disagreeing_fraction,
                confidence_spread,
            },
            flags,
        }
    }
}

const fn label_slot(label: JudgeLabel) -> usize {
    match label {
        JudgeLabel::Relevant => 0,
        JudgeLabel::Partially => 1,
        JudgeLabel::Irrelevant => 2,
    }
}
