use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chunk::ChunkPlan;
use super::model_config::ModelConfig;

/// Completion state of one chunk within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChunkState {
    pub index: usize,
    pub sample_count: usize,

    /// Set when every sample in the chunk reached its completion criterion
    /// and the chunk's records were handed to the sink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChunkState {
    pub const fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Run-level metadata and per-chunk completion markers.
///
/// Created at run start, appended to as chunks complete, never mutated
/// retroactively. On restart the scheduler consults the manifest to skip
/// chunks already marked complete, so a crashed run resumes without
/// re-issuing finished provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunManifest {
    /// Run identifier
    pub run_id: String,

    pub created_at: DateTime<Utc>,

    /// Dataset reference (path, table, URL) this run evaluated
    pub dataset_ref: String,

    /// Snapshot of the model registry at run start
    pub models: Vec<ModelConfig>,

    /// Ensemble strategy name ("weighted_majority_vote")
    pub strategy: String,

    /// Strategy parameters (weights, thresholds) for auditing
    pub strategy_params: serde_json::Value,

    /// Per-chunk completion state, in chunk order
    pub chunks: Vec<ChunkState>,

    /// Code version stamp (e.g. git describe output), when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_version: Option<String>,

    /// Free-form operator notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl RunManifest {
    /// Build a fresh manifest for a planned run.
    pub fn new(
        dataset_ref: impl Into<String>,
        models: Vec<ModelConfig>,
        strategy_params: serde_json::Value,
        plan: &ChunkPlan,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            dataset_ref: dataset_ref.into(),
            models,
            strategy: "weighted_majority_vote".to_string(),
            strategy_params,
            chunks: plan
                .chunks
                .iter()
                .map(|chunk| ChunkState {
                    index: chunk.index,
                    sample_count: chunk.len(),
                    completed_at: None,
                })
                .collect(),
            code_version: option_env!("CARGO_PKG_VERSION").map(str::to_string),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn is_chunk_complete(&self, index: usize) -> bool {
        self.chunks
            .iter()
            .any(|state| state.index == index && state.is_complete())
    }

    /// Mark a chunk complete. Completion markers are append-only: marking an
    /// already complete chunk keeps the original timestamp.
    pub fn mark_chunk_complete(&mut self, index: usize, at: DateTime<Utc>) {
        if let Some(state) = self.chunks.iter_mut().find(|state| state.index == index) {
            if state.completed_at.is_none() {
                state.completed_at = Some(at);
            }
        }
    }

    pub fn completed_chunks(&self) -> usize {
        self.chunks.iter().filter(|state| state.is_complete()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::chunk::Chunk;

    fn plan_of(sizes: &[usize]) -> ChunkPlan {
        let chunks = sizes
            .iter()
            .enumerate()
            .map(|(index, size)| Chunk {
                index,
                sample_ids: (0..*size).map(|i| format!("s{index}-{i}")).collect(),
            })
            .collect();
        ChunkPlan {
            chunk_size: sizes.first().copied().unwrap_or(1),
            chunks,
        }
    }

    #[test]
    fn test_manifest_tracks_chunk_completion() {
        let plan = plan_of(&[2, 2, 1]);
        let mut manifest =
            RunManifest::new("dataset.jsonl", vec![], serde_json::json!({}), &plan);

        assert_eq!(manifest.chunks.len(), 3);
        assert_eq!(manifest.completed_chunks(), 0);
        assert!(!manifest.is_chunk_complete(1));

        manifest.mark_chunk_complete(1, Utc::now());
        assert!(manifest.is_chunk_complete(1));
        assert_eq!(manifest.completed_chunks(), 1);
    }

    #[test]
    fn test_mark_complete_is_idempotent() {
        let plan = plan_of(&[1]);
        let mut manifest =
            RunManifest::new("dataset.jsonl", vec![], serde_json::json!({}), &plan);

        let first = Utc::now();
        manifest.mark_chunk_complete(0, first);
        manifest.mark_chunk_complete(0, Utc::now());

        assert_eq!(manifest.chunks[0].completed_at, Some(first));
    }
}
