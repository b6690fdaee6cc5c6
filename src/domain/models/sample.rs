use serde::{Deserialize, Serialize};

/// One query/candidate pair to be judged.
///
/// Samples are immutable once ingested: the engine only ever reads them, and
/// the cache key derivation depends on their content staying fixed for the
/// duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Sample {
    /// Stable unique identifier within the dataset
    pub sample_id: String,

    /// The query text the candidate is judged against
    pub query: String,

    /// The candidate text (document, passage, answer, ...)
    pub candidate: String,

    /// Optional reference texts (gold passages, citations, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,

    /// Optional gold label for agreement reporting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold_label: Option<String>,

    /// Free-form metadata carried through to output records
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Sample {
    /// Create a minimal sample with no references, gold label, or metadata.
    pub fn new(
        sample_id: impl Into<String>,
        query: impl Into<String>,
        candidate: impl Into<String>,
    ) -> Self {
        Self {
            sample_id: sample_id.into(),
            query: query.into(),
            candidate: candidate.into(),
            references: Vec::new(),
            gold_label: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach a gold label for agreement reporting.
    pub fn with_gold_label(mut self, label: impl Into<String>) -> Self {
        self.gold_label = Some(label.into());
        self
    }
}
