use serde::{Deserialize, Serialize};

/// One fixed-size slice of the sample sequence, the unit of resumable
/// progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Chunk {
    /// Position of this chunk in the plan (0-based)
    pub index: usize,

    /// Sample identifiers in input order
    pub sample_ids: Vec<String>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }
}

/// Ordered partition of the sample sequence into fixed-size chunks.
///
/// Deterministic given the same sample ordering and chunk size, which is what
/// makes chunk indices a valid resume cursor across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChunkPlan {
    /// Configured chunk size (the final chunk may be smaller)
    pub chunk_size: usize,

    /// Chunks in order
    pub chunks: Vec<Chunk>,
}

impl ChunkPlan {
    /// Total number of samples across all chunks.
    pub fn total_samples(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
