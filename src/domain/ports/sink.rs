//! Output sink port.
//!
//! Accepts judgement and ensemble records for durable storage plus manifest
//! updates; append-only from the engine's perspective. The scheduler writes
//! records sorted by `sample_id` at chunk boundaries and marks chunk
//! completion through a single coordinating path, so sink implementations
//! never see interleaved manifest writes.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{EnsembleResult, Judgement, RunManifest};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("unknown run: {0}")]
    UnknownRun(String),
}

/// Port trait for output sinks.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Record the manifest for a starting (or resuming) run.
    async fn begin_run(&self, manifest: &RunManifest) -> Result<(), SinkError>;

    /// Load a previously recorded manifest for resume, if one exists.
    async fn load_manifest(&self, run_id: &str) -> Result<Option<RunManifest>, SinkError>;

    /// Append a chunk's judgements (pre-sorted by sample id).
    async fn write_judgements(
        &self,
        run_id: &str,
        judgements: &[Judgement],
    ) -> Result<(), SinkError>;

    /// Append a chunk's ensemble results (pre-sorted by sample id).
    async fn write_ensembles(
        &self,
        run_id: &str,
        results: &[EnsembleResult],
    ) -> Result<(), SinkError>;

    /// Mark a chunk complete in the durable manifest.
    async fn mark_chunk_complete(&self, run_id: &str, chunk_index: usize)
        -> Result<(), SinkError>;

    /// Mark the run finished.
    async fn finalize_run(&self, run_id: &str) -> Result<(), SinkError>;
}
