//! Dataset source port.
//!
//! Produces a finite, restartable ordered sequence of samples. The engine
//! consumes it without knowledge of the storage format; ordering must be
//! stable across restarts for the chunk plan to be a valid resume cursor.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::Sample;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset unavailable: {0}")]
    Unavailable(String),

    #[error("malformed record at position {position}: {message}")]
    MalformedRecord { position: usize, message: String },
}

/// Port trait for dataset sources.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Stable reference to the dataset (recorded in the run manifest).
    fn dataset_ref(&self) -> &str;

    /// Load the full ordered sample sequence. Repeated calls must yield the
    /// same sequence in the same order.
    async fn load(&self) -> Result<Vec<Sample>, DatasetError>;
}
