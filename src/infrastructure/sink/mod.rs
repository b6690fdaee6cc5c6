//! Output sink backends, selected by configuration tag.

pub mod jsonl;
pub mod sqlite;

use std::sync::Arc;

use crate::domain::models::SinkConfig;
use crate::domain::ports::sink::{OutputSink, SinkError};

pub use jsonl::JsonlSink;
pub use sqlite::SqliteSink;

/// Build the configured output sink.
pub async fn build_sink(config: &SinkConfig) -> Result<Arc<dyn OutputSink>, SinkError> {
    match config.backend.as_str() {
        "sqlite" => Ok(Arc::new(SqliteSink::open(&config.path).await?)),
        "jsonl" => Ok(Arc::new(JsonlSink::open(config.path.clone()).await?)),
        other => Err(SinkError::Unavailable(format!(
            "unknown sink backend '{other}'"
        ))),
    }
}
