//! Judgement cache backends, selected by configuration tag.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use crate::domain::models::CacheConfig;
use crate::domain::ports::cache::{CacheError, JudgementCache};

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

/// Build the configured cache backend.
///
/// Unknown tags are rejected by config validation before this runs; the
/// fallthrough here only guards against calls that skipped validation.
pub async fn build_cache(config: &CacheConfig) -> Result<Arc<dyn JudgementCache>, CacheError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryCache::new(config))),
        "sqlite" => Ok(Arc::new(SqliteCache::open(&config.path).await?)),
        other => Err(CacheError::Unavailable(format!(
            "unknown cache backend '{other}'"
        ))),
    }
}
