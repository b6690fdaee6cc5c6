//! Judgement cache port.
//!
//! The cache is a best-effort accelerator shared read/write across workers.
//! Backend failures are never fatal: a failed read degrades to a miss, a
//! failed write to a no-op, and either is surfaced as a `cache_degraded`
//! warning on the resulting judgement. Keys are content-addressed, so
//! conflicting writes to the same key are idempotent and last-writer-wins is
//! safe.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

use crate::domain::models::{Judgement, ModelParams, Sample};

/// Content-addressed cache key.
///
/// Deterministic SHA-256 over the sample content the prompt depends on, the
/// model identity, the rendered prompt, and the canonicalized call
/// parameters. Length-prefixed fields keep distinct inputs from colliding
/// through concatenation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(sample: &Sample, model_id: &str, prompt: &str, params: &ModelParams) -> Self {
        let mut hasher = Sha256::new();
        for field in [
            sample.sample_id.as_str(),
            sample.query.as_str(),
            sample.candidate.as_str(),
            model_id,
            prompt,
            params.canonical_string().as_str(),
        ] {
            hasher.update(field.len().to_le_bytes());
            hasher.update(field.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache backend failure. Always recoverable: callers degrade to miss/no-op.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache entry corrupt: {0}")]
    Corrupt(String),
}

/// Port trait for judgement cache backends.
#[async_trait]
pub trait JudgementCache: Send + Sync {
    /// Look up a previously computed judgement.
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Judgement>, CacheError>;

    /// Store a computed judgement. Last-writer-wins on key conflict.
    async fn store(&self, key: &CacheKey, judgement: &Judgement) -> Result<(), CacheError>;
}
