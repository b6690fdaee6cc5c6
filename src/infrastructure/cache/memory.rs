//! In-memory judgement cache backed by a moka TTL cache.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::{CacheConfig, Judgement};
use crate::domain::ports::cache::{CacheError, CacheKey, JudgementCache};

/// Process-local cache. Fast path for reruns within one process and the
/// default backend; judgements are shared across workers behind `Arc`s so a
/// hit never clones the full record until it is returned.
pub struct MemoryCache {
    entries: Cache<String, Arc<Judgement>>,
}

impl MemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.capacity);
        if let Some(ttl_secs) = config.ttl_secs {
            builder = builder.time_to_live(Duration::from_secs(ttl_secs));
        }
        Self {
            entries: builder.build(),
        }
    }
}

#[async_trait]
impl JudgementCache for MemoryCache {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Judgement>, CacheError> {
        Ok(self
            .entries
            .get(key.as_str())
            .await
            .map(|entry| (*entry).clone()))
    }

    async fn store(&self, key: &CacheKey, judgement: &Judgement) -> Result<(), CacheError> {
        self.entries
            .insert(key.as_str().to_string(), Arc::new(judgement.clone()))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{JudgeLabel, ModelParams, Sample};

    fn judgement() -> Judgement {
        Judgement {
            sample_id: "s1".to_string(),
            model_id: "m1".to_string(),
            provider: "mock".to_string(),
            label: JudgeLabel::Relevant,
            score: None,
            confidence: 0.9,
            rationale: None,
            raw_text: None,
            latency_ms: 3,
            attempts: 1,
            cache_hit: false,
            warnings: vec![],
        }
    }

    #[tokio::test]
    async fn test_store_then_lookup_returns_equal_judgement() {
        let cache = MemoryCache::new(&CacheConfig::default());
        let sample = Sample::new("s1", "q", "c");
        let key = CacheKey::compute(&sample, "m1", "prompt", &ModelParams::default());

        assert!(cache.lookup(&key).await.unwrap().is_none());

        let stored = judgement();
        cache.store(&key, &stored).await.unwrap();

        let hit = cache.lookup(&key).await.unwrap().expect("entry present");
        assert_eq!(hit, stored);
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let cache = MemoryCache::new(&CacheConfig::default());
        let sample = Sample::new("s1", "q", "c");
        let key = CacheKey::compute(&sample, "m1", "prompt", &ModelParams::default());

        let first = judgement();
        let mut second = judgement();
        second.confidence = 0.5;

        cache.store(&key, &first).await.unwrap();
        cache.store(&key, &second).await.unwrap();

        let hit = cache.lookup(&key).await.unwrap().unwrap();
        assert!((hit.confidence - 0.5).abs() < f64::EPSILON);
    }
}
