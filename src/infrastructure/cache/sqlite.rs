//! SQLite judgement cache: durable across processes, which is what protects
//! resumed runs from paying for provider calls a crashed run already made.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::models::Judgement;
use crate::domain::ports::cache::{CacheError, CacheKey, JudgementCache};

/// Durable cache backend. One row per content-addressed key; writes are
/// last-writer-wins (`INSERT OR REPLACE`), which is safe because equal keys
/// imply equal computations.
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    /// Open (creating if missing) the cache database at `path`.
    pub async fn open(path: &str) -> Result<Self, CacheError> {
        ensure_parent_dir(path)?;

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| CacheError::Unavailable(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS judgement_cache (
                key TEXT PRIMARY KEY,
                judgement TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (shared with the sqlite sink in typical runs).
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, CacheError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS judgement_cache (
                key TEXT PRIMARY KEY,
                judgement TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }
}

fn ensure_parent_dir(path: &str) -> Result<(), CacheError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        }
    }
    Ok(())
}

#[async_trait]
impl JudgementCache for SqliteCache {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Judgement>, CacheError> {
        let row = sqlx::query("SELECT judgement FROM judgement_cache WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        match row {
            Some(row) => {
                let payload: String = row.get("judgement");
                let judgement = serde_json::from_str(&payload)
                    .map_err(|e| CacheError::Corrupt(e.to_string()))?;
                Ok(Some(judgement))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, key: &CacheKey, judgement: &Judgement) -> Result<(), CacheError> {
        let payload = serde_json::to_string(judgement)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;

        sqlx::query("INSERT OR REPLACE INTO judgement_cache (key, judgement) VALUES (?, ?)")
            .bind(key.as_str())
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{JudgeLabel, ModelParams, Sample};

    async fn test_cache() -> SqliteCache {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        SqliteCache::with_pool(pool).await.unwrap()
    }

    fn judgement(confidence: f64) -> Judgement {
        Judgement {
            sample_id: "s1".to_string(),
            model_id: "m1".to_string(),
            provider: "mock".to_string(),
            label: JudgeLabel::Partially,
            score: Some(2.0),
            confidence,
            rationale: Some("half-covers the query".to_string()),
            raw_text: Some("{}".to_string()),
            latency_ms: 40,
            attempts: 2,
            cache_hit: false,
            warnings: vec!["attempt 1/3 failed (timeout): timed out".to_string()],
        }
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_all_fields() {
        let cache = test_cache().await;
        let sample = Sample::new("s1", "q", "c");
        let key = CacheKey::compute(&sample, "m1", "prompt", &ModelParams::default());

        let stored = judgement(0.6);
        cache.store(&key, &stored).await.unwrap();

        let hit = cache.lookup(&key).await.unwrap().expect("entry present");
        assert_eq!(hit, stored);
    }

    #[tokio::test]
    async fn test_miss_on_unknown_key() {
        let cache = test_cache().await;
        let sample = Sample::new("s-unknown", "q", "c");
        let key = CacheKey::compute(&sample, "m1", "prompt", &ModelParams::default());
        assert!(cache.lookup(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_on_same_key() {
        let cache = test_cache().await;
        let sample = Sample::new("s1", "q", "c");
        let key = CacheKey::compute(&sample, "m1", "prompt", &ModelParams::default());

        cache.store(&key, &judgement(0.6)).await.unwrap();
        cache.store(&key, &judgement(0.9)).await.unwrap();

        let hit = cache.lookup(&key).await.unwrap().unwrap();
        assert!((hit.confidence - 0.9).abs() < f64::EPSILON);
    }
}
