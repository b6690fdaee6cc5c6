//! SQLite output sink: the audit store for judgements, ensemble results,
//! and the run manifest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::models::{ChunkState, EnsembleResult, Judgement, RunManifest};
use crate::domain::ports::sink::{OutputSink, SinkError};

/// Durable result store.
///
/// Chunk re-processing after a crash (written but not marked complete)
/// replays the same content-addressed records, so judgement and ensemble
/// writes are `INSERT OR REPLACE` on their natural keys.
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub async fn open(path: &str) -> Result<Self, SinkError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SinkError::Unavailable(e.to_string()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| SinkError::Unavailable(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, SinkError> {
        let schema = [
            "CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                dataset_ref TEXT NOT NULL,
                models TEXT NOT NULL,
                strategy TEXT NOT NULL,
                strategy_params TEXT NOT NULL,
                code_version TEXT,
                notes TEXT,
                finalized_at TEXT
            )",
            "CREATE TABLE IF NOT EXISTS chunks (
                run_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                sample_count INTEGER NOT NULL,
                completed_at TEXT,
                PRIMARY KEY (run_id, chunk_index)
            )",
            "CREATE TABLE IF NOT EXISTS judgements (
                run_id TEXT NOT NULL,
                sample_id TEXT NOT NULL,
                model_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                label TEXT NOT NULL,
                score REAL,
                confidence REAL NOT NULL,
                rationale TEXT,
                raw_text TEXT,
                latency_ms INTEGER NOT NULL,
                attempts INTEGER NOT NULL,
                cache_hit INTEGER NOT NULL,
                warnings TEXT NOT NULL,
                PRIMARY KEY (run_id, sample_id, model_id)
            )",
            "CREATE TABLE IF NOT EXISTS ensembles (
                run_id TEXT NOT NULL,
                sample_id TEXT NOT NULL,
                final_label TEXT NOT NULL,
                final_confidence REAL NOT NULL,
                disagreeing_fraction REAL NOT NULL,
                confidence_spread REAL NOT NULL,
                flags TEXT NOT NULL,
                PRIMARY KEY (run_id, sample_id)
            )",
        ];
        for statement in schema {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        }
        Ok(Self { pool })
    }
}

fn to_sink_err(error: sqlx::Error) -> SinkError {
    SinkError::WriteFailed(error.to_string())
}

#[async_trait]
impl OutputSink for SqliteSink {
    async fn begin_run(&self, manifest: &RunManifest) -> Result<(), SinkError> {
        let models = serde_json::to_string(&manifest.models)
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?;

        sqlx::query(
            "INSERT INTO runs
                (run_id, created_at, dataset_ref, models, strategy, strategy_params,
                 code_version, notes)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&manifest.run_id)
        .bind(manifest.created_at.to_rfc3339())
        .bind(&manifest.dataset_ref)
        .bind(models)
        .bind(&manifest.strategy)
        .bind(manifest.strategy_params.to_string())
        .bind(&manifest.code_version)
        .bind(&manifest.notes)
        .execute(&self.pool)
        .await
        .map_err(to_sink_err)?;

        for state in &manifest.chunks {
            sqlx::query(
                "INSERT INTO chunks (run_id, chunk_index, sample_count, completed_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&manifest.run_id)
            .bind(i64::try_from(state.index).unwrap_or(i64::MAX))
            .bind(i64::try_from(state.sample_count).unwrap_or(i64::MAX))
            .bind(state.completed_at.map(|at| at.to_rfc3339()))
            .execute(&self.pool)
            .await
            .map_err(to_sink_err)?;
        }
        Ok(())
    }

    async fn load_manifest(&self, run_id: &str) -> Result<Option<RunManifest>, SinkError> {
        let Some(run_row) = sqlx::query(
            "SELECT run_id, created_at, dataset_ref, models, strategy, strategy_params,
                    code_version, notes
             FROM runs WHERE run_id = ?",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(to_sink_err)?
        else {
            return Ok(None);
        };

        let chunk_rows = sqlx::query(
            "SELECT chunk_index, sample_count, completed_at
             FROM chunks WHERE run_id = ? ORDER BY chunk_index",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(to_sink_err)?;

        let created_at: String = run_row.get("created_at");
        let models: String = run_row.get("models");
        let strategy_params: String = run_row.get("strategy_params");

        let chunks = chunk_rows
            .iter()
            .map(|row| {
                let completed_at: Option<String> = row.get("completed_at");
                let index: i64 = row.get("chunk_index");
                let sample_count: i64 = row.get("sample_count");
                ChunkState {
                    index: usize::try_from(index).unwrap_or(0),
                    sample_count: usize::try_from(sample_count).unwrap_or(0),
                    completed_at: completed_at
                        .as_deref()
                        .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
                        .map(|at| at.with_timezone(&Utc)),
                }
            })
            .collect();

        Ok(Some(RunManifest {
            run_id: run_row.get("run_id"),
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| SinkError::WriteFailed(format!("corrupt created_at: {e}")))?
                .with_timezone(&Utc),
            dataset_ref: run_row.get("dataset_ref"),
            models: serde_json::from_str(&models)
                .map_err(|e| SinkError::WriteFailed(format!("corrupt model snapshot: {e}")))?,
            strategy: run_row.get("strategy"),
            strategy_params: serde_json::from_str(&strategy_params)
                .map_err(|e| SinkError::WriteFailed(format!("corrupt strategy params: {e}")))?,
            chunks,
            code_version: run_row.get("code_version"),
            notes: run_row.get("notes"),
        }))
    }

    async fn write_judgements(
        &self,
        run_id: &str,
        judgements: &[Judgement],
    ) -> Result<(), SinkError> {
        let mut tx = self.pool.begin().await.map_err(to_sink_err)?;
        for judgement in judgements {
            let warnings = serde_json::to_string(&judgement.warnings)
                .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
            sqlx::query(
                "INSERT OR REPLACE INTO judgements
                    (run_id, sample_id, model_id, provider, label, score, confidence,
                     rationale, raw_text, latency_ms, attempts, cache_hit, warnings)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(run_id)
            .bind(&judgement.sample_id)
            .bind(&judgement.model_id)
            .bind(&judgement.provider)
            .bind(judgement.label.as_str())
            .bind(judgement.score)
            .bind(judgement.confidence)
            .bind(&judgement.rationale)
            .bind(&judgement.raw_text)
            .bind(i64::try_from(judgement.latency_ms).unwrap_or(i64::MAX))
            .bind(i64::from(judgement.attempts))
            .bind(i32::from(judgement.cache_hit))
            .bind(warnings)
            .execute(&mut *tx)
            .await
            .map_err(to_sink_err)?;
        }
        tx.commit().await.map_err(to_sink_err)
    }

    async fn write_ensembles(
        &self,
        run_id: &str,
        results: &[EnsembleResult],
    ) -> Result<(), SinkError> {
        let mut tx = self.pool.begin().await.map_err(to_sink_err)?;
        for result in results {
            let flags = serde_json::to_string(&result.flags)
                .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
            sqlx::query(
                "INSERT OR REPLACE INTO ensembles
                    (run_id, sample_id, final_label, final_confidence,
                     disagreeing_fraction, confidence_spread, flags)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(run_id)
            .bind(&result.sample_id)
            .bind(result.final_label.to_string())
            .bind(result.final_confidence)
            .bind(result.disagreement_metrics.disagreeing_fraction)
            .bind(result.disagreement_metrics.confidence_spread)
            .bind(flags)
            .execute(&mut *tx)
            .await
            .map_err(to_sink_err)?;
        }
        tx.commit().await.map_err(to_sink_err)
    }

    async fn mark_chunk_complete(
        &self,
        run_id: &str,
        chunk_index: usize,
    ) -> Result<(), SinkError> {
        // Zero affected rows means an unknown chunk or one already marked;
        // both are harmless for an append-only marker.
        sqlx::query(
            "UPDATE chunks SET completed_at = ?
             WHERE run_id = ? AND chunk_index = ? AND completed_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(run_id)
        .bind(i64::try_from(chunk_index).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(to_sink_err)?;
        Ok(())
    }

    async fn finalize_run(&self, run_id: &str) -> Result<(), SinkError> {
        sqlx::query("UPDATE runs SET finalized_at = ? WHERE run_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(run_id)
            .execute(&self.pool)
            .await
            .map_err(to_sink_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        Chunk, ChunkPlan, DisagreementMetrics, FinalLabel, JudgeLabel,
    };

    async fn test_sink() -> SqliteSink {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        SqliteSink::with_pool(pool).await.unwrap()
    }

    fn manifest() -> RunManifest {
        let plan = ChunkPlan {
            chunk_size: 2,
            chunks: vec![
                Chunk {
                    index: 0,
                    sample_ids: vec!["s1".into(), "s2".into()],
                },
                Chunk {
                    index: 1,
                    sample_ids: vec!["s3".into()],
                },
            ],
        };
        RunManifest::new(
            "dataset.jsonl",
            vec![],
            serde_json::json!({"chunk_size": 2}),
            &plan,
        )
    }

    #[tokio::test]
    async fn test_manifest_roundtrip() {
        let sink = test_sink().await;
        let manifest = manifest();
        sink.begin_run(&manifest).await.unwrap();

        let loaded = sink
            .load_manifest(&manifest.run_id)
            .await
            .unwrap()
            .expect("manifest persisted");

        assert_eq!(loaded.run_id, manifest.run_id);
        assert_eq!(loaded.dataset_ref, "dataset.jsonl");
        assert_eq!(loaded.chunks.len(), 2);
        assert!(!loaded.is_chunk_complete(0));
    }

    #[tokio::test]
    async fn test_chunk_completion_persists() {
        let sink = test_sink().await;
        let manifest = manifest();
        sink.begin_run(&manifest).await.unwrap();

        sink.mark_chunk_complete(&manifest.run_id, 1).await.unwrap();

        let loaded = sink.load_manifest(&manifest.run_id).await.unwrap().unwrap();
        assert!(!loaded.is_chunk_complete(0));
        assert!(loaded.is_chunk_complete(1));
    }

    #[tokio::test]
    async fn test_load_manifest_unknown_run() {
        let sink = test_sink().await;
        assert!(sink.load_manifest("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_records() {
        let sink = test_sink().await;
        let manifest = manifest();
        sink.begin_run(&manifest).await.unwrap();

        let judgement = Judgement {
            sample_id: "s1".to_string(),
            model_id: "m1".to_string(),
            provider: "mock".to_string(),
            label: JudgeLabel::Relevant,
            score: None,
            confidence: 0.8,
            rationale: None,
            raw_text: Some("{}".to_string()),
            latency_ms: 10,
            attempts: 1,
            cache_hit: false,
            warnings: vec![],
        };
        let ensemble = EnsembleResult {
            sample_id: "s1".to_string(),
            final_label: FinalLabel::Relevant,
            final_confidence: 0.8,
            disagreement_metrics: DisagreementMetrics::empty(),
            flags: vec![],
        };

        sink.write_judgements(&manifest.run_id, &[judgement.clone()])
            .await
            .unwrap();
        sink.write_ensembles(&manifest.run_id, std::slice::from_ref(&ensemble))
            .await
            .unwrap();

        // Replaying the same chunk after a crash must not error
        sink.write_judgements(&manifest.run_id, &[judgement])
            .await
            .unwrap();
        sink.finalize_run(&manifest.run_id).await.unwrap();
    }
}
