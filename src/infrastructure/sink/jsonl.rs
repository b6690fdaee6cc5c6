//! JSONL output sink: one directory per run store, append-only record files
//! plus a manifest document.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::models::{EnsembleResult, Judgement, RunManifest};
use crate::domain::ports::sink::{OutputSink, SinkError};

/// File-based sink.
///
/// Layout under the configured directory:
/// - `manifest-<run_id>.json` — manifest document, rewritten at chunk
///   completion (content is append-only: chunk markers are only ever added)
/// - `judgements-<run_id>.jsonl` — one judgement per line
/// - `ensembles-<run_id>.jsonl` — one ensemble result per line
pub struct JsonlSink {
    dir: PathBuf,

    /// Serializes manifest read-modify-write cycles
    manifest_lock: Mutex<()>,
}

impl JsonlSink {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        Ok(Self {
            dir,
            manifest_lock: Mutex::new(()),
        })
    }

    fn manifest_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("manifest-{run_id}.json"))
    }

    fn records_path(&self, kind: &str, run_id: &str) -> PathBuf {
        self.dir.join(format!("{kind}-{run_id}.jsonl"))
    }

    async fn append_lines<T: serde::Serialize>(
        &self,
        path: PathBuf,
        records: &[T],
    ) -> Result<(), SinkError> {
        let mut buffer = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn write_manifest(&self, manifest: &RunManifest) -> Result<(), SinkError> {
        let payload = serde_json::to_string_pretty(manifest)
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        fs::write(self.manifest_path(&manifest.run_id), payload)
            .await
            .map_err(|e| SinkError::WriteFailed(e.to_string()))
    }

    async fn read_manifest(&self, run_id: &str) -> Result<Option<RunManifest>, SinkError> {
        let path = self.manifest_path(run_id);
        match fs::read_to_string(&path).await {
            Ok(payload) => serde_json::from_str(&payload)
                .map(Some)
                .map_err(|e| SinkError::WriteFailed(format!("corrupt manifest: {e}"))),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(SinkError::Unavailable(error.to_string())),
        }
    }
}

#[async_trait]
impl OutputSink for JsonlSink {
    async fn begin_run(&self, manifest: &RunManifest) -> Result<(), SinkError> {
        let _guard = self.manifest_lock.lock().await;
        self.write_manifest(manifest).await
    }

    async fn load_manifest(&self, run_id: &str) -> Result<Option<RunManifest>, SinkError> {
        let _guard = self.manifest_lock.lock().await;
        self.read_manifest(run_id).await
    }

    async fn write_judgements(
        &self,
        run_id: &str,
        judgements: &[Judgement],
    ) -> Result<(), SinkError> {
        self.append_lines(self.records_path("judgements", run_id), judgements)
            .await
    }

    async fn write_ensembles(
        &self,
        run_id: &str,
        results: &[EnsembleResult],
    ) -> Result<(), SinkError> {
        self.append_lines(self.records_path("ensembles", run_id), results)
            .await
    }

    async fn mark_chunk_complete(
        &self,
        run_id: &str,
        chunk_index: usize,
    ) -> Result<(), SinkError> {
        let _guard = self.manifest_lock.lock().await;
        let mut manifest = self
            .read_manifest(run_id)
            .await?
            .ok_or_else(|| SinkError::UnknownRun(run_id.to_string()))?;
        manifest.mark_chunk_complete(chunk_index, chrono::Utc::now());
        self.write_manifest(&manifest).await
    }

    async fn finalize_run(&self, _run_id: &str) -> Result<(), SinkError> {
        // The manifest's chunk markers already capture completion; nothing
        // further to record in the file layout.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Chunk, ChunkPlan};

    fn manifest() -> RunManifest {
        let plan = ChunkPlan {
            chunk_size: 1,
            chunks: vec![Chunk {
                index: 0,
                sample_ids: vec!["s1".into()],
            }],
        };
        RunManifest::new("ds", vec![], serde_json::json!({}), &plan)
    }

    #[tokio::test]
    async fn test_manifest_roundtrip_and_completion() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::open(dir.path()).await.unwrap();
        let manifest = manifest();

        sink.begin_run(&manifest).await.unwrap();
        sink.mark_chunk_complete(&manifest.run_id, 0).await.unwrap();

        let loaded = sink
            .load_manifest(&manifest.run_id)
            .await
            .unwrap()
            .expect("manifest on disk");
        assert!(loaded.is_chunk_complete(0));
    }

    #[tokio::test]
    async fn test_mark_unknown_run_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::open(dir.path()).await.unwrap();
        assert!(matches!(
            sink.mark_chunk_complete("missing", 0).await,
            Err(SinkError::UnknownRun(_))
        ));
    }

    #[tokio::test]
    async fn test_records_append_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::open(dir.path()).await.unwrap();
        let manifest = manifest();
        sink.begin_run(&manifest).await.unwrap();

        let result = EnsembleResult {
            sample_id: "s1".to_string(),
            final_label: crate::domain::models::FinalLabel::Abstain,
            final_confidence: 0.0,
            disagreement_metrics: crate::domain::models::DisagreementMetrics::empty(),
            flags: vec!["insufficient_votes".to_string()],
        };
        sink.write_ensembles(&manifest.run_id, std::slice::from_ref(&result))
            .await
            .unwrap();
        sink.write_ensembles(&manifest.run_id, &[result]).await.unwrap();

        let contents = std::fs::read_to_string(
            dir.path().join(format!("ensembles-{}.jsonl", manifest.run_id)),
        )
        .unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
