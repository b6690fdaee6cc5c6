//! JSONL dataset source: one sample per line.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

use crate::domain::models::Sample;
use crate::domain::ports::dataset::{DatasetError, DatasetSource};

/// File-backed dataset. Line order is the sample order, which makes the
/// chunk plan deterministic across restarts as long as the file is unchanged.
pub struct JsonlDataset {
    path: PathBuf,
    dataset_ref: String,
}

impl JsonlDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let dataset_ref = path.display().to_string();
        Self { path, dataset_ref }
    }
}

#[async_trait]
impl DatasetSource for JsonlDataset {
    fn dataset_ref(&self) -> &str {
        &self.dataset_ref
    }

    async fn load(&self) -> Result<Vec<Sample>, DatasetError> {
        let contents = fs::read_to_string(&self.path)
            .await
            .map_err(|e| DatasetError::Unavailable(format!("{}: {e}", self.dataset_ref)))?;

        let mut samples = Vec::new();
        for (position, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let sample: Sample =
                serde_json::from_str(line).map_err(|e| DatasetError::MalformedRecord {
                    position: position + 1,
                    message: e.to_string(),
                })?;
            samples.push(sample);
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"sample_id":"s1","query":"q1","candidate":"c1"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"sample_id":"s2","query":"q2","candidate":"c2"}}"#).unwrap();
        file.flush().unwrap();

        let dataset = JsonlDataset::new(file.path());
        let samples = dataset.load().await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].sample_id, "s1");
        assert_eq!(samples[1].sample_id, "s2");
    }

    #[tokio::test]
    async fn test_malformed_line_reports_position() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"sample_id":"s1","query":"q","candidate":"c"}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        file.flush().unwrap();

        let dataset = JsonlDataset::new(file.path());
        match dataset.load().await {
            Err(DatasetError::MalformedRecord { position, .. }) => assert_eq!(position, 2),
            other => panic!("expected MalformedRecord, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let dataset = JsonlDataset::new("/nonexistent/samples.jsonl");
        assert!(matches!(
            dataset.load().await,
            Err(DatasetError::Unavailable(_))
        ));
    }
}
