//! Chunk planner: deterministic partitioning of the sample sequence.

use crate::domain::models::{Chunk, ChunkPlan};
use crate::domain::EngineError;

/// Partition `sample_ids` into ordered, non-overlapping chunks of
/// `chunk_size`, the final chunk possibly smaller.
///
/// Pure function of its inputs: the same ordering and size always produce
/// the same plan, which is what lets a resumed run line its chunk indices up
/// with the manifest of the crashed one.
pub fn plan(sample_ids: &[String], chunk_size: usize) -> Result<ChunkPlan, EngineError> {
    if chunk_size == 0 {
        return Err(EngineError::InvalidConfig(
            "chunk_size must be greater than 0".to_string(),
        ));
    }

    let chunks = sample_ids
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, ids)| Chunk {
            index,
            sample_ids: ids.to_vec(),
        })
        .collect();

    Ok(ChunkPlan { chunk_size, chunks })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("s{i}")).collect()
    }

    #[test]
    fn test_plan_partitions_exactly() {
        let input = ids(10);
        let plan = plan(&input, 3).unwrap();

        assert_eq!(plan.chunks.len(), 4);
        assert_eq!(plan.chunks[3].sample_ids, vec!["s9"]);

        let concatenated: Vec<String> = plan
            .chunks
            .iter()
            .flat_map(|chunk| chunk.sample_ids.clone())
            .collect();
        assert_eq!(concatenated, input);
    }

    #[test]
    fn test_plan_exact_multiple() {
        let plan = plan(&ids(6), 3).unwrap();
        assert_eq!(plan.chunks.len(), 2);
        assert!(plan.chunks.iter().all(|chunk| chunk.len() == 3));
    }

    #[test]
    fn test_plan_empty_input() {
        let plan = plan(&[], 5).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.total_samples(), 0);
    }

    #[test]
    fn test_plan_rejects_zero_chunk_size() {
        let result = plan(&ids(3), 0);
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let input = ids(17);
        assert_eq!(plan(&input, 4).unwrap(), plan(&input, 4).unwrap());
    }
}
