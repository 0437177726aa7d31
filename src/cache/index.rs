use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::embed::dot;
use crate::error::AttestError;

/// Flat inner-product vector index. Row position is the vector id, shared
/// with the companion record store. Exhaustive search is exact and more
/// than fast enough at cache scale.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VectorIndex {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Append a vector, returning its id. Dimension mismatches are caller
    /// bugs and rejected loudly.
    pub fn push(&mut self, vector: Vec<f32>) -> Result<usize, AttestError> {
        if vector.len() != self.dim {
            return Err(AttestError::Other(format!(
                "vector dimension {} != index dimension {}",
                vector.len(),
                self.dim
            )));
        }
        self.vectors.push(vector);
        Ok(self.vectors.len() - 1)
    }

    /// Top-k ids by inner product, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, v)| (id, dot(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Best match, if any vector is indexed.
    pub fn top1(&self, query: &[f32]) -> Option<(usize, f32)> {
        self.search(query, 1).into_iter().next()
    }

    /// Load from disk; a missing file yields an empty index.
    pub async fn load(path: &Path, dim: usize) -> Result<Self, AttestError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let index: VectorIndex = bincode::deserialize(&bytes)
                    .map_err(|e| AttestError::Other(format!("vector index corrupt: {e}")))?;
                if index.dim != dim {
                    return Err(AttestError::Other(format!(
                        "vector index dimension {} != configured {}",
                        index.dim, dim
                    )));
                }
                Ok(index)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(dim)),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist atomically: write a temp file, then rename over the target.
    pub async fn persist(&self, path: &Path) -> Result<(), AttestError> {
        let bytes = bincode::serialize(self)
            .map_err(|e| AttestError::Other(format!("vector index serialize failed: {e}")))?;
        atomic_write(path, &bytes).await
    }
}

/// Temp-then-rename write. The temp name carries the PID so concurrent
/// processes never collide.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), AttestError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::l2_normalize;

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        l2_normalize(&mut v);
        v
    }

    #[test]
    fn push_and_search_rank_by_similarity() {
        let mut index = VectorIndex::new(3);
        index.push(unit(vec![1.0, 0.0, 0.0])).unwrap();
        index.push(unit(vec![0.0, 1.0, 0.0])).unwrap();
        index.push(unit(vec![0.9, 0.1, 0.0])).unwrap();

        let hits = index.search(&unit(vec![1.0, 0.0, 0.0]), 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].0, 2);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let mut index = VectorIndex::new(3);
        assert!(index.push(vec![1.0, 0.0]).is_err());
    }

    #[tokio::test]
    async fn persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");

        let mut index = VectorIndex::new(4);
        index.push(unit(vec![1.0, 2.0, 3.0, 4.0])).unwrap();
        index.persist(&path).await.unwrap();

        let loaded = VectorIndex::load(&path, 4).await.unwrap();
        assert_eq!(loaded.len(), 1);
        let (id, score) = loaded.top1(&unit(vec![1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(id, 0);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::load(&dir.path().join("none.bin"), 8).await.unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn wrong_dimension_on_load_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        VectorIndex::new(4).persist(&path).await.unwrap();
        assert!(VectorIndex::load(&path, 8).await.is_err());
    }
}
