use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cache::index::{VectorIndex, atomic_write};
use crate::error::AttestError;

/// One human correction, stored append-only and indexed by claim embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub original_claim: String,
    pub system_verdict: String,
    pub human_correction: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Default number of past corrections injected into agent prompts.
pub const DEFAULT_TOP_K: usize = 3;

/// Append-only store of human corrections with nearest-neighbour retrieval.
/// The k nearest past mistakes for a new claim are rendered into the
/// planner and synthesizer prompts as few-shot warnings.
pub struct FeedbackStore {
    state: RwLock<FeedbackState>,
    index_path: PathBuf,
    records_path: PathBuf,
}

struct FeedbackState {
    index: VectorIndex,
    entries: Vec<FeedbackEntry>,
}

impl FeedbackStore {
    pub async fn open(data_dir: &std::path::Path, dim: usize) -> Result<Self, AttestError> {
        let index_path = data_dir.join("feedback_vectors.bin");
        let records_path = data_dir.join("feedback_records.json");
        let index = VectorIndex::load(&index_path, dim).await?;
        let entries: Vec<FeedbackEntry> = match tokio::fs::read(&records_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AttestError::Other(format!("feedback store corrupt: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if index.len() != entries.len() {
            return Err(AttestError::Other(format!(
                "feedback index/store desynchronized: {} vectors vs {} entries",
                index.len(),
                entries.len()
            )));
        }
        tracing::info!(entries = entries.len(), "feedback store loaded");
        Ok(Self {
            state: RwLock::new(FeedbackState { index, entries }),
            index_path,
            records_path,
        })
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Record a correction together with its claim embedding.
    pub async fn record(
        &self,
        entry: FeedbackEntry,
        vector: Vec<f32>,
    ) -> Result<(), AttestError> {
        let mut state = self.state.write().await;
        state.index.push(vector)?;
        state.entries.push(entry);

        state.index.persist(&self.index_path).await?;
        let bytes = serde_json::to_vec(&state.entries)
            .map_err(|e| AttestError::Other(format!("feedback serialize failed: {e}")))?;
        atomic_write(&self.records_path, &bytes).await?;
        tracing::info!(total = state.entries.len(), "feedback recorded");
        Ok(())
    }

    /// Render the k nearest past corrections as a prompt block. Empty
    /// string when nothing relevant is stored.
    pub async fn relevant_examples(&self, vector: &[f32], k: usize) -> String {
        let state = self.state.read().await;
        if state.entries.is_empty() {
            return String::new();
        }
        let hits = state.index.search(vector, k);
        let mut out = String::new();
        for (i, (id, _score)) in hits.iter().enumerate() {
            let Some(entry) = state.entries.get(*id) else {
                continue;
            };
            let notes = if entry.notes.is_empty() {
                "none"
            } else {
                entry.notes.as_str()
            };
            out.push_str(&format!(
                "Example {n}:\n- Original claim: \"{claim}\"\n- System verdict (WRONG): {verdict}\n- Correct verdict: {correction}\n- Notes: {notes}\n\n",
                n = i + 1,
                claim = entry.original_claim,
                verdict = entry.system_verdict,
                correction = entry.human_correction,
            ));
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::l2_normalize;

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        l2_normalize(&mut v);
        v
    }

    fn entry(claim: &str) -> FeedbackEntry {
        FeedbackEntry {
            original_claim: claim.to_string(),
            system_verdict: "TRUE".to_string(),
            human_correction: "FALSE".to_string(),
            notes: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn empty_store_renders_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedbackStore::open(dir.path(), 3).await.unwrap();
        assert_eq!(store.relevant_examples(&unit(vec![1.0, 0.0, 0.0]), 3).await, "");
    }

    #[tokio::test]
    async fn nearest_correction_retrieved_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedbackStore::open(dir.path(), 3).await.unwrap();
        store
            .record(entry("claim about storms"), unit(vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        store
            .record(entry("claim about elections"), unit(vec![0.0, 1.0, 0.0]))
            .await
            .unwrap();

        let rendered = store
            .relevant_examples(&unit(vec![0.95, 0.05, 0.0]), 1)
            .await;
        assert!(rendered.contains("claim about storms"));
        assert!(!rendered.contains("claim about elections"));
        assert!(rendered.contains("Correct verdict: FALSE"));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FeedbackStore::open(dir.path(), 2).await.unwrap();
            store.record(entry("persisted"), unit(vec![1.0, 0.0])).await.unwrap();
        }
        let store = FeedbackStore::open(dir.path(), 2).await.unwrap();
        assert_eq!(store.len().await, 1);
        let rendered = store.relevant_examples(&unit(vec![1.0, 0.0]), DEFAULT_TOP_K).await;
        assert!(rendered.contains("persisted"));
    }
}
