pub mod index;
pub mod store;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::cache::index::VectorIndex;
use crate::cache::store::{CacheRecord, Freshness, RecordStore, freshness};
use crate::error::AttestError;
use crate::plan::Volatility;
use crate::synthesizer::Verdict;

/// Semantic verdict cache: a flat inner-product index over claim embeddings
/// plus a companion record store.
///
/// Callers embed once and pass vectors in, so one embedding serves cache
/// lookup and feedback retrieval alike. The index/store pair is guarded by
/// a single writer lock; persistence is temp-then-rename on both files.
pub struct SemanticCache {
    state: RwLock<CacheState>,
    index_path: PathBuf,
    store_path: PathBuf,
    threshold: f32,
}

struct CacheState {
    index: VectorIndex,
    store: RecordStore,
}

impl SemanticCache {
    /// Open (or create) the cache under `data_dir`.
    pub async fn open(data_dir: &std::path::Path, dim: usize, threshold: f32) -> Result<Self, AttestError> {
        let index_path = data_dir.join("kb_vectors.bin");
        let store_path = data_dir.join("kb_records.json");
        let index = VectorIndex::load(&index_path, dim).await?;
        let store = RecordStore::load(&store_path).await?;
        if index.len() != store.len() {
            return Err(AttestError::Other(format!(
                "cache index/store desynchronized: {} vectors vs {} records",
                index.len(),
                store.len()
            )));
        }
        tracing::info!(entries = store.len(), "semantic cache loaded");
        Ok(Self {
            state: RwLock::new(CacheState { index, store }),
            index_path,
            store_path,
            threshold,
        })
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.store.is_empty()
    }

    /// Look up a claim by its embedding. A hit requires top-1 similarity at
    /// or above the threshold; it bumps the record's hit counter and returns
    /// the stored verdict flagged `cached`.
    pub async fn lookup(&self, vector: &[f32]) -> Option<Verdict> {
        let (id, similarity) = {
            let state = self.state.read().await;
            state.index.top1(vector)?
        };
        if similarity < self.threshold {
            tracing::debug!(similarity, threshold = self.threshold, "cache near-miss");
            return None;
        }

        let mut state = self.state.write().await;
        let record = state.store.get_mut(id)?;
        record.hit_count += 1;
        let mut verdict = record.verdict.clone();
        verdict.cached = true;
        tracing::info!(similarity, hit_count = record.hit_count, "cache hit");

        // Hit counts steer the refresher; losing one to a crash is fine,
        // so persistence failures only log.
        if let Err(e) = state.store.persist(&self.store_path).await {
            tracing::warn!("failed to persist hit count: {e}");
        }
        Some(verdict)
    }

    /// Insert a freshly synthesized verdict iff its volatility allows
    /// caching. Returns the new id, or None when skipped.
    pub async fn insert(
        &self,
        claim_text: &str,
        vector: Vec<f32>,
        verdict: &Verdict,
        volatility: Volatility,
        topic_category: &str,
    ) -> Result<Option<usize>, AttestError> {
        if !volatility.cacheable() {
            tracing::debug!(?volatility, "skipping cache insert for volatile claim");
            return Ok(None);
        }

        let mut state = self.state.write().await;
        let id = state.index.push(vector)?;
        let record_id = state.store.push(CacheRecord {
            claim_text: claim_text.to_string(),
            claim_hash: crate::plan::Claim::new(claim_text).hash,
            verdict: Verdict {
                cached: false,
                ..verdict.clone()
            },
            volatility,
            topic_category: topic_category.to_string(),
            last_verified_at: Utc::now(),
            hit_count: 0,
        });
        debug_assert_eq!(id, record_id);

        state.index.persist(&self.index_path).await?;
        state.store.persist(&self.store_path).await?;
        tracing::info!(id, topic_category, "cached verdict");
        Ok(Some(id))
    }

    /// STALE entries in the given hot categories, ordered by hit count
    /// descending then last-verified ascending, capped at `max`.
    pub async fn stale_hot_entries(
        &self,
        hot_categories: &[String],
        now: DateTime<Utc>,
        max: usize,
    ) -> Vec<(usize, String)> {
        let state = self.state.read().await;
        let mut stale: Vec<(usize, u64, DateTime<Utc>, String)> = state
            .store
            .iter()
            .filter(|(_, r)| hot_categories.iter().any(|c| c == &r.topic_category))
            .filter(|(_, r)| freshness(r, now) == Freshness::Stale)
            .map(|(id, r)| (id, r.hit_count, r.last_verified_at, r.claim_text.clone()))
            .collect();
        stale.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        stale
            .into_iter()
            .take(max)
            .map(|(id, _, _, claim)| (id, claim))
            .collect()
    }

    /// Replace a record's verdict after a background re-verification and
    /// stamp it verified-now.
    pub async fn update_entry(&self, id: usize, verdict: &Verdict) -> Result<(), AttestError> {
        let mut state = self.state.write().await;
        let Some(record) = state.store.get_mut(id) else {
            return Err(AttestError::Other(format!("no cache record with id {id}")));
        };
        record.verdict = Verdict {
            cached: false,
            ..verdict.clone()
        };
        record.last_verified_at = Utc::now();
        state.store.persist(&self.store_path).await
    }

    /// Touch a record's timestamp without changing the verdict (used when a
    /// refresh run produced nothing better).
    pub async fn touch_entry(&self, id: usize) -> Result<(), AttestError> {
        let mut state = self.state.write().await;
        let Some(record) = state.store.get_mut(id) else {
            return Err(AttestError::Other(format!("no cache record with id {id}")));
        };
        record.last_verified_at = Utc::now();
        state.store.persist(&self.store_path).await
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

    async fn cache(dim: usize) -> (SemanticCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SemanticCache::open(dir.path(), dim, 0.85).await.unwrap();
        (cache, dir)
    }

    #[tokio::test]
    async fn insert_requires_low_volatility() {
        let (cache, _dir) = cache(3).await;
        let verdict = Verdict::unverified("x");

        let skipped = cache
            .insert("hot claim", unit(vec![1.0, 0.0, 0.0]), &verdict, Volatility::High, "weather")
            .await
            .unwrap();
        assert!(skipped.is_none());
        assert!(cache.is_empty().await);

        let inserted = cache
            .insert("stable claim", unit(vec![1.0, 0.0, 0.0]), &verdict, Volatility::Low, "general")
            .await
            .unwrap();
        assert_eq!(inserted, Some(0));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn lookup_honors_threshold_and_flags_cached() {
        let (cache, _dir) = cache(3).await;
        let verdict = Verdict::unverified("reason");
        cache
            .insert("claim", unit(vec![1.0, 0.0, 0.0]), &verdict, Volatility::Low, "general")
            .await
            .unwrap();

        // Orthogonal query: similarity 0 < 0.85.
        assert!(cache.lookup(&unit(vec![0.0, 1.0, 0.0])).await.is_none());

        // Near-identical query: hit, flagged cached.
        let hit = cache.lookup(&unit(vec![1.0, 0.01, 0.0])).await.unwrap();
        assert!(hit.cached);
    }

    #[tokio::test]
    async fn hit_count_increments_on_lookup() {
        let (cache, dir) = cache(3).await;
        let verdict = Verdict::unverified("reason");
        cache
            .insert("claim", unit(vec![1.0, 0.0, 0.0]), &verdict, Volatility::Low, "sports")
            .await
            .unwrap();

        cache.lookup(&unit(vec![1.0, 0.0, 0.0])).await.unwrap();
        cache.lookup(&unit(vec![1.0, 0.0, 0.0])).await.unwrap();

        let store = RecordStore::load(&dir.path().join("kb_records.json")).await.unwrap();
        assert_eq!(store.get(0).unwrap().hit_count, 2);
    }

    #[tokio::test]
    async fn reopen_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = SemanticCache::open(dir.path(), 3, 0.85).await.unwrap();
            cache
                .insert("persisted", unit(vec![0.0, 1.0, 0.0]), &Verdict::unverified("r"), Volatility::Static, "general")
                .await
                .unwrap();
        }
        let cache = SemanticCache::open(dir.path(), 3, 0.85).await.unwrap();
        assert_eq!(cache.len().await, 1);
        assert!(cache.lookup(&unit(vec![0.0, 1.0, 0.0])).await.is_some());
    }

    #[tokio::test]
    async fn stale_selection_orders_by_hits_then_age() {
        let (cache, _dir) = cache(2).await;
        let verdict = Verdict::unverified("r");
        let hot = vec!["sports".to_string()];

        for (i, claim) in ["a", "b", "c"].iter().enumerate() {
            let mut v = vec![0.0, 0.0];
            v[i % 2] = 1.0;
            cache
                .insert(claim, unit(v), &verdict, Volatility::Low, "sports")
                .await
                .unwrap();
        }
        {
            // Age all three into the STALE band (sports TTL is 6h) and give
            // "b" the most hits.
            let mut state = cache.state.write().await;
            for id in 0..3 {
                state.store.get_mut(id).unwrap().last_verified_at =
                    Utc::now() - chrono::Duration::hours(7);
            }
            state.store.get_mut(1).unwrap().hit_count = 9;
        }

        let stale = cache.stale_hot_entries(&hot, Utc::now(), 2).await;
        assert_eq!(stale.len(), 2);
        assert_eq!(stale[0].1, "b");
    }

    #[tokio::test]
    async fn update_entry_refreshes_timestamp() {
        let (cache, _dir) = cache(2).await;
        cache
            .insert("c", unit(vec![1.0, 0.0]), &Verdict::unverified("old"), Volatility::Low, "sports")
            .await
            .unwrap();
        {
            let mut state = cache.state.write().await;
            state.store.get_mut(0).unwrap().last_verified_at =
                Utc::now() - chrono::Duration::hours(7);
        }
        cache.update_entry(0, &Verdict::unverified("new")).await.unwrap();
        let state = cache.state.read().await;
        let rec = state.store.get(0).unwrap();
        assert_eq!(rec.verdict.reason, "new");
        assert_eq!(freshness(rec, Utc::now()), Freshness::Fresh);
    }
}
