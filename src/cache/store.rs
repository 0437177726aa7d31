use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::index::atomic_write;
use crate::error::AttestError;
use crate::plan::Volatility;
use crate::synthesizer::Verdict;

/// One cached verification outcome, keyed by its vector id (row position).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub claim_text: String,
    /// Immutable hash of the whitespace-normalized claim text.
    #[serde(default)]
    pub claim_hash: String,
    pub verdict: Verdict,
    pub volatility: Volatility,
    pub topic_category: String,
    pub last_verified_at: DateTime<Utc>,
    pub hit_count: u64,
}

/// Derived staleness of a cache record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

/// Per-category time-to-live. Hot, fast-moving categories go stale within
/// the hour; settled facts last a month.
pub fn ttl_for(category: &str) -> Duration {
    match category {
        "breaking_news" => Duration::minutes(30),
        "finance" => Duration::hours(1),
        "sports" => Duration::hours(6),
        "politics" => Duration::hours(12),
        "weather" => Duration::hours(1),
        "common_knowledge" | "historical" => Duration::days(30),
        _ => Duration::days(7),
    }
}

/// FRESH below one TTL, STALE between one and two, EXPIRED past two.
pub fn freshness(record: &CacheRecord, now: DateTime<Utc>) -> Freshness {
    let ttl = ttl_for(&record.topic_category);
    let age = now - record.last_verified_at;
    if age < ttl {
        Freshness::Fresh
    } else if age < ttl * 2 {
        Freshness::Stale
    } else {
        Freshness::Expired
    }
}

/// The companion record store for the vector index: a JSON file holding one
/// record per indexed vector, in id order.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RecordStore {
    records: Vec<CacheRecord>,
}

impl RecordStore {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&CacheRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut CacheRecord> {
        self.records.get_mut(id)
    }

    pub fn push(&mut self, record: CacheRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &CacheRecord)> {
        self.records.iter().enumerate()
    }

    pub async fn load(path: &Path) -> Result<Self, AttestError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AttestError::Other(format!("record store corrupt: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn persist(&self, path: &Path) -> Result<(), AttestError> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| AttestError::Other(format!("record store serialize failed: {e}")))?;
        atomic_write(path, &bytes).await
    }
}
