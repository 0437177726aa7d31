use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::Tuning;
use crate::pipeline::Pipeline;
use crate::synthesizer::Conclusion;

/// Spawn the background refresher: every interval it picks the most-hit
/// STALE entries in hot categories, re-runs the pipeline for each, and
/// updates the cache record. A cooldown between items respects upstream
/// rate limits.
pub fn spawn_refresher(pipeline: Arc<Pipeline>, tuning: Tuning) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(tuning.refresh_interval_secs);
        let cooldown = Duration::from_secs(tuning.refresh_cooldown_secs);
        tracing::info!(
            interval_secs = tuning.refresh_interval_secs,
            hot = ?tuning.hot_categories,
            "background refresher started"
        );

        loop {
            tokio::time::sleep(interval).await;
            run_cycle(&pipeline, &tuning, cooldown).await;
        }
    })
}

/// One refresh cycle. Public for tests and one-shot maintenance runs.
pub async fn run_cycle(pipeline: &Arc<Pipeline>, tuning: &Tuning, cooldown: Duration) {
    let cache = pipeline.cache();
    let stale = cache
        .stale_hot_entries(&tuning.hot_categories, Utc::now(), tuning.refresh_max_items)
        .await;
    if stale.is_empty() {
        tracing::debug!("refresher: nothing stale");
        return;
    }
    tracing::info!(count = stale.len(), "refresher: updating stale entries");

    let mut refreshed = 0usize;
    for (id, claim_text) in stale {
        let verdict = pipeline.verify_fresh(&claim_text).await;
        let result = if verdict.conclusion == Conclusion::Unverified {
            // Nothing better came back; just stamp the record checked so it
            // leaves the stale window.
            cache.touch_entry(id).await
        } else {
            refreshed += 1;
            cache.update_entry(id, &verdict).await
        };
        if let Err(e) = result {
            tracing::warn!(id, "refresher failed to update record: {e}");
        }
        tokio::time::sleep(cooldown).await;
    }
    tracing::info!(refreshed, "refresher cycle complete");
}
