//! Cache and feedback store behavior over real (temp) files, no network.

use attest::cache::SemanticCache;
use attest::embed::l2_normalize;
use attest::feedback::{DEFAULT_TOP_K, FeedbackEntry, FeedbackStore};
use attest::plan::Volatility;
use attest::synthesizer::{Conclusion, Verdict};

fn unit(mut v: Vec<f32>) -> Vec<f32> {
    l2_normalize(&mut v);
    v
}

fn verdict(conclusion: Conclusion) -> Verdict {
    Verdict {
        conclusion,
        reason: "two independent high-trust sources agree".to_string(),
        style_analysis: None,
        key_evidence_snippet: "snippet".to_string(),
        key_evidence_source: "reuters.com".to_string(),
        cached: false,
        confidence: Some(0.9),
    }
}

#[tokio::test]
async fn insert_gate_follows_volatility() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SemanticCache::open(dir.path(), 4, 0.85).await.unwrap();

    for (volatility, expected) in [
        (Volatility::Static, true),
        (Volatility::Low, true),
        (Volatility::Medium, false),
        (Volatility::High, false),
    ] {
        let inserted = cache
            .insert(
                "claim",
                unit(vec![1.0, 0.0, 0.0, 0.0]),
                &verdict(Conclusion::True),
                volatility,
                "general",
            )
            .await
            .unwrap();
        assert_eq!(inserted.is_some(), expected, "volatility {volatility:?}");
    }
    assert_eq!(cache.len().await, 2);
}

#[tokio::test]
async fn lookup_requires_similarity_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SemanticCache::open(dir.path(), 3, 0.85).await.unwrap();
    cache
        .insert(
            "iPhone 16 đã ra mắt",
            unit(vec![1.0, 0.2, 0.0]),
            &verdict(Conclusion::True),
            Volatility::Low,
            "tech",
        )
        .await
        .unwrap();

    // A semantically close query passes the threshold and comes back cached.
    let hit = cache.lookup(&unit(vec![1.0, 0.25, 0.05])).await;
    let hit = hit.expect("expected cache hit");
    assert!(hit.cached);
    assert_eq!(hit.conclusion, Conclusion::True);

    // A distant query misses.
    assert!(cache.lookup(&unit(vec![0.0, 0.1, 1.0])).await.is_none());
}

#[tokio::test]
async fn cache_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = SemanticCache::open(dir.path(), 3, 0.85).await.unwrap();
        cache
            .insert(
                "Hà Nội là thủ đô Việt Nam",
                unit(vec![0.0, 1.0, 0.0]),
                &verdict(Conclusion::True),
                Volatility::Static,
                "common_knowledge",
            )
            .await
            .unwrap();
    }
    let reopened = SemanticCache::open(dir.path(), 3, 0.85).await.unwrap();
    assert_eq!(reopened.len().await, 1);
    let hit = reopened.lookup(&unit(vec![0.0, 1.0, 0.0])).await.unwrap();
    assert!(hit.cached);
}

#[tokio::test]
async fn feedback_round_trip_and_retrieval() {
    let dir = tempfile::tempdir().unwrap();
    let store = FeedbackStore::open(dir.path(), 3).await.unwrap();

    store
        .record(
            FeedbackEntry {
                original_claim: "Trận bão số 5 đổ bộ Đà Nẵng".to_string(),
                system_verdict: "FALSE".to_string(),
                human_correction: "TRUE".to_string(),
                notes: "storm made landfall on the 12th".to_string(),
                created_at: chrono::Utc::now(),
            },
            unit(vec![1.0, 0.0, 0.0]),
        )
        .await
        .unwrap();

    let rendered = store
        .relevant_examples(&unit(vec![0.9, 0.1, 0.0]), DEFAULT_TOP_K)
        .await;
    assert!(rendered.contains("Trận bão số 5"));
    assert!(rendered.contains("System verdict (WRONG): FALSE"));
    assert!(rendered.contains("storm made landfall"));
}

#[tokio::test]
async fn stale_hot_entries_only_from_hot_categories() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SemanticCache::open(dir.path(), 2, 0.85).await.unwrap();
    cache
        .insert("sports claim", unit(vec![1.0, 0.0]), &verdict(Conclusion::True), Volatility::Low, "sports")
        .await
        .unwrap();
    cache
        .insert("general claim", unit(vec![0.0, 1.0]), &verdict(Conclusion::True), Volatility::Low, "general")
        .await
        .unwrap();

    // Fresh entries: nothing stale yet.
    let hot = vec!["sports".to_string()];
    let stale = cache.stale_hot_entries(&hot, chrono::Utc::now(), 10).await;
    assert!(stale.is_empty());

    // Seven hours from now, the sports entry (TTL 6h) is stale but the
    // general entry (TTL 7d) is not — and general is not hot anyway.
    let later = chrono::Utc::now() + chrono::Duration::hours(7);
    let stale = cache.stale_hot_entries(&hot, later, 10).await;
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].1, "sports claim");
}
