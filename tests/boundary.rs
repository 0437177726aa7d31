//! Boundary behavior that must hold with zero providers configured and no
//! network: the pipeline still answers with a well-formed verdict.

use attest::config::{Config, Secrets, Tuning};
use attest::pipeline::Pipeline;
use attest::planner::PlanOptions;
use attest::synthesizer::Conclusion;

fn offline_config(data_dir: &std::path::Path) -> Config {
    Config {
        secrets: Secrets::default(),
        tuning: Tuning {
            data_dir: data_dir.display().to_string(),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn empty_claim_is_unverified_without_any_network_call() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::build(&offline_config(dir.path())).await.unwrap();

    let verdict = pipeline.check_claim("   ", &PlanOptions::default()).await;
    assert_eq!(verdict.conclusion, Conclusion::Unverified);
    assert!(!verdict.reason.is_empty());
    assert!(!verdict.cached);
}

#[tokio::test]
async fn pipeline_builds_fresh_stores_in_empty_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::build(&offline_config(dir.path())).await.unwrap();
    assert!(pipeline.cache().is_empty().await);
}
