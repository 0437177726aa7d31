use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::cache::SemanticCache;
use crate::config::Config;
use crate::embed::Embedder;
use crate::error::AttestError;
use crate::executor::ToolExecutor;
use crate::feedback::{DEFAULT_TOP_K, FeedbackEntry, FeedbackStore};
use crate::gateway::registry::ModelRegistry;
use crate::geocode::Geocoder;
use crate::plan::Claim;
use crate::planner::{PlanOptions, Planner};
use crate::prompts::PromptRegistry;
use crate::search::SearchStack;
use crate::synthesizer::{Synthesizer, Verdict};
use crate::weather::WeatherProvider;

/// The full claim-verification pipeline, shared across requests.
///
/// Control flow per claim: cache lookup → planner → tool executor →
/// synthesizer → conditional background cache insert. Feedback writes
/// arrive on a separate path and never touch the verdict cache.
pub struct Pipeline {
    planner: Planner,
    executor: ToolExecutor,
    synthesizer: Synthesizer,
    embedder: Embedder,
    cache: Arc<SemanticCache>,
    feedback: Arc<FeedbackStore>,
}

impl Pipeline {
    pub async fn build(config: &Config) -> Result<Arc<Self>, AttestError> {
        let tuning = config.tuning.clone();
        let secrets = &config.secrets;

        let prompts = Arc::new(PromptRegistry::load(Path::new("prompts")));
        let registry = Arc::new(ModelRegistry::new(secrets));
        let geocoder = Arc::new(Geocoder::new());
        let search = Arc::new(SearchStack::from_config(secrets, &tuning));
        let weather = Arc::new(WeatherProvider::new(
            secrets.openweather_api_key.clone(),
            geocoder.clone(),
        ));

        let data_dir = Path::new(&tuning.data_dir);
        let cache = Arc::new(
            SemanticCache::open(data_dir, tuning.embedding_dim, tuning.similarity_threshold)
                .await?,
        );
        let feedback = Arc::new(FeedbackStore::open(data_dir, tuning.embedding_dim).await?);

        Ok(Arc::new(Self {
            planner: Planner::new(
                registry.clone(),
                prompts.clone(),
                geocoder,
                tuning.clone(),
            ),
            executor: ToolExecutor::new(search, weather, tuning.clone()),
            synthesizer: Synthesizer::new(registry, prompts, tuning),
            embedder: Embedder::new(secrets.gemini_api_key.clone(), config.tuning.embedding_dim),
            cache: cache.clone(),
            feedback,
        }))
    }

    pub fn cache(&self) -> Arc<SemanticCache> {
        self.cache.clone()
    }

    /// Verify one claim end to end. Always returns a well-formed Verdict;
    /// failures along the way degrade to UNVERIFIED with a reason.
    pub async fn check_claim(self: &Arc<Self>, text: &str, opts: &PlanOptions) -> Verdict {
        let claim = Claim::new(text);
        if claim.text.is_empty() {
            return Verdict::unverified("The claim is empty; there is nothing to verify.");
        }
        tracing::info!(hash = %&claim.hash[..12], "checking claim");

        // One embedding serves cache lookup and feedback retrieval. Losing
        // it (offline, quota) disables both but never blocks verification.
        let vector = match self.embedder.embed(&claim.text).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("claim embedding unavailable: {e}");
                None
            }
        };

        if let Some(ref v) = vector
            && let Some(hit) = self.cache.lookup(v).await
        {
            return hit;
        }

        let feedback_examples = match vector {
            Some(ref v) => self.feedback.relevant_examples(v, DEFAULT_TOP_K).await,
            None => String::new(),
        };

        let plan = self.planner.plan(&claim.text, opts, &feedback_examples).await;
        tracing::debug!(?plan.claim_type, ?plan.volatility, tools = plan.required_tools.len(), "plan ready");

        let outcome = self.executor.execute(&plan).await;
        if outcome.bundle.is_empty() {
            let err = AttestError::NoEvidence;
            tracing::warn!(reason = crate::error::error_reason(&err), "verification produced no evidence");
            return Verdict::unverified(
                "No evidence could be collected from any tool or search provider, even after the fallback sweep.",
            );
        }
        tracing::info!(
            l1 = outcome.bundle.l1.len(),
            l2 = outcome.bundle.l2.len(),
            l3 = outcome.bundle.l3.len(),
            l4 = outcome.bundle.l4.len(),
            "evidence collected"
        );

        let current_date = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        let verdict = self
            .synthesizer
            .synthesize(&claim.text, &outcome.bundle, &current_date, &feedback_examples)
            .await;

        // Conditional insert runs in the background; the caller never waits
        // on cache persistence.
        if let Some(v) = vector {
            let cache = self.cache.clone();
            let enriched = outcome.enriched_plan;
            let stored = verdict.clone();
            let claim_text = claim.text.clone();
            tokio::spawn(async move {
                match cache
                    .insert(&claim_text, v, &stored, enriched.volatility, enriched.topic_category())
                    .await
                {
                    Ok(Some(id)) => tracing::debug!(id, "verdict cached"),
                    Ok(None) => {}
                    Err(e) => tracing::warn!("cache insert failed: {e}"),
                }
            });
        }

        verdict
    }

    /// Re-run the full pipeline for a cached claim (background refresher
    /// path). Skips cache lookup and insert; the refresher updates the
    /// existing record in place.
    pub async fn verify_fresh(self: &Arc<Self>, claim_text: &str) -> Verdict {
        let opts = PlanOptions {
            flash_mode: true,
            ..Default::default()
        };
        let plan = self.planner.plan(claim_text, &opts, "").await;
        let outcome = self.executor.execute(&plan).await;
        if outcome.bundle.is_empty() {
            return Verdict::unverified("No evidence collected during refresh.");
        }
        let current_date = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        self.synthesizer
            .synthesize(claim_text, &outcome.bundle, &current_date, "")
            .await
    }

    /// Record a human correction and index it for prompt injection.
    pub async fn record_feedback(
        &self,
        original_claim: &str,
        system_verdict: &str,
        human_correction: &str,
        notes: &str,
    ) -> Result<(), AttestError> {
        let vector = self.embedder.embed(original_claim).await?;
        self.feedback
            .record(
                FeedbackEntry {
                    original_claim: original_claim.to_string(),
                    system_verdict: system_verdict.to_string(),
                    human_correction: human_correction.to_string(),
                    notes: notes.to_string(),
                    created_at: Utc::now(),
                },
                vector,
            )
            .await
    }
}
