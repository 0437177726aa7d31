use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::classify::classify;
use crate::config::Tuning;
use crate::error::AttestError;
use crate::gateway::registry::{ModelRegistry, normalize_alias, provider_of};
use crate::gateway::GenerateRequest;
use crate::geocode::Geocoder;
use crate::plan::{NormalizeContext, Plan, RawPlan, normalize_plan, parse_raw_plan};
use crate::prompts::PromptRegistry;

/// Default planner fallback chain: flash first, then the small Gemma tiers.
const PLANNER_CHAIN: &[&str] = &[
    "models/gemini-2.5-flash",
    "models/gemma-3-4b-it",
    "models/gemma-3-1b-it",
];

/// Options for one planning run.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Disable per-call timeouts and query caps (latency-insensitive batch
    /// callers).
    pub flash_mode: bool,
    /// Ask the model for a broader tool strategy and keep every query.
    pub unlimit_mode: bool,
    /// User-facing model alias tried ahead of the default chain.
    pub model_alias: Option<String>,
}

/// The planner agent: renders the planning prompt, walks the model
/// fallback chain, then normalizes whatever came back into a typed Plan.
pub struct Planner {
    registry: Arc<ModelRegistry>,
    prompts: Arc<PromptRegistry>,
    geocoder: Arc<Geocoder>,
    tuning: Tuning,
}

impl Planner {
    pub fn new(
        registry: Arc<ModelRegistry>,
        prompts: Arc<PromptRegistry>,
        geocoder: Arc<Geocoder>,
        tuning: Tuning,
    ) -> Self {
        Self {
            registry,
            prompts,
            geocoder,
            tuning,
        }
    }

    /// Produce a plan for a claim. Model failures of every retryable kind
    /// (timeout, rate limit, empty, malformed JSON) advance the chain; when
    /// the whole chain fails the heuristic plan from claim signals alone
    /// still satisfies the plan invariants.
    pub async fn plan(&self, claim: &str, opts: &PlanOptions, feedback_examples: &str) -> Plan {
        let signals = classify(claim);

        // Geocode the extracted city up front so normalization stays pure.
        // The canonical English name feeds the weather tool parameters.
        let resolved_city = match signals.city_candidate.as_deref() {
            Some(city) if signals.is_weather => self
                .geocoder
                .resolve(city)
                .await
                .map(|r| r.english_name),
            _ => None,
        };

        let today = Utc::now().date_naive();
        let ctx = NormalizeContext {
            signals: &signals,
            resolved_city,
            today,
            bounded: !opts.flash_mode && !opts.unlimit_mode,
        };

        let current_date = today.format("%Y-%m-%d").to_string();
        let prompt = self.prompts.render_planner(
            claim,
            &current_date,
            feedback_examples,
            opts.unlimit_mode,
        );

        let chain = self.chain_for(opts.model_alias.as_deref());
        let timeout = if opts.flash_mode {
            None
        } else {
            Some(Duration::from_secs(self.tuning.llm_timeout_secs))
        };

        let mut skip_provider = None;
        for alias in &chain {
            let model = normalize_alias(alias);
            let provider = provider_of(&model);
            if skip_provider == Some(provider) {
                continue;
            }
            let req = GenerateRequest {
                timeout,
                // The flash tier carries the provider's built-in search
                // tool; the Gemma tiers do not support it.
                enable_browse: model.contains("gemini"),
                ..GenerateRequest::new(model.clone(), prompt.clone())
            };
            match self.registry.generate(&req).await {
                Ok(result) => {
                    let raw = parse_raw_plan(&result.text);
                    tracing::info!(model = %result.model, "planner produced a plan");
                    return normalize_plan(raw, claim, &ctx);
                }
                Err(e) => {
                    tracing::warn!(%model, reason = crate::error::error_reason(&e), error = %e, "planner model failed");
                    if matches!(e, AttestError::RateLimited { .. }) {
                        skip_provider = Some(provider);
                    }
                }
            }
        }

        tracing::warn!("all planner models failed, normalizing an empty plan from claim signals");
        normalize_plan(RawPlan::default(), claim, &ctx)
    }

    /// The user's alias (normalized) leads the chain; defaults follow,
    /// deduplicated while preserving order.
    fn chain_for(&self, alias: Option<&str>) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        if let Some(alias) = alias {
            chain.push(normalize_alias(alias));
        }
        for member in PLANNER_CHAIN {
            let canonical = normalize_alias(member);
            if !chain.contains(&canonical) {
                chain.push(canonical);
            }
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secrets;

    fn planner() -> Planner {
        Planner::new(
            Arc::new(ModelRegistry::new(&Secrets::default())),
            Arc::new(PromptRegistry::embedded()),
            Arc::new(Geocoder::with_base_url("http://127.0.0.1:1/search".to_string())),
            Tuning::default(),
        )
    }

    #[test]
    fn chain_puts_user_alias_first_without_duplicates() {
        let p = planner();
        let chain = p.chain_for(Some("gemma-3-4b"));
        assert_eq!(chain[0], "models/gemma-3-4b-it");
        assert_eq!(
            chain.iter().filter(|m| *m == "models/gemma-3-4b-it").count(),
            1
        );
        assert!(chain.contains(&"models/gemini-2.5-flash".to_string()));
    }

    #[tokio::test]
    async fn offline_planner_still_satisfies_invariants() {
        // No API keys, no geocoder: the heuristic plan must still be valid.
        let p = planner();
        let plan = p
            .plan("Real Madrid won the 2024 Champions League final", &PlanOptions::default(), "")
            .await;
        assert!(!plan.required_tools.is_empty());
        assert!(plan.required_tools.iter().any(|t| t.is_search()));
        assert!(plan.required_tools.iter().all(|t| !t.is_weather()));
    }

    #[tokio::test]
    async fn offline_weather_plan_keeps_weather_tool() {
        let p = planner();
        let plan = p
            .plan("Weather in Hanoi tomorrow afternoon", &PlanOptions::default(), "")
            .await;
        assert_eq!(plan.required_tools.len(), 1);
        assert!(plan.required_tools[0].is_weather());
    }
}
