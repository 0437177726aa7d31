use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Tuning;
use crate::error::AttestError;
use crate::evidence::EvidenceBundle;
use crate::gateway::registry::{ModelRegistry, normalize_alias, provider_of};
use crate::gateway::GenerateRequest;
use crate::plan::find_json_object;
use crate::prompts::PromptRegistry;
use crate::weather::format_reading_snippet;

/// Final label set. Wire format is the uppercase English label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Conclusion {
    True,
    False,
    Misleading,
    Unverified,
}

impl Conclusion {
    /// Lenient label parsing. Models answer in English or Vietnamese
    /// ("TIN THẬT" / "TIN GIẢ" / "TIN CHƯA XÁC THỰC"); anything
    /// unrecognizable is treated as a malformed response upstream.
    pub fn from_label(label: &str) -> Option<Self> {
        let folded = crate::classify::fold(label);
        if folded.contains("misleading") || folded.contains("gay hieu lam") {
            Some(Self::Misleading)
        } else if folded.contains("unverified") || folded.contains("chua xac thuc") {
            Some(Self::Unverified)
        } else if folded.contains("false") || folded.contains("tin gia") || folded.contains("sai")
        {
            Some(Self::False)
        } else if folded.contains("true") || folded.contains("tin that") || folded == "dung" {
            Some(Self::True)
        } else {
            None
        }
    }
}

/// The pipeline's answer: always well-formed, even when every provider
/// failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub conclusion: Conclusion,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_analysis: Option<String>,
    pub key_evidence_snippet: String,
    pub key_evidence_source: String,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Verdict {
    pub fn unverified(reason: &str) -> Self {
        Self {
            conclusion: Conclusion::Unverified,
            reason: reason.to_string(),
            style_analysis: None,
            key_evidence_snippet: String::new(),
            key_evidence_source: String::new(),
            cached: false,
            confidence: None,
        }
    }
}

/// Loose verdict shape as the model emits it.
#[derive(Deserialize)]
struct RawVerdict {
    conclusion: Option<String>,
    reason: Option<String>,
    style_analysis: Option<String>,
    key_evidence_snippet: Option<String>,
    key_evidence_source: Option<String>,
    confidence: Option<f64>,
}

/// Parse the first JSON object of a model response into a Verdict.
pub fn parse_verdict(text: &str) -> Option<Verdict> {
    let json = find_json_object(text)?;
    let raw: RawVerdict = serde_json::from_str(json).ok()?;
    let conclusion = Conclusion::from_label(raw.conclusion.as_deref()?)?;
    Some(Verdict {
        conclusion,
        reason: raw.reason.unwrap_or_default(),
        style_analysis: raw.style_analysis.filter(|s| !s.is_empty()),
        key_evidence_snippet: raw.key_evidence_snippet.unwrap_or_default(),
        key_evidence_source: raw.key_evidence_source.unwrap_or_default(),
        cached: false,
        confidence: raw.confidence.filter(|c| (0.0..=1.0).contains(c)),
    })
}

/// Evidence-only fallback when every model failed or answered garbage.
///
/// Deliberately strict: TRUE needs either two high-trust items in
/// agreement or a successful structured weather reading; everything else
/// stays UNVERIFIED.
pub fn heuristic_verdict(bundle: &EvidenceBundle) -> Verdict {
    if bundle.l2.len() >= 2 {
        let top = &bundle.l2[0];
        return Verdict {
            conclusion: Conclusion::True,
            reason: format!(
                "Heuristic: {} recent high-trust sources corroborate the claim, e.g. {} ({}).",
                bundle.l2.len(),
                top.source_domain,
                top.date.as_deref().unwrap_or("undated")
            ),
            style_analysis: None,
            key_evidence_snippet: top.snippet.clone(),
            key_evidence_source: top.source_domain.clone(),
            cached: false,
            confidence: None,
        };
    }

    for entry in &bundle.l1 {
        if entry.tool_name == "weather"
            && entry.status == crate::evidence::L1Status::Success
            && let Some(ref reading) = entry.data
        {
            return Verdict {
                conclusion: Conclusion::True,
                reason: "Heuristic: the structured weather reading matches the stated time and place.".to_string(),
                style_analysis: None,
                key_evidence_snippet: format_reading_snippet(reading),
                key_evidence_source: reading.source.clone(),
                cached: false,
                confidence: None,
            };
        }
    }

    Verdict::unverified(
        "Heuristic fallback: no pair of high-trust sources and no successful structured reading; the claim cannot be verified.",
    )
}

/// Default model chain for synthesis. The strong reasoning model is
/// mandatory; the flash tier only exists to salvage an answer under quota.
const SYNTH_CHAIN: &[&str] = &["models/gemini-2.5-pro", "models/gemini-2.5-flash"];

pub struct Synthesizer {
    registry: Arc<ModelRegistry>,
    prompts: Arc<PromptRegistry>,
    tuning: Tuning,
}

impl Synthesizer {
    pub fn new(registry: Arc<ModelRegistry>, prompts: Arc<PromptRegistry>, tuning: Tuning) -> Self {
        Self {
            registry,
            prompts,
            tuning,
        }
    }

    /// Trim the bundle, render the prompt, walk the model chain, and fall
    /// back heuristically. Never returns an error to the caller.
    pub async fn synthesize(
        &self,
        claim: &str,
        bundle: &EvidenceBundle,
        current_date: &str,
        feedback_examples: &str,
    ) -> Verdict {
        let trimmed = bundle.trimmed(&self.tuning);
        let bundle_json = match serde_json::to_string_pretty(&trimmed) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!("evidence bundle failed to serialize: {e}");
                return heuristic_verdict(&trimmed);
            }
        };
        let prompt =
            self.prompts
                .render_synthesis(&bundle_json, claim, current_date, feedback_examples);

        let mut skip_provider = None;
        for alias in SYNTH_CHAIN {
            let model = normalize_alias(alias);
            let provider = provider_of(&model);
            if skip_provider == Some(provider) {
                continue;
            }
            let req = GenerateRequest {
                timeout: Some(Duration::from_secs(self.tuning.llm_timeout_secs * 2)),
                safety_off: true,
                ..GenerateRequest::new(model.clone(), prompt.clone())
            };
            match self.registry.generate(&req).await {
                Ok(result) => match parse_verdict(&result.text) {
                    Some(verdict) => {
                        tracing::info!(model = %result.model, conclusion = ?verdict.conclusion, "synthesis complete");
                        return verdict;
                    }
                    None => {
                        tracing::warn!(model = %result.model, "synthesis response had no parseable verdict");
                    }
                },
                Err(e) => {
                    tracing::warn!(%model, reason = crate::error::error_reason(&e), error = %e, "synthesis model failed");
                    if matches!(e, AttestError::RateLimited { .. }) {
                        skip_provider = Some(provider);
                    }
                    if !e.is_retryable() && !matches!(e, AttestError::ModelNotFound(_)) {
                        break;
                    }
                }
            }
        }

        tracing::warn!("all synthesis models failed, using heuristic fallback");
        heuristic_verdict(&trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{EvidenceItem, L1Entry};
    use crate::weather::Reading;

    fn l2_item(domain: &str, snippet: &str) -> EvidenceItem {
        EvidenceItem {
            source_domain: domain.to_string(),
            url: format!("https://{domain}/x"),
            title: None,
            snippet: snippet.to_string(),
            rank_score: 0.95,
            date: Some("2024-06-02".to_string()),
            full_text: None,
        }
    }

    fn reading() -> Reading {
        Reading {
            location: "Hanoi".to_string(),
            date: "2026-08-02".to_string(),
            time: "14:00".to_string(),
            temperature_c: 31.0,
            feels_like_c: 34.0,
            description: "light rain".to_string(),
            main_category: "Rain".to_string(),
            humidity_pct: 80.0,
            wind_ms: 3.0,
            source: "openweathermap.org".to_string(),
        }
    }

    #[test]
    fn conclusion_labels_lenient() {
        assert_eq!(Conclusion::from_label("TRUE"), Some(Conclusion::True));
        assert_eq!(Conclusion::from_label("TIN THẬT"), Some(Conclusion::True));
        assert_eq!(Conclusion::from_label("TIN GIẢ"), Some(Conclusion::False));
        assert_eq!(Conclusion::from_label("false"), Some(Conclusion::False));
        assert_eq!(
            Conclusion::from_label("MISLEADING"),
            Some(Conclusion::Misleading)
        );
        assert_eq!(
            Conclusion::from_label("TIN CHƯA XÁC THỰC"),
            Some(Conclusion::Unverified)
        );
        assert_eq!(Conclusion::from_label("maybe?"), None);
    }

    #[test]
    fn verdict_wire_format_uppercase() {
        let v = serde_json::to_value(Verdict::unverified("r")).unwrap();
        assert_eq!(v["conclusion"], "UNVERIFIED");
    }

    #[test]
    fn parse_verdict_from_fenced_response() {
        let text = "Here you go:\n```json\n{\"conclusion\": \"FALSE\", \"reason\": \"fact-checked\", \"key_evidence_snippet\": \"s\", \"key_evidence_source\": \"politifact.com\", \"confidence\": 0.92}\n```";
        let v = parse_verdict(text).unwrap();
        assert_eq!(v.conclusion, Conclusion::False);
        assert!(!v.cached);
        assert_eq!(v.confidence, Some(0.92));
    }

    #[test]
    fn parse_verdict_rejects_unknown_label() {
        assert!(parse_verdict("{\"conclusion\": \"perhaps\"}").is_none());
        assert!(parse_verdict("no json at all").is_none());
    }

    #[test]
    fn parse_verdict_drops_out_of_range_confidence() {
        let text = "{\"conclusion\": \"TRUE\", \"confidence\": 7.5}";
        assert_eq!(parse_verdict(text).unwrap().confidence, None);
    }

    #[test]
    fn heuristic_true_on_two_high_trust() {
        let mut bundle = EvidenceBundle::default();
        bundle.l2.push(l2_item("reuters.com", "confirmed"));
        bundle.l2.push(l2_item("apnews.com", "also confirmed"));
        let v = heuristic_verdict(&bundle);
        assert_eq!(v.conclusion, Conclusion::True);
        assert_eq!(v.key_evidence_source, "reuters.com");
    }

    #[test]
    fn heuristic_true_on_weather_reading() {
        let mut bundle = EvidenceBundle::default();
        bundle.l1.push(L1Entry::weather_success("forecast", reading()));
        let v = heuristic_verdict(&bundle);
        assert_eq!(v.conclusion, Conclusion::True);
        assert!(v.key_evidence_snippet.contains("Hanoi"));
    }

    #[test]
    fn heuristic_unverified_otherwise() {
        let mut bundle = EvidenceBundle::default();
        bundle.l2.push(l2_item("reuters.com", "single source"));
        bundle.l3.push(l2_item("blogish.org", "unranked"));
        let v = heuristic_verdict(&bundle);
        assert_eq!(v.conclusion, Conclusion::Unverified);
    }
}
