use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

const DEFAULT_PLANNER: &str = include_str!("../prompts/planner.txt");
const DEFAULT_SYNTHESIS: &str = include_str!("../prompts/synthesis.txt");

/// Suffix appended to the planner prompt in unlimit mode.
const UNLIMIT_SUFFIX: &str = "\n\n[UNLIMIT MODE]\nPrefer specialised data sources (traffic, maps, climate, finance, technology, science, health, sports) and plan a comprehensive evidence-gathering strategy without query-count limits.";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex"));

/// Prompt templates, loaded once at startup and read-only afterwards.
///
/// Templates are opaque: the pipeline only knows their named placeholders.
/// On-disk copies in `prompts/` override the embedded defaults so prompt
/// iteration never needs a rebuild.
pub struct PromptRegistry {
    planner: String,
    synthesis: String,
}

impl PromptRegistry {
    pub fn load(dir: &Path) -> Self {
        let read = |name: &str, fallback: &str| match std::fs::read_to_string(dir.join(name)) {
            Ok(s) if !s.trim().is_empty() => {
                tracing::info!("loaded prompt template {name}");
                s
            }
            _ => fallback.to_string(),
        };
        Self {
            planner: read("planner.txt", DEFAULT_PLANNER),
            synthesis: read("synthesis.txt", DEFAULT_SYNTHESIS),
        }
    }

    pub fn embedded() -> Self {
        Self {
            planner: DEFAULT_PLANNER.to_string(),
            synthesis: DEFAULT_SYNTHESIS.to_string(),
        }
    }

    pub fn render_planner(
        &self,
        claim: &str,
        current_date: &str,
        feedback_examples: &str,
        unlimit: bool,
    ) -> String {
        let mut rendered = render(
            &self.planner,
            &[
                ("claim", claim),
                ("current_date", current_date),
                ("feedback_examples", feedback_examples),
            ],
        );
        if unlimit {
            rendered.push_str(UNLIMIT_SUFFIX);
        }
        rendered
    }

    pub fn render_synthesis(
        &self,
        evidence_bundle_json: &str,
        claim: &str,
        current_date: &str,
        feedback_examples: &str,
    ) -> String {
        render(
            &self.synthesis,
            &[
                ("evidence_bundle_json", evidence_bundle_json),
                ("claim", claim),
                ("current_date", current_date),
                ("feedback_examples", feedback_examples),
            ],
        )
    }
}

/// Substitute named placeholders in one pass over the template.
///
/// A single pass is the safety property: placeholder-shaped text inside a
/// substituted value (evidence snippets quote anything) is never expanded
/// again. Unknown placeholders are left verbatim.
fn render(template: &str, pairs: &[(&str, &str)]) -> String {
    let map: HashMap<&str, &str> = pairs.iter().copied().collect();
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match map.get(&caps[1]) {
                Some(value) => (*value).to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
