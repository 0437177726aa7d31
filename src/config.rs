use std::env;
use std::path::Path;

use serde::Deserialize;

/// Provider credentials, loaded once from the environment.
///
/// Every key is optional: a missing key disables the corresponding adapter
/// and logs a warning, it never aborts startup. The pipeline degrades to
/// whatever providers remain configured.
#[derive(Clone, Default)]
pub struct Secrets {
    pub gemini_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub openweather_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub google_cse_id: Option<String>,
    pub fact_check_api_key: Option<String>,
    pub searxng_url: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let get = |name: &str| match env::var(name) {
            Ok(v) if !v.trim().is_empty() => Some(v),
            _ => {
                tracing::warn!("{name} not set — dependent adapter unavailable");
                None
            }
        };

        Self {
            gemini_api_key: get("GEMINI_API_KEY"),
            groq_api_key: get("GROQ_API_KEY"),
            openweather_api_key: get("OPENWEATHER_API_KEY"),
            google_api_key: get("GOOGLE_API_KEY"),
            google_cse_id: get("GOOGLE_CSE_ID"),
            fact_check_api_key: get("GOOGLE_FACT_CHECK_API_KEY"),
            searxng_url: env::var("SEARXNG_URL").ok().filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Tuning knobs with built-in defaults, optionally overlaid from `attest.toml`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Cosine similarity required for a cache hit.
    pub similarity_threshold: f32,
    /// Embedding dimension. Fixed by the encoder model.
    pub embedding_dim: usize,
    /// Evidence trim caps fed to the synthesizer prompt.
    pub trim_l1: usize,
    pub trim_l2: usize,
    pub trim_l3: usize,
    pub trim_l4: usize,
    /// Maximum snippet length after whitespace collapsing.
    pub snippet_cap: usize,
    /// Default per-call LLM timeout in seconds. `flash_mode` disables it.
    pub llm_timeout_secs: u64,
    /// Per-provider search timeout in seconds.
    pub search_timeout_secs: u64,
    /// Overall tool-executor budget in seconds.
    pub executor_budget_secs: u64,
    /// Background refresher interval in seconds.
    pub refresh_interval_secs: u64,
    /// Maximum entries refreshed per cycle.
    pub refresh_max_items: usize,
    /// Cooldown between refresher pipeline runs in seconds.
    pub refresh_cooldown_secs: u64,
    /// Categories eligible for proactive refresh.
    pub hot_categories: Vec<String>,
    /// Directory for the vector indices and record stores.
    pub data_dir: String,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            embedding_dim: 768,
            trim_l1: 3,
            trim_l2: 5,
            trim_l3: 5,
            trim_l4: 2,
            snippet_cap: 280,
            llm_timeout_secs: 30,
            search_timeout_secs: 20,
            executor_budget_secs: 90,
            refresh_interval_secs: 300,
            refresh_max_items: 10,
            refresh_cooldown_secs: 2,
            hot_categories: vec![
                "finance".to_string(),
                "breaking_news".to_string(),
                "sports".to_string(),
                "politics".to_string(),
            ],
            data_dir: "data".to_string(),
        }
    }
}

impl Tuning {
    /// Load tuning values, overlaying `attest.toml` when present.
    /// A malformed file is logged and ignored rather than aborting startup.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!("ignoring malformed {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

pub struct Config {
    pub secrets: Secrets,
    pub tuning: Tuning,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            secrets: Secrets::from_env(),
            tuning: Tuning::load(Path::new("attest.toml")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuning_defaults() {
        let t = Tuning::default();
        assert!((t.similarity_threshold - 0.85).abs() < f32::EPSILON);
        assert_eq!(t.embedding_dim, 768);
        assert_eq!((t.trim_l2, t.trim_l3, t.trim_l4), (5, 5, 2));
        assert_eq!(t.snippet_cap, 280);
        assert_eq!(t.llm_timeout_secs, 30);
        assert_eq!(t.refresh_interval_secs, 300);
        assert_eq!(t.refresh_max_items, 10);
        assert!(t.hot_categories.iter().any(|c| c == "breaking_news"));
    }

    #[test]
    fn tuning_missing_file_falls_back() {
        let t = Tuning::load(Path::new("/nonexistent/attest.toml"));
        assert_eq!(t.embedding_dim, 768);
    }
}
