pub mod cse;
pub mod factcheck;
pub mod searx;
pub mod wikipedia;

use std::collections::HashMap;
use std::time::Duration;

use crate::config::{Secrets, Tuning};
use crate::error::AttestError;

/// Provider-shaped search hit before ranking and date extraction.
#[derive(Debug, Clone, Default)]
pub struct RawItem {
    pub title: Option<String>,
    pub url: String,
    pub snippet: String,
    /// Date string as the provider reported it, if any.
    pub date_hint: Option<String>,
    /// Structured page metadata (og/article tags) when the provider has it.
    pub metatags: HashMap<String, String>,
}

/// One configured search backend. Enum dispatch keeps the adapter set
/// closed and avoids boxed futures on the hot path.
pub enum SearchBackend {
    Searx(searx::SearxClient),
    Cse(cse::CseClient),
    Wikipedia(wikipedia::WikipediaClient),
    FactCheck(factcheck::FactCheckClient),
}

impl SearchBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Searx(_) => "searxng",
            Self::Cse(_) => "google_cse",
            Self::Wikipedia(_) => "wikipedia",
            Self::FactCheck(_) => "fact_check",
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<RawItem>, AttestError> {
        match self {
            Self::Searx(c) => c.search(query).await,
            Self::Cse(c) => c.search(query).await,
            Self::Wikipedia(c) => c.search(query).await,
            Self::FactCheck(c) => c.search(query).await,
        }
    }
}

/// The full adapter stack in canonical order: news-leaning SearXNG, Google
/// CSE, Wikipedia, then the fact-check registry. Unconfigured adapters are
/// simply absent.
pub struct SearchStack {
    pub backends: Vec<SearchBackend>,
}

impl SearchStack {
    pub fn from_config(secrets: &Secrets, tuning: &Tuning) -> Self {
        let timeout = Duration::from_secs(tuning.search_timeout_secs);
        let mut backends = Vec::new();

        if let Some(ref url) = secrets.searxng_url {
            backends.push(SearchBackend::Searx(searx::SearxClient::new(
                url.clone(),
                timeout,
            )));
        }
        if let (Some(key), Some(cx)) = (&secrets.google_api_key, &secrets.google_cse_id) {
            backends.push(SearchBackend::Cse(cse::CseClient::new(
                key.clone(),
                cx.clone(),
                timeout,
            )));
        }
        backends.push(SearchBackend::Wikipedia(wikipedia::WikipediaClient::new(
            timeout,
        )));
        if let Some(ref key) = secrets.fact_check_api_key {
            backends.push(SearchBackend::FactCheck(factcheck::FactCheckClient::new(
                key.clone(),
                timeout,
            )));
        }

        if backends.len() == 1 {
            tracing::warn!("only the Wikipedia adapter is configured — recall will be poor");
        }
        Self { backends }
    }
}
