use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AttestError;
use crate::search::RawItem;

const CSE_URL: &str = "https://www.googleapis.com/customsearch/v1";

#[derive(Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseHit>,
}

#[derive(Deserialize)]
struct CseHit {
    link: Option<String>,
    title: Option<String>,
    snippet: Option<String>,
    #[serde(default)]
    pagemap: CsePagemap,
}

#[derive(Deserialize, Default)]
struct CsePagemap {
    #[serde(default)]
    metatags: Vec<HashMap<String, String>>,
}

/// Google Custom Search adapter. Quota exhaustion surfaces as RATE_LIMIT so
/// the executor can drop the backend for the rest of the fan-out.
pub struct CseClient {
    client: reqwest::Client,
    api_key: String,
    cse_id: String,
}

impl CseClient {
    pub fn new(api_key: String, cse_id: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build cse client");
        Self {
            client,
            api_key,
            cse_id,
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<RawItem>, AttestError> {
        let response = self
            .client
            .get(CSE_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", query),
                ("num", "10"),
                ("lr", "lang_vi"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AttestError::RateLimited {
                provider: "google_cse".to_string(),
            });
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            // Daily quota exhaustion comes back as 403 with a quota body.
            return Err(AttestError::RateLimited {
                provider: "google_cse".to_string(),
            });
        }
        if !status.is_success() {
            return Err(AttestError::Upstream {
                provider: "google_cse".to_string(),
                message: status.to_string(),
                status: Some(status.as_u16()),
            });
        }

        let body: CseResponse = response.json().await?;
        let items = body
            .items
            .into_iter()
            .filter_map(|hit| {
                let url = hit.link.filter(|u| !u.is_empty())?;
                let snippet = hit.snippet.unwrap_or_default();
                if snippet.chars().count() < 30 {
                    return None;
                }
                // Flatten the first metatag map; CSE repeats one per page.
                let metatags = hit.pagemap.metatags.into_iter().next().unwrap_or_default();
                Some(RawItem {
                    title: hit.title,
                    url,
                    snippet,
                    date_hint: None,
                    metatags,
                })
            })
            .collect();
        Ok(items)
    }
}
