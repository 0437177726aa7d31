use std::time::Duration;

use serde::Deserialize;

use crate::error::AttestError;
use crate::search::RawItem;

const MAX_RESULTS: usize = 20;

#[derive(Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxHit>,
}

#[derive(Deserialize)]
struct SearxHit {
    url: Option<String>,
    title: Option<String>,
    content: Option<String>,
    #[serde(rename = "publishedDate")]
    published_date: Option<String>,
}

/// SearXNG JSON API adapter, pinned to the Google engine for result
/// quality. News-leaning: queries carry a month time range.
pub struct SearxClient {
    client: reqwest::Client,
    base_url: String,
}

impl SearxClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build searx client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<RawItem>, AttestError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("engines", "google"),
                ("language", "vi-VN"),
                ("safesearch", "0"),
                ("pageno", "1"),
                ("time_range", "month"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AttestError::RateLimited {
                provider: "searxng".to_string(),
            });
        }
        if !status.is_success() {
            return Err(AttestError::Upstream {
                provider: "searxng".to_string(),
                message: status.to_string(),
                status: Some(status.as_u16()),
            });
        }

        let body: SearxResponse = response.json().await?;
        let items = body
            .results
            .into_iter()
            .filter_map(|hit| {
                let url = hit.url.filter(|u| !u.is_empty())?;
                let snippet = hit.content.unwrap_or_default();
                // Bare link stubs carry no evidence.
                if snippet.chars().count() < 30 {
                    return None;
                }
                Some(RawItem {
                    title: hit.title,
                    url,
                    snippet,
                    date_hint: hit.published_date,
                    metatags: Default::default(),
                })
            })
            .take(MAX_RESULTS)
            .collect();
        Ok(items)
    }
}
