use std::time::Duration;

use serde::Deserialize;

use crate::error::AttestError;
use crate::search::RawItem;

#[derive(Deserialize)]
struct SummaryResponse {
    title: Option<String>,
    extract: Option<String>,
    content_urls: Option<ContentUrls>,
}

#[derive(Deserialize)]
struct ContentUrls {
    desktop: Option<DesktopUrls>,
}

#[derive(Deserialize)]
struct DesktopUrls {
    page: Option<String>,
}

/// Wikipedia REST summary lookup for the claim's leading entity, Vietnamese
/// first with an English retry. A missing page is an empty result, not an
/// error.
pub struct WikipediaClient {
    client: reqwest::Client,
}

impl WikipediaClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("attest/0.1 (claim verification)")
            .build()
            .expect("failed to build wikipedia client");
        Self { client }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<RawItem>, AttestError> {
        // The summary endpoint wants a page title, not a query string:
        // the first few words of the claim are the best cheap guess.
        let title: String = query.split_whitespace().take(5).collect::<Vec<_>>().join(" ");
        if title.is_empty() {
            return Ok(Vec::new());
        }

        for lang in ["vi", "en"] {
            if let Some(item) = self.lookup(lang, &title).await? {
                return Ok(vec![item]);
            }
        }
        Ok(Vec::new())
    }

    async fn lookup(&self, lang: &str, title: &str) -> Result<Option<RawItem>, AttestError> {
        let encoded = title.replace(' ', "_");
        let url = format!("https://{lang}.wikipedia.org/api/rest_v1/page/summary/{encoded}");
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AttestError::RateLimited {
                provider: "wikipedia".to_string(),
            });
        }
        if !status.is_success() {
            return Err(AttestError::Upstream {
                provider: "wikipedia".to_string(),
                message: status.to_string(),
                status: Some(status.as_u16()),
            });
        }

        let body: SummaryResponse = response.json().await?;
        let extract = body.extract.unwrap_or_default();
        if extract.chars().count() < 30 {
            return Ok(None);
        }
        let page_url = body
            .content_urls
            .and_then(|c| c.desktop)
            .and_then(|d| d.page)
            .unwrap_or_else(|| format!("https://{lang}.wikipedia.org/wiki/{encoded}"));

        let mut snippet: String = extract.chars().take(500).collect();
        if extract.chars().count() > 500 {
            snippet.push('…');
        }
        Ok(Some(RawItem {
            title: body.title,
            url: page_url,
            snippet,
            date_hint: None,
            metatags: Default::default(),
        }))
    }
}
