use std::time::Duration;

use serde::Deserialize;

use crate::error::AttestError;
use crate::search::RawItem;

const FACT_CHECK_URL: &str = "https://factchecktools.googleapis.com/v1alpha1/claims:search";

#[derive(Deserialize)]
struct ClaimsResponse {
    #[serde(default)]
    claims: Vec<ClaimHit>,
}

#[derive(Deserialize)]
struct ClaimHit {
    text: Option<String>,
    #[serde(rename = "claimReview", default)]
    claim_review: Vec<ClaimReview>,
}

#[derive(Deserialize)]
struct ClaimReview {
    publisher: Option<Publisher>,
    url: Option<String>,
    title: Option<String>,
    #[serde(rename = "textualRating")]
    textual_rating: Option<String>,
    #[serde(rename = "reviewDate")]
    review_date: Option<String>,
}

#[derive(Deserialize)]
struct Publisher {
    name: Option<String>,
}

/// Which way a fact-check rating leans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingLean {
    True,
    False,
    Mixed,
    Unknown,
}

/// Interpret a free-text rating ("Pants on Fire", "Đúng", "Mostly false")
/// into a lean. False markers are checked first: "false" ratings often
/// embed the word "true" ("not true").
pub fn interpret_rating(rating: &str) -> RatingLean {
    let folded = crate::classify::fold(rating);
    const FALSE_MARKERS: &[&str] = &[
        "false", "fake", "incorrect", "sai", "gia", "bia", "misleading", "pants on fire", "hoax",
        "not true",
    ];
    const TRUE_MARKERS: &[&str] = &["true", "correct", "accurate", "dung", "chinh xac", "that"];
    const MIXED_MARKERS: &[&str] = &["partly", "partial", "mixed", "half", "mot phan"];

    if FALSE_MARKERS.iter().any(|m| folded.contains(m)) {
        RatingLean::False
    } else if MIXED_MARKERS.iter().any(|m| folded.contains(m)) {
        RatingLean::Mixed
    } else if TRUE_MARKERS.iter().any(|m| folded.contains(m)) {
        RatingLean::True
    } else {
        RatingLean::Unknown
    }
}

fn lean_label(lean: RatingLean) -> &'static str {
    match lean {
        RatingLean::True => "supports the claim",
        RatingLean::False => "refutes the claim",
        RatingLean::Mixed => "partially refutes the claim",
        RatingLean::Unknown => "unclear",
    }
}

/// Google Fact Check Tools adapter. Vietnamese first; an empty result set
/// retries in English before giving up.
pub struct FactCheckClient {
    client: reqwest::Client,
    api_key: String,
}

impl FactCheckClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build fact-check client");
        Self { client, api_key }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<RawItem>, AttestError> {
        let items = self.query_lang(query, "vi").await?;
        if !items.is_empty() {
            return Ok(items);
        }
        self.query_lang(query, "en").await
    }

    async fn query_lang(&self, query: &str, lang: &str) -> Result<Vec<RawItem>, AttestError> {
        let response = self
            .client
            .get(FACT_CHECK_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("query", query),
                ("languageCode", lang),
                ("pageSize", "10"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AttestError::RateLimited {
                provider: "fact_check".to_string(),
            });
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(AttestError::AuthFailed {
                provider: "fact_check".to_string(),
                message: status.to_string(),
            });
        }
        if !status.is_success() {
            return Err(AttestError::Upstream {
                provider: "fact_check".to_string(),
                message: status.to_string(),
                status: Some(status.as_u16()),
            });
        }

        let body: ClaimsResponse = response.json().await?;
        let mut items = Vec::new();
        for claim in body.claims {
            let claim_text = claim.text.unwrap_or_default();
            for review in claim.claim_review {
                let Some(url) = review.url.filter(|u| !u.is_empty()) else {
                    continue;
                };
                let publisher = review
                    .publisher
                    .and_then(|p| p.name)
                    .unwrap_or_else(|| "unknown publisher".to_string());
                let rating = review.textual_rating.unwrap_or_default();
                let lean = interpret_rating(&rating);
                let snippet = format!(
                    "Fact check by {publisher}: \"{claim_text}\" — rated \"{rating}\" ({}).",
                    lean_label(lean)
                );
                items.push(RawItem {
                    title: review.title,
                    url,
                    snippet,
                    date_hint: review.review_date,
                    metatags: Default::default(),
                });
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_interpretation() {
        assert_eq!(interpret_rating("False"), RatingLean::False);
        assert_eq!(interpret_rating("Pants on Fire!"), RatingLean::False);
        assert_eq!(interpret_rating("Sai sự thật"), RatingLean::False);
        assert_eq!(interpret_rating("Đúng"), RatingLean::True);
        assert_eq!(interpret_rating("Mostly true"), RatingLean::True);
        assert_eq!(interpret_rating("Half true"), RatingLean::Mixed);
        assert_eq!(interpret_rating("???"), RatingLean::Unknown);
    }

    #[test]
    fn false_markers_win_over_embedded_true() {
        assert_eq!(interpret_rating("Not true"), RatingLean::False);
    }
}
