use serde::{Deserialize, Serialize};

use crate::config::Tuning;
use crate::weather::Reading;

/// One normalized search result. Created by provider adapters, read-only
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceItem {
    #[serde(rename = "source")]
    pub source_domain: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub snippet: String,
    pub rank_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

/// Outcome of a structured (L1) tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum L1Status {
    Success,
    ApiError,
    NoData,
    InvalidLocation,
    HistoricalDateRequired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L1Entry {
    pub tool_name: String,
    pub status: L1Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl L1Entry {
    pub fn weather_success(mode: &str, reading: Reading) -> Self {
        Self {
            tool_name: "weather".to_string(),
            status: L1Status::Success,
            mode: Some(mode.to_string()),
            data: Some(reading),
            reason: None,
        }
    }

    pub fn weather_failure(status: L1Status, reason: String) -> Self {
        Self {
            tool_name: "weather".to_string(),
            status,
            mode: None,
            data: None,
            reason: Some(reason),
        }
    }
}

/// Four-tier evidence container. Wire keys match the synthesizer prompt's
/// expected shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceBundle {
    #[serde(rename = "layer_1_tools")]
    pub l1: Vec<L1Entry>,
    #[serde(rename = "layer_2_high_trust")]
    pub l2: Vec<EvidenceItem>,
    #[serde(rename = "layer_3_general")]
    pub l3: Vec<EvidenceItem>,
    #[serde(rename = "layer_4_social_low")]
    pub l4: Vec<EvidenceItem>,
}

impl EvidenceBundle {
    pub fn is_empty(&self) -> bool {
        self.l1.is_empty() && self.l2.is_empty() && self.l3.is_empty() && self.l4.is_empty()
    }

    /// Place an item into the tier matching its rank score:
    /// > 0.9 high-trust, > 0.5 general, otherwise low-trust.
    pub fn insert_ranked(&mut self, item: EvidenceItem) {
        if item.rank_score > 0.9 {
            self.l2.push(item);
        } else if item.rank_score > 0.5 {
            self.l3.push(item);
        } else {
            self.l4.push(item);
        }
    }

    /// Date-descending order within each web tier; undated items sink.
    /// Stable, so equal dates keep arrival order.
    pub fn sort_tiers(&mut self) {
        let key = |it: &EvidenceItem| it.date.clone().unwrap_or_else(|| "1970-01-01".to_string());
        self.l2.sort_by(|a, b| key(b).cmp(&key(a)));
        self.l3.sort_by(|a, b| key(b).cmp(&key(a)));
    }

    /// Extend from another bundle (used when merging sibling task results).
    pub fn absorb(&mut self, other: EvidenceBundle) {
        self.l1.extend(other.l1);
        self.l2.extend(other.l2);
        self.l3.extend(other.l3);
        self.l4.extend(other.l4);
    }

    /// Trim to the synthesizer budget: bounded entries per tier, snippets
    /// whitespace-collapsed and capped.
    pub fn trimmed(&self, tuning: &Tuning) -> EvidenceBundle {
        let trim_item = |it: &EvidenceItem| EvidenceItem {
            snippet: trim_snippet(&it.snippet, tuning.snippet_cap),
            full_text: None,
            ..it.clone()
        };
        EvidenceBundle {
            l1: self
                .l1
                .iter()
                .take(tuning.trim_l1)
                .cloned()
                .map(|mut e| {
                    if let Some(ref mut r) = e.data {
                        r.description = trim_snippet(&r.description, tuning.snippet_cap);
                    }
                    e
                })
                .collect(),
            l2: self.l2.iter().take(tuning.trim_l2).map(trim_item).collect(),
            l3: self.l3.iter().take(tuning.trim_l3).map(trim_item).collect(),
            l4: self.l4.iter().take(tuning.trim_l4).map(trim_item).collect(),
        }
    }
}

/// Collapse whitespace and truncate to `cap` characters.
pub fn trim_snippet(s: &str, cap: usize) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(cap).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str, score: f32, date: Option<&str>) -> EvidenceItem {
        EvidenceItem {
            source_domain: crate::rank::host_of(url),
            url: url.to_string(),
            title: None,
            snippet: "snippet text".to_string(),
            rank_score: score,
            date: date.map(|d| d.to_string()),
            full_text: None,
        }
    }

    #[test]
    fn tier_matches_rank_score() {
        let mut bundle = EvidenceBundle::default();
        bundle.insert_ranked(item("https://a.com/1", 0.95, None));
        bundle.insert_ranked(item("https://b.com/2", 0.8, None));
        bundle.insert_ranked(item("https://c.com/3", 0.1, None));
        assert_eq!(bundle.l2.len(), 1);
        assert_eq!(bundle.l3.len(), 1);
        assert_eq!(bundle.l4.len(), 1);
    }

    #[test]
    fn boundary_scores() {
        let mut bundle = EvidenceBundle::default();
        bundle.insert_ranked(item("https://a.com/1", 0.9, None));
        bundle.insert_ranked(item("https://b.com/2", 0.5, None));
        // 0.9 is not > 0.9 → general tier; 0.5 is not > 0.5 → low tier.
        assert!(bundle.l2.is_empty());
        assert_eq!(bundle.l3.len(), 1);
        assert_eq!(bundle.l4.len(), 1);
    }

    #[test]
    fn sort_is_date_descending_and_stable() {
        let mut bundle = EvidenceBundle::default();
        bundle.insert_ranked(item("https://a.com/1", 0.8, Some("2024-06-01")));
        bundle.insert_ranked(item("https://b.com/2", 0.8, Some("2024-06-03")));
        bundle.insert_ranked(item("https://c.com/3", 0.8, Some("2024-06-03")));
        bundle.insert_ranked(item("https://d.com/4", 0.8, None));
        bundle.sort_tiers();
        let urls: Vec<&str> = bundle.l3.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://b.com/2",
                "https://c.com/3",
                "https://a.com/1",
                "https://d.com/4"
            ]
        );
    }

    #[test]
    fn trim_caps_tiers_and_snippets() {
        let mut bundle = EvidenceBundle::default();
        for i in 0..10 {
            let mut it = item(&format!("https://s{i}.com/x"), 0.8, None);
            it.snippet = "word ".repeat(200);
            bundle.insert_ranked(it);
        }
        let trimmed = bundle.trimmed(&Tuning::default());
        assert_eq!(trimmed.l3.len(), 5);
        assert!(trimmed.l3[0].snippet.chars().count() <= 280);
        assert!(!trimmed.l3[0].snippet.contains("  "));
    }

    #[test]
    fn empty_bundle_detection() {
        let bundle = EvidenceBundle::default();
        assert!(bundle.is_empty());
    }
}
