use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classify::{ClaimSignals, PartOfDay, TimeScope};
use crate::queries;

/// Forecast horizon and history depth for weather tool calls, in days.
pub const MAX_FORECAST_DAYS: i64 = 7;
pub const MAX_HISTORY_DAYS: i64 = 5;

/// Maximum search queries per tool call in bounded mode.
pub const MAX_BOUNDED_QUERIES: usize = 5;

/// A claim: original text plus its immutable hash (cache key input).
#[derive(Debug, Clone)]
pub struct Claim {
    pub text: String,
    pub hash: String,
}

impl Claim {
    pub fn new(text: &str) -> Self {
        let normalized = normalize_whitespace(text);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self {
            text: text.trim().to_string(),
            hash: hex::encode(hasher.finalize()),
        }
    }
}

pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimType {
    Weather,
    CommonKnowledge,
    Historical,
    Sports,
    Politics,
    Tech,
    #[default]
    General,
}

impl ClaimType {
    /// Lenient mapping from whatever label the planner model produced.
    /// Labels arrive in Vietnamese or English, free-form.
    pub fn from_label(label: &str) -> Self {
        let folded = crate::classify::fold(label);
        if folded.contains("weather") || folded.contains("thoi tiet") {
            Self::Weather
        } else if folded.contains("lich su")
            || folded.contains("histor")
            || folded.contains("su kien lich su")
        {
            Self::Historical
        } else if folded.contains("common") || folded.contains("hien nhien") {
            Self::CommonKnowledge
        } else if folded.contains("sport") || folded.contains("the thao") {
            Self::Sports
        } else if folded.contains("politic") || folded.contains("chinh tri") {
            Self::Politics
        } else if folded.contains("tech") || folded.contains("cong nghe") {
            Self::Tech
        } else {
            Self::General
        }
    }
}

/// Rate at which the truth of a claim can change. Governs cacheability:
/// only static/low plans are inserted into the semantic cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    Static,
    Low,
    #[default]
    Medium,
    High,
}

impl Volatility {
    pub fn from_label(label: &str) -> Self {
        match crate::classify::fold(label).as_str() {
            "static" => Self::Static,
            "low" | "thap" => Self::Low,
            "high" | "cao" => Self::High,
            _ => Self::Medium,
        }
    }

    pub fn cacheable(&self) -> bool {
        matches!(self, Self::Static | Self::Low)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Entities {
    pub locations: Vec<String>,
    pub persons: Vec<String>,
    pub organizations: Vec<String>,
    pub events: Vec<String>,
    pub data_points: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeReferences {
    pub explicit_date: Option<NaiveDate>,
    pub relative_time: Option<String>,
    pub time_scope: TimeScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Broad,
    Targeted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchParams {
    pub queries: Vec<String>,
    #[serde(default)]
    pub search_type: SearchType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherParams {
    #[serde(alias = "city")]
    pub city_canonical: Option<String>,
    #[serde(default)]
    pub days_ahead: i64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub part_of_day: Option<PartOfDay>,
}

/// Closed union of tool invocations. Wire shape matches the planner model's
/// output: `{"tool_name": "search", "parameters": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "tool_name", content = "parameters", rename_all = "lowercase")]
pub enum ToolCall {
    Search(SearchParams),
    Weather(WeatherParams),
}

impl ToolCall {
    pub fn is_search(&self) -> bool {
        matches!(self, Self::Search(_))
    }

    pub fn is_weather(&self) -> bool {
        matches!(self, Self::Weather(_))
    }
}

/// Typed action plan. Produced by the planner, consumed by the executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub main_claim: String,
    pub claim_type: ClaimType,
    pub volatility: Volatility,
    #[serde(alias = "entities_and_values")]
    pub entities: Entities,
    #[serde(default)]
    pub time_references: TimeReferences,
    pub required_tools: Vec<ToolCall>,
}

impl Plan {
    /// Topic category string for the cache record.
    pub fn topic_category(&self) -> &'static str {
        match self.claim_type {
            ClaimType::Weather => "weather",
            ClaimType::CommonKnowledge => "common_knowledge",
            ClaimType::Historical => "historical",
            ClaimType::Sports => "sports",
            ClaimType::Politics => "politics",
            ClaimType::Tech => "tech",
            ClaimType::General => "general",
        }
    }
}

/// Loosely-typed plan as the LLM emits it. Every field optional; unknown
/// tool names are dropped during normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPlan {
    pub main_claim: Option<String>,
    pub claim_type: Option<String>,
    pub volatility: Option<String>,
    #[serde(alias = "entities_and_values")]
    pub entities: Option<Entities>,
    pub time_references: Option<RawTimeReferences>,
    pub required_tools: Vec<RawToolCall>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTimeReferences {
    pub explicit_date: Option<String>,
    pub relative_time: Option<String>,
    pub time_scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Extract the first balanced JSON object from LLM response text.
/// Tolerant of fences and prose; tracks string/escape state so braces in
/// string literals don't break depth matching.
pub fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a raw LLM response into a RawPlan. Empty when nothing parses.
pub fn parse_raw_plan(text: &str) -> RawPlan {
    let Some(json) = find_json_object(text) else {
        tracing::warn!("planner response contained no JSON object");
        return RawPlan::default();
    };
    match serde_json::from_str(json) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!("planner JSON did not match plan shape: {e}");
            RawPlan::default()
        }
    }
}

static DATA_POINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,3}\s?(?:°C|mm|%))").expect("data point regex"));

/// Unit-bearing numeric literals ("40°C", "120mm", "85%") found in a text.
pub fn extract_data_points(text: &str) -> Vec<String> {
    DATA_POINT
        .captures_iter(text)
        .map(|cap| cap[1].trim().to_string())
        .collect()
}

/// Inputs the normalizer needs beyond the raw plan. Keeping the clock and
/// the geocoded city as parameters keeps normalization pure and idempotent.
pub struct NormalizeContext<'a> {
    pub signals: &'a ClaimSignals,
    /// English canonical city from the geocoder, when one resolved.
    pub resolved_city: Option<String>,
    pub today: NaiveDate,
    /// Bounded mode truncates search queries to MAX_BOUNDED_QUERIES.
    pub bounded: bool,
}

/// Normalize a raw plan into the typed schema. Idempotent: feeding a
/// serialized normalized plan back through yields the same plan.
pub fn normalize_plan(raw: RawPlan, claim: &str, ctx: &NormalizeContext<'_>) -> Plan {
    let claim = normalize_whitespace(claim);
    let signals = ctx.signals;

    let mut entities = raw.entities.unwrap_or_default();
    for point in extract_data_points(&claim) {
        if !entities.data_points.contains(&point) {
            entities.data_points.push(point);
        }
    }

    let raw_time = raw.time_references.unwrap_or_default();
    let explicit_date = raw_time
        .explicit_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    let time_scope = match raw_time.time_scope.as_deref() {
        Some(s) => match crate::classify::fold(s).as_str() {
            "past" | "historical" | "qua khu" => TimeScope::Past,
            "future" | "present future" | "tuong lai" => TimeScope::Future,
            _ => signals.time_scope,
        },
        None => signals.time_scope,
    };

    let mut claim_type = raw
        .claim_type
        .as_deref()
        .map(ClaimType::from_label)
        .unwrap_or_default();
    let mut volatility = raw
        .volatility
        .as_deref()
        .map(Volatility::from_label)
        .unwrap_or_default();

    // Common knowledge and settled history cannot change: force low
    // volatility regardless of what the model said.
    if signals.is_common_knowledge
        || time_scope == TimeScope::Past
        || claim_type == ClaimType::Historical
        || claim_type == ClaimType::CommonKnowledge
    {
        volatility = Volatility::Low;
    }

    let mut tools: Vec<ToolCall> = raw
        .required_tools
        .into_iter()
        .filter_map(|t| parse_tool(&t))
        .collect();

    if signals.is_weather {
        claim_type = ClaimType::Weather;
        volatility = Volatility::High;

        // days_ahead precedence: direct parse from the claim beats the
        // model's weather tool date, which beats the plan's explicit date.
        let model_date = tools.iter().find_map(|t| match t {
            ToolCall::Weather(w) => w.date,
            _ => None,
        });
        let (days_ahead, date) = if let Some(n) = signals.days_ahead {
            let n = n.clamp(-MAX_HISTORY_DAYS, MAX_FORECAST_DAYS);
            (n, ctx.today + chrono::Duration::days(n))
        } else if let Some(d) = model_date.or(explicit_date) {
            let clamped = (d - ctx.today)
                .num_days()
                .clamp(-MAX_HISTORY_DAYS, MAX_FORECAST_DAYS);
            (clamped, d)
        } else {
            (0, ctx.today)
        };

        let city = ctx
            .resolved_city
            .clone()
            .or_else(|| signals.city_candidate.clone());
        if let Some(ref c) = city
            && !entities.locations.iter().any(|l| l == c)
        {
            entities.locations.push(c.clone());
        }

        // Historical phrasing without a pinned date keeps date unset so the
        // executor can surface historical_date_required.
        let date = if signals.time_scope == TimeScope::Past && signals.days_ahead.is_none() {
            explicit_date
        } else {
            Some(date)
        };

        // Exactly one weather call, no search calls.
        tools = vec![ToolCall::Weather(WeatherParams {
            city_canonical: city,
            days_ahead,
            date,
            part_of_day: signals.part_of_day,
        })];
    } else {
        let existing: Vec<String> = tools
            .iter()
            .filter_map(|t| match t {
                ToolCall::Search(s) => Some(s.queries.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        let search_type = tools
            .iter()
            .find_map(|t| match t {
                ToolCall::Search(s) => Some(s.search_type),
                _ => None,
            })
            .unwrap_or_default();

        let plan_view = queries::PlanView {
            main_claim: raw.main_claim.as_deref().unwrap_or(&claim),
            explicit_date: explicit_date.map(|d| d.to_string()),
            entities: &entities,
        };
        let synthesized = queries::build_query_bundle(&claim, &plan_view, &existing, ctx.today);
        let final_queries = if ctx.bounded {
            synthesized.into_iter().take(MAX_BOUNDED_QUERIES).collect()
        } else {
            synthesized
        };

        // One consolidated search call; weather calls never survive a
        // non-weather claim.
        tools.retain(|t| !t.is_weather());
        tools = vec![ToolCall::Search(SearchParams {
            queries: final_queries,
            search_type,
        })];
    }

    Plan {
        main_claim: raw.main_claim.map(|m| normalize_whitespace(&m)).filter(|m| !m.is_empty()).unwrap_or_else(|| claim.clone()),
        claim_type,
        volatility,
        entities,
        time_references: TimeReferences {
            explicit_date,
            relative_time: signals
                .relative_time
                .clone()
                .or(raw_time.relative_time),
            time_scope,
        },
        required_tools: tools,
    }
}

fn parse_tool(raw: &RawToolCall) -> Option<ToolCall> {
    match raw.tool_name.as_str() {
        "search" => serde_json::from_value::<SearchParams>(raw.parameters.clone())
            .ok()
            .map(ToolCall::Search),
        "weather" => serde_json::from_value::<WeatherParams>(raw.parameters.clone())
            .ok()
            .map(ToolCall::Weather),
        other => {
            tracing::debug!("dropping unknown tool '{other}' from plan");
            None
        }
    }
}

/// Re-normalize an already-typed plan (used by the idempotence law and the
/// refresher path, which replans from a cached record).
pub fn renormalize(plan: &Plan, claim: &str, ctx: &NormalizeContext<'_>) -> Plan {
    let value = serde_json::to_value(plan).unwrap_or_default();
    let raw: RawPlan = serde_json::from_value(value).unwrap_or_default();
    normalize_plan(raw, claim, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
    }

    fn ctx_for<'a>(signals: &'a ClaimSignals, city: Option<&str>) -> NormalizeContext<'a> {
        NormalizeContext {
            signals,
            resolved_city: city.map(|c| c.to_string()),
            today: today(),
            bounded: true,
        }
    }

    #[test]
    fn find_json_handles_nesting_and_strings() {
        let text = "Sure! ```json\n{\"a\": {\"b\": \"}\"}, \"c\": 1}\n``` trailing";
        let json = find_json_object(text).unwrap();
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(v["c"], 1);
    }

    #[test]
    fn find_json_none_when_absent() {
        assert!(find_json_object("no json here").is_none());
    }

    #[test]
    fn tool_call_wire_shape() {
        let call = ToolCall::Search(SearchParams {
            queries: vec!["q".to_string()],
            search_type: SearchType::Broad,
        });
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["tool_name"], "search");
        assert_eq!(v["parameters"]["queries"][0], "q");
    }

    #[test]
    fn weather_claim_gets_exactly_one_weather_call() {
        let claim = "Weather in Hanoi tomorrow afternoon.";
        let signals = classify(claim);
        let plan = normalize_plan(RawPlan::default(), claim, &ctx_for(&signals, Some("Hanoi")));

        assert_eq!(plan.claim_type, ClaimType::Weather);
        assert_eq!(plan.volatility, Volatility::High);
        assert_eq!(plan.required_tools.len(), 1);
        let ToolCall::Weather(ref w) = plan.required_tools[0] else {
            panic!("expected weather call");
        };
        assert_eq!(w.city_canonical.as_deref(), Some("Hanoi"));
        assert_eq!(w.days_ahead, 1);
        assert_eq!(w.date, Some(today() + chrono::Duration::days(1)));
        assert!(plan.required_tools.iter().all(|t| !t.is_search()));
    }

    #[test]
    fn direct_parse_beats_model_days_ahead() {
        let claim = "Thời tiết Hà Nội 3 ngày nữa";
        let signals = classify(claim);
        let raw = RawPlan {
            required_tools: vec![RawToolCall {
                tool_name: "weather".to_string(),
                parameters: serde_json::json!({"city": "Hanoi", "date": "2026-08-06"}),
            }],
            ..Default::default()
        };
        let plan = normalize_plan(raw, claim, &ctx_for(&signals, Some("Hanoi")));
        let ToolCall::Weather(ref w) = plan.required_tools[0] else {
            panic!("expected weather call");
        };
        assert_eq!(w.days_ahead, 3);
    }

    #[test]
    fn non_weather_claim_gets_search_with_raw_first() {
        let claim = "  Real Madrid   won the 2024 Champions League final  ";
        let signals = classify(claim);
        let plan = normalize_plan(RawPlan::default(), claim, &ctx_for(&signals, None));

        assert!(!plan.required_tools.is_empty());
        let ToolCall::Search(ref s) = plan.required_tools[0] else {
            panic!("expected search call");
        };
        assert_eq!(s.queries[0], normalize_whitespace(claim));
        assert!(s.queries.len() <= MAX_BOUNDED_QUERIES);
        assert!(plan.required_tools.iter().all(|t| !t.is_weather()));
    }

    #[test]
    fn common_knowledge_forces_low_volatility() {
        let claim = "Paris is the capital of France.";
        let signals = classify(claim);
        let raw = RawPlan {
            volatility: Some("high".to_string()),
            ..Default::default()
        };
        let plan = normalize_plan(raw, claim, &ctx_for(&signals, None));
        assert_eq!(plan.volatility, Volatility::Low);
        assert!(plan.volatility.cacheable());
    }

    #[test]
    fn past_scope_forces_low_volatility() {
        let claim = "Việt Nam vô địch AFF Cup năm ngoái";
        let signals = classify(claim);
        let plan = normalize_plan(RawPlan::default(), claim, &ctx_for(&signals, None));
        assert_eq!(plan.volatility, Volatility::Low);
    }

    #[test]
    fn data_points_extracted_from_claim() {
        let claim = "Nhiệt độ Hà Nội lên 40°C, độ ẩm 85% hôm nay";
        let signals = classify(claim);
        let plan = normalize_plan(RawPlan::default(), claim, &ctx_for(&signals, Some("Hanoi")));
        assert!(plan.entities.data_points.iter().any(|d| d == "40°C"));
        assert!(plan.entities.data_points.iter().any(|d| d == "85%"));
    }

    #[test]
    fn days_ahead_clamped_to_bounds() {
        let claim = "Thời tiết Hà Nội 30 ngày nữa";
        let signals = classify(claim);
        let plan = normalize_plan(RawPlan::default(), claim, &ctx_for(&signals, Some("Hanoi")));
        let ToolCall::Weather(ref w) = plan.required_tools[0] else {
            panic!("expected weather call");
        };
        assert_eq!(w.days_ahead, MAX_FORECAST_DAYS);
    }

    #[test]
    fn historical_weather_without_date_keeps_date_unset() {
        let claim = "Tuyết rơi ở Hà Nội năm ngoái";
        let signals = classify(claim);
        let plan = normalize_plan(RawPlan::default(), claim, &ctx_for(&signals, Some("Hanoi")));
        let ToolCall::Weather(ref w) = plan.required_tools[0] else {
            panic!("expected weather call");
        };
        assert!(w.date.is_none());
        assert_eq!(plan.time_references.time_scope, TimeScope::Past);
    }

    #[test]
    fn normalize_is_idempotent() {
        for claim in [
            "Weather in Hanoi tomorrow afternoon.",
            "Real Madrid won the 2024 Champions League final 2-0",
            "Paris is the capital of France.",
            "Bill Gates admitted vaccines contain microchips",
        ] {
            let signals = classify(claim);
            let ctx = ctx_for(&signals, signals.city_candidate.as_deref());
            let once = normalize_plan(RawPlan::default(), claim, &ctx);
            let twice = renormalize(&once, claim, &ctx);
            assert_eq!(once, twice, "normalize not idempotent for {claim:?}");
        }
    }
}
