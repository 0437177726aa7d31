//! Plan-level invariants: tool composition, query ordering, idempotence.

use attest::classify::classify;
use attest::plan::{
    MAX_BOUNDED_QUERIES, NormalizeContext, RawPlan, RawToolCall, ToolCall, normalize_plan,
    normalize_whitespace, renormalize,
};

fn today() -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
}

fn plan_for(claim: &str) -> attest::plan::Plan {
    let signals = classify(claim);
    let ctx = NormalizeContext {
        resolved_city: signals.city_candidate.clone(),
        signals: &signals,
        today: today(),
        bounded: true,
    };
    normalize_plan(RawPlan::default(), claim, &ctx)
}

const CLAIMS: &[&str] = &[
    "Paris is the capital of France.",
    "Weather in Hanoi tomorrow afternoon.",
    "Bill Gates admitted COVID-19 vaccines contain tracking microchips.",
    "Real Madrid won the 2024 Champions League final 2-0 over Dortmund.",
    "Vietnam will be renamed 'Federal Republic of Vietnam' in 2025.",
    "It snowed in Ho Chi Minh City yesterday.",
    "Ngày mai trời mưa to ở Đà Nẵng",
    "iPhone 17 ra mắt với giá 2000 USD",
];

#[test]
fn required_tools_never_empty() {
    for claim in CLAIMS {
        let plan = plan_for(claim);
        assert!(!plan.required_tools.is_empty(), "empty tools for {claim:?}");
    }
}

#[test]
fn weather_plans_have_exactly_one_weather_call_and_no_search() {
    for claim in CLAIMS {
        let plan = plan_for(claim);
        let weather = plan.required_tools.iter().filter(|t| t.is_weather()).count();
        let search = plan.required_tools.iter().filter(|t| t.is_search()).count();
        if plan.claim_type == attest::plan::ClaimType::Weather {
            assert_eq!(weather, 1, "claim {claim:?}");
            assert_eq!(search, 0, "claim {claim:?}");
        } else {
            assert!(search >= 1, "claim {claim:?}");
            assert_eq!(weather, 0, "claim {claim:?}");
        }
    }
}

#[test]
fn first_query_is_whitespace_normalized_raw_claim() {
    for claim in CLAIMS {
        let plan = plan_for(claim);
        for tool in &plan.required_tools {
            if let ToolCall::Search(s) = tool {
                assert_eq!(s.queries[0], normalize_whitespace(claim), "claim {claim:?}");
                assert!(s.queries.len() <= MAX_BOUNDED_QUERIES);
            }
        }
    }
}

#[test]
fn normalize_is_idempotent_across_claims() {
    for claim in CLAIMS {
        let signals = classify(claim);
        let ctx = NormalizeContext {
            resolved_city: signals.city_candidate.clone(),
            signals: &signals,
            today: today(),
            bounded: true,
        };
        let once = normalize_plan(RawPlan::default(), claim, &ctx);
        let twice = renormalize(&once, claim, &ctx);
        assert_eq!(once, twice, "claim {claim:?}");
    }
}

#[test]
fn misinformation_claim_fans_out_multiple_queries() {
    let plan = plan_for("Bill Gates admitted COVID-19 vaccines contain tracking microchips.");
    let ToolCall::Search(ref s) = plan.required_tools[0] else {
        panic!("expected search");
    };
    assert!(s.queries.len() >= 2, "queries: {:?}", s.queries);
}

#[test]
fn unknown_tools_from_model_are_dropped() {
    let claim = "Apple announced a new chip";
    let signals = classify(claim);
    let ctx = NormalizeContext {
        resolved_city: None,
        signals: &signals,
        today: today(),
        bounded: true,
    };
    let raw = RawPlan {
        required_tools: vec![
            RawToolCall {
                tool_name: "econ_data".to_string(),
                parameters: serde_json::json!({"series": "CPI"}),
            },
            RawToolCall {
                tool_name: "search".to_string(),
                parameters: serde_json::json!({"queries": ["apple chip"], "search_type": "targeted"}),
            },
        ],
        ..Default::default()
    };
    let plan = normalize_plan(raw, claim, &ctx);
    assert!(plan.required_tools.iter().all(|t| t.is_search()));
    // Model-proposed queries survive, after the raw claim.
    let ToolCall::Search(ref s) = plan.required_tools[0] else {
        panic!("expected search");
    };
    assert!(s.queries.iter().any(|q| q.contains("apple chip")));
    assert_eq!(s.search_type, attest::plan::SearchType::Targeted);
}

#[test]
fn yesterday_weather_claim_is_historical_with_negative_offset() {
    let plan = plan_for("It snowed in Ho Chi Minh City yesterday.");
    let ToolCall::Weather(ref w) = plan.required_tools[0] else {
        panic!("expected weather");
    };
    assert_eq!(w.days_ahead, -1);
    assert_eq!(
        w.date,
        Some(today() - chrono::Duration::days(1)),
        "yesterday resolves to a concrete date"
    );
    assert_eq!(
        attest::executor::weather_mode(w, plan.time_references.time_scope),
        "historical"
    );
}

#[test]
fn volatile_weather_plan_is_never_cacheable() {
    let plan = plan_for("Weather in Hanoi tomorrow afternoon.");
    assert!(!plan.volatility.cacheable());
    let stable = plan_for("Paris is the capital of France.");
    assert!(stable.volatility.cacheable());
}
