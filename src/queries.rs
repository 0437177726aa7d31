use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::classify::fold;
use crate::plan::{Entities, normalize_whitespace};

/// Borrowed view of the plan fields query synthesis needs.
pub struct PlanView<'a> {
    pub main_claim: &'a str,
    pub explicit_date: Option<String>,
    pub entities: &'a Entities,
}

static SENSATIONAL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(TIN NÓNG|NÓNG|BREAKING|TIN MỚI|SỐC|CẢNH BÁO|⚠️|🔴|📢|🚨|❗)[:!]*\s*",
    )
    .expect("sensational prefix regex")
});

static SOURCE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(Theo Reuters|Theo BBC|Theo AP|Thông tin từ AP|BBC đưa tin):?\s*")
        .expect("source prefix regex")
});

static CALL_TO_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[-–]\s*(Xem ngay|Chia sẻ ngay|Đọc thêm|Click here).*$")
        .expect("call to action regex")
});

static HAS_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("year regex"));

static EVENT_VERBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(ra mat|launch|launched|release|released|xay ra|happened|cong bo|announced)\b")
        .expect("event verb regex")
});

const NEWS_MARKERS: &[&str] = &["tin tuc", "news", "thong tin", "bao", "article", "report"];

const CONFLICT_TERMS: &[&str] = &[
    "chien su",
    "xung dot",
    "tan cong",
    "dung do",
    "invasion",
    "war",
    "attacked",
];

/// Key Vietnamese terms translated for English-language search passes.
/// Table-driven so additional pairs are purely data.
const VN_EN_TERMS: &[(&str, &str)] = &[
    ("vô địch", "won championship"),
    ("ra mắt", "launched"),
    ("công bố", "announced"),
    ("qua đời", "died"),
    ("mất tích", "missing"),
    ("động đất", "earthquake"),
    ("bầu cử", "election"),
    ("tổng thống", "president"),
    ("thủ tướng", "prime minister"),
    ("trí tuệ nhân tạo", "artificial intelligence"),
    ("Việt Nam", "Vietnam"),
    ("Hà Nội", "Hanoi"),
    ("bóng đá", "football"),
    ("tin tức", "news"),
    ("mới nhất", "latest"),
];

/// Signals that a claim is about an international story worth an English
/// search pass.
const INTERNATIONAL_MARKERS: &[&str] = &[
    "apple",
    "google",
    "microsoft",
    "openai",
    "tesla",
    "spacex",
    "nvidia",
    "samsung",
    "iphone",
    "world cup",
    "champions league",
    "premier league",
    "nba",
    "olympics",
    "biden",
    "trump",
    "putin",
    "elon musk",
    "boeing",
    "ukraine",
    "gaza",
    "israel",
];

/// True when the claim reads as Vietnamese (any folded-away diacritic or a
/// telltale particle).
fn likely_vietnamese(text: &str) -> bool {
    text.chars().any(|c| fold_changes(c))
        || {
            let folded = fold(text);
            ["cua", "nguoi", "viet nam", "khong", "nam", "thang"]
                .iter()
                .any(|w| folded.split(' ').any(|t| t == *w))
        }
}

fn fold_changes(c: char) -> bool {
    let lower = c.to_lowercase().next().unwrap_or(c);
    if lower.is_ascii() {
        return false;
    }
    let folded = crate::classify::fold(&lower.to_string());
    folded.chars().next() != Some(lower)
}

fn news_suffix(vietnamese: bool) -> &'static str {
    if vietnamese { "tin tức" } else { "news" }
}

/// Optimize one query for a news-leaning search backend: strip sensational
/// prefixes, guarantee a news keyword, attach the current year for undated
/// event queries. Idempotent.
pub fn optimize_query(query: &str, today: NaiveDate) -> String {
    let mut q = normalize_whitespace(query);
    q = SENSATIONAL_PREFIX.replace(&q, "").to_string();
    q = SOURCE_PREFIX.replace(&q, "").to_string();
    q = CALL_TO_ACTION.replace(&q, "").to_string();
    q = q.trim().to_string();
    if q.is_empty() {
        return q;
    }

    let folded = fold(&q);
    if !NEWS_MARKERS.iter().any(|kw| folded.contains(kw)) {
        let suffix = news_suffix(likely_vietnamese(&q));
        q = format!("{q} {suffix}");
    }

    let folded = fold(&q);
    if EVENT_VERBS.is_match(&folded) && !HAS_YEAR.is_match(&q) {
        q = format!("{q} {}", today.year());
    }

    q
}

/// Produce the ordered deduplicated query bundle for a search tool call.
///
/// `existing` carries queries already on the plan (model-proposed or from a
/// prior normalization pass); they keep their position ahead of freshly
/// synthesized ones, which makes the whole pass idempotent.
pub fn build_query_bundle(
    claim: &str,
    plan: &PlanView<'_>,
    existing: &[String],
    today: NaiveDate,
) -> Vec<String> {
    let raw = normalize_whitespace(claim);
    let vietnamese = likely_vietnamese(&raw);
    let folded_claim = fold(&raw);
    let year = today.year();

    let mut generated: Vec<String> = Vec::new();
    let mut push = |q: String| {
        let q = q.trim().to_string();
        if !q.is_empty() {
            generated.push(q);
        }
    };

    push(format!("{raw} {}", news_suffix(vietnamese)));

    let main = normalize_whitespace(plan.main_claim);
    if !main.is_empty() && fold(&main) != folded_claim {
        push(main);
    }

    if vietnamese && INTERNATIONAL_MARKERS.iter().any(|m| folded_claim.contains(m)) {
        push(format!("{} news", translate_vn(&raw)));
    }

    if EVENT_VERBS.is_match(&folded_claim) && !HAS_YEAR.is_match(&raw) {
        push(format!("{raw} {year}"));
    }
    if let Some(date) = &plan.explicit_date
        && date.len() >= 4
        && date[..4].chars().all(|c| c.is_ascii_digit())
        && !raw.contains(&date[..4])
    {
        push(format!("{raw} {}", &date[..4]));
    }

    for loc in plan.entities.locations.iter().take(3) {
        let loc = loc.trim();
        if !loc.is_empty() {
            push(format!("{loc} {raw}"));
        }
    }
    if let Some(org) = plan.entities.organizations.first() {
        let org = org.trim();
        if !org.is_empty() {
            push(format!("{org} {year}"));
        }
    }
    if let Some(event) = plan.entities.events.first() {
        let event = event.trim();
        if !event.is_empty() {
            push(event.to_string());
        }
    }

    if CONFLICT_TERMS.iter().any(|kw| folded_claim.contains(kw)) {
        for loc in plan.entities.locations.iter().take(2) {
            let loc = loc.trim();
            if !loc.is_empty() {
                push(format!("tình hình chiến sự {loc}"));
                push(format!("chiến sự {loc} mới nhất"));
            }
        }
    }

    // Raw claim always leads, unoptimized. Everything else is optimized and
    // deduplicated in order: plan-carried queries first, then synthesized.
    let mut out = vec![raw.clone()];
    let mut seen: Vec<String> = vec![fold(&raw)];
    for q in existing.iter().chain(generated.iter()) {
        let optimized = optimize_query(q, today);
        if optimized.is_empty() {
            continue;
        }
        let key = fold(&optimized);
        if !seen.contains(&key) {
            seen.push(key);
            out.push(optimized);
        }
    }
    out
}

/// Swap the high-value Vietnamese terms for English equivalents.
fn translate_vn(text: &str) -> String {
    let mut out = text.to_string();
    for (vn, en) in VN_EN_TERMS {
        if out.contains(vn) {
            out = out.replace(vn, en);
        }
    }
    out
}
