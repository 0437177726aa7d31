use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Time scope of a claim relative to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeScope {
    Past,
    #[default]
    Present,
    Future,
}

/// Part of day referenced by a weather claim. Windows (local time) are
/// applied by the weather provider: morning 06–12, afternoon 12–18,
/// evening 18–24, night 20–24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl PartOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }
}

/// Deterministic signals extracted from a raw claim. No network, no clock:
/// `days_ahead` is an offset, not a date.
#[derive(Debug, Clone, Default)]
pub struct ClaimSignals {
    pub is_weather: bool,
    pub city_candidate: Option<String>,
    pub time_scope: TimeScope,
    pub days_ahead: Option<i64>,
    pub relative_time: Option<String>,
    pub part_of_day: Option<PartOfDay>,
    pub is_common_knowledge: bool,
}

/// Fold a string for matching: lowercase, strip diacritics, collapse
/// whitespace/hyphen/underscore/dot runs to single spaces.
///
/// The fold table covers the Vietnamese alphabet plus the Latin accents the
/// multilingual lexicons use; combining marks are dropped.
pub fn fold(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for ch in s.chars() {
        let ch = ch.to_lowercase().next().unwrap_or(ch);
        let folded = fold_char(ch);
        match folded {
            Some(c) if c.is_whitespace() || matches!(c, '-' | '_' | '.') => {
                if !last_space {
                    out.push(' ');
                    last_space = true;
                }
            }
            Some(c) => {
                out.push(c);
                last_space = false;
            }
            None => {}
        }
    }
    out.trim().to_string()
}

/// Map one lowercased char to its unaccented base, or None to drop it
/// (combining marks).
fn fold_char(c: char) -> Option<char> {
    // Combining diacritical marks
    if ('\u{0300}'..='\u{036f}').contains(&c) {
        return None;
    }
    let base = match c {
        'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ'
        | 'ẩ' | 'ẫ' | 'ậ' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ' | 'ë' => 'e',
        'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' | 'ï' | 'î' => 'i',
        'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ'
        | 'ở' | 'ỡ' | 'ợ' | 'ö' => 'o',
        'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' | 'ü' | 'û' => 'u',
        'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
        'đ' => 'd',
        'ñ' => 'n',
        'ç' => 'c',
        'ß' => 's',
        other => other,
    };
    Some(base)
}

/// Multilingual weather lexicon, folded forms. Matched on word boundaries.
static WEATHER_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(thoi tiet|du bao|nhiet do|suong mu|do am|nang nong|mua lon|weather|forecasts?|temperatures?|humidity|tuyet|snow(?:ed|ing|s|fall)?|mua|rain(?:ed|ing|s|y|fall)?|nang|sunny|nong|hot|lanh|cold|bao|storm(?:s|y)?|gio|wind(?:y)?|fog(?:gy)?)\b",
    )
    .expect("weather lexicon regex")
});

/// Folded tokens that look like city candidates but are time words.
const TIME_STOPWORDS: &[&str] = &[
    "ngay", "hom", "qua", "mai", "sang", "chieu", "toi", "dem", "tuan", "nam", "thang", "today",
    "tomorrow", "yesterday", "morning", "afternoon", "evening", "night",
];

/// Common cities matched first, before pattern extraction. Entries from the
/// common-city list are trusted even when single-token.
const COMMON_CITIES: &[&str] = &[
    "Thành phố Hồ Chí Minh",
    "Hồ Chí Minh",
    "Ho Chi Minh City",
    "Hà Nội",
    "Hanoi",
    "Đà Nẵng",
    "Da Nang",
    "Hải Phòng",
    "Hai Phong",
    "Cần Thơ",
    "Can Tho",
    "Nha Trang",
    "Vũng Tàu",
    "New York",
    "Los Angeles",
    "San Francisco",
    "London",
    "Paris",
    "Tokyo",
    "Seoul",
    "Beijing",
    "Shanghai",
    "Bangkok",
    "Singapore",
    "Sydney",
    "Berlin",
    "Moscow",
];

/// "in X", "at X", "tại X", "thành phố X" affix patterns across languages.
static CITY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:tại|ở|in|at|thành phố|city of|ville de|ciudad de|stadt)\s+([\p{Lu}][\p{L}\-'\.]*(?:\s+[\p{Lu}][\p{L}\-'\.]*)*)",
    )
    .expect("city prefix regex")
});

/// "X city", "X province" suffix patterns.
static CITY_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([\p{Lu}][\p{L}\-'\.]*(?:\s+[\p{Lu}][\p{L}\-'\.]*)*)\s+(?:city|province|state|county|prefecture|shi|ken|市|省)",
    )
    .expect("city suffix regex")
});

/// Title-Case Unicode n-grams (n >= 2), the last-resort city extractor.
static TITLE_NGRAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([\p{Lu}][\p{L}\-']+(?:\s+[\p{Lu}][\p{L}\-']+)+)\b").expect("ngram regex")
});

static DAYS_AHEAD_VN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*ngay\s*(?:nua|toi|sau)").expect("days vn regex"));

static DAYS_AHEAD_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"in\s+(\d+)\s*days?\b|(\d+)\s*days?\s*(?:ahead|later|from now)")
        .expect("days en regex")
});

static YEARS_AGO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*(?:years? ago|nam truoc)").expect("years ago regex"));

/// Fixed registry of universally true/false statements. Matching any entry
/// forces volatility to low, whatever the planner model said.
static COMMON_KNOWLEDGE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Scientific facts
        r"mat troi moc (o |phia )?(huong )?dong",
        r"sun rises in the east",
        r"nuoc soi o 100 do",
        r"water boils at 100",
        r"trai dat quay quanh mat troi",
        r"earth revolves around the sun",
        r"nuoc dong bang o 0 do",
        r"water freezes at 0",
        r"oxygen is necessary",
        // Geographic facts
        r"paris (la|is) (thu do|the capital)( cua phap| of france)",
        r"london (la|is) (thu do|the capital)( cua anh| of england)",
        r"ha noi (la|is) (thu do|the capital)( cua viet nam| of vietnam)",
        r"viet nam nam o dong nam a",
        r"vietnam is in southeast asia",
        r"nile is the longest river",
        // Mathematical facts
        r"2\s*\+\s*2\s*=\s*4",
        r"1\s*\+\s*1\s*=\s*2",
        // Well-established history
        r"the chien 2 ket thuc nam 1945",
        r"world war 2 ended in 1945",
        r"viet nam doc lap nam 1945",
        r"vietnam gained independence in 1945",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("common knowledge regex"))
    .collect()
});

/// Classify a claim. Pure and deterministic.
pub fn classify(text: &str) -> ClaimSignals {
    let folded = fold(text);

    let is_weather = WEATHER_TERMS.is_match(&folded);
    let city_candidate = if is_weather { extract_city(text) } else { None };
    let (time_scope, days_ahead, relative_time) = relative_time_of(&folded);
    let part_of_day = part_of_day_of(&folded);

    ClaimSignals {
        is_weather,
        city_candidate,
        time_scope,
        days_ahead,
        relative_time,
        part_of_day,
        is_common_knowledge: COMMON_KNOWLEDGE.iter().any(|re| re.is_match(&folded)),
    }
}

/// Candidate validity for pattern-extracted names: multi-token, more than
/// two letters folded, not a time stopword, not shouting initials.
fn valid_candidate(s: &str) -> bool {
    let folded = fold(s);
    if folded.replace(' ', "").chars().count() < 3 {
        return false;
    }
    if folded.split(' ').any(|tok| TIME_STOPWORDS.contains(&tok)) {
        return false;
    }
    if s.chars().count() <= 3 && s.chars().all(|c| c.is_uppercase()) {
        return false;
    }
    s.chars().any(|c| c.is_alphabetic())
}

/// Cascading city extraction: common-city list, affix patterns, then the
/// longest Title-Case n-gram.
pub fn extract_city(text: &str) -> Option<String> {
    let folded = fold(text);

    // (a) Common-city list. Longest entries first so "Thành phố Hồ Chí Minh"
    // wins over "Hồ Chí Minh". List membership trumps the single-token rule.
    let mut commons: Vec<&str> = COMMON_CITIES.to_vec();
    commons.sort_by_key(|c| std::cmp::Reverse(c.len()));
    for city in commons {
        let city_folded = fold(city);
        if folded.contains(&city_folded) {
            return Some((*city).to_string());
        }
    }

    // (b) Affix patterns. Captures must pass candidate validity and carry
    // at least two tokens (single capitalized words are too often names).
    for re in [&*CITY_PREFIX, &*CITY_SUFFIX] {
        for cap in re.captures_iter(text) {
            let raw = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            let cleaned = strip_time_tokens(raw);
            if valid_candidate(&cleaned) && cleaned.split_whitespace().count() >= 2 {
                return Some(cleaned);
            }
        }
    }

    // (c) Longest Title-Case n-gram (n >= 2).
    let mut grams: Vec<String> = TITLE_NGRAM
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|g| valid_candidate(g))
        .collect();
    grams.sort_by_key(|g| std::cmp::Reverse(g.split_whitespace().count()));
    grams.into_iter().next()
}

/// Remove trailing time words that affix patterns tend to swallow
/// ("in Hanoi tomorrow" captures "Hanoi tomorrow").
fn strip_time_tokens(s: &str) -> String {
    let kept: Vec<&str> = s
        .split_whitespace()
        .filter(|tok| {
            let f = fold(tok);
            !TIME_STOPWORDS.contains(&f.as_str())
        })
        .collect();
    kept.join(" ")
}

/// Relative-time precedence: explicit day offset first, then tomorrow,
/// today, next week, yesterday, and finally open historical phrases.
fn relative_time_of(folded: &str) -> (TimeScope, Option<i64>, Option<String>) {
    if let Some(cap) = DAYS_AHEAD_VN.captures(folded)
        && let Ok(n) = cap[1].parse::<i64>()
    {
        return (TimeScope::Future, Some(n), Some(format!("{n} ngày nữa")));
    }
    if let Some(cap) = DAYS_AHEAD_EN.captures(folded) {
        let digits = cap.get(1).or_else(|| cap.get(2));
        if let Some(m) = digits
            && let Ok(n) = m.as_str().parse::<i64>()
        {
            return (TimeScope::Future, Some(n), Some(format!("in {n} days")));
        }
    }
    if folded.contains("ngay mai")
        || folded.contains("sang mai")
        || folded.contains("chieu mai")
        || folded.contains("toi mai")
        || folded.contains("tomorrow")
    {
        return (TimeScope::Future, Some(1), Some("ngày mai".to_string()));
    }
    if folded.contains("hom nay")
        || folded.contains("hien tai")
        || folded.contains("bay gio")
        || folded.contains("today")
        || folded.contains(" now")
    {
        return (TimeScope::Present, Some(0), Some("hôm nay".to_string()));
    }
    if folded.contains("tuan toi") || folded.contains("tuan sau") || folded.contains("next week") {
        return (TimeScope::Future, Some(7), Some("tuần tới".to_string()));
    }
    if folded.contains("hom qua") || folded.contains("yesterday") {
        return (TimeScope::Past, Some(-1), Some("hôm qua".to_string()));
    }
    if folded.contains("nam truoc")
        || folded.contains("nam ngoai")
        || folded.contains("last year")
        || folded.contains("qua khu")
        || YEARS_AGO.is_match(folded)
    {
        return (TimeScope::Past, None, None);
    }
    (TimeScope::Present, None, None)
}

/// `tới` (upcoming) folds to the same token as `tối` (evening); strip the
/// time phrases that contain it before looking for an evening marker.
static NOT_EVENING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:tuan|ngay|thang|\d+\s*ngay)\s+toi").expect("not-evening regex")
});

fn part_of_day_of(folded: &str) -> Option<PartOfDay> {
    static MORNING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(sang|morning)\b").expect("morning regex"));
    static AFTERNOON: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(chieu|afternoon)\b").expect("afternoon regex"));
    static NIGHT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(dem|night)\b").expect("night regex"));
    static EVENING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(toi|evening)\b").expect("evening regex"));

    if MORNING.is_match(folded) {
        return Some(PartOfDay::Morning);
    }
    if AFTERNOON.is_match(folded) {
        return Some(PartOfDay::Afternoon);
    }
    if NIGHT.is_match(folded) {
        return Some(PartOfDay::Night);
    }
    let without = NOT_EVENING.replace_all(folded, " ");
    if EVENING.is_match(&without) {
        return Some(PartOfDay::Evening);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_strips_vietnamese_diacritics() {
        assert_eq!(fold("Thời tiết Hà Nội"), "thoi tiet ha noi");
        assert_eq!(fold("ĐÀ   NẴNG"), "da nang");
        assert_eq!(fold("mưa-to.ngập_úng"), "mua to ngap ung");
    }

    #[test]
    fn weather_detection_multilingual() {
        assert!(classify("Ngày mai trời mưa to ở Hà Nội").is_weather);
        assert!(classify("Heavy snow expected in London tomorrow").is_weather);
        assert!(classify("Nhiệt độ Đà Nẵng lên 40 độ").is_weather);
        assert!(!classify("Paris is the capital of France.").is_weather);
    }

    #[test]
    fn city_only_claim_is_not_weather() {
        let s = classify("Hà Nội");
        assert!(!s.is_weather);
        assert!(s.city_candidate.is_none());
    }

    #[test]
    fn common_city_match_prefers_longest() {
        let s = classify("Dự báo mưa tại Thành phố Hồ Chí Minh chiều nay");
        assert_eq!(s.city_candidate.as_deref(), Some("Thành phố Hồ Chí Minh"));
    }

    #[test]
    fn common_city_single_token_is_trusted() {
        let s = classify("Weather in Hanoi tomorrow afternoon.");
        assert!(s.is_weather);
        assert_eq!(s.city_candidate.as_deref(), Some("Hanoi"));
        assert_eq!(s.days_ahead, Some(1));
        assert_eq!(s.part_of_day, Some(PartOfDay::Afternoon));
    }

    #[test]
    fn single_token_pattern_candidate_rejected() {
        // "Hồ" is a single token and not in the common-city list.
        let s = classify("Trời mưa ở Hồ hôm nay");
        assert!(s.is_weather);
        assert!(s.city_candidate.is_none());
    }

    #[test]
    fn title_case_ngram_fallback() {
        let city = extract_city("Buôn Ma Thuột hứng tuyết rơi dày sáng nay");
        assert_eq!(city.as_deref(), Some("Buôn Ma Thuột"));
    }

    #[test]
    fn days_ahead_precedence_explicit_over_tomorrow() {
        // Explicit "3 ngày nữa" wins even though "mai" is absent anyway.
        let s = classify("Thời tiết Hà Nội 3 ngày nữa");
        assert_eq!(s.days_ahead, Some(3));
        assert_eq!(s.time_scope, TimeScope::Future);
    }

    #[test]
    fn days_ahead_in_n_days() {
        assert_eq!(classify("weather in Paris in 5 days").days_ahead, Some(5));
    }

    #[test]
    fn days_ahead_ladder() {
        assert_eq!(classify("trời mưa ngày mai").days_ahead, Some(1));
        assert_eq!(classify("thời tiết hôm nay").days_ahead, Some(0));
        assert_eq!(classify("dự báo tuần tới").days_ahead, Some(7));
        assert_eq!(classify("trời mưa hôm qua").days_ahead, Some(-1));
    }

    #[test]
    fn yesterday_is_past_scope() {
        let s = classify("It snowed in Ho Chi Minh City yesterday.");
        assert!(s.is_weather);
        assert_eq!(s.time_scope, TimeScope::Past);
        assert_eq!(s.days_ahead, Some(-1));
        assert_eq!(s.city_candidate.as_deref(), Some("Ho Chi Minh City"));
    }

    #[test]
    fn historical_phrase_unsets_days_ahead() {
        let s = classify("Trận bão lớn nhất 10 năm trước");
        assert_eq!(s.time_scope, TimeScope::Past);
        assert_eq!(s.days_ahead, None);
    }

    #[test]
    fn next_week_is_not_evening() {
        assert_eq!(classify("dự báo thời tiết tuần tới").part_of_day, None);
        assert_eq!(
            classify("trời mưa tối nay").part_of_day,
            Some(PartOfDay::Evening)
        );
        assert_eq!(
            classify("mưa đêm nay ở Hà Nội").part_of_day,
            Some(PartOfDay::Night)
        );
    }

    #[test]
    fn common_knowledge_registry() {
        assert!(classify("Paris is the capital of France.").is_common_knowledge);
        assert!(classify("Mặt trời mọc phía đông").is_common_knowledge);
        assert!(classify("2 + 2 = 4").is_common_knowledge);
        assert!(!classify("iPhone 17 ra mắt tháng 9").is_common_knowledge);
    }

    #[test]
    fn classify_is_deterministic() {
        let a = classify("Ngày mai trời mưa to ở Hà Nội");
        let b = classify("Ngày mai trời mưa to ở Hà Nội");
        assert_eq!(a.is_weather, b.is_weather);
        assert_eq!(a.city_candidate, b.city_candidate);
        assert_eq!(a.days_ahead, b.days_ahead);
    }
}
