use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

/// Trust score for sources the pipeline may quote.
pub const USABLE: f32 = 0.8;
/// Trust score for user-generated, tabloid, and propaganda sources.
pub const BLOCKED: f32 = 0.1;

// Blocked-source tables. Membership is closed under subdomain prefixing:
// `m.facebook.com` is blocked because `facebook.com` is.

const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "fb.com",
    "fb.watch",
    "twitter.com",
    "x.com",
    "instagram.com",
    "tiktok.com",
    "youtube.com",
    "youtu.be",
    "reddit.com",
    "weibo.com",
    "telegram.org",
    "t.me",
    "threads.net",
    "mastodon.social",
    "bsky.app",
    "linkedin.com",
    "pinterest.com",
    "snapchat.com",
    "zalo.me",
    "zalo.vn",
];

const BLOG_PLATFORMS: &[&str] = &[
    "blogspot.com",
    "blogger.com",
    "wordpress.com",
    "wordpress.org",
    "tumblr.com",
    "substack.com",
    "medium.com",
    "wix.com",
    "weebly.com",
    "squarespace.com",
    "notion.so",
    "notion.site",
    "ghost.io",
    "towardsdatascience.com",
    "dev.to",
    "hashnode.dev",
];

const FORUM_MARKERS: &[&str] = &["forum", "community", "discuss", "boards", "voz.vn", "tinhte.vn", "otofun"];

const TABLOID_DOMAINS: &[&str] = &[
    "dailymail.co.uk",
    "thesun.co.uk",
    "mirror.co.uk",
    "express.co.uk",
    "nypost.com",
    "nationalenquirer.com",
    "tmz.com",
    "pagesix.com",
    "buzzfeed.com",
    "huffpost.com",
    "dailybeast.com",
    "infowars.com",
    "breitbart.com",
    "thegatewaypundit.com",
    "eva.vn",
    "afamily.vn",
    "ngoisao.net",
    "2sao.vn",
    "gamek.vn",
    "yan.vn",
    "yeah1.com",
    "docbao.vn",
    "webtretho.com",
    "tinmoi.vn",
    "tintuconline.com.vn",
    "soha.vn",
    "kienthuc.net.vn",
    "giadinh.net.vn",
    "anninhthudo.vn",
    "nguoiduatin.vn",
    "phapluatplus.vn",
    "congly.vn",
    "baomoi.com",
    "tiin.vn",
    "24h.com.vn",
    "doisongphapluat.com",
    "danviet.vn",
];

const PROPAGANDA_DOMAINS: &[&str] = &[
    "rfa.org",
    "rfavietnam.com",
    "voatiengviet.com",
    "nguoi-viet.com",
    "vietbao.com",
    "viettan.org",
    "chantroimoimedia.com",
    "danchimviet.info",
    "baocalitoday.com",
    "saigonnhonews.com",
    "vietbf.com",
    "vietinfo.eu",
    "thoibao.de",
    "luatkhoa.org",
    "thevietnamese.org",
    "rt.com",
    "sputniknews.com",
    "globalresearch.ca",
    "naturalnews.com",
    "zerohedge.com",
    "epochtimes.com",
    "theepochtimes.com",
    "ntd.com",
];

/// Path-scoped blocks for otherwise-usable hosts.
const BLOCKED_URL_PREFIXES: &[&str] = &["bbc.com/vietnamese", "www.bbc.com/vietnamese"];

const UNRELIABLE_DOMAINS: &[&str] = &[
    "dantricdn.com",
    "img.vn",
    "xahoi.com.vn",
    "vietnamfinance.vn",
    "petrotimes.vn",
    "congan.com.vn",
    "giadinhvietnam.com",
    "giaoducthoidai.vn",
    "baophapluat.vn",
    "baodatviet.vn",
    "theonion.com",
    "babylonbee.com",
    "clickhole.com",
    "waterfordwhispersnews.com",
];

const SUSPICIOUS_TLDS: &[&str] = &[
    ".xyz", ".top", ".click", ".online", ".site", ".website", ".space", ".store", ".shop",
    ".info", ".tk", ".ml", ".ga", ".cf", ".gq",
];

/// Publishers and brands commonly impersonated on throwaway TLDs.
const MAJOR_BRANDS: &[&str] = &[
    "vnexpress",
    "dantri",
    "tuoitre",
    "thanhnien",
    "vtv",
    "vov",
    "bbc",
    "cnn",
    "reuters",
    "google",
    "facebook",
    "apple",
    "microsoft",
];

/// Extract the lowercased host from a URL, dropping scheme, credentials,
/// port, path, and a leading `www.`.
pub fn host_of(url: &str) -> String {
    let rest = url.split("://").nth(1).unwrap_or(url);
    let rest = rest.split(['/', '?', '#']).next().unwrap_or("");
    let rest = rest.rsplit('@').next().unwrap_or("");
    let host = rest.split(':').next().unwrap_or("").to_lowercase();
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

fn in_set(host: &str, set: &[&str]) -> bool {
    set.iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

fn is_impersonation(host: &str) -> bool {
    SUSPICIOUS_TLDS.iter().any(|tld| host.ends_with(tld))
        && MAJOR_BRANDS.iter().any(|brand| host.contains(brand))
}

/// Pure binary classifier: USABLE (0.8) or BLOCKED (0.1).
///
/// Trusts everything except user-generated content, tabloids, propaganda,
/// known-unreliable outlets, suspicious TLDs, and brand impersonations.
pub fn rank(url: &str) -> f32 {
    let host = host_of(url);
    if host.is_empty() {
        return USABLE;
    }

    let lowered = url.to_lowercase();
    let lowered = lowered.split("://").nth(1).unwrap_or(&lowered);
    if BLOCKED_URL_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        return BLOCKED;
    }

    if is_impersonation(&host)
        || in_set(&host, SOCIAL_DOMAINS)
        || in_set(&host, BLOG_PLATFORMS)
        || FORUM_MARKERS.iter().any(|kw| host.contains(kw))
        || in_set(&host, TABLOID_DOMAINS)
        || in_set(&host, PROPAGANDA_DOMAINS)
        || in_set(&host, UNRELIABLE_DOMAINS)
        || SUSPICIOUS_TLDS.iter().any(|tld| host.ends_with(tld))
    {
        return BLOCKED;
    }

    USABLE
}

// --- Date extraction -------------------------------------------------------

/// Metatag keys checked for a publication date, in priority order.
const DATE_KEYS: &[&str] = &[
    "article:published_time",
    "og:published_time",
    "date",
    "og:updated_time",
    "article:modified_time",
    "article:published",
    "publishdate",
    "pubdate",
    "datePublished",
    "dateModified",
    "parsely-pub-date",
    "sailthru.date",
    "dc.date",
    "dc.date.issued",
];

static MS_AND_TZ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\d{1,6}(Z|[+\-]\d{2}:?\d{2})?$").expect("ms regex"));

static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+(\d{1,2}),?\s*(\d{4})\b")
        .expect("month-day-year regex")
});

static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+(\d{4})\b")
        .expect("day-month-year regex")
});

static URL_YMD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(20\d{2})[\-/](\d{1,2})[\-/](\d{1,2})/").expect("url ymd"));

static URL_DMY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d{1,2})[\-/](\d{1,2})[\-/](20\d{2})/").expect("url dmy"));

static TEXT_YMD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2})[\-/](\d{1,2})[\-/](\d{1,2})\b").expect("text ymd"));

static TEXT_DMY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})[\-/](\d{1,2})[\-/](20\d{2})\b").expect("text dmy"));

fn month_number(name: &str) -> Option<u32> {
    let lowered = name.to_lowercase();
    match lowered.get(..3)? {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

fn ymd(y: i32, m: u32, d: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(y, m, d).map(|date| date.format("%Y-%m-%d").to_string())
}

/// Best-effort parse of one date string in any of the tolerated formats.
/// Returns a normalized `YYYY-MM-DD`, so parsing its own output is a
/// fixed point.
pub fn parse_date_str(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let normalized = MS_AND_TZ.replace(s, "").to_string();
    let normalized = normalized.replace('Z', "+00:00");

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(dt.date().format("%Y-%m-%d").to_string());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(&normalized, fmt) {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    if let Some(cap) = DAY_MONTH_YEAR.captures(s) {
        let d: u32 = cap[1].parse().ok()?;
        let m = month_number(&cap[2])?;
        let y: i32 = cap[3].parse().ok()?;
        return ymd(y, m, d);
    }
    if let Some(cap) = MONTH_DAY_YEAR.captures(s) {
        let m = month_number(&cap[1])?;
        let d: u32 = cap[2].parse().ok()?;
        let y: i32 = cap[3].parse().ok()?;
        return ymd(y, m, d);
    }
    None
}

/// Extract a publication date for a search item: structured metadata first,
/// then URL date segments, then the snippet text.
pub fn extract_date(
    metatags: &HashMap<String, String>,
    date_hint: Option<&str>,
    url: &str,
    snippet: &str,
) -> Option<String> {
    for key in DATE_KEYS {
        if let Some(v) = metatags.get(*key)
            && let Some(parsed) = parse_date_str(v)
        {
            return Some(parsed);
        }
    }
    if let Some(hint) = date_hint
        && let Some(parsed) = parse_date_str(hint)
    {
        return Some(parsed);
    }

    if let Some(cap) = URL_YMD.captures(url) {
        let y: i32 = cap[1].parse().ok()?;
        let m: u32 = cap[2].parse().ok()?;
        let d: u32 = cap[3].parse().ok()?;
        if let Some(date) = ymd(y, m, d) {
            return Some(date);
        }
    }
    if let Some(cap) = URL_DMY.captures(url) {
        let d: u32 = cap[1].parse().ok()?;
        let m: u32 = cap[2].parse().ok()?;
        let y: i32 = cap[3].parse().ok()?;
        if let Some(date) = ymd(y, m, d) {
            return Some(date);
        }
    }

    if let Some(cap) = TEXT_YMD.captures(snippet) {
        let y: i32 = cap[1].parse().ok()?;
        let m: u32 = cap[2].parse().ok()?;
        let d: u32 = cap[3].parse().ok()?;
        if let Some(date) = ymd(y, m, d) {
            return Some(date);
        }
    }
    if let Some(cap) = TEXT_DMY.captures(snippet) {
        let d: u32 = cap[1].parse().ok()?;
        let m: u32 = cap[2].parse().ok()?;
        let y: i32 = cap[3].parse().ok()?;
        if let Some(date) = ymd(y, m, d) {
            return Some(date);
        }
    }
    if let Some(parsed) = parse_date_str(snippet) {
        return Some(parsed);
    }
    None
}
