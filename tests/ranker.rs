//! Source ranker properties: purity, subdomain closure, tier mapping, and
//! date-extractor idempotence.

use std::collections::HashMap;

use attest::rank::{BLOCKED, USABLE, extract_date, parse_date_str, rank};

const BLOCKED_SAMPLES: &[&str] = &[
    "https://facebook.com/story",
    "https://twitter.com/u/status/1",
    "https://medium.com/@someone/post",
    "https://voz.vn/t/thread",
    "https://dailymail.co.uk/news/article",
    "https://rt.com/news/x",
    "https://theonion.com/report",
    "https://tin-nong.xyz/bai-viet",
];

const USABLE_SAMPLES: &[&str] = &[
    "https://vnexpress.net/phap-luat/x",
    "https://tuoitre.vn/the-thao/y",
    "https://www.reuters.com/world/",
    "https://en.wikipedia.org/wiki/Hanoi",
    "https://www.politifact.com/factchecks/2024/",
];

#[test]
fn rank_is_pure() {
    for url in BLOCKED_SAMPLES.iter().chain(USABLE_SAMPLES) {
        assert_eq!(rank(url), rank(url), "unstable rank for {url}");
    }
}

#[test]
fn blocked_and_usable_samples() {
    for url in BLOCKED_SAMPLES {
        assert_eq!(rank(url), BLOCKED, "expected BLOCKED for {url}");
    }
    for url in USABLE_SAMPLES {
        assert_eq!(rank(url), USABLE, "expected USABLE for {url}");
    }
}

#[test]
fn blocked_set_closed_under_subdomain_prefixing() {
    // For every blocked host, prefixing a subdomain must stay blocked.
    for (base, sub) in [
        ("https://facebook.com/x", "https://m.facebook.com/x"),
        ("https://youtube.com/w", "https://music.youtube.com/w"),
        ("https://soha.vn/a", "https://m.soha.vn/a"),
        ("https://rt.com/a", "https://de.rt.com/a"),
    ] {
        assert_eq!(rank(base), BLOCKED);
        assert_eq!(rank(sub), BLOCKED, "subdomain escape: {sub}");
    }
}

#[test]
fn tier_mapping_matches_rank_scores() {
    // With the binary 0.1/0.8 ruleset, usable sources land in L3 and
    // blocked in L4; L2 stays empty until a higher-trust score exists.
    let tier = |score: f32| {
        if score > 0.9 {
            2
        } else if score > 0.5 {
            3
        } else {
            4
        }
    };
    assert_eq!(tier(rank("https://vnexpress.net/x")), 3);
    assert_eq!(tier(rank("https://facebook.com/x")), 4);
}

#[test]
fn date_extractor_is_idempotent() {
    let samples = [
        "2024-06-02T10:45:26.123Z",
        "02/06/2024",
        "Nov 15, 2024",
        "Tue, 15 Nov 2024 12:45:26 GMT",
    ];
    for raw in samples {
        let once = parse_date_str(raw).unwrap();
        assert_eq!(parse_date_str(&once).as_deref(), Some(once.as_str()), "{raw}");
    }
}

#[test]
fn extraction_priority_metadata_then_url_then_snippet() {
    let mut tags = HashMap::new();
    tags.insert("og:published_time".to_string(), "2024-01-05".to_string());
    assert_eq!(
        extract_date(&tags, None, "https://ex.com/2024/02/06/x/", "published 07/03/2024"),
        Some("2024-01-05".to_string())
    );

    let empty = HashMap::new();
    assert_eq!(
        extract_date(&empty, None, "https://ex.com/2024/02/06/x/", "published 07/03/2024"),
        Some("2024-02-06".to_string())
    );
    assert_eq!(
        extract_date(&empty, None, "https://ex.com/x", "published 07/03/2024"),
        Some("2024-03-07".to_string())
    );
    assert_eq!(extract_date(&empty, None, "https://ex.com/x", "no dates here"), None);
}

#[test]
fn provider_date_hint_used_before_url() {
    let empty = HashMap::new();
    assert_eq!(
        extract_date(
            &empty,
            Some("2024-05-30T08:00:00Z"),
            "https://ex.com/2024/06/02/x/",
            ""
        ),
        Some("2024-05-30".to_string())
    );
}
