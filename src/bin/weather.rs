//! Weather helper CLI. Prints one JSON object mirroring the pipeline's L1
//! weather entry so the tool executor (or a human debugging evidence) can
//! consume it directly.
//!
//! Usage:
//!   attest-weather --city "Hanoi, VN" [--mode present|future|historical]
//!                  [--relative "sáng ngày mai" | --date YYYY-MM-DD]

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use serde::Serialize;

use attest::classify::classify;
use attest::geocode::Geocoder;
use attest::weather::{Reading, WeatherProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Present,
    Future,
    Historical,
}

#[derive(Parser)]
#[command(name = "attest-weather", about = "OpenWeather helper for the claim pipeline")]
struct Args {
    /// City name, ideally canonical ("Hanoi, VN", "Paris, FR")
    #[arg(long)]
    city: String,

    /// Query mode
    #[arg(long, value_enum, default_value_t = Mode::Present)]
    mode: Mode,

    /// Relative time phrase ("ngày mai", "chiều mai", "tomorrow afternoon")
    #[arg(long)]
    relative: Option<String>,

    /// Explicit date YYYY-MM-DD (overrides --relative)
    #[arg(long)]
    date: Option<String>,
}

#[derive(Serialize)]
struct Payload {
    tool_name: &'static str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl Payload {
    fn success(mode: &'static str, reading: Reading) -> Self {
        Self {
            tool_name: "weather",
            status: "success",
            mode: Some(mode),
            data: Some(reading),
            reason: None,
        }
    }

    fn failure(status: &'static str, reason: String) -> Self {
        Self {
            tool_name: "weather",
            status,
            mode: None,
            data: None,
            reason: Some(reason),
        }
    }
}

/// Resolve --date / --relative into a target date and part of day.
fn resolve_time(relative: Option<&str>, date: Option<&str>) -> (Option<NaiveDate>, Option<attest::classify::PartOfDay>) {
    let part_of_day = relative.and_then(|r| classify(r).part_of_day);
    if let Some(d) = date
        && let Ok(parsed) = NaiveDate::parse_from_str(d, "%Y-%m-%d")
    {
        return (Some(parsed), part_of_day);
    }
    if let Some(r) = relative {
        let signals = classify(r);
        if let Some(days) = signals.days_ahead {
            return (
                Some(Utc::now().date_naive() + Duration::days(days)),
                part_of_day,
            );
        }
    }
    (None, part_of_day)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    let api_key = std::env::var("OPENWEATHER_API_KEY").ok();
    let provider = WeatherProvider::new(api_key, Arc::new(Geocoder::new()));
    let (target_date, part_of_day) = resolve_time(args.relative.as_deref(), args.date.as_deref());

    let as_payload = |mode: &'static str, result: Result<Option<attest::weather::Reading>, attest::error::AttestError>| match result {
        Ok(Some(reading)) => Payload::success(mode, reading),
        Ok(None) => Payload::failure(
            "no_data",
            format!("no weather data available for {}", args.city),
        ),
        Err(e) => Payload::failure("api_error", e.to_string()),
    };

    let payload = match args.mode {
        Mode::Historical => {
            if target_date.is_none() {
                Payload::failure(
                    "historical_date_required",
                    "historical weather needs --date or a resolvable --relative".to_string(),
                )
            } else {
                as_payload("historical", provider.historical(&args.city, target_date).await)
            }
        }
        Mode::Future => {
            let target = target_date.unwrap_or_else(|| Utc::now().date_naive() + Duration::days(1));
            as_payload("future", provider.forecast(&args.city, target, part_of_day).await)
        }
        Mode::Present => as_payload("present", provider.current(&args.city).await),
    };

    match serde_json::to_string_pretty(&payload) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("failed to serialize payload: {e}");
            std::process::exit(1);
        }
    }
}
