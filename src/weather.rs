use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::PartOfDay;
use crate::error::AttestError;
use crate::geocode::Geocoder;

const GEO_DIRECT_URL: &str = "http://api.openweathermap.org/geo/1.0/direct";
const CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";
const TIMEMACHINE_URL: &str = "https://api.openweathermap.org/data/3.0/onecall/timemachine";
const WEATHER_TIMEOUT: Duration = Duration::from_secs(10);

/// One normalized weather observation or forecast point, timestamped in the
/// target city's local timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub location: String,
    /// YYYY-MM-DD, local to the city.
    pub date: String,
    /// HH:MM, local to the city.
    pub time: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub description: String,
    /// Coarse category: Rain, Clear, Clouds, Thunderstorm, Snow, ...
    pub main_category: String,
    pub humidity_pct: f64,
    pub wind_ms: f64,
    pub source: String,
}

/// Part-of-day selection windows in local hours: [start, end).
fn window(pod: PartOfDay) -> (u32, u32) {
    match pod {
        PartOfDay::Morning => (6, 12),
        PartOfDay::Afternoon => (12, 18),
        PartOfDay::Evening => (18, 24),
        PartOfDay::Night => (20, 24),
    }
}

// --- OpenWeather response shapes -------------------------------------------

#[derive(Deserialize)]
struct GeoDirectHit {
    name: Option<String>,
    country: Option<String>,
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct MainBlock {
    temp: f64,
    feels_like: f64,
    humidity: f64,
}

#[derive(Deserialize)]
struct WeatherBlock {
    description: String,
    main: String,
}

#[derive(Deserialize, Default)]
struct WindBlock {
    #[serde(default)]
    speed: f64,
}

#[derive(Deserialize)]
struct CurrentResponse {
    main: MainBlock,
    weather: Vec<WeatherBlock>,
    #[serde(default)]
    wind: WindBlock,
    dt: i64,
    /// Seconds east of UTC for the queried location.
    timezone: i64,
}

#[derive(Deserialize)]
struct ForecastSlotWire {
    dt: i64,
    main: MainBlock,
    weather: Vec<WeatherBlock>,
    #[serde(default)]
    wind: WindBlock,
}

#[derive(Deserialize)]
struct ForecastCity {
    #[serde(default)]
    timezone: i64,
}

#[derive(Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastSlotWire>,
    city: ForecastCity,
}

#[derive(Deserialize)]
struct TimemachinePoint {
    dt: i64,
    temp: f64,
    feels_like: f64,
    humidity: f64,
    #[serde(default)]
    wind_speed: f64,
    #[serde(default)]
    weather: Vec<WeatherBlock>,
}

#[derive(Deserialize)]
struct TimemachineResponse {
    timezone_offset: i64,
    data: Vec<TimemachinePoint>,
}

/// Normalized forecast slot used by the selection logic.
#[derive(Debug, Clone)]
pub struct Slot {
    pub dt: i64,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: f64,
    pub wind_ms: f64,
    pub description: String,
    pub main_category: String,
}

/// Choose the forecast slot for `target` date and optional part of day,
/// with all timestamps interpreted in the city's local offset.
///
/// Cascade: exact-date slots filtered by the part-of-day window (nearest to
/// the window midpoint when nothing lands inside), else the soonest slot on
/// a later date, else the last slot available.
pub fn pick_slot<'a>(
    slots: &'a [Slot],
    target: NaiveDate,
    part_of_day: Option<PartOfDay>,
    offset: FixedOffset,
) -> Option<&'a Slot> {
    let local = |s: &Slot| {
        DateTime::<Utc>::from_timestamp(s.dt, 0)
            .unwrap_or_default()
            .with_timezone(&offset)
    };

    let on_date: Vec<&Slot> = slots.iter().filter(|s| local(s).date_naive() == target).collect();

    if on_date.is_empty() {
        let mut future: Vec<&Slot> = slots
            .iter()
            .filter(|s| local(s).date_naive() > target)
            .collect();
        future.sort_by_key(|s| s.dt);
        return future.first().copied().or_else(|| slots.last());
    }

    if let Some(pod) = part_of_day {
        let (start, end) = window(pod);
        if let Some(hit) = on_date.iter().find(|s| {
            let h = chrono::Timelike::hour(&local(s));
            (start..end).contains(&h)
        }) {
            return Some(hit);
        }
        let mid = f64::from(start + end) / 2.0;
        return on_date.into_iter().min_by(|a, b| {
            let da = (f64::from(chrono::Timelike::hour(&local(a))) - mid).abs();
            let db = (f64::from(chrono::Timelike::hour(&local(b))) - mid).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    on_date.first().copied()
}

/// Weather provider over the OpenWeatherMap API family, fronted by the
/// shared geocoder with the provider's own `/geo/1.0/direct` as fallback.
pub struct WeatherProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    geocoder: Arc<Geocoder>,
}

struct Located {
    name: String,
    lat: f64,
    lon: f64,
}

impl WeatherProvider {
    pub fn new(api_key: Option<String>, geocoder: Arc<Geocoder>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEATHER_TIMEOUT)
            .build()
            .expect("failed to build weather client");
        Self {
            client,
            api_key,
            geocoder,
        }
    }

    fn key(&self) -> Result<&str, AttestError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AttestError::Other("OPENWEATHER_API_KEY is not configured".to_string()))
    }

    /// Resolve a city to coordinates: shared geocoder first, then the
    /// provider's own geocoding endpoint.
    async fn locate(&self, city: &str) -> Result<Located, AttestError> {
        if let Some(hit) = self.geocoder.resolve(city).await {
            return Ok(Located {
                name: hit.english_name,
                lat: hit.lat,
                lon: hit.lon,
            });
        }

        let key = self.key()?;
        let response = self
            .client
            .get(GEO_DIRECT_URL)
            .query(&[("q", city), ("limit", "1"), ("appid", key)])
            .send()
            .await?;
        let response = check_status("openweathermap", response)?;
        let hits: Vec<GeoDirectHit> = response.json().await?;
        let hit = hits
            .into_iter()
            .next()
            .ok_or_else(|| AttestError::InvalidLocation(city.to_string()))?;
        let name = match (hit.name, hit.country) {
            (Some(n), Some(c)) => format!("{n}, {c}"),
            (Some(n), None) => n,
            _ => city.to_string(),
        };
        Ok(Located {
            name,
            lat: hit.lat,
            lon: hit.lon,
        })
    }

    /// Current conditions for a city.
    pub async fn current(&self, city: &str) -> Result<Option<Reading>, AttestError> {
        let key = self.key()?.to_string();
        let loc = self.locate(city).await?;
        let response = self
            .client
            .get(CURRENT_URL)
            .query(&[
                ("lat", loc.lat.to_string()),
                ("lon", loc.lon.to_string()),
                ("appid", key),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;
        let response = check_status("openweathermap", response)?;
        let body: CurrentResponse = response.json().await?;

        let offset = offset_from_secs(body.timezone);
        let local = DateTime::<Utc>::from_timestamp(body.dt, 0)
            .unwrap_or_default()
            .with_timezone(&offset);
        let weather = body.weather.first();
        Ok(Some(Reading {
            location: loc.name,
            date: local.format("%Y-%m-%d").to_string(),
            time: local.format("%H:%M").to_string(),
            temperature_c: body.main.temp,
            feels_like_c: body.main.feels_like,
            description: weather.map(|w| w.description.clone()).unwrap_or_default(),
            main_category: weather.map(|w| w.main.clone()).unwrap_or_default(),
            humidity_pct: body.main.humidity,
            wind_ms: body.wind.speed,
            source: "openweathermap.org".to_string(),
        }))
    }

    /// Forecast reading for a target date, honoring the part-of-day window
    /// in the city's local timezone.
    pub async fn forecast(
        &self,
        city: &str,
        target_date: NaiveDate,
        part_of_day: Option<PartOfDay>,
    ) -> Result<Option<Reading>, AttestError> {
        let key = self.key()?.to_string();
        let loc = self.locate(city).await?;
        let response = self
            .client
            .get(FORECAST_URL)
            .query(&[
                ("lat", loc.lat.to_string()),
                ("lon", loc.lon.to_string()),
                ("appid", key),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;
        let response = check_status("openweathermap", response)?;
        let body: ForecastResponse = response.json().await?;
        if body.list.is_empty() {
            return Ok(None);
        }

        let offset = offset_from_secs(body.city.timezone);
        let slots: Vec<Slot> = body
            .list
            .into_iter()
            .map(|s| Slot {
                dt: s.dt,
                temperature_c: s.main.temp,
                feels_like_c: s.main.feels_like,
                humidity_pct: s.main.humidity,
                wind_ms: s.wind.speed,
                description: s.weather.first().map(|w| w.description.clone()).unwrap_or_default(),
                main_category: s.weather.first().map(|w| w.main.clone()).unwrap_or_default(),
            })
            .collect();

        let Some(chosen) = pick_slot(&slots, target_date, part_of_day, offset) else {
            return Ok(None);
        };

        let local = DateTime::<Utc>::from_timestamp(chosen.dt, 0)
            .unwrap_or_default()
            .with_timezone(&offset);
        Ok(Some(Reading {
            location: loc.name,
            date: local.format("%Y-%m-%d").to_string(),
            time: local.format("%H:%M").to_string(),
            temperature_c: chosen.temperature_c,
            feels_like_c: chosen.feels_like_c,
            description: chosen.description.clone(),
            main_category: chosen.main_category.clone(),
            humidity_pct: chosen.humidity_pct,
            wind_ms: chosen.wind_ms,
            source: "openweathermap.org".to_string(),
        }))
    }

    /// Historical reading. The date is mandatory; callers surface
    /// `HistoricalDateRequired` as an L1 status.
    pub async fn historical(
        &self,
        city: &str,
        date: Option<NaiveDate>,
    ) -> Result<Option<Reading>, AttestError> {
        let date = date.ok_or(AttestError::HistoricalDateRequired)?;
        let key = self.key()?.to_string();
        let loc = self.locate(city).await?;

        // Query noon UTC of the requested day; the timemachine endpoint
        // returns the nearest observation.
        let dt = date
            .and_hms_opt(12, 0, 0)
            .map(|naive| naive.and_utc().timestamp())
            .unwrap_or_default();
        let response = self
            .client
            .get(TIMEMACHINE_URL)
            .query(&[
                ("lat", loc.lat.to_string()),
                ("lon", loc.lon.to_string()),
                ("dt", dt.to_string()),
                ("appid", key),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;
        let response = check_status("openweathermap", response)?;
        let body: TimemachineResponse = response.json().await?;
        let Some(point) = body.data.into_iter().next() else {
            return Ok(None);
        };

        let offset = offset_from_secs(body.timezone_offset);
        let local = DateTime::<Utc>::from_timestamp(point.dt, 0)
            .unwrap_or_default()
            .with_timezone(&offset);
        let weather = point.weather.first();
        Ok(Some(Reading {
            location: loc.name,
            date: local.format("%Y-%m-%d").to_string(),
            time: local.format("%H:%M").to_string(),
            temperature_c: point.temp,
            feels_like_c: point.feels_like,
            description: weather.map(|w| w.description.clone()).unwrap_or_default(),
            main_category: weather.map(|w| w.main.clone()).unwrap_or_default(),
            humidity_pct: point.humidity,
            wind_ms: point.wind_speed,
            source: "openweathermap.org".to_string(),
        }))
    }
}

fn offset_from_secs(secs: i64) -> FixedOffset {
    FixedOffset::east_opt(secs as i32).unwrap_or_else(|| FixedOffset::east_opt(0).expect("utc"))
}

/// Map HTTP status classes onto the error taxonomy.
fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AttestError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AttestError::RateLimited {
            provider: provider.to_string(),
        });
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(AttestError::AuthFailed {
            provider: provider.to_string(),
            message: status.to_string(),
        });
    }
    if !status.is_success() {
        return Err(AttestError::Upstream {
            provider: provider.to_string(),
            message: status.to_string(),
            status: Some(status.as_u16()),
        });
    }
    Ok(response)
}

/// Render a reading as the compact evidence snippet the synthesizer quotes:
/// `[DD/MM/YYYY] [HH:MM] — description (Category) at location ...`.
pub fn format_reading_snippet(r: &Reading) -> String {
    let date_display = NaiveDate::parse_from_str(&r.date, "%Y-%m-%d")
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|_| r.date.clone());
    let wind_kmh = (r.wind_ms * 3.6 * 10.0).round() / 10.0;
    let mut snippet = format!(
        "[{date_display}] [{time}] - {desc} ({main}) at {loc}. Temperature {temp:.0}°C (feels like {feels:.0}°C). Humidity {hum:.0}%, wind {wind_kmh} km/h. Source: OpenWeatherMap API.",
        time = r.time,
        desc = r.description,
        main = r.main_category,
        loc = r.location,
        temp = r.temperature_c,
        feels = r.feels_like_c,
        hum = r.humidity_pct,
    );
    let marker = match r.main_category.as_str() {
        "Rain" => {
            let lower = r.description.to_lowercase();
            if lower.contains("heavy") || lower.contains("torrential") {
                " [HEAVY RAIN]"
            } else if lower.contains("light") || lower.contains("drizzle") {
                " [LIGHT RAIN]"
            } else {
                " [RAIN]"
            }
        }
        "Clear" => " [CLEAR]",
        "Thunderstorm" => " [THUNDERSTORM]",
        "Clouds" => " [CLOUDY]",
        "Snow" => " [SNOW]",
        _ => "",
    };
    snippet.push_str(marker);
    snippet
}
