use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;

use crate::classify::fold;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const USER_AGENT: &str = "attest/0.1 (claim verification)";
const GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);

/// A resolved place: canonical display name, English short name, coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub canonical_name: String,
    pub english_name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Deserialize)]
struct NominatimHit {
    display_name: Option<String>,
    name: Option<String>,
    lat: Option<String>,
    lon: Option<String>,
}

/// Free-form place resolution over an OpenStreetMap-style geocoding service.
///
/// Results are cached process-wide by folded name; entries never expire.
/// Failures (timeout, service error, no coordinates) resolve to None and are
/// not cached, so a transient outage does not poison the map.
pub struct Geocoder {
    client: reqwest::Client,
    base_url: String,
    cache: RwLock<HashMap<String, Resolved>>,
}

impl Default for Geocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Geocoder {
    pub fn new() -> Self {
        Self::with_base_url(NOMINATIM_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(GEOCODE_TIMEOUT)
            .build()
            .expect("failed to build geocoding client");
        Self {
            client,
            base_url,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a place name. Strategy: exact query, then a ", city" kind
    /// hint, then the first hit of a relaxed multi-result query.
    pub async fn resolve(&self, name: &str) -> Option<Resolved> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let key = fold(name);

        if let Some(hit) = self.cache.read().await.get(&key) {
            return Some(hit.clone());
        }

        let mut resolved = self.query(name, 1).await;
        if resolved.is_none() && !key.contains("city") && !key.contains("thanh pho") {
            resolved = self.query(&format!("{name}, city"), 1).await;
        }
        if resolved.is_none() {
            resolved = self.query(name, 5).await;
        }

        if let Some(ref hit) = resolved {
            tracing::debug!(
                place = name,
                canonical = %hit.canonical_name,
                lat = hit.lat,
                lon = hit.lon,
                "geocoded"
            );
            self.cache.write().await.insert(key, hit.clone());
        }
        resolved
    }

    /// One geocoding request. Returns the first hit that carries
    /// coordinates; any transport or decode failure is swallowed.
    async fn query(&self, q: &str, limit: usize) -> Option<Resolved> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", q),
                ("format", "json"),
                ("limit", &limit.to_string()),
                ("accept-language", "en"),
            ])
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!(query = q, status = %response.status(), "geocoding error");
            return None;
        }

        let hits: Vec<NominatimHit> = response.json().await.ok()?;
        hits.into_iter().find_map(|hit| {
            let lat = hit.lat.as_deref()?.parse::<f64>().ok()?;
            let lon = hit.lon.as_deref()?.parse::<f64>().ok()?;
            let display = hit.display_name.unwrap_or_default();
            let canonical = display.split(',').next().unwrap_or("").trim().to_string();
            if canonical.is_empty() {
                return None;
            }
            let english = hit.name.filter(|n| !n.is_empty()).unwrap_or_else(|| canonical.clone());
            Some(Resolved {
                canonical_name: canonical,
                english_name: english,
                lat,
                lon,
            })
        })
    }

    /// Number of cached places.
    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}
