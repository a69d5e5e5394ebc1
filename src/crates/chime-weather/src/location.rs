//! Geolocation providers and the location cache

use crate::{Result, WeatherError};
use async_trait::async_trait;
use chime_core::Coordinates;
use parking_lot::Mutex;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Bound on a single geolocation lookup
pub const DEFAULT_GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(5);

const IP_API_URL: &str = "http://ip-api.com/json/?fields=status,message,lat,lon,city";

/// Something that can tell where the listener is
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn locate(&self) -> Result<Coordinates>;
}

/// Coordinates taken from configuration
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation {
    coordinates: Coordinates,
}

impl FixedLocation {
    pub fn new(coordinates: Coordinates) -> Self {
        FixedLocation { coordinates }
    }
}

#[async_trait]
impl GeolocationProvider for FixedLocation {
    async fn locate(&self) -> Result<Coordinates> {
        Ok(self.coordinates)
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    city: Option<String>,
}

impl IpApiResponse {
    fn coordinates(self) -> Result<Coordinates> {
        if self.status != "success" {
            return Err(WeatherError::LocationUnavailable(
                self.message.unwrap_or_else(|| self.status.clone()),
            ));
        }
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => {
                debug!("IP geolocation: {} ({}, {})", self.city.as_deref().unwrap_or("?"), lat, lon);
                Ok(Coordinates::new(lat, lon))
            }
            _ => Err(WeatherError::Parse("missing lat/lon".to_string())),
        }
    }
}

/// Approximate location from the public IP address
pub struct IpGeolocation {
    client: reqwest::Client,
    url: String,
}

impl IpGeolocation {
    pub fn new() -> Self {
        IpGeolocation {
            client: reqwest::Client::new(),
            url: IP_API_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl Default for IpGeolocation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeolocationProvider for IpGeolocation {
    async fn locate(&self) -> Result<Coordinates> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }
        let body: IpApiResponse = response.json().await?;
        body.coordinates()
    }
}

/// The last good location fix, valid for a time-to-live
pub struct LocationCache {
    ttl: Duration,
    entry: Mutex<Option<(Coordinates, Instant)>>,
}

impl LocationCache {
    pub fn new(ttl: Duration) -> Self {
        LocationCache {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// The cached fix, if it has not expired
    pub fn get(&self) -> Option<Coordinates> {
        let entry = *self.entry.lock();
        entry.and_then(|(coordinates, stored)| (stored.elapsed() < self.ttl).then_some(coordinates))
    }

    pub fn put(&self, coordinates: Coordinates) {
        *self.entry.lock() = Some((coordinates, Instant::now()));
    }

    pub fn clear(&self) {
        *self.entry.lock() = None;
    }
}

/// Where the listener is, never failing
///
/// A fresh cached fix wins; otherwise the provider gets `timeout` to answer.
/// Errors and timeouts yield [`Coordinates::FALLBACK`], which is not cached.
pub async fn resolve_location(
    provider: &dyn GeolocationProvider,
    cache: &LocationCache,
    timeout: Duration,
) -> Coordinates {
    if let Some(coordinates) = cache.get() {
        debug!("Using cached location {}", coordinates);
        return coordinates;
    }

    let result = match tokio::time::timeout(timeout, provider.locate()).await {
        Ok(result) => result,
        Err(_) => Err(WeatherError::Timeout(timeout)),
    };

    match result {
        Ok(coordinates) => {
            cache.put(coordinates);
            coordinates
        }
        Err(e) => {
            warn!("Geolocation failed ({}), using {}", e, Coordinates::FALLBACK);
            Coordinates::FALLBACK
        }
    }
}
