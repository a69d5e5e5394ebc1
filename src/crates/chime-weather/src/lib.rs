//! Weather and location lookups for Weather Chimes
//!
//! Nothing in this crate ever leaves the soundscape without a reading: every
//! provider resolves failures, timeouts and missing API keys to the fallback
//! reading, and location lookups fall back to fixed coordinates.

pub mod location;
pub mod weatherapi;

pub use location::{
    resolve_location, FixedLocation, GeolocationProvider, IpGeolocation, LocationCache,
    DEFAULT_GEOLOCATION_TIMEOUT,
};
pub use weatherapi::WeatherApiClient;

use async_trait::async_trait;
use chime_core::{Coordinates, WeatherReading};
use std::time::Duration;

/// Weather and geolocation errors
///
/// Providers never hand these to the audio side; they are logged and replaced
/// by fallback data.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Provider returned HTTP {0}")]
    Status(u16),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),
}

pub type Result<T> = std::result::Result<T, WeatherError>;

impl From<reqwest::Error> for WeatherError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            WeatherError::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            WeatherError::Status(status.as_u16())
        } else {
            WeatherError::Http(e.to_string())
        }
    }
}

/// Source of weather readings
///
/// Both lookups always resolve; failures come back as fallback readings.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn get_weather_by_coordinates(&self, latitude: f64, longitude: f64) -> WeatherReading;

    async fn get_weather_by_location(&self, query: &str) -> WeatherReading;
}

/// A provider that always reports the same reading
#[derive(Debug, Clone)]
pub struct StaticWeather {
    reading: WeatherReading,
}

impl StaticWeather {
    pub fn new(reading: WeatherReading) -> Self {
        StaticWeather { reading }
    }
}

#[async_trait]
impl WeatherProvider for StaticWeather {
    async fn get_weather_by_coordinates(&self, _latitude: f64, _longitude: f64) -> WeatherReading {
        self.reading.clone()
    }

    async fn get_weather_by_location(&self, _query: &str) -> WeatherReading {
        self.reading.clone()
    }
}

/// Locate the listener and fetch the weather there
pub async fn current_weather(
    geolocation: &dyn GeolocationProvider,
    cache: &LocationCache,
    provider: &dyn WeatherProvider,
    geolocation_timeout: Duration,
) -> (Coordinates, WeatherReading) {
    let coordinates = resolve_location(geolocation, cache, geolocation_timeout).await;
    let reading = provider
        .get_weather_by_coordinates(coordinates.latitude, coordinates.longitude)
        .await;
    (coordinates, reading)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_weather_uses_located_coordinates() {
        let reading = WeatherReading::fallback().with_conditions("Light rain", 12.0);
        let provider = StaticWeather::new(reading.clone());
        let geolocation = FixedLocation::new(Coordinates::new(51.5, -0.12));
        let cache = LocationCache::new(Duration::from_secs(600));

        let (coordinates, got) =
            current_weather(&geolocation, &cache, &provider, DEFAULT_GEOLOCATION_TIMEOUT).await;
        assert_eq!(coordinates, Coordinates::new(51.5, -0.12));
        assert_eq!(got, reading);
        assert_eq!(cache.get(), Some(coordinates));
    }
}
