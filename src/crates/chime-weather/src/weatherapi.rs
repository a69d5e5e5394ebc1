//! WeatherAPI.com current-conditions client
//!
//! A key of `demo` or an empty key never touches the network. Any request
//! error is logged and answered with the fallback reading.

use crate::{Result, WeatherError, WeatherProvider};
use async_trait::async_trait;
use chime_core::WeatherReading;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// HTTP client timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// API key that selects canned demo data
pub const DEMO_KEY: &str = "demo";

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    location: ApiLocation,
    current: ApiCurrent,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    name: String,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    text: String,
    #[serde(default)]
    code: u32,
}

#[derive(Debug, Deserialize)]
struct ApiCurrent {
    #[serde(default)]
    temp_c: f32,
    #[serde(default)]
    temp_f: f32,
    condition: ApiCondition,
    #[serde(default)]
    wind_mph: f32,
    #[serde(default)]
    humidity: f32,
    #[serde(default)]
    cloud: f32,
    #[serde(default)]
    is_day: u8,
}

impl From<CurrentResponse> for WeatherReading {
    fn from(response: CurrentResponse) -> Self {
        let CurrentResponse { location, current } = response;
        WeatherReading {
            location_name: location.name,
            country: location.country,
            condition_text: current.condition.text,
            condition_code: current.condition.code,
            wind_speed_mph: current.wind_mph,
            humidity: current.humidity,
            temperature_c: current.temp_c,
            temperature_f: current.temp_f,
            cloud: current.cloud,
            is_day: current.is_day != 0,
        }
    }
}

/// Parse a `current.json` body
pub fn parse_current(body: &str) -> Result<WeatherReading> {
    let response: CurrentResponse = serde_json::from_str(body).map_err(|e| WeatherError::Parse(e.to_string()))?;
    Ok(response.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyMode {
    Demo,
    Missing,
    Live,
}

/// Client for `https://api.weatherapi.com/v1/current.json`
pub struct WeatherApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WeatherApiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WeatherError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(WeatherApiClient {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn key_mode(&self) -> KeyMode {
        match self.api_key.trim() {
            "" => KeyMode::Missing,
            DEMO_KEY => KeyMode::Demo,
            _ => KeyMode::Live,
        }
    }

    /// Fetch current conditions for a WeatherAPI `q` parameter
    pub async fn fetch_current(&self, query: &str) -> Result<WeatherReading> {
        let url = format!("{}/current.json", self.base_url);
        debug!("Fetching weather for {}", query);

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        parse_current(&body)
    }
}

/// Fallback reading for a coordinate lookup that could not be served
fn coordinate_fallback(mode: KeyMode, latitude: f64, longitude: f64) -> WeatherReading {
    let fallback = WeatherReading::fallback();
    match mode {
        KeyMode::Demo => fallback.with_location_name(format!("Demo Mode ({:.2}, {:.2})", latitude, longitude)),
        KeyMode::Missing => fallback,
        KeyMode::Live if latitude != 0.0 && longitude != 0.0 => {
            fallback.with_location_name(format!("Location ({:.2}, {:.2})", latitude, longitude))
        }
        KeyMode::Live => fallback,
    }
}

/// Fallback reading for a place-name lookup that could not be served
fn location_fallback(mode: KeyMode, query: &str) -> WeatherReading {
    let fallback = WeatherReading::fallback();
    match mode {
        KeyMode::Demo => fallback.with_location_name(format!("Demo: {}", query)),
        KeyMode::Missing => fallback,
        KeyMode::Live if !query.trim().is_empty() => fallback.with_location_name(query),
        KeyMode::Live => fallback,
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiClient {
    async fn get_weather_by_coordinates(&self, latitude: f64, longitude: f64) -> WeatherReading {
        let mode = self.key_mode();
        match mode {
            KeyMode::Demo => info!("Using demo mode with fallback weather data"),
            KeyMode::Missing => info!("No API key provided, using fallback weather data"),
            KeyMode::Live => {
                match self.fetch_current(&format!("{},{}", latitude, longitude)).await {
                    Ok(reading) => return reading,
                    Err(e) => warn!("Weather lookup failed ({}), using fallback weather data", e),
                }
            }
        }
        coordinate_fallback(mode, latitude, longitude)
    }

    async fn get_weather_by_location(&self, query: &str) -> WeatherReading {
        let mode = self.key_mode();
        match mode {
            KeyMode::Demo => info!("Using demo mode with fallback weather data"),
            KeyMode::Missing => info!("No API key provided, using fallback weather data"),
            KeyMode::Live => match self.fetch_current(query).await {
                Ok(reading) => return reading,
                Err(e) => warn!("Weather lookup failed ({}), using fallback weather data", e),
            },
        }
        location_fallback(mode, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_BODY: &str = r#"{
        "location": { "name": "Reykjavik", "region": "", "country": "Iceland", "lat": 64.15, "lon": -21.95 },
        "current": {
            "temp_c": -2.0, "temp_f": 28.4, "is_day": 0,
            "condition": { "text": "Blowing snow", "icon": "//cdn/x.png", "code": 1114 },
            "wind_mph": 31.5, "wind_kph": 50.8, "humidity": 86, "cloud": 100,
            "feelslike_c": -9.1
        }
    }"#;

    #[test]
    fn test_parse_current_conditions() {
        let reading = parse_current(SAMPLE_BODY).unwrap();
        assert_eq!(reading.location_name, "Reykjavik");
        assert_eq!(reading.country, "Iceland");
        assert_eq!(reading.condition_text, "Blowing snow");
        assert_eq!(reading.condition_code, 1114);
        assert_eq!(reading.wind_speed_mph, 31.5);
        assert_eq!(reading.humidity, 86.0);
        assert!(!reading.is_day);
    }

    #[test]
    fn test_parse_rejects_error_body() {
        let body = r#"{"error":{"code":2008,"message":"API key has been disabled."}}"#;
        assert!(matches!(parse_current(body), Err(WeatherError::Parse(_))));
    }

    #[tokio::test]
    async fn test_demo_key_names_coordinates() {
        let client = WeatherApiClient::new("demo").unwrap();
        let reading = client.get_weather_by_coordinates(37.7749, -122.4194).await;
        assert_eq!(reading.location_name, "Demo Mode (37.77, -122.42)");
        assert_eq!(reading.condition_text, "Partly cloudy");

        let reading = client.get_weather_by_location("Oslo").await;
        assert_eq!(reading.location_name, "Demo: Oslo");
    }

    #[tokio::test]
    async fn test_missing_key_returns_plain_fallback() {
        let client = WeatherApiClient::new("  ").unwrap();
        let reading = client.get_weather_by_coordinates(10.0, 20.0).await;
        assert_eq!(reading, WeatherReading::fallback());
    }

    #[test]
    fn test_error_fallback_names() {
        assert_eq!(
            coordinate_fallback(KeyMode::Live, 51.5074, -0.1278).location_name,
            "Location (51.51, -0.13)"
        );
        assert_eq!(coordinate_fallback(KeyMode::Live, 0.0, 0.0).location_name, "Your Location");
        assert_eq!(location_fallback(KeyMode::Live, "Lisbon").location_name, "Lisbon");
        assert_eq!(location_fallback(KeyMode::Live, "").location_name, "Your Location");
    }
}
