//! Weather snapshots and condition classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition keywords that select the rain ambience
const RAINY_KEYWORDS: &[&str] = &[
    "rain",
    "drizzle",
    "shower",
    "thunderstorm",
    "thunder",
    "mist",
    "fog",
];

/// Condition keywords that select the snow ambience
const SNOWY_KEYWORDS: &[&str] = &["snow", "sleet", "blizzard", "ice", "freezing"];

/// Condition keywords that select the cloudy ambience
const CLOUDY_KEYWORDS: &[&str] = &["cloud", "overcast", "fog", "mist"];

/// Condition keywords that make the chimes gustier
const STORMY_KEYWORDS: &[&str] = &["thunder", "storm", "blizzard", "gale", "squall"];

fn matches_any(condition_text: &str, keywords: &[&str]) -> bool {
    let lower = condition_text.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

/// True if the condition calls for the rain ambience
pub fn is_rainy(condition_text: &str) -> bool {
    matches_any(condition_text, RAINY_KEYWORDS)
}

/// True if the condition calls for the snow ambience
pub fn is_snowy(condition_text: &str) -> bool {
    matches_any(condition_text, SNOWY_KEYWORDS)
}

/// True if the condition calls for the cloudy ambience
pub fn is_cloudy(condition_text: &str) -> bool {
    matches_any(condition_text, CLOUDY_KEYWORDS)
}

/// True if the condition describes gusty, storm-driven air
pub fn is_stormy(condition_text: &str) -> bool {
    matches_any(condition_text, STORMY_KEYWORDS)
}

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// San Francisco, used whenever no location fix is available
    pub const FALLBACK: Coordinates = Coordinates {
        latitude: 37.7749,
        longitude: -122.4194,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinates {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}, {:.2}", self.latitude, self.longitude)
    }
}

/// An immutable snapshot of the current weather
///
/// Readings are replaced wholesale on every update; nothing in the audio core
/// mutates a reading it has been handed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub location_name: String,
    pub country: String,
    pub condition_text: String,
    pub condition_code: u32,
    /// Wind speed in miles per hour
    pub wind_speed_mph: f32,
    /// Relative humidity in percent
    pub humidity: f32,
    pub temperature_c: f32,
    pub temperature_f: f32,
    /// Cloud cover in percent
    pub cloud: f32,
    pub is_day: bool,
}

impl WeatherReading {
    /// The reading used when no provider could be reached
    pub fn fallback() -> Self {
        WeatherReading {
            location_name: "Your Location".to_string(),
            country: "Earth".to_string(),
            condition_text: "Partly cloudy".to_string(),
            condition_code: 1003,
            wind_speed_mph: 9.3,
            humidity: 65.0,
            temperature_c: 22.0,
            temperature_f: 72.0,
            cloud: 25.0,
            is_day: true,
        }
    }

    /// Return a copy carrying a different location name
    pub fn with_location_name(mut self, name: impl Into<String>) -> Self {
        self.location_name = name.into();
        self
    }

    /// Return a copy with a different condition and wind speed
    pub fn with_conditions(mut self, condition_text: impl Into<String>, wind_speed_mph: f32) -> Self {
        self.condition_text = condition_text.into();
        self.wind_speed_mph = wind_speed_mph;
        self
    }

    /// Wind speed sanitised for the chime model: never negative, never NaN
    pub fn wind_speed(&self) -> f32 {
        if self.wind_speed_mph.is_finite() {
            self.wind_speed_mph.max(0.0)
        } else {
            0.0
        }
    }
}

impl Default for WeatherReading {
    fn default() -> Self {
        Self::fallback()
    }
}

impl fmt::Display for WeatherReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}: {} {:.0}°C, wind {:.1} mph, humidity {:.0}%",
            self.location_name,
            self.country,
            self.condition_text,
            self.temperature_c,
            self.wind_speed_mph,
            self.humidity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_classification() {
        assert!(is_rainy("Patchy light drizzle"));
        assert!(is_rainy("Thundery outbreaks possible"));
        assert!(is_rainy("Moderate or heavy rain with thunder"));
        assert!(!is_rainy("Sunny"));

        assert!(is_snowy("Blowing snow"));
        assert!(is_snowy("Freezing fog"));
        assert!(!is_snowy("Overcast"));

        assert!(is_cloudy("Partly cloudy"));
        assert!(is_cloudy("Overcast"));
        assert!(!is_cloudy("Clear"));

        assert!(is_stormy("Thunderstorm"));
        assert!(is_stormy("Blizzard"));
        assert!(!is_stormy("Light rain"));
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        assert!(is_rainy("HEAVY RAIN"));
        assert!(is_cloudy("CLOUDY"));
    }

    #[test]
    fn test_wind_speed_sanitised() {
        let reading = WeatherReading::fallback().with_conditions("Clear", f32::NAN);
        assert_eq!(reading.wind_speed(), 0.0);

        let reading = WeatherReading::fallback().with_conditions("Clear", -4.0);
        assert_eq!(reading.wind_speed(), 0.0);

        let reading = WeatherReading::fallback().with_conditions("Clear", 12.5);
        assert_eq!(reading.wind_speed(), 12.5);
    }

    #[test]
    fn test_fallback_is_playable() {
        let reading = WeatherReading::fallback();
        assert_eq!(reading.condition_text, "Partly cloudy");
        assert!(reading.wind_speed() > 0.0);
    }
}
