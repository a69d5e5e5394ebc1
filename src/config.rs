//! Configuration loader for Weather Chimes
//!
//! * Looks for `weather-chimes.toml` in the cwd unless overridden by `--config`.
//! * Every field has a default, so the file is optional.
//! * `WEATHER_API_KEY` in the environment wins over the file.

use anyhow::{Context, Result};
use chime_audio::PlayerConfig;
use chime_core::{Coordinates, UserAudioSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_FILE: &str = "weather-chimes.toml";
pub const API_KEY_ENV: &str = "WEATHER_API_KEY";

/// Weather provider options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// WeatherAPI.com key; `demo` or empty selects the fallback reading
    pub api_key: String,
    /// Place name to look up instead of locating the listener
    pub location: Option<String>,
    /// How often `play` re-checks the weather
    pub poll_interval_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        WeatherConfig {
            api_key: String::new(),
            location: None,
            poll_interval_secs: 600,
        }
    }
}

/// Geolocation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Fixed coordinates; both must be set to take effect
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Ask an IP geolocation service when no coordinates are configured
    pub ip_lookup: bool,
    pub timeout_ms: u64,
    pub cache_ttl_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        LocationConfig {
            latitude: None,
            longitude: None,
            ip_lookup: true,
            timeout_ms: 5000,
            cache_ttl_secs: 1800,
        }
    }
}

impl LocationConfig {
    pub fn fixed(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory local sound assets are resolved against
    pub asset_root: PathBuf,
    pub weather: WeatherConfig,
    pub location: LocationConfig,
    pub player: PlayerConfig,
    /// Levels, mutes and binaural settings at startup
    pub settings: UserAudioSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            asset_root: PathBuf::from("assets"),
            weather: WeatherConfig::default(),
            location: LocationConfig::default(),
            player: PlayerConfig::default(),
            settings: UserAudioSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, then apply environment overrides
    ///
    /// A missing default file means defaults; a missing explicit file is an
    /// error, as is a file that does not parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        let mut config = match fs::read_to_string(path) {
            Ok(text) => {
                info!("Loading config from {}", path.display());
                Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                debug!("No {} found, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.player.tuning.validate().context("Invalid chime tuning")?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.weather.api_key = key;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.weather.poll_interval_secs.max(1))
    }
}
