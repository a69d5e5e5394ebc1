//! A listening session: locate, fetch weather, play, follow the weather

use crate::config::{AppConfig, LocationConfig};
use anyhow::Result;
use chime_audio::{AudioBackend, PlaybackController, ResourceLoader, SettingsHandle};
use chime_core::{Coordinates, WeatherReading};
use chime_weather::{
    current_weather, FixedLocation, GeolocationProvider, IpGeolocation, LocationCache, WeatherApiClient,
    WeatherProvider,
};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Geolocation chosen by configuration
pub fn geolocation_for(location: &LocationConfig) -> Box<dyn GeolocationProvider> {
    match location.fixed() {
        Some(coordinates) => Box::new(FixedLocation::new(coordinates)),
        None if location.ip_lookup => Box::new(IpGeolocation::new()),
        None => Box::new(FixedLocation::new(Coordinates::FALLBACK)),
    }
}

pub struct Session {
    config: AppConfig,
    controller: Arc<PlaybackController>,
    weather: Box<dyn WeatherProvider>,
    geolocation: Box<dyn GeolocationProvider>,
    cache: LocationCache,
}

impl Session {
    pub fn new(config: AppConfig, backend: Arc<dyn AudioBackend>) -> Result<Self> {
        let weather = Box::new(WeatherApiClient::new(config.weather.api_key.clone())?);
        let geolocation = geolocation_for(&config.location);
        Self::with_providers(config, backend, weather, geolocation)
    }

    pub fn with_providers(
        config: AppConfig,
        backend: Arc<dyn AudioBackend>,
        weather: Box<dyn WeatherProvider>,
        geolocation: Box<dyn GeolocationProvider>,
    ) -> Result<Self> {
        let loader = Arc::new(
            ResourceLoader::from_asset_root(config.asset_root.clone()).with_timeout(config.player.load_timeout()),
        );
        let settings: SettingsHandle = Arc::new(RwLock::new(config.settings));
        let controller = PlaybackController::new(
            config.player.clone(),
            backend,
            loader,
            settings,
            WeatherReading::fallback(),
        )?;

        Ok(Session {
            cache: LocationCache::new(config.location.cache_ttl()),
            config,
            controller: Arc::new(controller),
            weather,
            geolocation,
        })
    }

    pub fn controller(&self) -> &Arc<PlaybackController> {
        &self.controller
    }

    /// Current weather for the configured place, or for wherever we are
    pub async fn fetch_weather(&self) -> WeatherReading {
        match self.config.weather.location.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => self.weather.get_weather_by_location(query).await,
            _ => {
                let (coordinates, reading) = current_weather(
                    self.geolocation.as_ref(),
                    &self.cache,
                    self.weather.as_ref(),
                    self.config.location.timeout(),
                )
                .await;
                info!("Weather at {}: {}", coordinates, reading);
                reading
            }
        }
    }

    /// Fetch the weather and hand it to the controller
    pub async fn refresh(&self) -> Result<WeatherReading> {
        let reading = self.fetch_weather().await;
        self.controller.set_weather(reading.clone()).await?;
        Ok(reading)
    }

    /// Play until `shutdown` resolves, re-checking the weather every poll interval
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.refresh().await?;
        self.controller.start().await?;

        let mut poll = tokio::time::interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        poll.tick().await;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = poll.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!("Weather refresh failed: {}", e);
                    }
                    if !self.controller.is_playing() {
                        info!("Restarting soundscape ({})", self.controller.state());
                        if let Err(e) = self.controller.start().await {
                            warn!("Restart failed: {}", e);
                        }
                    }
                }
            }
        }

        self.controller.shutdown().await?;
        Ok(())
    }
}
