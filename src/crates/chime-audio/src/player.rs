//! High-level playback controller for the weather soundscape
//!
//! The controller is the only thing that creates the audio context or builds
//! the graph. Every lifecycle operation (start, stop, weather change,
//! shutdown) runs under one async lock, so at most one graph ever exists and a
//! rebuild always finishes its teardown before the next build begins.

use crate::engine::{AudioBackend, AudioContext, ContextState};
use crate::mixer::LoopedLayer;
use crate::{AudioError, AudioGraph, ChimeScheduler, ResourceLoader, Result, Sample};
use chime_core::{
    default_voices, AmbienceKind, BinauralPreset, ChimeTuning, ChimeVoice, Layer, SoundPack,
    UserAudioSettings, WeatherReading,
};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Settings shared between the controller and whoever edits them
pub type SettingsHandle = Arc<RwLock<UserAudioSettings>>;

/// Configuration for the playback controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Bound on each resource load attempt
    pub load_timeout_ms: u64,
    /// Pause between teardown and rebuild on a weather change
    pub settle_delay_ms: u64,
    pub tuning: ChimeTuning,
    pub voices: Vec<ChimeVoice>,
    pub pack: SoundPack,
    /// Fixed seed for the chime timers
    pub seed: Option<u64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            load_timeout_ms: 3000,
            settle_delay_ms: 300,
            tuning: ChimeTuning::default(),
            voices: default_voices(),
            pack: SoundPack::default(),
            seed: None,
        }
    }
}

impl PlayerConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Initializing,
    Playing,
    /// Torn down after a weather change, waiting to build again
    Rebuilding,
    Stopped,
    Error(String),
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Initializing => write!(f, "initializing"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Rebuilding => write!(f, "rebuilding"),
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Drives the soundscape from weather readings and user settings
pub struct PlaybackController {
    config: PlayerConfig,
    backend: Arc<dyn AudioBackend>,
    loader: Arc<ResourceLoader>,
    graph: AudioGraph,
    scheduler: ChimeScheduler,
    settings: SettingsHandle,
    weather: RwLock<WeatherReading>,
    context: Mutex<Option<AudioContext>>,
    state: RwLock<PlaybackState>,
    /// Serialises start, stop, rebuild and shutdown
    lifecycle: tokio::sync::Mutex<()>,
    builds: AtomicU64,
}

impl PlaybackController {
    pub fn new(
        config: PlayerConfig,
        backend: Arc<dyn AudioBackend>,
        loader: Arc<ResourceLoader>,
        settings: SettingsHandle,
        weather: WeatherReading,
    ) -> Result<Self> {
        let graph = AudioGraph::new();
        let mut scheduler = ChimeScheduler::new(graph.clone(), config.tuning.clone(), config.voices.clone())?;
        if let Some(seed) = config.seed {
            scheduler = scheduler.with_seed(seed);
        }

        Ok(PlaybackController {
            config,
            backend,
            loader,
            graph,
            scheduler,
            settings,
            weather: RwLock::new(weather),
            context: Mutex::new(None),
            state: RwLock::new(PlaybackState::Idle),
            lifecycle: tokio::sync::Mutex::new(()),
            builds: AtomicU64::new(0),
        })
    }

    /// Start the soundscape
    ///
    /// Collapses into the running graph when already playing.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.state() == PlaybackState::Playing {
            debug!("Already playing, start ignored");
            return Ok(());
        }
        self.start_locked().await
    }

    /// Tear everything down and suspend the context
    ///
    /// The context stays acquired; the next start resumes it.
    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown().await;
        if let Some(context) = self.context.lock().as_mut() {
            context.suspend()?;
        }
        if self.state() != PlaybackState::Idle {
            self.set_state(PlaybackState::Stopped);
        }
        info!("Soundscape stopped");
        Ok(())
    }

    /// Replace the weather reading
    ///
    /// While playing this rebuilds the graph after the settle delay; otherwise
    /// the reading is kept for the next start. An identical reading is ignored.
    pub async fn set_weather(&self, reading: WeatherReading) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if *self.weather.read() == reading {
            debug!("Weather unchanged, no rebuild");
            return Ok(());
        }
        info!("Weather update: {}", reading);
        *self.weather.write() = reading;

        if self.state() != PlaybackState::Playing {
            return Ok(());
        }

        self.set_state(PlaybackState::Rebuilding);
        self.teardown().await;
        tokio::time::sleep(self.config.settle_delay()).await;
        self.start_locked().await
    }

    /// Stop playback and release the audio context
    pub async fn shutdown(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown().await;
        if let Some(mut context) = self.context.lock().take() {
            context.close()?;
        }
        self.set_state(PlaybackState::Stopped);
        info!("Playback controller shut down");
        Ok(())
    }

    async fn start_locked(&self) -> Result<()> {
        if self.state() != PlaybackState::Rebuilding {
            self.set_state(PlaybackState::Initializing);
        }

        if let Err(e) = self.ensure_context() {
            error!("Audio initialisation failed: {}", e);
            self.set_state(PlaybackState::Error(e.to_string()));
            return Err(e);
        }

        match self.build().await {
            Ok(()) => {
                self.set_state(PlaybackState::Playing);
                Ok(())
            }
            Err(e) => {
                error!("Failed to build soundscape: {}", e);
                self.teardown().await;
                self.set_state(PlaybackState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Acquire the audio context once and make sure it is running
    fn ensure_context(&self) -> Result<()> {
        let mut context = self.context.lock();
        let reopen = context.as_ref().map_or(true, |c| c.state() == ContextState::Closed);
        if reopen {
            *context = Some(AudioContext::open(self.backend.as_ref())?);
        }
        match context.as_mut() {
            Some(context) => context.resume(&self.graph),
            None => Err(AudioError::AudioInitFailed("No audio context".to_string())),
        }
    }

    async fn build(&self) -> Result<()> {
        let reading = self.weather.read().clone();
        let pack = &self.config.pack;
        let kind = AmbienceKind::for_condition(&reading.condition_text);

        let (drone, ambience, chimes) = tokio::join!(
            self.loader.load_descriptor(&pack.drone),
            self.loader.load_descriptor(pack.ambience(kind)),
            join_all(pack.chimes.iter().map(|asset| self.loader.load_descriptor(asset))),
        );

        let variants: Vec<Arc<Sample>> = chimes
            .into_iter()
            .zip(pack.chimes.iter())
            .filter_map(|(result, asset)| match result {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!("Chime variant {} unavailable: {}", asset.name, e);
                    None
                }
            })
            .collect();
        if variants.is_empty() {
            return Err(AudioError::ResourceUnavailable("every chime variant failed to load".to_string()));
        }

        let generation = self.graph.begin_generation();
        match drone {
            Ok(sample) => self.graph.set_looped(LoopedLayer::Drone, sample),
            Err(e) => warn!("Skipping drone layer: {}", e),
        }
        match ambience {
            Ok(sample) => self.graph.set_looped(LoopedLayer::Ambience, sample),
            Err(e) => warn!("Skipping {} ambience layer: {}", kind, e),
        }

        self.apply_settings();
        self.scheduler.start(generation, &reading, variants).await?;

        self.builds.fetch_add(1, Ordering::SeqCst);
        info!(
            "Soundscape playing: generation {}, {} ambience, {} looped layers, {:.1} mph",
            generation,
            kind,
            self.graph.looped_layer_count(),
            reading.wind_speed()
        );
        Ok(())
    }

    /// Stop sources first so no stale timer can sound, then cancel the timers
    async fn teardown(&self) {
        self.graph.teardown();
        self.scheduler.cancel().await;
    }

    fn set_state(&self, state: PlaybackState) {
        let mut current = self.state.write();
        if *current != state {
            debug!("Playback state: {} -> {}", *current, state);
            *current = state;
        }
    }

    /// Re-read the shared settings and push them into the graph
    pub fn apply_settings(&self) {
        let settings = *self.settings.read();
        self.graph.apply_settings(&settings);
    }

    /// Edit the shared settings in place and apply them
    pub fn update_settings<F>(&self, edit: F)
    where
        F: FnOnce(&mut UserAudioSettings),
    {
        {
            let mut settings = self.settings.write();
            edit(&mut settings);
        }
        self.apply_settings();
    }

    pub fn set_master_volume(&self, db: f32) {
        self.set_volume(Layer::Master, db);
    }

    pub fn set_volume(&self, layer: Layer, db: f32) {
        self.update_settings(|s| s.set_volume(layer, db));
    }

    pub fn toggle_mute(&self, layer: Layer) {
        self.update_settings(|s| s.toggle_mute(layer));
    }

    pub fn set_binaural_enabled(&self, enabled: bool) {
        self.update_settings(|s| s.binaural.enabled = enabled);
    }

    pub fn select_binaural_preset(&self, preset: BinauralPreset) {
        self.update_settings(|s| s.binaural.set_preset(preset));
    }

    pub fn state(&self) -> PlaybackState {
        self.state.read().clone()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Whether the audio context has been acquired
    pub fn is_initialized(&self) -> bool {
        self.context
            .lock()
            .as_ref()
            .map_or(false, |c| c.state() != ContextState::Closed)
    }

    /// Chime voices currently ringing
    pub fn active_voices(&self) -> usize {
        self.scheduler.active_voices()
    }

    pub fn settings(&self) -> SettingsHandle {
        self.settings.clone()
    }

    pub fn weather(&self) -> WeatherReading {
        self.weather.read().clone()
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub fn scheduler(&self) -> &ChimeScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Number of graphs built so far
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::SeqCst)
    }
}
