//! User audio settings and gain conversion
//!
//! Volumes are expressed on the same dB-like slider range the player exposes
//! (`MIN_DB..=MAX_DB`). The mixer never sees dB: it asks for linear gains,
//! which are recomputed from these settings every time they are applied.

use crate::ChimeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bottom of the volume slider
pub const MIN_DB: f32 = -30.0;
/// Top of the volume slider
pub const MAX_DB: f32 = 6.0;

/// Convert a slider value to a linear gain in [0, 1]
///
/// `-30` maps to silence and `+6` to unity.
pub fn db_to_gain(db: f32) -> f32 {
    if db.is_nan() {
        return 0.0;
    }
    ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0)
}

/// A user-controllable level in the mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Master,
    Drone,
    Ambience,
    Chimes,
}

impl Layer {
    /// Fixed trim applied on top of the user's level so a neutral mix sits
    /// drone-under-ambience-under-chimes
    pub fn trim(&self) -> f32 {
        match self {
            Layer::Master => 1.0,
            Layer::Drone => 0.7,
            Layer::Ambience => 0.5,
            Layer::Chimes => 1.0,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Master => "master",
            Layer::Drone => "drone",
            Layer::Ambience => "ambience",
            Layer::Chimes => "chimes",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Layer {
    type Err = ChimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "master" => Ok(Layer::Master),
            "drone" => Ok(Layer::Drone),
            "ambience" => Ok(Layer::Ambience),
            "chimes" | "chime" => Ok(Layer::Chimes),
            _ => Err(ChimeError::UnknownLayer(s.to_string())),
        }
    }
}

/// Per-layer volume in slider units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerLevels {
    pub master: f32,
    pub drone: f32,
    pub ambience: f32,
    pub chimes: f32,
}

impl Default for LayerLevels {
    fn default() -> Self {
        LayerLevels {
            master: 0.0,
            drone: -25.0,
            ambience: MAX_DB,
            chimes: 0.0,
        }
    }
}

impl LayerLevels {
    pub fn get(&self, layer: Layer) -> f32 {
        match layer {
            Layer::Master => self.master,
            Layer::Drone => self.drone,
            Layer::Ambience => self.ambience,
            Layer::Chimes => self.chimes,
        }
    }

    pub fn set(&mut self, layer: Layer, db: f32) {
        let db = if db.is_nan() { MIN_DB } else { db.clamp(MIN_DB, MAX_DB) };
        match layer {
            Layer::Master => self.master = db,
            Layer::Drone => self.drone = db,
            Layer::Ambience => self.ambience = db,
            Layer::Chimes => self.chimes = db,
        }
    }
}

/// Per-layer mute flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerMutes {
    pub master: bool,
    pub drone: bool,
    pub ambience: bool,
    pub chimes: bool,
}

impl LayerMutes {
    pub fn get(&self, layer: Layer) -> bool {
        match layer {
            Layer::Master => self.master,
            Layer::Drone => self.drone,
            Layer::Ambience => self.ambience,
            Layer::Chimes => self.chimes,
        }
    }

    pub fn set(&mut self, layer: Layer, muted: bool) {
        match layer {
            Layer::Master => self.master = muted,
            Layer::Drone => self.drone = muted,
            Layer::Ambience => self.ambience = muted,
            Layer::Chimes => self.chimes = muted,
        }
    }
}

/// Brain-wave presets for the binaural beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinauralPreset {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
    /// Beat or carrier was set by hand
    Custom,
}

impl BinauralPreset {
    /// Canonical beat frequency in Hz, `None` for `Custom`
    pub fn beat_frequency(&self) -> Option<f32> {
        match self {
            BinauralPreset::Delta => Some(2.0),
            BinauralPreset::Theta => Some(6.0),
            BinauralPreset::Alpha => Some(10.0),
            BinauralPreset::Beta => Some(20.0),
            BinauralPreset::Gamma => Some(40.0),
            BinauralPreset::Custom => None,
        }
    }
}

impl fmt::Display for BinauralPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinauralPreset::Delta => "delta",
            BinauralPreset::Theta => "theta",
            BinauralPreset::Alpha => "alpha",
            BinauralPreset::Beta => "beta",
            BinauralPreset::Gamma => "gamma",
            BinauralPreset::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for BinauralPreset {
    type Err = ChimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delta" => Ok(BinauralPreset::Delta),
            "theta" => Ok(BinauralPreset::Theta),
            "alpha" => Ok(BinauralPreset::Alpha),
            "beta" => Ok(BinauralPreset::Beta),
            "gamma" => Ok(BinauralPreset::Gamma),
            "custom" => Ok(BinauralPreset::Custom),
            _ => Err(ChimeError::UnknownPreset(s.to_string())),
        }
    }
}

/// Binaural beat parameters
///
/// When deserialized, a named preset overrides the stored beat frequency;
/// only `custom` keeps it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredBinauralSettings")]
pub struct BinauralSettings {
    pub enabled: bool,
    /// Centre frequency in Hz
    pub carrier_frequency: f32,
    /// Left/right difference in Hz
    pub beat_frequency: f32,
    /// Linear gain of the binaural stage
    pub volume: f32,
    pub preset: BinauralPreset,
}

impl Default for BinauralSettings {
    fn default() -> Self {
        BinauralSettings {
            enabled: false,
            carrier_frequency: 400.0,
            beat_frequency: 10.0,
            volume: 0.1,
            preset: BinauralPreset::Alpha,
        }
    }
}

/// Binaural settings as written in a settings file
#[derive(Deserialize)]
#[serde(default)]
struct StoredBinauralSettings {
    enabled: bool,
    carrier_frequency: f32,
    beat_frequency: f32,
    volume: f32,
    preset: BinauralPreset,
}

impl Default for StoredBinauralSettings {
    fn default() -> Self {
        let defaults = BinauralSettings::default();
        StoredBinauralSettings {
            enabled: defaults.enabled,
            carrier_frequency: defaults.carrier_frequency,
            beat_frequency: defaults.beat_frequency,
            volume: defaults.volume,
            preset: defaults.preset,
        }
    }
}

impl From<StoredBinauralSettings> for BinauralSettings {
    fn from(stored: StoredBinauralSettings) -> Self {
        let mut settings = BinauralSettings {
            enabled: stored.enabled,
            carrier_frequency: stored.carrier_frequency,
            beat_frequency: stored.beat_frequency,
            volume: stored.volume,
            preset: stored.preset,
        };
        settings.set_preset(stored.preset);
        settings
    }
}

impl BinauralSettings {
    /// Select a preset; `Custom` keeps the current beat frequency
    pub fn set_preset(&mut self, preset: BinauralPreset) {
        if let Some(beat) = preset.beat_frequency() {
            self.beat_frequency = beat;
        }
        self.preset = preset;
    }

    /// Override the beat frequency by hand
    pub fn set_beat_frequency(&mut self, hz: f32) {
        self.beat_frequency = hz.max(0.0);
        self.preset = BinauralPreset::Custom;
    }

    /// Override the carrier frequency by hand
    pub fn set_carrier_frequency(&mut self, hz: f32) {
        self.carrier_frequency = hz.max(0.0);
        self.preset = BinauralPreset::Custom;
    }

    pub fn left_frequency(&self) -> f32 {
        (self.carrier_frequency - self.beat_frequency / 2.0).max(0.0)
    }

    pub fn right_frequency(&self) -> f32 {
        self.carrier_frequency + self.beat_frequency / 2.0
    }

    /// Linear gain of the binaural stage before the master gain
    pub fn gain(&self) -> f32 {
        if self.volume.is_nan() {
            0.0
        } else {
            self.volume.clamp(0.0, 1.0)
        }
    }
}

/// Everything the listener can change while the soundscape plays
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAudioSettings {
    pub volume: LayerLevels,
    pub mute: LayerMutes,
    pub binaural: BinauralSettings,
}

impl UserAudioSettings {
    /// Linear master gain, zero when the master is muted
    pub fn master_gain(&self) -> f32 {
        if self.mute.master {
            0.0
        } else {
            db_to_gain(self.volume.master)
        }
    }

    /// Linear gain of one layer before the master gain, zero when muted
    pub fn layer_gain(&self, layer: Layer) -> f32 {
        if layer == Layer::Master {
            return self.master_gain();
        }
        if self.mute.get(layer) {
            0.0
        } else {
            db_to_gain(self.volume.get(layer)) * layer.trim()
        }
    }

    /// What the listener actually hears of a layer: layer gain times master
    pub fn effective_gain(&self, layer: Layer) -> f32 {
        if layer == Layer::Master {
            return self.master_gain();
        }
        self.master_gain() * self.layer_gain(layer)
    }

    pub fn set_volume(&mut self, layer: Layer, db: f32) {
        self.volume.set(layer, db);
    }

    pub fn toggle_mute(&mut self, layer: Layer) {
        let muted = self.mute.get(layer);
        self.mute.set(layer, !muted);
    }

    pub fn is_muted(&self, layer: Layer) -> bool {
        self.mute.get(layer)
    }
}
