//! Core types for Weather Chimes
//!
//! This crate holds everything about the soundscape that does not touch an
//! audio device or the network:
//!
//! - **WeatherReading**: the immutable snapshot the soundscape reacts to
//! - **UserAudioSettings**: volumes, mutes and binaural parameters, plus the
//!   dB to linear gain conversion used by the mixer
//! - **ChimeTuning / ChimeVoice**: the wind-driven probability and interval model
//! - **Scale**: pentatonic pitch ratios for chime transposition
//! - **SoundPack**: logical asset names with primary and fallback sources
//!
//! # Examples
//!
//! ```
//! use chime_core::{default_voices, ChimeTuning};
//!
//! let tuning = ChimeTuning::default();
//! let voices = default_voices();
//!
//! // Calm air never rings the chimes
//! assert_eq!(tuning.voice_probability(&voices[0], 3.0, "Clear"), 0.0);
//! ```

pub mod chimes;
pub mod pack;
pub mod scale;
pub mod settings;
pub mod weather;

pub use chimes::{default_voices, ChimeTuning, ChimeVoice, HURRICANE_WIND_SPEED};
pub use pack::{AmbienceKind, AmbienceSet, AssetDescriptor, SoundPack};
pub use scale::Scale;
pub use settings::{
    db_to_gain, BinauralPreset, BinauralSettings, Layer, LayerLevels, LayerMutes,
    UserAudioSettings, MAX_DB, MIN_DB,
};
pub use weather::{is_cloudy, is_rainy, is_snowy, is_stormy, Coordinates, WeatherReading};

/// Errors raised while validating core configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChimeError {
    #[error("Invalid chime tuning: {0}")]
    InvalidTuning(String),

    #[error("Unknown binaural preset: {0}")]
    UnknownPreset(String),

    #[error("Unknown layer: {0}")]
    UnknownLayer(String),
}

pub type Result<T> = std::result::Result<T, ChimeError>;
