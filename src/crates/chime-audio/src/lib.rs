//! Weather-reactive audio engine for Weather Chimes
//!
//! This crate turns a weather reading into a running soundscape:
//! - Load drone, ambience and chime samples from local assets, falling back
//!   to remote URLs when a local file is missing or slow
//! - Mix looped layers, one-shot chime hits and a binaural beat pair
//! - Ring each chime voice on its own wind-driven, probabilistic timer
//! - Rebuild the whole graph when the weather changes, without ghost layers

pub mod binaural;
pub mod engine;
pub mod mixer;
pub mod player;
pub mod samples;
pub mod scheduler;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use binaural::BinauralGenerator;
pub use engine::{
    AudioBackend, AudioContext, AudioOutput, ContextState, CpalBackend, OfflineBackend,
    OfflineOutput, RenderCallback,
};
pub use mixer::{AudioGraph, LoopedLayer, MixGains};
pub use player::{PlaybackController, PlaybackState, PlayerConfig, SettingsHandle};
pub use samples::{
    decode_audio, AssetFetcher, FileFetcher, HttpFetcher, ResourceLoader, Sample, SourceFetcher,
};
pub use scheduler::{ChimeScheduler, VoicePlan};
pub use voice::Voice;

/// Re-export common types from chime-core
pub use chime_core::{
    AssetDescriptor, ChimeTuning, ChimeVoice, Layer, SoundPack, UserAudioSettings, WeatherReading,
};

/// Audio playback errors
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Audio initialisation failed: {0}")]
    AudioInitFailed(String),

    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Sample not found: {0}")]
    SampleNotFound(String),

    #[error("Failed to decode audio: {0}")]
    DecodeError(String),

    #[error("Failed to load sample from URL: {0}")]
    HttpError(String),

    #[error("Timed out loading {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] chime_core::ChimeError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AudioError>;
