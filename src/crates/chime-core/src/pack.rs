//! Sound packs: which asset plays on which layer

use crate::weather::{is_cloudy, is_rainy, is_snowy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical sound asset with a primary and a fallback source
///
/// Sources are opaque references: a path relative to the asset root, or an
/// `http(s)://` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub name: String,
    pub primary: String,
    pub fallback: Option<String>,
}

impl AssetDescriptor {
    pub fn new(name: impl Into<String>, primary: impl Into<String>, fallback: impl Into<String>) -> Self {
        AssetDescriptor {
            name: name.into(),
            primary: primary.into(),
            fallback: Some(fallback.into()),
        }
    }

    /// An asset with no fallback source
    pub fn local(name: impl Into<String>, primary: impl Into<String>) -> Self {
        AssetDescriptor {
            name: name.into(),
            primary: primary.into(),
            fallback: None,
        }
    }
}

/// Ambience bed selected from the weather condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbienceKind {
    /// Calm, clear or otherwise unclassified weather
    Default,
    Rain,
    Snow,
    Cloudy,
}

impl AmbienceKind {
    /// Classify a condition; rain wins over snow, snow over cloud
    pub fn for_condition(condition_text: &str) -> Self {
        if is_rainy(condition_text) {
            AmbienceKind::Rain
        } else if is_snowy(condition_text) {
            AmbienceKind::Snow
        } else if is_cloudy(condition_text) {
            AmbienceKind::Cloudy
        } else {
            AmbienceKind::Default
        }
    }
}

impl fmt::Display for AmbienceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AmbienceKind::Default => "default",
            AmbienceKind::Rain => "rain",
            AmbienceKind::Snow => "snow",
            AmbienceKind::Cloudy => "cloudy",
        };
        write!(f, "{}", name)
    }
}

/// Per-condition ambience assets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbienceSet {
    pub default: AssetDescriptor,
    pub rain: AssetDescriptor,
    pub snow: AssetDescriptor,
    pub cloudy: AssetDescriptor,
}

/// Every asset the soundscape can play
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundPack {
    pub id: String,
    pub name: String,
    pub drone: AssetDescriptor,
    /// Chime hit variants; voices alternate between them
    pub chimes: Vec<AssetDescriptor>,
    pub ambience: AmbienceSet,
}

impl SoundPack {
    pub fn ambience(&self, kind: AmbienceKind) -> &AssetDescriptor {
        match kind {
            AmbienceKind::Default => &self.ambience.default,
            AmbienceKind::Rain => &self.ambience.rain,
            AmbienceKind::Snow => &self.ambience.snow,
            AmbienceKind::Cloudy => &self.ambience.cloudy,
        }
    }

    pub fn ambience_for_condition(&self, condition_text: &str) -> &AssetDescriptor {
        self.ambience(AmbienceKind::for_condition(condition_text))
    }
}

impl Default for SoundPack {
    fn default() -> Self {
        SoundPack {
            id: "default".to_string(),
            name: "Default Pack".to_string(),
            drone: AssetDescriptor::new(
                "drone",
                "drone-cello-f.mp3",
                "https://assets.mixkit.co/sfx/preview/mixkit-cinematic-mystery-drone-2783.mp3",
            ),
            chimes: vec![
                AssetDescriptor::new(
                    "chime-a",
                    "chime-f3-a.wav",
                    "https://assets.mixkit.co/sfx/preview/mixkit-small-church-bell-588.mp3",
                ),
                AssetDescriptor::new(
                    "chime-b",
                    "chime-f3-b.wav",
                    "https://assets.mixkit.co/sfx/preview/mixkit-small-church-bell-588.mp3",
                ),
            ],
            ambience: AmbienceSet {
                default: AssetDescriptor::new(
                    "ambience-default",
                    "very-low-wind.wav",
                    "https://assets.mixkit.co/sfx/preview/mixkit-light-wind-1166.mp3",
                ),
                rain: AssetDescriptor::new(
                    "ambience-rain",
                    "heavy-rain.mp3",
                    "https://assets.mixkit.co/sfx/preview/mixkit-heavy-rain-loop-1248.mp3",
                ),
                snow: AssetDescriptor::new(
                    "ambience-snow",
                    "light-snow.mp3",
                    "https://assets.mixkit.co/sfx/preview/mixkit-blizzard-cold-winds-1153.mp3",
                ),
                cloudy: AssetDescriptor::new(
                    "ambience-cloudy",
                    "medium-wind.mp3",
                    "https://assets.mixkit.co/sfx/preview/mixkit-forest-wind-ambient-2431.mp3",
                ),
            },
        }
    }
}
