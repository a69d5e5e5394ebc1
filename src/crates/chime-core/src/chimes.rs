//! Wind-driven chime model
//!
//! Every chime voice rings on its own recurring timer. Each tick is a
//! Bernoulli trial whose probability rises with wind speed, so calm air leaves
//! the chimes silent and a gale keeps them ringing. The model here is pure;
//! the runtime that owns the timers lives in `chime-audio`.

use crate::weather::is_stormy;
use crate::{ChimeError, Result, Scale};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wind speed at which the chimes saturate (hurricane force), in mph
pub const HURRICANE_WIND_SPEED: f32 = 74.0;

/// Largest register weighting that keeps probability monotone in wind speed
const MAX_REGISTER_FACTOR: f32 = 2.0;

/// One pitched chime channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChimeVoice {
    /// Display name, usually the sounding note
    pub name: String,
    /// Scale degree relative to the sample's root pitch
    pub degree: i32,
    /// Low-register voices dominate in calm weather
    pub low_tone: bool,
    /// Interval between ticks in still air
    pub base_interval_ms: u64,
    /// How much the interval shrinks per mph of wind
    pub decay_ms_per_mph: f32,
    /// Shortest interval the voice will ever tick at
    pub floor_interval_ms: u64,
}

impl ChimeVoice {
    pub fn new(name: impl Into<String>, degree: i32, low_tone: bool) -> Self {
        ChimeVoice {
            name: name.into(),
            degree,
            low_tone,
            base_interval_ms: 6000,
            decay_ms_per_mph: 70.0,
            floor_interval_ms: 1500,
        }
    }

    pub fn with_interval(mut self, base_ms: u64, decay_ms_per_mph: f32, floor_ms: u64) -> Self {
        self.base_interval_ms = base_ms;
        self.decay_ms_per_mph = decay_ms_per_mph;
        self.floor_interval_ms = floor_ms;
        self
    }
}

/// The five-bell set: one octave of the pentatonic scale below the sample root
pub fn default_voices() -> Vec<ChimeVoice> {
    vec![
        ChimeVoice::new("D3", -1, false).with_interval(5000, 60.0, 1200),
        ChimeVoice::new("C3", -2, false).with_interval(5500, 60.0, 1400),
        ChimeVoice::new("A2", -3, false).with_interval(6000, 70.0, 1500),
        ChimeVoice::new("G2", -4, true).with_interval(6500, 70.0, 1600),
        ChimeVoice::new("F2", -5, true).with_interval(7000, 80.0, 1800),
    ]
}

/// Tunable constants of the chime model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChimeTuning {
    /// At or below this wind speed the chimes never ring
    pub min_wind_speed: f32,
    /// Multiplier on the linear wind ramp, re-clamped to 1
    pub activity_scale: f32,
    /// Below this wind speed register weighting applies
    pub calm_wind_speed: f32,
    /// Probability multiplier for low voices in calm air
    pub low_tone_boost: f32,
    /// Probability multiplier for high voices in calm air
    pub high_tone_damping: f32,
    /// Probability multiplier for storm conditions
    pub storm_gust_factor: f32,
    /// Relative interval jitter, 0.25 = ±25%
    pub interval_jitter: f32,
    /// Delay between the first onsets of neighbouring voices
    pub stagger_ms: u64,
    pub velocity_min: f32,
    pub velocity_max: f32,
    pub scale: Scale,
}

impl Default for ChimeTuning {
    fn default() -> Self {
        ChimeTuning {
            min_wind_speed: 5.0,
            activity_scale: 1.5,
            calm_wind_speed: 15.0,
            low_tone_boost: 2.0,
            high_tone_damping: 0.5,
            storm_gust_factor: 1.2,
            interval_jitter: 0.25,
            stagger_ms: 100,
            velocity_min: 0.4,
            velocity_max: 0.7,
            scale: Scale::MajorPentatonic,
        }
    }
}

impl ChimeTuning {
    /// Reject tunings that would break the model's guarantees
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ChimeError::InvalidTuning(msg.to_string()));

        if !(0.0..HURRICANE_WIND_SPEED).contains(&self.min_wind_speed) {
            return invalid("min_wind_speed must be in [0, 74)");
        }
        if !(self.activity_scale > 0.0) {
            return invalid("activity_scale must be positive");
        }
        if !(self.calm_wind_speed >= self.min_wind_speed) {
            return invalid("calm_wind_speed must not be below min_wind_speed");
        }
        for factor in [self.low_tone_boost, self.high_tone_damping] {
            if !(0.0..=MAX_REGISTER_FACTOR).contains(&factor) {
                return invalid("register factors must be in [0, 2]");
            }
        }
        if !(self.storm_gust_factor >= 0.0) {
            return invalid("storm_gust_factor must not be negative");
        }
        if !(0.0..1.0).contains(&self.interval_jitter) {
            return invalid("interval_jitter must be in [0, 1)");
        }
        if !(0.0 <= self.velocity_min
            && self.velocity_min <= self.velocity_max
            && self.velocity_max <= 1.0)
        {
            return invalid("velocity range must satisfy 0 <= min <= max <= 1");
        }
        Ok(())
    }

    /// Base per-tick probability from wind speed alone
    pub fn swing_probability(&self, wind_speed: f32) -> f32 {
        if !wind_speed.is_finite() || wind_speed <= self.min_wind_speed {
            return 0.0;
        }
        let ramp = (wind_speed - self.min_wind_speed) / (HURRICANE_WIND_SPEED - self.min_wind_speed);
        (ramp.clamp(0.0, 1.0) * self.activity_scale).clamp(0.0, 1.0)
    }

    /// Register weighting for a voice
    ///
    /// Full strength at `min_wind_speed`, fading linearly to 1 at
    /// `calm_wind_speed`. With factors in [0, 2] the weighted probability
    /// stays non-decreasing in wind speed.
    pub fn register_weight(&self, voice: &ChimeVoice, wind_speed: f32) -> f32 {
        let factor = if voice.low_tone {
            self.low_tone_boost
        } else {
            self.high_tone_damping
        }
        .clamp(0.0, MAX_REGISTER_FACTOR);

        let band = self.calm_wind_speed - self.min_wind_speed;
        if band <= 0.0 {
            return 1.0;
        }
        let t = ((wind_speed - self.min_wind_speed) / band).clamp(0.0, 1.0);
        factor + (1.0 - factor) * t
    }

    /// Weighting from the weather condition text
    pub fn condition_weight(&self, condition_text: &str) -> f32 {
        if is_stormy(condition_text) {
            self.storm_gust_factor.max(0.0)
        } else {
            1.0
        }
    }

    /// Probability that one tick of `voice` rings
    pub fn voice_probability(&self, voice: &ChimeVoice, wind_speed: f32, condition_text: &str) -> f32 {
        let base = self.swing_probability(wind_speed);
        if base == 0.0 {
            return 0.0;
        }
        let weighted = base * self.register_weight(voice, wind_speed) * self.condition_weight(condition_text);
        weighted.clamp(0.0, 1.0)
    }

    /// Un-jittered interval between ticks
    pub fn base_interval(&self, voice: &ChimeVoice, wind_speed: f32) -> Duration {
        let wind = if wind_speed.is_finite() { wind_speed.max(0.0) } else { 0.0 };
        let shrunk = voice.base_interval_ms as f32 - wind * voice.decay_ms_per_mph;
        let ms = shrunk.max(voice.floor_interval_ms as f32).max(1.0);
        Duration::from_millis(ms.round() as u64)
    }

    /// Interval until the next tick, with fresh jitter
    pub fn jittered_interval<R: Rng + ?Sized>(&self, voice: &ChimeVoice, wind_speed: f32, rng: &mut R) -> Duration {
        let jitter = self.interval_jitter.clamp(0.0, 0.99);
        let factor = rng.gen_range((1.0 - jitter)..=(1.0 + jitter));
        self.base_interval(voice, wind_speed).mul_f32(factor)
    }

    /// Offset of a voice's first onset
    pub fn stagger(&self, voice_index: usize) -> Duration {
        Duration::from_millis(self.stagger_ms * voice_index as u64)
    }

    /// Random per-hit velocity
    pub fn velocity<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let lo = self.velocity_min.clamp(0.0, 1.0);
        let hi = self.velocity_max.clamp(lo, 1.0);
        rng.gen_range(lo..=hi)
    }

    /// Playback-rate ratio for a voice
    pub fn pitch_ratio(&self, voice: &ChimeVoice) -> f64 {
        self.scale.degree_ratio(voice.degree)
    }

    /// Draw one Bernoulli trial
    pub fn should_ring<R: Rng + ?Sized>(&self, probability: f32, rng: &mut R) -> bool {
        rng.gen::<f32>() < probability
    }
}
