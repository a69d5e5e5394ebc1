//! The audio graph: a software mixer shared with the output callback
//!
//! The graph owns every sounding source. Looped beds (drone, ambience) sit in
//! fixed slots, chime hits come and go, and the binaural pair has its own gain
//! stage. Gains are recomputed from [`UserAudioSettings`] whenever settings are
//! applied; sources are never restarted to change a level.
//!
//! Each build of the graph is a generation. Teardown closes the generation, and
//! a chime trigger stamped with an older generation is dropped under the same
//! lock the render callback takes, so a stale timer can never sound.

use crate::{BinauralGenerator, Sample, Voice};
use chime_core::{Layer, UserAudioSettings};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// The two looped beds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopedLayer {
    Drone,
    Ambience,
}

impl LoopedLayer {
    pub fn layer(&self) -> Layer {
        match self {
            LoopedLayer::Drone => Layer::Drone,
            LoopedLayer::Ambience => Layer::Ambience,
        }
    }
}

/// Snapshot of the linear gains the mixer is currently applying
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MixGains {
    pub master: f32,
    pub drone: f32,
    pub ambience: f32,
    pub chimes: f32,
    pub binaural: f32,
}

#[derive(Default)]
struct Mixer {
    gains: MixGains,
    drone: Option<Voice>,
    ambience: Option<Voice>,
    chimes: Vec<Voice>,
    binaural: Option<BinauralGenerator>,
    generation: u64,
    live: bool,
    frames_rendered: u64,
}

impl Mixer {
    fn slot(&mut self, layer: LoopedLayer) -> &mut Option<Voice> {
        match layer {
            LoopedLayer::Drone => &mut self.drone,
            LoopedLayer::Ambience => &mut self.ambience,
        }
    }

    fn slot_ref(&self, layer: LoopedLayer) -> &Option<Voice> {
        match layer {
            LoopedLayer::Drone => &self.drone,
            LoopedLayer::Ambience => &self.ambience,
        }
    }
}

/// Handle to the shared mixer; clones refer to the same graph
#[derive(Clone, Default)]
pub struct AudioGraph {
    inner: Arc<Mutex<Mixer>>,
}

impl AudioGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new generation and return its number
    ///
    /// Anything left from the previous generation is dropped first.
    pub fn begin_generation(&self) -> u64 {
        let mut mixer = self.inner.lock();
        mixer.drone = None;
        mixer.ambience = None;
        mixer.chimes.clear();
        mixer.binaural = None;
        mixer.generation += 1;
        mixer.live = true;
        debug!("Audio graph generation {} opened", mixer.generation);
        mixer.generation
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Whether the current generation is accepting sources
    pub fn is_live(&self) -> bool {
        self.inner.lock().live
    }

    /// Start a looped bed, replacing whatever occupied the slot
    pub fn set_looped(&self, layer: LoopedLayer, sample: Arc<Sample>) {
        let mut mixer = self.inner.lock();
        if !mixer.live {
            return;
        }
        *mixer.slot(layer) = Some(Voice::looping(sample));
    }

    /// Sound one chime hit if `generation` is still the live one
    ///
    /// Returns whether the hit was accepted.
    pub fn trigger_chime(&self, generation: u64, sample: Arc<Sample>, rate: f64, velocity: f32) -> bool {
        let mut mixer = self.inner.lock();
        if !mixer.live || mixer.generation != generation {
            return false;
        }
        let voice = Voice::one_shot(sample).with_rate(rate).with_gain(velocity);
        if !voice.is_active() {
            return false;
        }
        mixer.chimes.push(voice);
        true
    }

    /// Recompute every gain from the settings and reconcile the binaural pair
    ///
    /// Idempotent. Looped beds keep their position whatever the gains become.
    pub fn apply_settings(&self, settings: &UserAudioSettings) {
        let mut mixer = self.inner.lock();
        mixer.gains = MixGains {
            master: settings.master_gain(),
            drone: settings.layer_gain(Layer::Drone),
            ambience: settings.layer_gain(Layer::Ambience),
            chimes: settings.layer_gain(Layer::Chimes),
            binaural: settings.binaural.gain(),
        };

        let binaural = &settings.binaural;
        if binaural.enabled && mixer.live {
            match mixer.binaural.as_mut() {
                Some(generator) => generator.retune(binaural),
                None => {
                    debug!(
                        "Binaural on: {:.1} Hz / {:.1} Hz",
                        binaural.left_frequency(),
                        binaural.right_frequency()
                    );
                    mixer.binaural = Some(BinauralGenerator::new(binaural));
                }
            }
        } else if mixer.binaural.take().is_some() {
            debug!("Binaural off");
        }
    }

    /// Stop and release every source and close the generation
    ///
    /// Tearing down an empty graph is a no-op.
    pub fn teardown(&self) {
        let mut mixer = self.inner.lock();
        if !mixer.live
            && mixer.drone.is_none()
            && mixer.ambience.is_none()
            && mixer.chimes.is_empty()
            && mixer.binaural.is_none()
        {
            return;
        }
        mixer.live = false;
        mixer.drone = None;
        mixer.ambience = None;
        mixer.chimes.clear();
        mixer.binaural = None;
        debug!("Audio graph generation {} torn down", mixer.generation);
    }

    /// Fill an interleaved stereo block
    pub fn render(&self, out: &mut [f32], sample_rate: u32) {
        let mut mixer = self.inner.lock();
        let mixer = &mut *mixer;
        let gains = mixer.gains;

        for frame in out.chunks_exact_mut(2) {
            let mut left = 0.0f32;
            let mut right = 0.0f32;

            if let Some((l, r)) = mixer.drone.as_mut().and_then(|v| v.next_frame(sample_rate)) {
                left += l * gains.drone;
                right += r * gains.drone;
            }
            if let Some((l, r)) = mixer.ambience.as_mut().and_then(|v| v.next_frame(sample_rate)) {
                left += l * gains.ambience;
                right += r * gains.ambience;
            }

            let mut chime_l = 0.0f32;
            let mut chime_r = 0.0f32;
            for voice in mixer.chimes.iter_mut() {
                if let Some((l, r)) = voice.next_frame(sample_rate) {
                    chime_l += l;
                    chime_r += r;
                }
            }
            left += chime_l * gains.chimes;
            right += chime_r * gains.chimes;

            if let Some(generator) = mixer.binaural.as_mut() {
                let (l, r) = generator.next_frame(sample_rate);
                left += l * gains.binaural;
                right += r * gains.binaural;
            }

            frame[0] = (left * gains.master).clamp(-1.0, 1.0);
            frame[1] = (right * gains.master).clamp(-1.0, 1.0);
        }

        mixer.chimes.retain(|v| v.is_active());
        mixer.frames_rendered += (out.len() / 2) as u64;
    }

    pub fn gains(&self) -> MixGains {
        self.inner.lock().gains
    }

    /// Number of looped beds currently sounding
    pub fn looped_layer_count(&self) -> usize {
        let mixer = self.inner.lock();
        mixer.drone.is_some() as usize + mixer.ambience.is_some() as usize
    }

    /// Source reference of a looped bed
    pub fn looped_source(&self, layer: LoopedLayer) -> Option<String> {
        self.inner.lock().slot_ref(layer).as_ref().map(|v| v.sample().source.clone())
    }

    /// Playback position of a looped bed, in source frames
    pub fn looped_position(&self, layer: LoopedLayer) -> Option<f64> {
        self.inner.lock().slot_ref(layer).as_ref().map(|v| v.position())
    }

    /// Chime hits still ringing
    pub fn sounding_chimes(&self) -> usize {
        self.inner.lock().chimes.len()
    }

    pub fn has_binaural(&self) -> bool {
        self.inner.lock().binaural.is_some()
    }

    pub fn binaural_frequencies(&self) -> Option<(f32, f32)> {
        self.inner.lock().binaural.as_ref().map(|g| g.frequencies())
    }

    pub fn frames_rendered(&self) -> u64 {
        self.inner.lock().frames_rendered
    }
}
