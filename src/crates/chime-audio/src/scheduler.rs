//! Scheduler that rings each chime voice on its own wind-driven timer
//!
//! One tokio task per voice: wait the voice's stagger, then loop on a jittered
//! interval and ring with the voice's probability. Every task is stamped with
//! the graph generation it was started for and stops as soon as that
//! generation is no longer live.

use crate::{AudioError, AudioGraph, Result, Sample};
use chime_core::{ChimeTuning, ChimeVoice, WeatherReading};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// What one voice will do at a given wind speed
#[derive(Debug, Clone, PartialEq)]
pub struct VoicePlan {
    pub name: String,
    pub probability: f32,
    pub interval: Duration,
    pub stagger: Duration,
    pub pitch_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct VoiceStatus {
    hits: u64,
    active_until: Option<Instant>,
}

#[derive(Default)]
struct SchedulerState {
    /// Timer tasks that have not yet been dropped
    running: AtomicUsize,
    voices: Mutex<Vec<VoiceStatus>>,
}

/// Decrements the running-timer count when a timer task is dropped,
/// whether it returned or was aborted
struct TimerGuard(Arc<SchedulerState>);

impl TimerGuard {
    fn new(state: Arc<SchedulerState>) -> Self {
        state.running.fetch_add(1, Ordering::SeqCst);
        TimerGuard(state)
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything one timer task needs, owned by the task
struct VoiceTimer {
    index: usize,
    voice: ChimeVoice,
    tuning: ChimeTuning,
    probability: f32,
    wind_speed: f32,
    generation: u64,
    variants: Arc<Vec<Arc<Sample>>>,
    graph: AudioGraph,
    state: Arc<SchedulerState>,
    rng: StdRng,
}

impl VoiceTimer {
    async fn run(mut self) {
        let _guard = TimerGuard::new(self.state.clone());
        let ratio = self.tuning.pitch_ratio(&self.voice);
        let mut variant = self.index % self.variants.len();

        tokio::time::sleep(self.tuning.stagger(self.index)).await;

        loop {
            let interval = self.tuning.jittered_interval(&self.voice, self.wind_speed, &mut self.rng);
            tokio::time::sleep(interval).await;

            if self.graph.generation() != self.generation || !self.graph.is_live() {
                debug!("{} timer from generation {} expired", self.voice.name, self.generation);
                return;
            }
            if !self.tuning.should_ring(self.probability, &mut self.rng) {
                continue;
            }

            let sample = self.variants[variant].clone();
            variant = (variant + 1) % self.variants.len();
            let velocity = self.tuning.velocity(&mut self.rng);
            let ring_for = Duration::from_secs_f64(sample.duration() / ratio);

            if !self.graph.trigger_chime(self.generation, sample, ratio, velocity) {
                return;
            }

            let mut voices = self.state.voices.lock();
            if let Some(status) = voices.get_mut(self.index) {
                status.hits += 1;
                status.active_until = Some(Instant::now() + ring_for);
            }
        }
    }
}

/// Owns the chime timers of the current generation
pub struct ChimeScheduler {
    graph: AudioGraph,
    tuning: ChimeTuning,
    voices: Vec<ChimeVoice>,
    state: Arc<SchedulerState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    seed: Option<u64>,
}

impl ChimeScheduler {
    pub fn new(graph: AudioGraph, tuning: ChimeTuning, voices: Vec<ChimeVoice>) -> Result<Self> {
        tuning.validate()?;
        Ok(ChimeScheduler {
            graph,
            tuning,
            voices,
            state: Arc::new(SchedulerState::default()),
            tasks: Mutex::new(Vec::new()),
            seed: None,
        })
    }

    /// Make every timer's random draws reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn tuning(&self) -> &ChimeTuning {
        &self.tuning
    }

    pub fn voices(&self) -> &[ChimeVoice] {
        &self.voices
    }

    /// Per-voice probability and timing for a reading
    pub fn plan(&self, reading: &WeatherReading) -> Vec<VoicePlan> {
        let wind = reading.wind_speed();
        self.voices
            .iter()
            .enumerate()
            .map(|(index, voice)| VoicePlan {
                name: voice.name.clone(),
                probability: self.tuning.voice_probability(voice, wind, &reading.condition_text),
                interval: self.tuning.base_interval(voice, wind),
                stagger: self.tuning.stagger(index),
                pitch_ratio: self.tuning.pitch_ratio(voice),
            })
            .collect()
    }

    /// Start one timer per voice for `generation`
    ///
    /// Timers of any earlier generation are cancelled first. Voices alternate
    /// through `variants`, so at least one is required.
    pub async fn start(&self, generation: u64, reading: &WeatherReading, variants: Vec<Arc<Sample>>) -> Result<()> {
        self.cancel().await;

        if variants.is_empty() {
            return Err(AudioError::ResourceUnavailable("no chime samples".to_string()));
        }
        let variants = Arc::new(variants);
        let wind_speed = reading.wind_speed();

        *self.state.voices.lock() = vec![VoiceStatus::default(); self.voices.len()];

        let mut handles = Vec::with_capacity(self.voices.len());
        for (index, voice) in self.voices.iter().enumerate() {
            let probability = self.tuning.voice_probability(voice, wind_speed, &reading.condition_text);
            let rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed ^ (generation << 16) ^ index as u64),
                None => StdRng::from_entropy(),
            };
            debug!(
                "{}: p={:.3}, interval {:?}",
                voice.name,
                probability,
                self.tuning.base_interval(voice, wind_speed)
            );

            let timer = VoiceTimer {
                index,
                voice: voice.clone(),
                tuning: self.tuning.clone(),
                probability,
                wind_speed,
                generation,
                variants: variants.clone(),
                graph: self.graph.clone(),
                state: self.state.clone(),
                rng,
            };
            handles.push(tokio::spawn(timer.run()));
        }

        info!(
            "Started {} chime timers for generation {} ({:.1} mph, {})",
            handles.len(),
            generation,
            wind_speed,
            reading.condition_text
        );
        self.tasks.lock().extend(handles);
        Ok(())
    }

    /// Abort every timer and wait until each one is gone
    pub async fn cancel(&self) {
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        let count = handles.len();
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }
        debug!("Cancelled {} chime timers", count);
    }

    /// Timer tasks still alive
    pub fn running_timers(&self) -> usize {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Voices whose last hit is still ringing
    pub fn active_voices(&self) -> usize {
        let now = Instant::now();
        self.state
            .voices
            .lock()
            .iter()
            .filter(|s| s.active_until.map_or(false, |until| until > now))
            .count()
    }

    /// Hits per voice since the last start
    pub fn hits(&self) -> Vec<u64> {
        self.state.voices.lock().iter().map(|s| s.hits).collect()
    }

    pub fn total_hits(&self) -> u64 {
        self.hits().iter().sum()
    }
}

impl Drop for ChimeScheduler {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}
