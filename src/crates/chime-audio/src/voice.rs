//! Sample playback voices
//!
//! A voice reads one decoded sample at a playback rate. One-shot voices carry
//! chime hits and finish at the end of the sample; looping voices carry the
//! drone and ambience beds and wrap around forever.

use crate::Sample;
use std::sync::Arc;

/// A playback cursor over a sample
pub struct Voice {
    sample: Arc<Sample>,
    /// Current playback position (in frames)
    position: f64,
    /// Playback rate multiplier; also transposes pitch
    rate: f64,
    /// Per-voice gain (0.0 to 1.0), applied before any bus gain
    gain: f32,
    looping: bool,
    active: bool,
}

impl Voice {
    /// A one-shot voice that stops at the end of the sample
    pub fn one_shot(sample: Arc<Sample>) -> Self {
        let active = sample.frames() > 0;
        Voice {
            sample,
            position: 0.0,
            rate: 1.0,
            gain: 1.0,
            looping: false,
            active,
        }
    }

    /// A voice that wraps back to the start forever
    pub fn looping(sample: Arc<Sample>) -> Self {
        let mut voice = Self::one_shot(sample);
        voice.looping = true;
        voice
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate;
        }
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = if gain.is_nan() { 0.0 } else { gain.clamp(0.0, 1.0) };
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn sample(&self) -> &Arc<Sample> {
        &self.sample
    }

    /// Wall-clock length of one pass at this voice's rate, in seconds
    pub fn duration(&self) -> f64 {
        self.sample.duration() / self.rate
    }

    /// Next stereo frame, or `None` once a one-shot voice has finished
    pub fn next_frame(&mut self, output_sample_rate: u32) -> Option<(f32, f32)> {
        if !self.active {
            return None;
        }

        let frames = self.sample.frames() as f64;
        if self.position >= frames {
            if self.looping {
                self.position %= frames;
            } else {
                self.active = false;
                return None;
            }
        }

        let (left, right) = if self.sample.channels == 1 {
            let mono = self.read(self.position, 0);
            (mono, mono)
        } else {
            (self.read(self.position, 0), self.read(self.position, 1))
        };

        let step = self.rate * self.sample.sample_rate as f64 / output_sample_rate.max(1) as f64;
        self.position += step;

        Some((left * self.gain, right * self.gain))
    }

    /// Linearly interpolated value of one channel at a fractional frame
    ///
    /// Looping voices interpolate their last frame towards the first so the
    /// loop seam does not click.
    fn read(&self, frame_position: f64, channel: usize) -> f32 {
        let data = &self.sample.data;
        let channels = self.sample.channels.max(1) as usize;
        let frames = self.sample.frames();
        if frames == 0 {
            return 0.0;
        }

        let frame = frame_position.floor() as usize;
        if frame >= frames {
            return 0.0;
        }
        let fraction = (frame_position - frame_position.floor()) as f32;
        let current = data[frame * channels + channel];

        let next_frame = if frame + 1 < frames {
            frame + 1
        } else if self.looping {
            0
        } else {
            return current;
        };
        let next = data[next_frame * channels + channel];

        current + (next - current) * fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(data: Vec<f32>, channels: u16) -> Arc<Sample> {
        Arc::new(Sample {
            name: "test".to_string(),
            source: "memory".to_string(),
            data: Arc::new(data),
            sample_rate: 44100,
            channels,
        })
    }

    #[test]
    fn test_one_shot_finishes() {
        let mut voice = Voice::one_shot(sample(vec![0.1, 0.2, 0.3], 1));
        assert!(voice.next_frame(44100).is_some());
        assert!(voice.next_frame(44100).is_some());
        assert!(voice.next_frame(44100).is_some());
        assert!(voice.next_frame(44100).is_none());
        assert!(!voice.is_active());
    }

    #[test]
    fn test_looping_wraps() {
        let mut voice = Voice::looping(sample(vec![0.5, -0.5], 1));
        let values: Vec<f32> = (0..6).map(|_| voice.next_frame(44100).unwrap().0).collect();
        assert_eq!(values, vec![0.5, -0.5, 0.5, -0.5, 0.5, -0.5]);
        assert!(voice.is_active());
    }

    #[test]
    fn test_stereo_channels_kept_apart() {
        let mut voice = Voice::one_shot(sample(vec![0.25, -0.75, 0.5, -0.5], 2));
        assert_eq!(voice.next_frame(44100), Some((0.25, -0.75)));
        assert_eq!(voice.next_frame(44100), Some((0.5, -0.5)));
        assert_eq!(voice.next_frame(44100), None);
    }

    #[test]
    fn test_interpolation_at_half_rate() {
        let mut voice = Voice::one_shot(sample(vec![0.0, 0.4, 0.8], 1)).with_rate(0.5);
        let values: Vec<f32> = std::iter::from_fn(|| voice.next_frame(44100).map(|f| f.0)).collect();
        let expected = [0.0, 0.2, 0.4, 0.6, 0.8, 0.8];
        assert_eq!(values.len(), expected.len());
        for (got, want) in values.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "expected {}, got {}", want, got);
        }
    }

    #[test]
    fn test_loop_seam_interpolates_to_start() {
        let voice = Voice::looping(sample(vec![0.0, 1.0], 1));
        assert!((voice.read(1.5, 0) - 0.5).abs() < 1e-6);

        let voice = Voice::one_shot(sample(vec![0.0, 1.0], 1));
        assert_eq!(voice.read(1.5, 0), 1.0);
    }

    #[test]
    fn test_gain_and_rate_guards() {
        let voice = Voice::one_shot(sample(vec![1.0; 10], 1))
            .with_gain(3.0)
            .with_rate(-2.0);
        assert_eq!(voice.gain(), 1.0);
        assert!((voice.duration() - 10.0 / 44100.0).abs() < 1e-12);

        let mut voice = voice.with_gain(0.5).with_rate(2.0);
        assert_eq!(voice.next_frame(44100), Some((0.5, 0.5)));
        assert!((voice.position() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_sample_is_inactive() {
        let mut voice = Voice::looping(sample(Vec::new(), 2));
        assert!(!voice.is_active());
        assert!(voice.next_frame(44100).is_none());
    }
}
