//! Binaural beat generator
//!
//! Two sine tones a beat frequency apart, one hard left and one hard right.
//! Each ear keeps its own phase accumulator, so retuning while the tones play
//! changes the pitch without a click.

use chime_core::BinauralSettings;
use std::f64::consts::TAU;

pub struct BinauralGenerator {
    left_freq: f32,
    right_freq: f32,
    /// Phase of each oscillator in cycles, kept in [0, 1)
    left_phase: f64,
    right_phase: f64,
}

impl BinauralGenerator {
    pub fn new(settings: &BinauralSettings) -> Self {
        BinauralGenerator {
            left_freq: settings.left_frequency(),
            right_freq: settings.right_frequency(),
            left_phase: 0.0,
            right_phase: 0.0,
        }
    }

    /// Change frequencies in place; phases carry over
    pub fn retune(&mut self, settings: &BinauralSettings) {
        self.left_freq = settings.left_frequency();
        self.right_freq = settings.right_frequency();
    }

    /// Current (left, right) frequencies in Hz
    pub fn frequencies(&self) -> (f32, f32) {
        (self.left_freq, self.right_freq)
    }

    /// Next stereo frame at unit amplitude
    pub fn next_frame(&mut self, sample_rate: u32) -> (f32, f32) {
        let left = (self.left_phase * TAU).sin() as f32;
        let right = (self.right_phase * TAU).sin() as f32;

        let sr = sample_rate.max(1) as f64;
        self.left_phase = (self.left_phase + self.left_freq as f64 / sr).fract();
        self.right_phase = (self.right_phase + self.right_freq as f64 / sr).fract();

        (left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_core::BinauralPreset;

    fn zero_crossings(samples: &[f32]) -> usize {
        samples.windows(2).filter(|w| w[0] <= 0.0 && w[1] > 0.0).count()
    }

    #[test]
    fn test_theta_pair() {
        let mut settings = BinauralSettings::default();
        settings.set_preset(BinauralPreset::Theta);
        let generator = BinauralGenerator::new(&settings);
        assert_eq!(generator.frequencies(), (397.0, 403.0));
    }

    #[test]
    fn test_channels_carry_their_own_tone() {
        let settings = BinauralSettings {
            carrier_frequency: 100.0,
            beat_frequency: 20.0,
            ..BinauralSettings::default()
        };
        let mut generator = BinauralGenerator::new(&settings);

        let sr = 48000;
        let frames: Vec<(f32, f32)> = (0..sr).map(|_| generator.next_frame(sr)).collect();
        let left: Vec<f32> = frames.iter().map(|f| f.0).collect();
        let right: Vec<f32> = frames.iter().map(|f| f.1).collect();

        // One second of audio: upward crossings count the frequency
        assert!((zero_crossings(&left) as i64 - 90).abs() <= 1);
        assert!((zero_crossings(&right) as i64 - 110).abs() <= 1);
        assert!(left.iter().chain(right.iter()).all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_retune_is_phase_continuous() {
        let mut settings = BinauralSettings::default();
        let mut generator = BinauralGenerator::new(&settings);

        let mut last = (0.0, 0.0);
        for _ in 0..1000 {
            last = generator.next_frame(44100);
        }

        settings.set_carrier_frequency(410.0);
        generator.retune(&settings);
        let next = generator.next_frame(44100);

        // Max per-sample step of a ~400 Hz sine at 44.1 kHz is about 0.06
        assert!((next.0 - last.0).abs() < 0.1);
        assert!((next.1 - last.1).abs() < 0.1);
        assert_eq!(generator.frequencies(), (405.0, 415.0));
    }
}
