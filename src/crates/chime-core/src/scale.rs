//! Musical scales for chime transposition
//!
//! Chimes are only ever pitch-shifted along a fixed scale so no wind speed can
//! produce a dissonant transposition.

use serde::{Deserialize, Serialize};

/// Scales a chime set can be tuned to, as semitone intervals from the root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    #[default]
    MajorPentatonic,
    MinorPentatonic,
}

impl Scale {
    pub fn intervals(&self) -> &'static [i32] {
        match self {
            Scale::MajorPentatonic => &[0, 2, 4, 7, 9],
            Scale::MinorPentatonic => &[0, 3, 5, 7, 10],
        }
    }

    /// Semitone offset of a scale degree relative to the root
    ///
    /// Degrees wrap into neighbouring octaves: with five notes per octave,
    /// degree 5 is the root an octave up and degree -1 is the top note of the
    /// octave below.
    pub fn degree_semitones(&self, degree: i32) -> i32 {
        let intervals = self.intervals();
        let len = intervals.len() as i32;
        let octave = degree.div_euclid(len);
        let index = degree.rem_euclid(len) as usize;
        intervals[index] + 12 * octave
    }

    /// Playback-rate ratio that transposes the root to the given degree
    pub fn degree_ratio(&self, degree: i32) -> f64 {
        semitone_ratio(self.degree_semitones(degree))
    }
}

/// Equal-tempered playback-rate ratio for a semitone offset
pub fn semitone_ratio(semitones: i32) -> f64 {
    2f64.powf(semitones as f64 / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degrees_below_root() {
        let scale = Scale::MajorPentatonic;
        let offsets: Vec<i32> = (1..=5).map(|d| scale.degree_semitones(-d)).collect();
        assert_eq!(offsets, vec![-3, -5, -8, -10, -12]);
    }

    #[test]
    fn test_degrees_wrap_octaves() {
        let scale = Scale::MinorPentatonic;
        assert_eq!(scale.degree_semitones(0), 0);
        assert_eq!(scale.degree_semitones(5), 12);
        assert_eq!(scale.degree_semitones(7), 17);
        assert_eq!(scale.degree_semitones(-5), -12);
    }

    #[test]
    fn test_octave_ratio() {
        assert!((semitone_ratio(12) - 2.0).abs() < 1e-12);
        assert!((semitone_ratio(-12) - 0.5).abs() < 1e-12);
        assert!((Scale::MajorPentatonic.degree_ratio(0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ratios_stay_on_scale() {
        let scale = Scale::MajorPentatonic;
        for degree in -10..10 {
            let semis = (scale.degree_ratio(degree).log2() * 12.0).round() as i32;
            assert!(scale.intervals().contains(&semis.rem_euclid(12)));
        }
    }
}
