use chrono::{DateTime, Local};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hound error: {0}")]
    Hound(#[from] hound::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

/// Parameters of one `record` run
#[derive(Debug, Clone)]
pub struct RecordParams {
    pub output_path: PathBuf,
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub bit_depth: u16,
}

impl RecordParams {
    pub fn validate(&self) -> Result<(), ExportError> {
        if ![16, 24, 32].contains(&self.bit_depth) {
            return Err(ExportError::InvalidParams(format!(
                "Bit depth must be 16, 24, or 32, got {}",
                self.bit_depth
            )));
        }

        if ![22050, 44100, 48000, 96000].contains(&self.sample_rate) {
            return Err(ExportError::InvalidParams(format!(
                "Sample rate must be 22050, 44100, 48000, or 96000 Hz, got {}",
                self.sample_rate
            )));
        }

        if !(self.duration_secs > 0.0) || !self.duration_secs.is_finite() {
            return Err(ExportError::InvalidParams("Duration must be positive".to_string()));
        }

        Ok(())
    }

    /// Stereo frames the recording should contain
    pub fn frames(&self) -> usize {
        (self.duration_secs * self.sample_rate as f64).round() as usize
    }
}

/// `weather-chimes-YYYYMMDD-HHMMSS.wav` in the current directory
pub fn default_output_path(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("weather-chimes-{}.wav", now.format("%Y%m%d-%H%M%S")))
}

/// Write interleaved stereo samples to a WAV file
///
/// 16 and 24 bit write clamped integers, 32 bit writes float.
pub fn encode_wav(interleaved: &[f32], path: &Path, sample_rate: u32, bit_depth: u16) -> Result<(), ExportError> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: bit_depth,
        sample_format: if bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    let mut writer = WavWriter::create(path, spec)?;
    // A trailing half frame would leave the file unreadable
    let samples = &interleaved[..interleaved.len() - interleaved.len() % 2];

    match bit_depth {
        16 => {
            for s in samples {
                writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16)?;
            }
        }
        24 => {
            for s in samples {
                writer.write_sample((s.clamp(-1.0, 1.0) * 8388607.0) as i32)?;
            }
        }
        32 => {
            for s in samples {
                writer.write_sample(*s)?;
            }
        }
        _ => {
            return Err(ExportError::InvalidParams(format!(
                "Unsupported bit depth: {}",
                bit_depth
            )))
        }
    }

    writer.finalize()?;
    info!(
        "Wrote {} frames ({:.1}s) to {}",
        samples.len() / 2,
        samples.len() as f64 / 2.0 / sample_rate.max(1) as f64,
        path.display()
    );
    Ok(())
}

/// Validate, trim to the requested length and write
pub fn write_recording(interleaved: &[f32], params: &RecordParams) -> Result<(), ExportError> {
    params.validate()?;
    let len = interleaved.len().min(params.frames() * 2);
    encode_wav(&interleaved[..len], &params.output_path, params.sample_rate, params.bit_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params(path: PathBuf) -> RecordParams {
        RecordParams {
            output_path: path,
            sample_rate: 44100,
            duration_secs: 1.0,
            bit_depth: 16,
        }
    }

    #[test]
    fn test_validate_rejects_bad_params() {
        let ok = params(PathBuf::from("out.wav"));
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.bit_depth = 8;
        assert!(matches!(bad.validate(), Err(ExportError::InvalidParams(_))));

        let mut bad = ok.clone();
        bad.sample_rate = 8000;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.duration_secs = 0.0;
        assert!(bad.validate().is_err());
        bad.duration_secs = f64::NAN;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_recording_is_trimmed_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = params(dir.path().join("take.wav"));
        params.sample_rate = 22050;
        params.duration_secs = 0.5;

        // 2 seconds of a left-only tone, one stray sample at the end
        let mut samples: Vec<f32> = (0..22050 * 2).flat_map(|_| [0.5f32, 0.0]).collect();
        samples.push(0.25);
        write_recording(&samples, &params).unwrap();

        let mut reader = hound::WavReader::open(&params.output_path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration(), 11025);

        let read: Vec<i16> = reader.samples::<i16>().take(4).map(|s| s.unwrap()).collect();
        assert_eq!(read, vec![16383, 0, 16383, 0]);
    }

    #[test]
    fn test_float_and_clamped_depths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        encode_wav(&[1.5, -0.25], &path, 48000, 32).unwrap();
        let mut reader = hound::WavReader::open(&path).unwrap();
        let read: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(read, vec![1.5, -0.25]);

        let path = dir.path().join("deep.wav");
        encode_wav(&[1.5, -1.5], &path, 48000, 24).unwrap();
        let mut reader = hound::WavReader::open(&path).unwrap();
        let read: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        assert_eq!(read, vec![8388607, -8388607]);
    }

    #[test]
    fn test_default_output_path_uses_timestamp() {
        let now = Local.with_ymd_and_hms(2026, 10, 14, 7, 5, 9).unwrap();
        assert_eq!(default_output_path(now), PathBuf::from("weather-chimes-20261014-070509.wav"));
    }
}
