//! Fixtures shared by the inline tests

use crate::engine::{AudioBackend, AudioOutput, RenderCallback};
use crate::{AssetFetcher, AudioError, Result};
use async_trait::async_trait;
use chime_core::{AmbienceSet, AssetDescriptor, SoundPack};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn encode_wav(channels: u16, sample_rate: u32, frames: impl Iterator<Item = Vec<f32>>) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for frame in frames {
            for value in frame {
                writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// A constant-valued mono 16-bit WAV file
pub fn wav_bytes(frames: usize, sample_rate: u32, value: f32) -> Vec<u8> {
    encode_wav(1, sample_rate, (0..frames).map(|_| vec![value]))
}

/// A constant-valued stereo 16-bit WAV file
pub fn wav_bytes_stereo(frames: usize, sample_rate: u32, left: f32, right: f32) -> Vec<u8> {
    encode_wav(2, sample_rate, (0..frames).map(|_| vec![left, right]))
}

/// In-memory sources with optional per-source latency
#[derive(Default)]
pub struct MemoryFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    delays: Mutex<HashMap<String, Duration>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, reference: &str, bytes: Vec<u8>) {
        self.files.lock().insert(reference.to_string(), bytes);
    }

    pub fn delay(&self, reference: &str, delay: Duration) {
        self.delays.lock().insert(reference.to_string(), delay);
    }

    /// Every reference fetched so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AssetFetcher for MemoryFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        self.requests.lock().push(reference.to_string());
        let delay = self.delays.lock().get(reference).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.files
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| AudioError::SampleNotFound(reference.to_string()))
    }
}

/// A pack whose sources are all plain local names
pub fn test_pack() -> SoundPack {
    SoundPack {
        id: "test".to_string(),
        name: "Test Pack".to_string(),
        drone: AssetDescriptor::local("drone", "drone.wav"),
        chimes: vec![
            AssetDescriptor::local("chime-a", "chime-a.wav"),
            AssetDescriptor::local("chime-b", "chime-b.wav"),
        ],
        ambience: AmbienceSet {
            default: AssetDescriptor::local("ambience-default", "very-low-wind.wav"),
            rain: AssetDescriptor::local("ambience-rain", "heavy-rain.wav"),
            snow: AssetDescriptor::local("ambience-snow", "light-snow.wav"),
            cloudy: AssetDescriptor::local("ambience-cloudy", "medium-wind.wav"),
        },
    }
}

/// A fetcher that serves every source of [`test_pack`]
pub fn pack_fetcher() -> Arc<MemoryFetcher> {
    let fetcher = Arc::new(MemoryFetcher::new());
    for name in [
        "drone.wav",
        "very-low-wind.wav",
        "heavy-rain.wav",
        "light-snow.wav",
        "medium-wind.wav",
    ] {
        fetcher.insert(name, wav_bytes(2205, 22050, 0.1));
    }
    fetcher.insert("chime-a.wav", wav_bytes(4410, 22050, 0.5));
    fetcher.insert("chime-b.wav", wav_bytes(4410, 22050, -0.5));
    fetcher
}

/// A backend whose output only renders when asked to
#[derive(Default)]
pub struct TestBackend {
    unavailable: bool,
    opened: AtomicUsize,
    output: Mutex<Option<Arc<TestOutput>>>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that behaves like a host without audio hardware
    pub fn unavailable() -> Self {
        TestBackend {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn output(&self) -> Option<Arc<TestOutput>> {
        self.output.lock().clone()
    }
}

impl AudioBackend for TestBackend {
    fn open(&self) -> Result<Arc<dyn AudioOutput>> {
        if self.unavailable {
            return Err(AudioError::AudioInitFailed("No output device available".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let output = Arc::new(TestOutput::default());
        *self.output.lock() = Some(output.clone());
        Ok(output)
    }
}

#[derive(Default)]
pub struct TestOutput {
    running: AtomicBool,
    callback: Mutex<Option<RenderCallback>>,
}

impl TestOutput {
    /// Pull one stereo block through the render callback
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut block = vec![0.0; frames * 2];
        if let Some(callback) = self.callback.lock().as_mut() {
            callback(&mut block);
        }
        block
    }
}

impl AudioOutput for TestOutput {
    fn sample_rate(&self) -> u32 {
        22050
    }

    fn start(&self, callback: RenderCallback) -> Result<()> {
        *self.callback.lock() = Some(callback);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.callback.lock().take();
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
