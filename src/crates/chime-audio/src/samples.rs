//! Sample loading and caching
//!
//! Resolves a logical asset to decoded PCM: the primary source first, then the
//! fallback, each attempt bounded by the load timeout. Decoded samples are
//! cached by source reference so a rebuild does not decode the same file twice.

use crate::{AudioError, Result};
use async_trait::async_trait;
use chime_core::AssetDescriptor;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Default bound on a single load attempt
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(3);

/// An audio sample with decoded PCM data
#[derive(Debug, Clone)]
pub struct Sample {
    /// File name of the source (e.g., "chime-f3-a.wav")
    pub name: String,
    /// Source reference the sample was decoded from
    pub source: String,
    /// Audio data (interleaved f32, normalized to [-1.0, 1.0])
    pub data: Arc<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl Sample {
    /// Get the duration of this sample in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.data.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Get the number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.data.len() / self.channels as usize
    }
}

/// Fetches the raw bytes behind a source reference
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Reads sources relative to an asset root directory
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileFetcher { root: root.into() }
    }
}

#[async_trait]
impl AssetFetcher for FileFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let path = self.root.join(reference.trim_start_matches('/'));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AudioError::SampleNotFound(path.display().to_string()))
            }
            Err(e) => Err(AudioError::IoError(e)),
        }
    }
}

/// Downloads `http(s)://` sources
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        HttpFetcher { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(reference)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AudioError::HttpError(format!("Failed to download {}: {}", reference, e)))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AudioError::HttpError(format!("Failed to read bytes: {}", e)))?;

        Ok(bytes.to_vec())
    }
}

/// Routes remote URLs over HTTP and everything else to the asset root
pub struct SourceFetcher {
    files: FileFetcher,
    http: HttpFetcher,
}

impl SourceFetcher {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        SourceFetcher {
            files: FileFetcher::new(asset_root),
            http: HttpFetcher::new(),
        }
    }
}

/// Whether a source reference names a remote URL
pub fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

#[async_trait]
impl AssetFetcher for SourceFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        if is_remote(reference) {
            self.http.fetch(reference).await
        } else {
            self.files.fetch(reference).await
        }
    }
}

/// Loads and caches decoded samples
pub struct ResourceLoader {
    fetcher: Arc<dyn AssetFetcher>,
    /// Decoded samples keyed by source reference
    cache: RwLock<HashMap<String, Arc<Sample>>>,
    timeout: Duration,
}

impl ResourceLoader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        ResourceLoader {
            fetcher,
            cache: RwLock::new(HashMap::new()),
            timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }

    /// A loader over the asset root directory with HTTP fallback
    pub fn from_asset_root(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(SourceFetcher::new(root)))
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Load a sample, trying `primary` and then `fallback`
    ///
    /// Each fetch gets the full timeout, so the worst case is two timeouts.
    /// Fails with `ResourceUnavailable` only when every source failed.
    pub async fn load(&self, primary: &str, fallback: Option<&str>) -> Result<Arc<Sample>> {
        let primary_err = match self.attempt(primary).await {
            Ok(sample) => return Ok(sample),
            Err(e) => e,
        };

        let Some(fallback) = fallback else {
            warn!("Failed to load {}: {}", primary, primary_err);
            return Err(AudioError::ResourceUnavailable(format!("{}: {}", primary, primary_err)));
        };

        warn!("Primary source {} failed ({}), trying fallback {}", primary, primary_err, fallback);
        match self.attempt(fallback).await {
            Ok(sample) => {
                info!("Loaded {} from fallback {}", primary, fallback);
                Ok(sample)
            }
            Err(fallback_err) => {
                warn!("Fallback source {} failed: {}", fallback, fallback_err);
                Err(AudioError::ResourceUnavailable(format!(
                    "{}: primary failed ({}), fallback failed ({})",
                    primary, primary_err, fallback_err
                )))
            }
        }
    }

    /// Load the sample behind an asset descriptor
    pub async fn load_descriptor(&self, asset: &AssetDescriptor) -> Result<Arc<Sample>> {
        debug!("Loading asset {}", asset.name);
        self.load(&asset.primary, asset.fallback.as_deref()).await
    }

    /// A previously decoded sample, if any
    pub fn cached(&self, source: &str) -> Option<Arc<Sample>> {
        self.cache.read().get(source).cloned()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    /// One bounded fetch-and-decode of a single source
    async fn attempt(&self, source: &str) -> Result<Arc<Sample>> {
        if let Some(sample) = self.cached(source) {
            return Ok(sample);
        }

        let bytes = tokio::time::timeout(self.timeout, self.fetcher.fetch(source))
            .await
            .map_err(|_| AudioError::Timeout(source.to_string()))??;

        let owned_source = source.to_string();
        let sample = tokio::task::spawn_blocking(move || decode_audio(bytes, &owned_source))
            .await
            .map_err(|e| AudioError::DecodeError(format!("Decoder task failed: {}", e)))??;

        let sample = Arc::new(sample);
        debug!(
            "Decoded {} ({} frames, {} Hz, {} ch)",
            source,
            sample.frames(),
            sample.sample_rate,
            sample.channels
        );
        self.cache.write().insert(source.to_string(), sample.clone());
        Ok(sample)
    }
}

/// Decode audio data from bytes using Symphonia
///
/// Output is interleaved regardless of how the codec lays out its planes.
pub fn decode_audio(data: Vec<u8>, source: &str) -> Result<Sample> {
    let cursor = Cursor::new(data);
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension(source) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::DecodeError(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::DecodeError("No valid audio track found".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::DecodeError(format!("Failed to create decoder: {}", e)))?;

    let mut audio_data: Vec<f32> = Vec::new();
    let mut buffer: Option<(usize, SampleBuffer<f32>)> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::DecodeError(format!("Format error: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped, the rest of the stream is still usable
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet in {}: {}", source, e);
                continue;
            }
            Err(e) => return Err(AudioError::DecodeError(format!("Failed to decode packet: {}", e))),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let capacity = decoded.capacity();
        let needs_buffer = !matches!(&buffer, Some((cap, _)) if *cap >= capacity);
        if needs_buffer {
            buffer = Some((capacity, SampleBuffer::<f32>::new(capacity as u64, spec)));
        }
        if let Some((_, buf)) = buffer.as_mut() {
            buf.copy_interleaved_ref(decoded);
            audio_data.extend_from_slice(buf.samples());
        }
    }

    if audio_data.is_empty() || channels == 0 {
        return Err(AudioError::DecodeError(format!("{} contains no audio", source)));
    }

    Ok(Sample {
        name: file_name(source).to_string(),
        source: source.to_string(),
        data: Arc::new(audio_data),
        sample_rate,
        channels,
    })
}

fn file_name(source: &str) -> &str {
    let path = source.split(['?', '#']).next().unwrap_or(source);
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(source: &str) -> Option<&str> {
    let name = file_name(source);
    let (_, ext) = name.rsplit_once('.')?;
    match ext {
        "wav" | "mp3" | "ogg" | "flac" => Some(ext),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wav_bytes, MemoryFetcher};
    use tokio::time::Instant;

    #[test]
    fn test_decode_interleaves_stereo() {
        let bytes = crate::testing::wav_bytes_stereo(4, 44100, 0.5, -0.25);
        let sample = decode_audio(bytes, "assets/stereo.wav").unwrap();
        assert_eq!(sample.channels, 2);
        assert_eq!(sample.frames(), 4);
        assert_eq!(sample.name, "stereo.wav");
        for frame in sample.data.chunks(2) {
            assert!((frame[0] - 0.5).abs() < 1e-3);
            assert!((frame[1] + 0.25).abs() < 1e-3);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode_audio(b"definitely not audio".to_vec(), "noise.mp3");
        assert!(matches!(result, Err(AudioError::DecodeError(_))));
    }

    #[test]
    fn test_source_helpers() {
        assert!(is_remote("https://assets.mixkit.co/x.mp3"));
        assert!(!is_remote("chime-f3-a.wav"));
        assert_eq!(file_name("https://host/path/bell.mp3?x=1"), "bell.mp3");
        assert_eq!(extension("heavy-rain.mp3"), Some("mp3"));
        assert_eq!(extension("README"), None);
    }

    #[tokio::test]
    async fn test_primary_preferred_and_cached() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("drone.wav", wav_bytes(100, 22050, 0.2));
        fetcher.insert("https://cdn/drone.mp3", wav_bytes(50, 22050, 0.2));
        let loader = ResourceLoader::new(fetcher.clone());

        let sample = loader.load("drone.wav", Some("https://cdn/drone.mp3")).await.unwrap();
        assert_eq!(sample.source, "drone.wav");
        assert_eq!(sample.frames(), 100);

        let again = loader.load("drone.wav", Some("https://cdn/drone.mp3")).await.unwrap();
        assert!(Arc::ptr_eq(&sample, &again));
        assert_eq!(fetcher.requests(), vec!["drone.wav".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_primary_resolves_with_fallback() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://cdn/bell.mp3", wav_bytes(64, 44100, 0.3));
        let loader = ResourceLoader::new(fetcher.clone());

        let asset = AssetDescriptor::new("bell", "bell.wav", "https://cdn/bell.mp3");
        let sample = loader.load_descriptor(&asset).await.unwrap();
        assert_eq!(sample.source, "https://cdn/bell.mp3");
        assert!(loader.cached("https://cdn/bell.mp3").is_some());
        assert!(loader.cached("bell.wav").is_none());
    }

    #[tokio::test]
    async fn test_undecodable_primary_falls_back() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("bell.wav", b"RIFF but broken".to_vec());
        fetcher.insert("bell-remote.wav", wav_bytes(64, 44100, 0.3));
        let loader = ResourceLoader::new(fetcher);

        let sample = loader.load("bell.wav", Some("bell-remote.wav")).await.unwrap();
        assert_eq!(sample.source, "bell-remote.wav");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_primary_times_out_to_fallback() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("slow.wav", wav_bytes(64, 44100, 0.3));
        fetcher.delay("slow.wav", Duration::from_secs(30));
        fetcher.insert("fast.wav", wav_bytes(32, 44100, 0.3));
        let loader = ResourceLoader::new(fetcher).with_timeout(Duration::from_secs(3));

        let started = Instant::now();
        let sample = loader.load("slow.wav", Some("fast.wav")).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(sample.source, "fast.wav");
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_failing_rejects_within_two_timeouts() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("slow-a.wav", wav_bytes(64, 44100, 0.3));
        fetcher.delay("slow-a.wav", Duration::from_secs(60));
        fetcher.insert("slow-b.wav", wav_bytes(64, 44100, 0.3));
        fetcher.delay("slow-b.wav", Duration::from_secs(60));
        let loader = ResourceLoader::new(fetcher).with_timeout(Duration::from_secs(3));

        let started = Instant::now();
        let result = loader.load("slow-a.wav", Some("slow-b.wav")).await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(AudioError::ResourceUnavailable(_))));
        assert!(elapsed <= Duration::from_secs(6) + Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_missing_without_fallback() {
        let loader = ResourceLoader::new(Arc::new(MemoryFetcher::new()));
        let result = loader.load("nothing.wav", None).await;
        assert!(matches!(result, Err(AudioError::ResourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_file_fetcher_reads_asset_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chime.wav"), wav_bytes(10, 44100, 0.1)).unwrap();

        let loader = ResourceLoader::from_asset_root(dir.path());
        let sample = loader.load("/chime.wav", None).await.unwrap();
        assert_eq!(sample.frames(), 10);

        let fetcher = FileFetcher::new(dir.path());
        assert!(matches!(fetcher.fetch("missing.wav").await, Err(AudioError::SampleNotFound(_))));
    }
}
