//! Audio output engines
//!
//! The mixer renders interleaved stereo; an [`AudioOutput`] pulls those blocks
//! either from a cpal device or from an offline clock that can capture what it
//! renders. [`AudioContext`] wraps one output with a suspended / running /
//! closed lifecycle so the controller can acquire it once and resume it.

use crate::{AudioError, AudioGraph, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Fills an interleaved stereo block (L, R, L, R, ...)
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// A sink that repeatedly asks for stereo blocks
pub trait AudioOutput: Send + Sync {
    fn sample_rate(&self) -> u32;
    fn start(&self, callback: RenderCallback) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn is_running(&self) -> bool;
}

/// Acquires an output; the platform capability check lives here
pub trait AudioBackend: Send + Sync {
    fn open(&self) -> Result<Arc<dyn AudioOutput>>;
}

/// The default cpal output device
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open(&self) -> Result<Arc<dyn AudioOutput>> {
        Ok(Arc::new(CpalOutput::new()?))
    }
}

struct StreamWorker {
    stop_tx: mpsc::Sender<()>,
    thread: std::thread::JoinHandle<()>,
}

/// cpal output stream
///
/// cpal streams are not `Send` on every platform, so the stream lives on a
/// dedicated thread for as long as it plays.
pub struct CpalOutput {
    device_name: String,
    sample_rate: u32,
    channels: u16,
    worker: Mutex<Option<StreamWorker>>,
}

impl CpalOutput {
    /// Probe the default output device
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::AudioInitFailed("No output device available".to_string()))?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::AudioInitFailed(format!("Failed to get default config: {}", e)))?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!(
            "Output device: {} ({} Hz, {} ch)",
            device_name,
            config.sample_rate().0,
            config.channels()
        );

        Ok(CpalOutput {
            device_name,
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            worker: Mutex::new(None),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

/// Build and play a stream on the current thread
fn play_stream(mut callback: RenderCallback) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceError("No output device available".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceError(format!("Failed to get default config: {}", e)))?;
    let channels = supported.channels() as usize;
    let config: cpal::StreamConfig = supported.into();

    let mut stereo: Vec<f32> = Vec::new();
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                stereo.resize(frames * 2, 0.0);
                callback(&mut stereo);

                for (out, frame) in data.chunks_mut(channels.max(1)).zip(stereo.chunks(2)) {
                    match out.len() {
                        1 => out[0] = (frame[0] + frame[1]) * 0.5,
                        _ => {
                            out[0] = frame[0];
                            out[1] = frame[1];
                            for extra in out.iter_mut().skip(2) {
                                *extra = 0.0;
                            }
                        }
                    }
                }
            },
            |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::DeviceError(format!("Failed to build stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| AudioError::DeviceError(format!("Failed to play stream: {}", e)))?;

    Ok(stream)
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&self, callback: RenderCallback) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("chime-output".to_string())
            .spawn(move || match play_stream(callback) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Park until stopped or the output is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *worker = Some(StreamWorker { stop_tx, thread });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(AudioError::DeviceError("Output thread exited early".to_string())),
        }
    }

    fn stop(&self) -> Result<()> {
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.stop_tx.send(());
            if worker.thread.join().is_err() {
                return Err(AudioError::DeviceError("Output thread panicked".to_string()));
            }
            debug!("Output stream on {} stopped", self.device_name);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop output stream: {}", e);
        }
    }
}

/// Offline clock: renders one block per block period on the tokio runtime
#[derive(Debug, Clone)]
pub struct OfflineBackend {
    sample_rate: u32,
    block_frames: usize,
    capture: Option<Arc<Mutex<Vec<f32>>>>,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32) -> Self {
        OfflineBackend {
            sample_rate,
            block_frames: 1024,
            capture: None,
        }
    }

    pub fn with_block_frames(mut self, frames: usize) -> Self {
        self.block_frames = frames.max(1);
        self
    }

    /// Append every rendered block to `buffer`
    pub fn capture_into(mut self, buffer: Arc<Mutex<Vec<f32>>>) -> Self {
        self.capture = Some(buffer);
        self
    }
}

impl AudioBackend for OfflineBackend {
    fn open(&self) -> Result<Arc<dyn AudioOutput>> {
        Ok(Arc::new(OfflineOutput {
            config: self.clone(),
            task: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }))
    }
}

pub struct OfflineOutput {
    config: OfflineBackend,
    task: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl OfflineOutput {
    /// Wall-clock length of one block
    pub fn block_period(&self) -> Duration {
        Duration::from_secs_f64(self.config.block_frames as f64 / self.config.sample_rate.max(1) as f64)
    }
}

impl AudioOutput for OfflineOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn start(&self, mut callback: RenderCallback) -> Result<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| AudioError::DeviceError("Offline output needs a tokio runtime".to_string()))?;

        let period = self.block_period();
        let block_frames = self.config.block_frames;
        let capture = self.config.capture.clone();
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        *task = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
            let mut block = vec![0.0f32; block_frames * 2];
            loop {
                ticker.tick().await;
                callback(&mut block);
                if let Some(capture) = &capture {
                    capture.lock().extend_from_slice(&block);
                }
            }
        }));
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for OfflineOutput {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

/// Lifecycle of the audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Acquired but not pulling audio yet
    Suspended,
    Running,
    Closed,
}

/// The single audio context of a controller
pub struct AudioContext {
    output: Arc<dyn AudioOutput>,
    state: ContextState,
}

impl AudioContext {
    /// Acquire an output from the backend, initially suspended
    pub fn open(backend: &dyn AudioBackend) -> Result<Self> {
        let output = backend.open().map_err(|e| match e {
            AudioError::AudioInitFailed(msg) => AudioError::AudioInitFailed(msg),
            other => AudioError::AudioInitFailed(other.to_string()),
        })?;
        Ok(AudioContext {
            output,
            state: ContextState::Suspended,
        })
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn sample_rate(&self) -> u32 {
        self.output.sample_rate()
    }

    /// Start pulling audio from `graph`; a no-op when already running
    pub fn resume(&mut self, graph: &AudioGraph) -> Result<()> {
        match self.state {
            ContextState::Running => Ok(()),
            ContextState::Closed => Err(AudioError::AudioInitFailed("Audio context is closed".to_string())),
            ContextState::Suspended => {
                let graph = graph.clone();
                let sample_rate = self.output.sample_rate();
                self.output
                    .start(Box::new(move |block: &mut [f32]| graph.render(block, sample_rate)))
                    .map_err(|e| AudioError::AudioInitFailed(format!("Resume rejected: {}", e)))?;
                self.state = ContextState::Running;
                debug!("Audio context running at {} Hz", sample_rate);
                Ok(())
            }
        }
    }

    pub fn suspend(&mut self) -> Result<()> {
        if self.state == ContextState::Running {
            self.output.stop()?;
            self.state = ContextState::Suspended;
        }
        Ok(())
    }

    /// Release the output; a closed context cannot be resumed
    pub fn close(&mut self) -> Result<()> {
        if self.state == ContextState::Closed {
            return Ok(());
        }
        self.output.stop()?;
        self.state = ContextState::Closed;
        debug!("Audio context closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::LoopedLayer;
    use crate::Sample;
    use chime_core::{Layer, UserAudioSettings, MAX_DB};

    struct NoDevice;

    impl AudioBackend for NoDevice {
        fn open(&self) -> Result<Arc<dyn AudioOutput>> {
            Err(AudioError::DeviceError("no sound card".to_string()))
        }
    }

    #[test]
    fn test_missing_device_is_init_failure() {
        let result = AudioContext::open(&NoDevice);
        assert!(matches!(result, Err(AudioError::AudioInitFailed(_))));
    }

    #[test]
    fn test_offline_output_needs_runtime() {
        let output = OfflineBackend::new(44100).open().unwrap();
        let result = output.start(Box::new(|_block: &mut [f32]| {}));
        assert!(result.is_err());
        assert!(!output.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_lifecycle_and_capture() {
        let capture = Arc::new(Mutex::new(Vec::new()));
        let backend = OfflineBackend::new(1000)
            .with_block_frames(100)
            .capture_into(capture.clone());

        let graph = AudioGraph::new();
        graph.begin_generation();
        graph.set_looped(
            LoopedLayer::Drone,
            Arc::new(Sample {
                name: "drone.wav".to_string(),
                source: "drone.wav".to_string(),
                data: Arc::new(vec![1.0; 1000]),
                sample_rate: 1000,
                channels: 1,
            }),
        );
        let mut settings = UserAudioSettings::default();
        settings.set_volume(Layer::Master, MAX_DB);
        settings.set_volume(Layer::Drone, MAX_DB);
        graph.apply_settings(&settings);

        let mut context = AudioContext::open(&backend).unwrap();
        assert_eq!(context.state(), ContextState::Suspended);
        context.resume(&graph).unwrap();
        context.resume(&graph).unwrap();
        assert_eq!(context.state(), ContextState::Running);

        tokio::time::sleep(Duration::from_millis(450)).await;
        context.close().unwrap();

        let rendered = capture.lock().clone();
        // Ticks at 0, 100, 200, 300 and 400 ms
        assert_eq!(rendered.len(), 5 * 100 * 2);
        assert!(rendered.iter().all(|s| (*s - 0.7).abs() < 1e-6));

        assert!(matches!(context.resume(&graph), Err(AudioError::AudioInitFailed(_))));
    }
}
