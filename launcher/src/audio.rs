/// Audio playback for the launcher: the intro sting, the looping menu theme and
/// hover ticks.
///
/// An [`AudioResource`] is opened from a symbolic source id through an
/// [`AudioBackend`], started once, and stopped/released exactly once. Opening
/// decodes the whole clip and opens the output device, so callers run it on a
/// blocking background context.
///
/// Device output is implemented with WASAPI-backed `cpal` on Windows. On other
/// platforms the public API compiles but opening a device fails with
/// `ResourceUnavailable`, and the launcher runs silently.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::oneshot;

use crate::error::LaunchError;

/// Intro sting played over the splash screen.
pub const INTRO_SOURCE: &str = "V";
/// Main menu theme, looped while the menu is visible.
pub const THEME_SOURCE: &str = "menu_theme";
/// Tick played when the pointer enters a menu button.
pub const HOVER_SOURCE: &str = "hover";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    OneShot,
    Loop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioState {
    Idle,
    Playing,
    Stopped,
}

/// An opened output stream for one clip.
pub trait AudioOutput: Send {
    /// Begins playback. For one-shot clips `done` is fired when the clip ends;
    /// it is dropped unfired if playback is stopped first.
    fn play(&mut self, done: oneshot::Sender<()>) -> Result<(), LaunchError>;
    /// Halts playback. Must tolerate repeated calls.
    fn stop(&mut self);
}

/// Decodes sources and opens device outputs for them.
pub trait AudioBackend: Send + Sync {
    fn open(&self, source_id: &str, mode: AudioMode) -> Result<Box<dyn AudioOutput>, LaunchError>;
}

/// One playable sound with an explicit open/start/stop/release lifecycle.
pub struct AudioResource {
    source_id: String,
    mode: AudioMode,
    state: AudioState,
    output: Option<Box<dyn AudioOutput>>,
}

impl AudioResource {
    pub fn open(
        backend: &dyn AudioBackend,
        source_id: &str,
        mode: AudioMode,
    ) -> Result<Self, LaunchError> {
        let output = backend.open(source_id, mode)?;
        Ok(Self {
            source_id: source_id.to_string(),
            mode,
            state: AudioState::Idle,
            output: Some(output),
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn mode(&self) -> AudioMode {
        self.mode
    }

    #[cfg(test)]
    pub fn state(&self) -> AudioState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == AudioState::Playing
    }

    /// Starts playback and returns the completion signal. Loop resources never
    /// complete on their own, so their receiver only resolves with an error
    /// once the resource is stopped.
    pub fn start(&mut self) -> Result<oneshot::Receiver<()>, LaunchError> {
        let (done_tx, done_rx) = oneshot::channel();
        let output = match (self.state, self.output.as_mut()) {
            (AudioState::Idle, Some(output)) => output,
            _ => {
                return Err(LaunchError::ResourceUnavailable {
                    source_id: self.source_id.clone(),
                    reason: format!("cannot start a resource in state {:?}", self.state),
                })
            }
        };
        if let Err(e) = output.play(done_tx) {
            self.stop();
            return Err(e);
        }
        self.state = AudioState::Playing;
        Ok(done_rx)
    }

    /// Stops playback and releases the device handle. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.stop();
        }
        self.state = AudioState::Stopped;
    }

    /// Stops (if needed) and consumes the resource.
    pub fn release(mut self) {
        self.stop();
    }
}

impl Drop for AudioResource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Clip decoding ─────────────────────────────────────────────────────────────

/// A fully decoded clip as interleaved f32 samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl Clip {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
        let spec = reader.spec();
        if spec.channels == 0 {
            bail!("WAV file has no channels: {}", path.display());
        }

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()
            }
        }
        .with_context(|| format!("Failed to decode WAV samples: {}", path.display()))?;

        Ok(Self {
            samples,
            channels: spec.channels,
            sample_rate: spec.sample_rate,
        })
    }

    #[cfg(any(windows, test))]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

/// Reads a clip out at the device's sample rate and channel count.
#[cfg(any(windows, test))]
pub struct ClipCursor {
    clip: Arc<Clip>,
    position: f64,
    step: f64,
    looping: bool,
    finished: bool,
}

#[cfg(any(windows, test))]
impl ClipCursor {
    pub fn new(clip: Arc<Clip>, device_rate: u32, mode: AudioMode) -> Self {
        let step = clip.sample_rate as f64 / device_rate.max(1) as f64;
        Self {
            clip,
            position: 0.0,
            step,
            looping: mode == AudioMode::Loop,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fills `out` (interleaved, `channels` wide). Clip channels are mapped
    /// round-robin onto device channels. Once a one-shot clip runs out the
    /// rest of the buffer is silence.
    pub fn fill(&mut self, out: &mut [f32], channels: usize) {
        let frames = self.clip.frames();
        let clip_channels = self.clip.channels as usize;
        for frame in out.chunks_mut(channels.max(1)) {
            let mut index = self.position as usize;
            if index >= frames {
                if self.looping && frames > 0 {
                    self.position -= frames as f64;
                    index = (self.position as usize).min(frames - 1);
                } else {
                    self.finished = true;
                    frame.fill(0.0);
                    continue;
                }
            }
            let base = index * clip_channels;
            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = self.clip.samples[base + c % clip_channels];
            }
            self.position += self.step;
        }
    }
}

// ── Production backend ────────────────────────────────────────────────────────

/// Resolves source ids to `<dir>/<id>.wav` and plays them on the default
/// output device.
pub struct DeviceBackend {
    dir: PathBuf,
}

impl DeviceBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn source_path(&self, source_id: &str) -> PathBuf {
        self.dir.join(format!("{source_id}.wav"))
    }
}

impl AudioBackend for DeviceBackend {
    fn open(&self, source_id: &str, mode: AudioMode) -> Result<Box<dyn AudioOutput>, LaunchError> {
        let unavailable = |e: anyhow::Error| LaunchError::ResourceUnavailable {
            source_id: source_id.to_string(),
            reason: format!("{e:#}"),
        };
        let clip = Clip::load(&self.source_path(source_id)).map_err(unavailable)?;
        open_device(source_id, Arc::new(clip), mode).map_err(unavailable)
    }
}

#[cfg(windows)]
fn open_device(source_id: &str, clip: Arc<Clip>, mode: AudioMode) -> Result<Box<dyn AudioOutput>> {
    Ok(Box::new(imp::DeviceOutput::open(source_id, clip, mode)?))
}

#[cfg(not(windows))]
fn open_device(source_id: &str, clip: Arc<Clip>, mode: AudioMode) -> Result<Box<dyn AudioOutput>> {
    let _ = (source_id, clip, mode);
    bail!("Audio output is only supported on Windows")
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use anyhow::{anyhow, bail, Context, Result};
    use cpal::traits::{DeviceTrait as _, HostTrait as _, StreamTrait as _};
    use log::warn;
    use tokio::sync::oneshot;

    use super::{AudioMode, AudioOutput, Clip, ClipCursor};
    use crate::error::LaunchError;

    const POLL_INTERVAL: Duration = Duration::from_millis(20);

    enum Cmd {
        Play(oneshot::Sender<()>),
        Stop,
    }

    /// Owns a playback thread holding the `cpal::Stream`, which is not `Send`.
    pub struct DeviceOutput {
        source_id: String,
        cmd_tx: mpsc::Sender<Cmd>,
        thread: Option<JoinHandle<()>>,
    }

    impl DeviceOutput {
        pub fn open(source_id: &str, clip: Arc<Clip>, mode: AudioMode) -> Result<Self> {
            let (cmd_tx, cmd_rx) = mpsc::channel::<Cmd>();
            let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

            let thread = thread::spawn(move || playback_thread(clip, mode, cmd_rx, ready_tx));
            ready_rx
                .recv()
                .map_err(|_| anyhow!("playback thread exited during device setup"))??;

            Ok(Self {
                source_id: source_id.to_string(),
                cmd_tx,
                thread: Some(thread),
            })
        }
    }

    impl AudioOutput for DeviceOutput {
        fn play(&mut self, done: oneshot::Sender<()>) -> Result<(), LaunchError> {
            self.cmd_tx
                .send(Cmd::Play(done))
                .map_err(|_| LaunchError::ResourceUnavailable {
                    source_id: self.source_id.clone(),
                    reason: "playback thread is gone".to_string(),
                })
        }

        fn stop(&mut self) {
            let _ = self.cmd_tx.send(Cmd::Stop);
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }

    impl Drop for DeviceOutput {
        fn drop(&mut self) {
            self.stop();
        }
    }

    fn playback_thread(
        clip: Arc<Clip>,
        mode: AudioMode,
        cmd_rx: mpsc::Receiver<Cmd>,
        ready_tx: mpsc::Sender<Result<()>>,
    ) {
        let finished = Arc::new(AtomicBool::new(false));
        let stream = match build_stream(clip, mode, Arc::clone(&finished)) {
            Ok(s) => {
                let _ = ready_tx.send(Ok(()));
                s
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        let done = match cmd_rx.recv() {
            Ok(Cmd::Play(done)) => done,
            Ok(Cmd::Stop) | Err(_) => return,
        };
        if let Err(e) = stream.play() {
            warn!("Failed to start audio stream: {e}");
            return;
        }

        loop {
            match cmd_rx.recv_timeout(POLL_INTERVAL) {
                Ok(Cmd::Stop) | Err(mpsc::RecvTimeoutError::Disconnected) => return,
                Ok(Cmd::Play(_)) => {}
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if finished.load(Ordering::Acquire) {
                        drop(stream);
                        let _ = done.send(());
                        return;
                    }
                }
            }
        }
    }

    fn build_stream(clip: Arc<Clip>, mode: AudioMode, finished: Arc<AtomicBool>) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no default output device")?;
        let supported = device
            .default_output_config()
            .context("default_output_config failed")?;
        let config = supported.config();
        let channels = config.channels as usize;
        let cursor = Arc::new(Mutex::new(ClipCursor::new(clip, config.sample_rate.0, mode)));

        let err_fn = |err| warn!("Audio stream error: {err}");

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                build_typed::<f32>(&device, &config, channels, cursor, finished, err_fn)?
            }
            cpal::SampleFormat::I16 => {
                build_typed::<i16>(&device, &config, channels, cursor, finished, err_fn)?
            }
            cpal::SampleFormat::U16 => {
                build_typed::<u16>(&device, &config, channels, cursor, finished, err_fn)?
            }
            other => bail!("unsupported sample format: {other:?}"),
        };
        Ok(stream)
    }

    fn build_typed<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        channels: usize,
        cursor: Arc<Mutex<ClipCursor>>,
        finished: Arc<AtomicBool>,
        err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
    ) -> Result<cpal::Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let mut scratch: Vec<f32> = Vec::new();
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _| {
                    scratch.resize(data.len(), 0.0);
                    let Ok(mut cursor) = cursor.lock() else { return };
                    cursor.fill(&mut scratch, channels);
                    for (out, value) in data.iter_mut().zip(scratch.iter()) {
                        *out = <T as cpal::FromSample<f32>>::from_sample_(*value);
                    }
                    if cursor.is_finished() {
                        finished.store(true, Ordering::Release);
                    }
                },
                err_fn,
                None,
            )
            .context("build_output_stream failed")
    }
}
