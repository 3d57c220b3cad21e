//! Audio hardware seam.
//!
//! The engine never talks to `cpal` directly. Capture and playback workers
//! open streams through an [`AudioBackend`], which is `Send + Sync` so it can
//! be shared with the worker threads. The streams it returns are created
//! *on* the worker thread and never leave it, so they do not need to be
//! `Send` (a `cpal::Stream` is not `Send` on every platform).
//!
//! [`CpalBackend`] is the production implementation. Tests use
//! `MockBackend`, a scripted in-memory device.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use thiserror::Error;

use super::capture::CpalInput;
use super::output::CpalOutput;
use super::PcmFormat;
use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Errors raised while opening or running an audio device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no input device found on the default audio host")]
    NoInputDevice,

    #[error("no output device found on the default audio host")]
    NoOutputDevice,

    #[error("failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported device sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("unsupported PCM layout: {0} bits per sample")]
    UnsupportedBitDepth(u16),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("audio stream disconnected")]
    Disconnected,

    #[error("device did not become ready within {0:?}")]
    OpenTimeout(Duration),
}

// ---------------------------------------------------------------------------
// SpeedControl
// ---------------------------------------------------------------------------

/// Playback speed multiplier shared between the engine and a running output
/// stream. Stored as `f32` bits so the audio callback can read it lock-free.
#[derive(Debug, Clone)]
pub struct SpeedControl(Arc<AtomicU32>);

impl SpeedControl {
    pub fn new(speed: f32) -> Self {
        Self(Arc::new(AtomicU32::new(speed.to_bits())))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, speed: f32) {
        self.0.store(speed.to_bits(), Ordering::Relaxed);
    }
}

impl Default for SpeedControl {
    fn default() -> Self {
        Self::new(1.0)
    }
}

// ---------------------------------------------------------------------------
// PlaybackSource
// ---------------------------------------------------------------------------

/// Everything an output stream needs to play a buffer suffix.
#[derive(Debug, Clone)]
pub struct PlaybackSource {
    /// The whole session buffer; playback starts at `start_offset`.
    pub pcm: Arc<[u8]>,
    pub format: PcmFormat,
    /// Frame-aligned byte offset of the first frame to play.
    pub start_offset: usize,
    /// Live speed multiplier, re-read by the stream while it plays.
    pub speed: SpeedControl,
}

// ---------------------------------------------------------------------------
// Stream traits
// ---------------------------------------------------------------------------

/// Blocking reader over a capture device producing PCM in the requested
/// format.
pub trait InputStream {
    /// Fill `buf` with up to `buf.len()` bytes.
    ///
    /// Blocks for at most a short device-specific timeout; `Ok(0)` means no
    /// data arrived in that window.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;
}

/// A prepared output stream over a [`PlaybackSource`].
pub trait OutputStream {
    /// Start (or restart) audible output.
    fn play(&mut self) -> Result<(), DeviceError>;

    /// Stop output and discard anything queued on the device.
    fn stop(&mut self);

    /// Take the first asynchronous stream error reported since the last call.
    fn take_error(&mut self) -> Option<DeviceError>;
}

/// Factory for capture and output streams.
pub trait AudioBackend: Send + Sync {
    fn open_input(&self, format: PcmFormat) -> Result<Box<dyn InputStream>, DeviceError>;

    fn open_output(&self, source: PlaybackSource) -> Result<Box<dyn OutputStream>, DeviceError>;

    /// Whether a running output stream follows [`SpeedControl`] changes.
    /// When `false` the engine restarts playback to apply a new speed.
    fn supports_live_speed(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// [`AudioBackend`] on the default `cpal` host.
///
/// Devices are looked up by name each time a stream is opened, falling back
/// to the host default when no name is configured or the named device is
/// gone.
#[derive(Debug, Clone)]
pub struct CpalBackend {
    input_device: Option<String>,
    output_device: Option<String>,
    read_timeout: Duration,
}

impl CpalBackend {
    /// Backend using the system default input and output devices.
    pub fn new() -> Self {
        Self {
            input_device: None,
            output_device: None,
            read_timeout: Duration::from_millis(100),
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            input_device: config.input_device.clone(),
            output_device: config.output_device.clone(),
            ..Self::new()
        }
    }

    /// Names of the input devices on the default host.
    pub fn input_device_names() -> Result<Vec<String>, DeviceError> {
        let host = cpal::default_host();
        Ok(host
            .input_devices()?
            .filter_map(|d| d.name().ok())
            .collect())
    }

    fn input(&self) -> Result<cpal::Device, DeviceError> {
        let host = cpal::default_host();
        if let Some(name) = &self.input_device {
            if let Some(device) = host
                .input_devices()?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
            {
                return Ok(device);
            }
            log::warn!("capture: input device {name:?} not found, using default");
        }
        host.default_input_device().ok_or(DeviceError::NoInputDevice)
    }

    fn output(&self) -> Result<cpal::Device, DeviceError> {
        let host = cpal::default_host();
        if let Some(name) = &self.output_device {
            if let Some(device) = host
                .output_devices()?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
            {
                return Ok(device);
            }
            log::warn!("playback: output device {name:?} not found, using default");
        }
        host.default_output_device().ok_or(DeviceError::NoOutputDevice)
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn open_input(&self, format: PcmFormat) -> Result<Box<dyn InputStream>, DeviceError> {
        let device = self.input()?;
        log::info!(
            "capture: opening {:?}",
            device.name().unwrap_or_else(|_| "<unknown>".into())
        );
        Ok(Box::new(CpalInput::open(&device, format, self.read_timeout)?))
    }

    fn open_output(&self, source: PlaybackSource) -> Result<Box<dyn OutputStream>, DeviceError> {
        let device = self.output()?;
        log::info!(
            "playback: opening {:?}",
            device.name().unwrap_or_else(|_| "<unknown>".into())
        );
        Ok(Box::new(CpalOutput::open(&device, source)?))
    }
}

// ---------------------------------------------------------------------------
// MockBackend  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) use mock::{MockBackend, OpenedOutput};


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
