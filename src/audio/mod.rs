//! Audio plumbing: PCM formats, the WAV container, envelope extraction and
//! the device seam.
//!
//! # Data flow
//!
//! ```text
//! Microphone → cpal callback → downmix → StreamResampler → pcm16 (mpsc)
//!           → InputStream::read → PcmBuffer → waveform::extract_amplitudes
//!
//! PcmBuffer snapshot → PlaybackSource → SourceReader (speed, rate) → Speaker
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voice_recorder::audio::{AudioBackend, CpalBackend, PcmFormat};
//!
//! let backend = CpalBackend::new();
//! let mut input = backend.open_input(PcmFormat::DEFAULT).unwrap();
//! let mut chunk = vec![0u8; PcmFormat::DEFAULT.bytes_for_ms(10)];
//! loop {
//!     let n = input.read(&mut chunk).unwrap();
//!     println!("captured {n} bytes");
//! }
//! ```

pub mod buffer;
pub mod capture;
pub mod device;
pub mod format;
pub mod output;
pub mod resample;
pub mod wav;
pub mod waveform;

pub use buffer::PcmBuffer;
pub use device::{
    AudioBackend, CpalBackend, DeviceError, InputStream, OutputStream, PlaybackSource,
    SpeedControl,
};
pub use format::PcmFormat;
pub use wav::{ParsedAudioData, WavError};
