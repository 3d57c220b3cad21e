//! Voice recorder: capture, playback and storage of mono PCM recordings.
//!
//! * [`audio`]: PCM formats, the WAV container, amplitude envelopes and the
//!   `cpal` device seam.
//! * [`engine`]: [`RecorderEngine`], the Idle / Recording / Paused /
//!   Playback state machine and its observable streams.
//! * [`storage`]: the recordings directory, name validation and display
//!   formatting.
//! * [`config`]: `settings.toml` and platform paths.

pub mod audio;
pub mod config;
pub mod engine;
pub mod storage;

pub use engine::{EngineError, RecorderEngine, RecordingState};
