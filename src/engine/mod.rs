//! Recorder engine: a four-state machine over one PCM session buffer.
//!
//! # Architecture
//!
//! ```text
//! RecorderEngine (control, &mut self)
//!        │
//!        ├─ start_or_resume ─▶ capture worker ── InputStream::read ─┐
//!        │                                                         ▼
//!        │                               Shared { Mutex<Session>, EngineEvents }
//!        │                                                         ▲
//!        └─ play / seek ─────▶ playback worker ── cursor ticks ────┘
//!                                   │
//!                                   └─ OutputStream (device callback thread)
//!
//! EngineEvents (tokio::sync::watch) ───▶ UI / CLI subscribers
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_recorder::audio::CpalBackend;
//! use voice_recorder::config::AudioConfig;
//! use voice_recorder::engine::{RecorderEngine, RecordingState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AudioConfig::default();
//!     let mut engine = RecorderEngine::new(config.clone(), Arc::new(CpalBackend::from_config(&config)));
//!     let mut timestamps = engine.subscribe_timestamp();
//!
//!     engine.start_or_resume().unwrap();
//!     while *timestamps.borrow_and_update() < 3_000 {
//!         timestamps.changed().await.unwrap();
//!     }
//!     let pcm = engine.finalize();
//!     assert_eq!(engine.state(), RecordingState::Idle);
//!     println!("{} bytes", pcm.len());
//! }
//! ```

mod capture;
mod playback;
pub mod recorder;
mod session;
pub mod state;
mod worker;

pub use recorder::{EngineError, RecorderEngine};
pub use state::{
    envelope_index_for, position_for_index, EngineEvents, PlaybackCursor, PlaybackSettings,
    RecordingState, WaveformData, WaveformUpdate,
};
