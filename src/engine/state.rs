//! Engine state machine and the observable streams published to the UI.
//!
//! [`RecordingState`] drives the recorder's state machine. Everything a UI
//! needs to render is published through [`EngineEvents`]: one
//! `tokio::sync::watch` channel per stream, so every subscriber always sees
//! the latest value and a slow reader never blocks the audio workers.
//!
//! Publishing (`send_replace`, `send_modify`) works from plain threads; only
//! *waiting* on a receiver (`changed().await`) needs an async context.

use tokio::sync::watch;

// ---------------------------------------------------------------------------
// RecordingState
// ---------------------------------------------------------------------------

/// States of the recorder engine.
///
/// ```text
/// Idle ──start_or_resume──▶ Recording ──pause──▶ Paused
/// Paused ──start_or_resume──▶ Recording
/// Paused ──play──▶ Playback ──pause / end of audio──▶ Paused
/// Playback ──end of audio, repeat on──▶ Playback (from 0)
/// any state ──finalize──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RecordingState {
    /// Nothing recorded or loaded.
    #[default]
    Idle,
    /// The capture worker is appending to the session buffer.
    Recording,
    /// A buffer exists; neither worker is running.
    Paused,
    /// The playback worker is playing the buffer.
    Playback,
}

impl RecordingState {
    /// A short human-readable label suitable for a status line.
    ///
    /// ```
    /// use voice_recorder::engine::RecordingState;
    ///
    /// assert_eq!(RecordingState::Idle.label(), "Idle");
    /// assert_eq!(RecordingState::Playback.label(), "Playing");
    /// ```
    pub fn label(&self) -> &'static str {
        match self {
            RecordingState::Idle => "Idle",
            RecordingState::Recording => "Recording",
            RecordingState::Paused => "Paused",
            RecordingState::Playback => "Playing",
        }
    }

    /// `true` while a worker thread is running.
    pub fn is_active(&self) -> bool {
        matches!(self, RecordingState::Recording | RecordingState::Playback)
    }
}

// ---------------------------------------------------------------------------
// Published values
// ---------------------------------------------------------------------------

/// Playback position, both in milliseconds and as an envelope bar index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackCursor {
    pub position_ms: u64,
    pub envelope_index: usize,
}

/// User-adjustable playback settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSettings {
    /// Speed multiplier; `1.0` is normal speed.
    pub speed: f32,
    /// Restart from the beginning when playback reaches the end.
    pub repeat: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            repeat: false,
        }
    }
}

/// Full waveform snapshot, published on start, load, play, seek, pause
/// after recording, and finalize.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformData {
    pub amplitudes: Vec<f32>,
    pub max_amplitude: f32,
    /// Envelope index of the playback cursor.
    pub current_position: usize,
}

/// Incremental waveform growth during capture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformUpdate {
    /// Bars appended since the previous update.
    pub new_amplitudes: Vec<f32>,
    pub max_amplitude: f32,
    /// Envelope length after appending `new_amplitudes`.
    pub total_len: usize,
}

// ---------------------------------------------------------------------------
// Cursor math
// ---------------------------------------------------------------------------

/// Envelope index for a playback position:
/// `round(position / total * (len - 1))`, clamped to `[0, len - 1]`.
pub fn envelope_index_for(position_ms: u64, total_ms: u64, envelope_len: usize) -> usize {
    if envelope_len <= 1 || total_ms == 0 {
        return 0;
    }
    let last = envelope_len - 1;
    let index = (position_ms as f64 / total_ms as f64 * last as f64).round();
    (index.max(0.0) as usize).min(last)
}

/// Playback position for an envelope index:
/// `index / (len - 1) * total`. Index 0 and single-bar envelopes map to 0.
pub fn position_for_index(index: usize, total_ms: u64, envelope_len: usize) -> u64 {
    if envelope_len <= 1 || total_ms == 0 {
        return 0;
    }
    let last = envelope_len - 1;
    (index.min(last) as f64 / last as f64 * total_ms as f64) as u64
}

// ---------------------------------------------------------------------------
// EngineEvents
// ---------------------------------------------------------------------------

/// Latest-value streams published by the engine.
///
/// ```rust
/// use voice_recorder::engine::{EngineEvents, RecordingState};
///
/// let events = EngineEvents::new();
/// let rx = events.subscribe_state();
/// assert_eq!(*rx.borrow(), RecordingState::Idle);
/// ```
#[derive(Debug)]
pub struct EngineEvents {
    state: watch::Sender<RecordingState>,
    timestamp: watch::Sender<u64>,
    waveform: watch::Sender<WaveformData>,
    waveform_update: watch::Sender<WaveformUpdate>,
    cursor: watch::Sender<PlaybackCursor>,
    settings: watch::Sender<PlaybackSettings>,
}

impl EngineEvents {
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(RecordingState::Idle),
            timestamp: watch::Sender::new(0),
            waveform: watch::Sender::new(WaveformData::default()),
            waveform_update: watch::Sender::new(WaveformUpdate::default()),
            cursor: watch::Sender::new(PlaybackCursor::default()),
            settings: watch::Sender::new(PlaybackSettings::default()),
        }
    }

    // ---- Subscriptions ----

    pub fn subscribe_state(&self) -> watch::Receiver<RecordingState> {
        self.state.subscribe()
    }

    /// Milliseconds recorded (while capturing) or played (during playback).
    pub fn subscribe_timestamp(&self) -> watch::Receiver<u64> {
        self.timestamp.subscribe()
    }

    pub fn subscribe_waveform(&self) -> watch::Receiver<WaveformData> {
        self.waveform.subscribe()
    }

    pub fn subscribe_waveform_updates(&self) -> watch::Receiver<WaveformUpdate> {
        self.waveform_update.subscribe()
    }

    pub fn subscribe_cursor(&self) -> watch::Receiver<PlaybackCursor> {
        self.cursor.subscribe()
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<PlaybackSettings> {
        self.settings.subscribe()
    }

    // ---- Current values ----

    pub fn state(&self) -> RecordingState {
        *self.state.borrow()
    }

    pub fn timestamp_ms(&self) -> u64 {
        *self.timestamp.borrow()
    }

    pub fn waveform(&self) -> WaveformData {
        self.waveform.borrow().clone()
    }

    pub fn cursor(&self) -> PlaybackCursor {
        *self.cursor.borrow()
    }

    pub fn settings(&self) -> PlaybackSettings {
        *self.settings.borrow()
    }

    // ---- Publishing (engine only) ----

    pub(crate) fn set_state(&self, state: RecordingState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            log::debug!("engine: {previous:?} -> {state:?}");
        }
    }

    /// Move to `to` only if the current state is `from`. Returns whether the
    /// transition happened.
    pub(crate) fn transition(&self, from: RecordingState, to: RecordingState) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            log::debug!("engine: {from:?} -> {to:?}");
        }
        moved
    }

    pub(crate) fn publish_timestamp(&self, ms: u64) {
        self.timestamp.send_replace(ms);
    }

    pub(crate) fn publish_waveform(&self, waveform: WaveformData) {
        self.waveform.send_replace(waveform);
    }

    pub(crate) fn publish_waveform_position(&self, index: usize) {
        self.waveform.send_modify(|w| w.current_position = index);
    }

    pub(crate) fn publish_waveform_update(&self, update: WaveformUpdate) {
        self.waveform_update.send_replace(update);
    }

    pub(crate) fn publish_cursor(&self, cursor: PlaybackCursor) {
        self.cursor.send_replace(cursor);
    }

    pub(crate) fn update_settings(&self, f: impl FnOnce(&mut PlaybackSettings)) -> PlaybackSettings {
        self.settings.send_modify(f);
        self.settings()
    }
}

impl Default for EngineEvents {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
