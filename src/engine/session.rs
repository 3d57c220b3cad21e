//! Session data shared between the engine and its worker threads.
//!
//! All mutable session data lives in one [`Session`] behind one mutex, so a
//! worker's "am I still current?" check and its write happen atomically.
//! Every worker is started with the session *epoch* current at spawn time;
//! stopping a worker bumps the epoch, after which its handle's writes are
//! silently rejected even if the thread has not noticed yet.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::state::{
    envelope_index_for, EngineEvents, PlaybackCursor, RecordingState, WaveformData,
    WaveformUpdate,
};
use crate::audio::waveform::extract_amplitudes;
use crate::audio::{PcmBuffer, PcmFormat, SpeedControl};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct Session {
    pub buffer: PcmBuffer,
    pub envelope: Vec<f32>,
    pub max_amplitude: f32,
    /// Paused playback position.
    pub cursor_ms: u64,
    /// Buffer length at the last emitted waveform bar.
    pub last_waveform_bytes: usize,
    pub epoch: u64,
}

impl Session {
    /// Clear all audio data and adopt `format` for the next capture.
    pub fn reset(&mut self, format: PcmFormat) {
        self.buffer.reset(format);
        self.envelope.clear();
        self.max_amplitude = 0.0;
        self.cursor_ms = 0;
        self.last_waveform_bytes = 0;
    }

    pub fn waveform(&self, current_position: usize) -> WaveformData {
        WaveformData {
            amplitudes: self.envelope.clone(),
            max_amplitude: self.max_amplitude,
            current_position,
        }
    }

    /// Envelope index matching `cursor_ms`.
    pub fn cursor_index(&self) -> usize {
        envelope_index_for(self.cursor_ms, self.buffer.duration_ms(), self.envelope.len())
    }
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct Shared {
    session: Mutex<Session>,
    pub events: EngineEvents,
    pub speed: SpeedControl,
}

impl Shared {
    pub fn new(format: PcmFormat) -> Self {
        Self {
            session: Mutex::new(Session {
                buffer: PcmBuffer::new(format),
                ..Session::default()
            }),
            events: EngineEvents::new(),
            speed: SpeedControl::default(),
        }
    }

    /// Lock the session. A worker that panicked while holding the lock leaves
    /// the data in a usable state (every write is a single append or store),
    /// so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invalidate every outstanding worker handle and return the new epoch.
    pub fn next_epoch(&self) -> u64 {
        let mut session = self.lock();
        session.epoch += 1;
        session.epoch
    }

    pub fn state(&self) -> RecordingState {
        self.events.state()
    }
}

// ---------------------------------------------------------------------------
// CaptureHandle
// ---------------------------------------------------------------------------

/// The capture worker's view of the session.
pub(crate) struct CaptureHandle {
    shared: Arc<Shared>,
    epoch: u64,
    /// Bytes of new audio per waveform bar.
    resolution_bytes: usize,
}

impl CaptureHandle {
    pub fn new(shared: Arc<Shared>, epoch: u64, resolution_bytes: usize) -> Self {
        Self {
            shared,
            epoch,
            resolution_bytes: resolution_bytes.max(2),
        }
    }

    pub fn format(&self) -> PcmFormat {
        self.shared.lock().buffer.format()
    }

    pub fn is_active(&self) -> bool {
        self.shared.state() == RecordingState::Recording && self.shared.lock().epoch == self.epoch
    }

    /// Append captured bytes, emitting one waveform bar per full resolution
    /// slice accumulated since the last bar. Returns `false` if this worker
    /// has been superseded.
    pub fn append(&self, bytes: &[u8]) -> bool {
        let (timestamp_ms, update) = {
            let mut session = self.shared.lock();
            if session.epoch != self.epoch {
                return false;
            }
            session.buffer.push_slice(bytes);

            let total = session.buffer.len();
            let mut new_amplitudes = Vec::new();
            while total - session.last_waveform_bytes >= self.resolution_bytes {
                let start = session.last_waveform_bytes;
                let end = start + self.resolution_bytes;
                let bar = extract_amplitudes(&session.buffer.as_slice()[start..end], 1)[0];
                session.envelope.push(bar);
                session.max_amplitude = session.max_amplitude.max(bar);
                session.last_waveform_bytes = end;
                new_amplitudes.push(bar);
            }

            let update = if new_amplitudes.is_empty() {
                None
            } else {
                Some(WaveformUpdate {
                    new_amplitudes,
                    max_amplitude: session.max_amplitude,
                    total_len: session.envelope.len(),
                })
            };

            (session.buffer.duration_ms(), update)
        };

        let events = &self.shared.events;
        events.publish_timestamp(timestamp_ms);
        if let Some(update) = update {
            events.publish_waveform_update(update);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// PlaybackHandle
// ---------------------------------------------------------------------------

/// How a completed playback pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Finish {
    /// Repeat is on; play again from the start.
    Repeat,
    /// Stopped at the end, or this worker was superseded.
    Stopped,
}

/// The playback worker's view of the session: an immutable snapshot of the
/// audio plus write access to the cursor.
pub(crate) struct PlaybackHandle {
    shared: Arc<Shared>,
    epoch: u64,
    pcm: Arc<[u8]>,
    format: PcmFormat,
    total_ms: u64,
    envelope_len: usize,
}

impl PlaybackHandle {
    pub fn new(
        shared: Arc<Shared>,
        epoch: u64,
        pcm: Arc<[u8]>,
        format: PcmFormat,
        envelope_len: usize,
    ) -> Self {
        Self {
            total_ms: format.duration_ms(pcm.len()),
            shared,
            epoch,
            pcm,
            format,
            envelope_len,
        }
    }

    pub fn pcm(&self) -> Arc<[u8]> {
        Arc::clone(&self.pcm)
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn speed(&self) -> SpeedControl {
        self.shared.speed.clone()
    }

    pub fn is_active(&self) -> bool {
        self.shared.state() == RecordingState::Playback && self.shared.lock().epoch == self.epoch
    }

    /// Cursor to start the next pass from, or `None` if superseded.
    pub fn start_ms(&self) -> Option<u64> {
        let session = self.shared.lock();
        (session.epoch == self.epoch).then_some(session.cursor_ms)
    }

    /// Store and publish a new playback position.
    pub fn advance(&self, position_ms: u64) -> bool {
        {
            let mut session = self.shared.lock();
            if session.epoch != self.epoch {
                return false;
            }
            session.cursor_ms = position_ms;
        }
        self.publish_cursor(position_ms);
        true
    }

    /// Handle reaching the end of the audio.
    pub fn finish(&self) -> Finish {
        {
            let mut session = self.shared.lock();
            if session.epoch != self.epoch {
                return Finish::Stopped;
            }
            session.cursor_ms = 0;
        }

        if self.shared.events.settings().repeat {
            self.publish_cursor(0);
            return Finish::Repeat;
        }

        if self
            .shared
            .events
            .transition(RecordingState::Playback, RecordingState::Paused)
        {
            self.publish_cursor(0);
        }
        Finish::Stopped
    }

    /// Give up after a device failure, keeping the cursor where it is.
    pub fn abort(&self) {
        let current = self.shared.lock().epoch == self.epoch;
        if current {
            self.shared
                .events
                .transition(RecordingState::Playback, RecordingState::Paused);
        }
    }

    fn publish_cursor(&self, position_ms: u64) {
        let events = &self.shared.events;
        let envelope_index = envelope_index_for(position_ms, self.total_ms, self.envelope_len);
        events.publish_timestamp(position_ms);
        events.publish_cursor(PlaybackCursor {
            position_ms,
            envelope_index,
        });
        events.publish_waveform_position(envelope_index);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
