//! The recorder engine: state machine, worker lifecycle and session data.
//!
//! [`RecorderEngine`] owns one growable PCM buffer per session plus the
//! amplitude envelope derived from it. Two workers share that data:
//!
//! * the **capture** worker appends to the buffer while `Recording`;
//! * the **playback** worker plays a snapshot of it while `Playback`.
//!
//! At most one worker runs at a time. Every transition stops the running
//! worker (bounded by `worker_join_timeout_ms`) before the next one starts.
//!
//! Control methods take `&mut self`; callers serialise them. Observers use
//! the `subscribe_*` receivers, which can be read from any thread.

use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::session::{CaptureHandle, PlaybackHandle, Shared};
use super::state::{
    position_for_index, EngineEvents, PlaybackCursor, PlaybackSettings, RecordingState,
    WaveformData, WaveformUpdate,
};
use super::worker::Worker;
use super::{capture, playback};
use crate::audio::output::is_playable;
use crate::audio::waveform;
use crate::audio::{AudioBackend, DeviceError, ParsedAudioData, PcmFormat};
use crate::config::AudioConfig;
use crate::storage::{self, StorageError};

/// Upper bound on how long a worker may take to open its device.
const DEVICE_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors returned by [`RecorderEngine`] control methods.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no audio data to load")]
    EmptyInput,

    #[error("playback speed must be a positive finite number, got {0}")]
    InvalidSpeed(f32),

    #[error("cannot record {capture:?} onto a buffer holding {existing:?}")]
    FormatMismatch {
        existing: PcmFormat,
        capture: PcmFormat,
    },

    #[error("unsupported audio format {0:?}")]
    UnsupportedFormat(PcmFormat),

    #[error("audio device error: {0}")]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// RecorderEngine
// ---------------------------------------------------------------------------

/// Audio capture and playback engine.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_recorder::audio::CpalBackend;
/// use voice_recorder::config::AudioConfig;
/// use voice_recorder::engine::RecorderEngine;
///
/// let config = AudioConfig::default();
/// let backend = Arc::new(CpalBackend::from_config(&config));
/// let mut engine = RecorderEngine::new(config, backend);
///
/// engine.start_or_resume().unwrap();
/// std::thread::sleep(std::time::Duration::from_secs(2));
/// engine.pause();
/// engine.play().unwrap();
/// // ...
/// let pcm = engine.finalize();
/// println!("recorded {} bytes", pcm.len());
/// ```
pub struct RecorderEngine {
    shared: Arc<Shared>,
    backend: Arc<dyn AudioBackend>,
    config: AudioConfig,
    capture: Option<Worker>,
    playback: Option<Worker>,
}

impl RecorderEngine {
    pub fn new(config: AudioConfig, backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            shared: Arc::new(Shared::new(config.capture_format())),
            backend,
            config,
            capture: None,
            playback: None,
        }
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn events(&self) -> &EngineEvents {
        &self.shared.events
    }

    pub fn state(&self) -> RecordingState {
        self.shared.state()
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.shared.events.timestamp_ms()
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.shared.events.cursor()
    }

    pub fn settings(&self) -> PlaybackSettings {
        self.shared.events.settings()
    }

    /// Current envelope, including bars appended during capture.
    pub fn envelope(&self) -> Vec<f32> {
        self.shared.lock().envelope.clone()
    }

    pub fn max_amplitude(&self) -> f32 {
        self.shared.lock().max_amplitude
    }

    /// Bytes in the session buffer.
    pub fn buffer_len(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    pub fn duration_ms(&self) -> u64 {
        self.shared.lock().buffer.duration_ms()
    }

    /// Format of the session buffer: the capture format, or the loaded
    /// file's format.
    pub fn format(&self) -> PcmFormat {
        self.shared.lock().buffer.format()
    }

    pub fn subscribe_state(&self) -> tokio::sync::watch::Receiver<RecordingState> {
        self.shared.events.subscribe_state()
    }

    pub fn subscribe_timestamp(&self) -> tokio::sync::watch::Receiver<u64> {
        self.shared.events.subscribe_timestamp()
    }

    pub fn subscribe_waveform(&self) -> tokio::sync::watch::Receiver<WaveformData> {
        self.shared.events.subscribe_waveform()
    }

    pub fn subscribe_waveform_updates(&self) -> tokio::sync::watch::Receiver<WaveformUpdate> {
        self.shared.events.subscribe_waveform_updates()
    }

    pub fn subscribe_cursor(&self) -> tokio::sync::watch::Receiver<PlaybackCursor> {
        self.shared.events.subscribe_cursor()
    }

    pub fn subscribe_settings(&self) -> tokio::sync::watch::Receiver<PlaybackSettings> {
        self.shared.events.subscribe_settings()
    }

    // -----------------------------------------------------------------------
    // Capture
    // -----------------------------------------------------------------------

    /// Start a new recording (from `Idle`) or append to the current buffer
    /// (from `Paused`). No-op while already recording; stops playback first.
    ///
    /// # Errors
    ///
    /// [`EngineError::FormatMismatch`] when the buffer holds a loaded file
    /// whose format differs from the capture format, or
    /// [`EngineError::Device`] when the input device cannot be opened. On a
    /// device error the engine returns to the state it would otherwise be in
    /// (`Idle` for an empty buffer, `Paused` otherwise).
    pub fn start_or_resume(&mut self) -> Result<(), EngineError> {
        match self.state() {
            RecordingState::Recording => {
                log::debug!("engine: already recording");
                return Ok(());
            }
            RecordingState::Playback => self.pause(),
            RecordingState::Idle | RecordingState::Paused => {}
        }

        let fresh = self.state() == RecordingState::Idle;
        let capture_format = self.config.capture_format();
        {
            let mut session = self.shared.lock();
            if fresh {
                session.reset(capture_format);
            } else if !session.buffer.is_empty() && session.buffer.format() != capture_format {
                return Err(EngineError::FormatMismatch {
                    existing: session.buffer.format(),
                    capture: capture_format,
                });
            } else if session.buffer.is_empty() {
                session.buffer.reset(capture_format);
            }
            session.cursor_ms = 0;
        }

        let events = &self.shared.events;
        if fresh {
            events.publish_timestamp(0);
            events.publish_waveform(WaveformData::default());
            events.publish_waveform_update(WaveformUpdate::default());
        }
        events.publish_cursor(PlaybackCursor::default());

        self.join_workers();
        let epoch = self.shared.next_epoch();
        self.shared.events.set_state(RecordingState::Recording);

        let handle = CaptureHandle::new(
            Arc::clone(&self.shared),
            epoch,
            capture_format.bytes_for_ms(self.config.waveform_resolution_ms),
        );
        let backend = Arc::clone(&self.backend);
        let chunk_bytes = self.config.capture_chunk_bytes();
        let retry_delay = self.config.capture_chunk();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let spawned = Worker::spawn("capture", move || {
            capture::run(handle, backend.as_ref(), chunk_bytes, retry_delay, ready_tx)
        });
        self.capture = Some(self.started(spawned)?);

        if let Err(e) = wait_ready(ready_rx) {
            self.abort_start();
            return Err(e.into());
        }
        log::info!(
            "engine: recording {} at {} bytes",
            if fresh { "started" } else { "resumed" },
            self.buffer_len()
        );
        Ok(())
    }

    /// Stop capture or playback, keeping the buffer and cursor.
    /// No-op in `Idle` and `Paused`.
    pub fn pause(&mut self) {
        match self.state() {
            RecordingState::Recording => {
                self.shared.events.set_state(RecordingState::Paused);
                self.stop_workers();
                let waveform = {
                    let session = self.shared.lock();
                    session.waveform(session.cursor_index())
                };
                self.shared.events.publish_waveform(waveform);
                log::info!("engine: recording paused at {} ms", self.duration_ms());
            }
            RecordingState::Playback => {
                self.shared.events.set_state(RecordingState::Paused);
                self.stop_workers();
                log::info!("engine: playback paused at {} ms", self.shared.lock().cursor_ms);
            }
            other => log::debug!("engine: pause ignored in {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Playback
    // -----------------------------------------------------------------------

    /// Play the buffer from the paused cursor. Stops recording first. No-op
    /// in `Idle`, in `Playback`, or when the buffer holds less than one
    /// frame.
    ///
    /// # Errors
    ///
    /// [`EngineError::Device`] when the output device cannot be opened; the
    /// engine stays `Paused` with the cursor unchanged.
    pub fn play(&mut self) -> Result<(), EngineError> {
        if self.state() == RecordingState::Recording {
            self.pause();
        }
        if self.state() != RecordingState::Paused {
            log::debug!("engine: play ignored in {:?}", self.state());
            return Ok(());
        }

        let (pcm, format, waveform) = {
            let mut session = self.shared.lock();
            let format = session.buffer.format();
            if format.align_down(session.buffer.len()) == 0 {
                log::info!("engine: nothing to play");
                return Ok(());
            }
            if session.envelope.is_empty() {
                // Capture shorter than one bar: fall back to a bulk envelope.
                session.envelope = waveform::envelope(
                    session.buffer.as_slice(),
                    format,
                    self.config.waveform_resolution_ms,
                );
                session.max_amplitude = waveform::peak(&session.envelope);
            }
            let waveform = session.waveform(session.cursor_index());
            (session.buffer.snapshot(), format, waveform)
        };
        if !is_playable(format) {
            return Err(EngineError::UnsupportedFormat(format));
        }

        let envelope_len = waveform.amplitudes.len();
        self.shared.events.publish_waveform(waveform);

        self.join_workers();
        let epoch = self.shared.next_epoch();
        self.shared.events.set_state(RecordingState::Playback);

        let handle = PlaybackHandle::new(Arc::clone(&self.shared), epoch, pcm, format, envelope_len);
        let backend = Arc::clone(&self.backend);
        let tick = self.config.playback_tick();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let spawned = Worker::spawn("playback", move || {
            playback::run(handle, backend.as_ref(), tick, ready_tx)
        });
        self.playback = Some(self.started(spawned)?);

        if let Err(e) = wait_ready(ready_rx) {
            self.abort_start();
            return Err(e.into());
        }
        log::info!("engine: playback started at {} ms", self.shared.lock().cursor_ms);
        Ok(())
    }

    /// Move the cursor to envelope bar `index` (clamped to the envelope).
    /// Restarts playback from the new position when playing. No-op in
    /// `Idle` and `Recording`, or with an empty envelope.
    pub fn seek(&mut self, index: usize) -> Result<(), EngineError> {
        let was_playing = match self.state() {
            RecordingState::Playback => true,
            RecordingState::Paused => false,
            other => {
                log::debug!("engine: seek ignored in {other:?}");
                return Ok(());
            }
        };
        if was_playing {
            self.pause();
        }

        let cursor = {
            let mut session = self.shared.lock();
            let len = session.envelope.len();
            if len == 0 {
                return Ok(());
            }
            let envelope_index = index.min(len - 1);
            let position_ms = position_for_index(envelope_index, session.buffer.duration_ms(), len);
            session.cursor_ms = position_ms;
            PlaybackCursor {
                position_ms,
                envelope_index,
            }
        };

        let events = &self.shared.events;
        events.publish_timestamp(cursor.position_ms);
        events.publish_cursor(cursor);
        events.publish_waveform_position(cursor.envelope_index);
        log::debug!(
            "engine: seek to bar {} ({} ms)",
            cursor.envelope_index,
            cursor.position_ms
        );

        if was_playing {
            self.play()?;
        }
        Ok(())
    }

    /// Set the playback speed multiplier. Applies immediately to a running
    /// playback.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidSpeed`] for zero, negative or non-finite values.
    pub fn set_speed(&mut self, speed: f32) -> Result<(), EngineError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(EngineError::InvalidSpeed(speed));
        }
        self.shared.speed.set(speed);
        self.shared.events.update_settings(|s| s.speed = speed);
        log::debug!("engine: speed set to {speed}");

        if self.state() == RecordingState::Playback && !self.backend.supports_live_speed() {
            self.pause();
            self.play()?;
        }
        Ok(())
    }

    /// Flip the repeat flag and return its new value.
    pub fn toggle_repeat(&mut self) -> bool {
        let settings = self.shared.events.update_settings(|s| s.repeat = !s.repeat);
        log::debug!("engine: repeat {}", if settings.repeat { "on" } else { "off" });
        settings.repeat
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// End the session: stop any worker, drain the buffer and reset
    /// everything to `Idle`. Speed resets to 1.0; repeat is kept.
    ///
    /// Returns the drained PCM bytes, empty when there was nothing to save.
    pub fn finalize(&mut self) -> Vec<u8> {
        self.shared.events.set_state(RecordingState::Idle);
        self.stop_workers();

        let data = {
            let mut session = self.shared.lock();
            let data = session.buffer.drain();
            session.reset(self.config.capture_format());
            data
        };
        self.publish_reset();
        log::info!("engine: finalized session, drained {} bytes", data.len());
        data
    }

    /// [`finalize`](Self::finalize), handing the drained bytes to
    /// `on_drained` only when there are any.
    pub fn finalize_with<F>(&mut self, on_drained: F)
    where
        F: FnOnce(Vec<u8>),
    {
        let data = self.finalize();
        if !data.is_empty() {
            on_drained(data);
        }
    }

    /// Replace the session with decoded file data and enter `Paused`, ready
    /// for playback from the start.
    ///
    /// # Errors
    ///
    /// [`EngineError::EmptyInput`] for an empty payload and
    /// [`EngineError::UnsupportedFormat`] for a layout the player cannot
    /// read. Either leaves the engine `Idle` with an empty envelope.
    pub fn load_for_playback(&mut self, data: ParsedAudioData) -> Result<(), EngineError> {
        self.shared.events.set_state(RecordingState::Idle);
        self.stop_workers();

        let format = data.format();
        let rejected = if data.payload.is_empty() {
            Some(EngineError::EmptyInput)
        } else if !is_playable(format) {
            Some(EngineError::UnsupportedFormat(format))
        } else {
            None
        };
        if let Some(err) = rejected {
            self.shared.lock().reset(self.config.capture_format());
            self.publish_reset();
            return Err(err);
        }

        let envelope =
            waveform::envelope(&data.payload, format, self.config.waveform_resolution_ms);
        let max_amplitude = waveform::peak(&envelope);
        let len = data.payload.len();
        let waveform = {
            let mut session = self.shared.lock();
            session.reset(format);
            session.buffer.replace(data.payload, format);
            session.envelope = envelope;
            session.max_amplitude = max_amplitude;
            session.last_waveform_bytes = len;
            session.waveform(0)
        };

        self.publish_reset();
        self.shared.events.publish_waveform(waveform);
        self.shared.events.set_state(RecordingState::Paused);
        log::info!(
            "engine: loaded {len} bytes ({:?}, header {})",
            format,
            if data.has_valid_header { "valid" } else { "missing" }
        );
        Ok(())
    }

    /// Read and decode `path`, then [`load_for_playback`](Self::load_for_playback).
    ///
    /// A missing, empty or unreadable file leaves the engine `Idle` with an
    /// empty envelope.
    pub fn load_file(&mut self, path: &Path) -> Result<(), EngineError> {
        match storage::read_recording(path) {
            Ok(data) => self.load_for_playback(data),
            Err(e) => {
                log::warn!("engine: cannot load {}: {e}", path.display());
                self.finalize();
                Err(e.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn started(&mut self, spawned: std::io::Result<Worker>) -> Result<Worker, EngineError> {
        spawned.map_err(|e| {
            log::error!("engine: failed to spawn worker: {e}");
            self.abort_start();
            EngineError::Spawn(e)
        })
    }

    /// Undo a transition whose worker failed to start.
    fn abort_start(&mut self) {
        self.shared.next_epoch();
        self.join_workers();
        let fallback = if self.shared.lock().buffer.is_empty() {
            RecordingState::Idle
        } else {
            RecordingState::Paused
        };
        self.shared.events.set_state(fallback);
    }

    /// Invalidate the running worker and wait for it to exit.
    fn stop_workers(&mut self) {
        self.shared.next_epoch();
        self.join_workers();
    }

    fn join_workers(&mut self) {
        let timeout = self.config.worker_join_timeout();
        for worker in [self.capture.take(), self.playback.take()].into_iter().flatten() {
            worker.join_within(timeout);
        }
    }

    fn publish_reset(&self) {
        self.shared.speed.set(1.0);
        let events = &self.shared.events;
        events.publish_timestamp(0);
        events.publish_waveform(WaveformData::default());
        events.publish_waveform_update(WaveformUpdate::default());
        events.publish_cursor(PlaybackCursor::default());
        events.update_settings(|s| s.speed = 1.0);
    }
}

impl Drop for RecorderEngine {
    fn drop(&mut self) {
        self.shared.events.set_state(RecordingState::Idle);
        self.stop_workers();
    }
}

fn wait_ready(ready: Receiver<Result<(), DeviceError>>) -> Result<(), DeviceError> {
    match ready.recv_timeout(DEVICE_OPEN_TIMEOUT) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(DeviceError::OpenTimeout(DEVICE_OPEN_TIMEOUT)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(DeviceError::Disconnected),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::audio::device::MockBackend;
    use crate::audio::wav;

    fn tone(ms: u64, amplitude: i16) -> Vec<u8> {
        let samples = PcmFormat::DEFAULT.bytes_for_ms(ms) / 2;
        std::iter::repeat(amplitude.to_le_bytes())
            .take(samples)
            .flatten()
            .collect()
    }

    fn config() -> AudioConfig {
        AudioConfig {
            worker_join_timeout_ms: 2_000,
            ..AudioConfig::default()
        }
    }

    fn engine(backend: &MockBackend) -> RecorderEngine {
        engine_with(backend, config())
    }

    fn engine_with(backend: &MockBackend, config: AudioConfig) -> RecorderEngine {
        RecorderEngine::new(config, Arc::new(backend.clone()))
    }

    fn wait_until(what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn loaded(ms: u64) -> ParsedAudioData {
        wav::decode(&wav::encode(&tone(ms, 1_000), PcmFormat::DEFAULT).unwrap()).unwrap()
    }

    // ---- Capture ---

    #[test]
    fn one_second_of_capture_yields_twenty_bars() {
        let backend = MockBackend::with_signal(tone(1_000, 2_000));
        let mut engine = engine(&backend);

        engine.start_or_resume().unwrap();
        assert_eq!(engine.state(), RecordingState::Recording);
        wait_until("1 s captured", || engine.buffer_len() == 88_200);
        engine.pause();

        assert_eq!(engine.state(), RecordingState::Paused);
        assert_eq!(engine.timestamp_ms(), 1_000);
        let bars = engine.envelope();
        assert!((19..=21).contains(&bars.len()), "got {} bars", bars.len());
        assert!(bars.iter().all(|&b| b == 2_000.0));
        assert_eq!(engine.events().waveform().amplitudes, bars);
    }

    #[test]
    fn waveform_updates_track_envelope_growth() {
        let backend = MockBackend::with_signal(tone(500, 700));
        let mut engine = engine(&backend);
        let updates = engine.subscribe_waveform_updates();

        engine.start_or_resume().unwrap();
        wait_until("0.5 s captured", || engine.buffer_len() == 44_100);
        engine.pause();

        let last = updates.borrow().clone();
        assert_eq!(last.total_len, engine.envelope().len());
        assert_eq!(last.max_amplitude, 700.0);
    }

    #[test]
    fn resume_appends_to_the_same_buffer() {
        let backend = MockBackend::with_signal(tone(1_000, 500));
        let mut engine = engine(&backend);

        engine.start_or_resume().unwrap();
        wait_until("first take", || engine.buffer_len() == 88_200);
        engine.pause();

        backend.push_signal(&tone(500, 500));
        engine.start_or_resume().unwrap();
        wait_until("second take", || engine.buffer_len() == 132_300);
        engine.pause();

        assert_eq!(engine.timestamp_ms(), 1_500);
        assert_eq!(engine.envelope().len(), 30);
    }

    #[test]
    fn start_while_recording_is_a_no_op() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        engine.start_or_resume().unwrap();
        engine.start_or_resume().unwrap();
        assert_eq!(engine.state(), RecordingState::Recording);
        engine.pause();
    }

    #[test]
    fn read_errors_do_not_stop_capture() {
        let backend = MockBackend::with_signal(tone(100, 100));
        backend.fail_reads(3);
        let mut engine = engine(&backend);

        engine.start_or_resume().unwrap();
        wait_until("capture after errors", || engine.buffer_len() == 8_820);
        assert_eq!(engine.state(), RecordingState::Recording);
        engine.pause();
    }

    #[test]
    fn input_failure_returns_to_idle() {
        let backend = MockBackend::new();
        backend.fail_input_open(true);
        let mut engine = engine(&backend);

        let err = engine.start_or_resume().unwrap_err();
        assert!(matches!(err, EngineError::Device(DeviceError::NoInputDevice)));
        assert_eq!(engine.state(), RecordingState::Idle);
    }

    #[test]
    fn pause_and_play_in_idle_are_no_ops() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        engine.pause();
        engine.play().unwrap();
        engine.seek(3).unwrap();
        assert_eq!(engine.state(), RecordingState::Idle);
        assert!(backend.opened_outputs().is_empty());
    }

    // ---- Playback ---

    #[test]
    fn playback_runs_to_end_and_rewinds() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        engine.load_for_playback(loaded(100)).unwrap();
        assert_eq!(engine.state(), RecordingState::Paused);

        engine.play().unwrap();
        wait_until("natural end", || engine.state() == RecordingState::Paused);

        assert_eq!(engine.cursor(), PlaybackCursor::default());
        assert_eq!(backend.opened_outputs().len(), 1);
        assert_eq!(backend.opened_outputs()[0].start_offset, 0);
    }

    #[test]
    fn repeat_restarts_without_leaving_playback() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        engine.load_for_playback(loaded(50)).unwrap();
        assert!(engine.toggle_repeat());

        engine.play().unwrap();
        wait_until("second pass", || backend.opened_outputs().len() >= 2);
        assert_eq!(engine.state(), RecordingState::Playback);
        assert!(backend.opened_outputs().iter().all(|o| o.start_offset == 0));

        engine.pause();
        assert_eq!(engine.state(), RecordingState::Paused);
    }

    #[test]
    fn seek_while_paused_moves_cursor() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        engine.load_for_playback(loaded(10_000)).unwrap();
        assert_eq!(engine.envelope().len(), 200);

        engine.seek(100).unwrap();
        assert_eq!(
            engine.cursor(),
            PlaybackCursor {
                position_ms: 5_025,
                envelope_index: 100
            }
        );
        assert_eq!(engine.timestamp_ms(), 5_025);
        assert_eq!(engine.events().waveform().current_position, 100);

        engine.seek(10_000).unwrap();
        assert_eq!(engine.cursor().envelope_index, 199);
        assert_eq!(engine.state(), RecordingState::Paused);
    }

    #[test]
    fn play_starts_from_seek_position() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        engine.load_for_playback(loaded(10_000)).unwrap();
        engine.seek(100).unwrap();

        engine.play().unwrap();
        engine.pause();

        let opened = backend.opened_outputs();
        assert_eq!(opened[0].start_offset, PcmFormat::DEFAULT.bytes_for_ms(5_025));
        assert!(engine.cursor().position_ms >= 5_025);
    }

    #[test]
    fn seek_during_playback_then_pause() {
        let backend = MockBackend::new();
        // Long tick so the restarted worker cannot advance before the pause.
        let mut engine = engine_with(
            &backend,
            AudioConfig {
                playback_tick_ms: 200,
                ..config()
            },
        );
        engine.load_for_playback(loaded(10_000)).unwrap();
        engine.seek(120).unwrap();
        engine.play().unwrap();

        engine.seek(0).unwrap();
        assert_eq!(engine.state(), RecordingState::Playback);
        engine.pause();

        assert_eq!(engine.state(), RecordingState::Paused);
        assert_eq!(engine.cursor().envelope_index, 0);
        assert_eq!(backend.opened_outputs().len(), 2);
    }

    #[test]
    fn speed_validation() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        for bad in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                engine.set_speed(bad),
                Err(EngineError::InvalidSpeed(_))
            ));
        }
        engine.set_speed(1.5).unwrap();
        assert_eq!(engine.settings().speed, 1.5);
    }

    #[test]
    fn speed_change_restarts_fixed_speed_output() {
        let backend = MockBackend::new().without_live_speed();
        let mut engine = engine(&backend);
        engine.load_for_playback(loaded(10_000)).unwrap();
        engine.play().unwrap();

        engine.set_speed(2.0).unwrap();
        assert_eq!(engine.state(), RecordingState::Playback);
        let opened = backend.opened_outputs();
        assert_eq!(opened.len(), 2);
        assert_eq!(opened[1].speed, 2.0);
        engine.pause();
    }

    #[test]
    fn output_open_failure_stays_paused() {
        let backend = MockBackend::new();
        backend.fail_output_open(true);
        let mut engine = engine(&backend);
        engine.load_for_playback(loaded(1_000)).unwrap();
        engine.seek(5).unwrap();
        let cursor = engine.cursor();

        let err = engine.play().unwrap_err();
        assert!(matches!(err, EngineError::Device(DeviceError::NoOutputDevice)));
        assert_eq!(engine.state(), RecordingState::Paused);
        assert_eq!(engine.cursor(), cursor);
    }

    #[test]
    fn stream_error_pauses_playback() {
        let backend = MockBackend::new();
        backend.break_output_streams(true);
        let mut engine = engine(&backend);
        engine.load_for_playback(loaded(10_000)).unwrap();

        engine.play().unwrap();
        wait_until("device failure", || engine.state() == RecordingState::Paused);
        assert_eq!(engine.buffer_len(), 882_000);
    }

    #[test]
    fn recording_during_playback_stops_playback() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        engine.load_for_playback(loaded(1_000)).unwrap();
        engine.play().unwrap();

        engine.start_or_resume().unwrap();
        assert_eq!(engine.state(), RecordingState::Recording);
        engine.pause();
        assert_eq!(engine.buffer_len(), 88_200);
    }

    // ---- Lifecycle ---

    #[test]
    fn finalize_twice_only_saves_once() {
        let backend = MockBackend::with_signal(tone(200, 300));
        let mut engine = engine(&backend);
        engine.start_or_resume().unwrap();
        wait_until("capture", || engine.buffer_len() == 17_640);

        let saved = Cell::new(0);
        engine.finalize_with(|data| {
            assert_eq!(data.len(), 17_640);
            saved.set(saved.get() + 1);
        });
        engine.finalize_with(|_| saved.set(saved.get() + 1));

        assert_eq!(saved.get(), 1);
        assert_eq!(engine.state(), RecordingState::Idle);
        assert!(engine.finalize().is_empty());
        assert!(engine.envelope().is_empty());
        assert_eq!(engine.timestamp_ms(), 0);
    }

    #[test]
    fn finalize_resets_speed_but_keeps_repeat() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        engine.set_speed(2.0).unwrap();
        engine.toggle_repeat();

        engine.finalize();
        assert_eq!(engine.settings().speed, 1.0);
        assert!(engine.settings().repeat);
    }

    #[test]
    fn finalize_during_playback_returns_buffer() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        engine.load_for_playback(loaded(10_000)).unwrap();
        engine.play().unwrap();

        let data = engine.finalize();
        assert_eq!(data.len(), 882_000);
        assert_eq!(engine.state(), RecordingState::Idle);
    }

    #[test]
    fn load_builds_bulk_envelope() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        engine.load_for_playback(loaded(1_000)).unwrap();

        let waveform = engine.events().waveform();
        assert_eq!(waveform.amplitudes.len(), 20);
        assert_eq!(waveform.max_amplitude, 1_000.0);
        assert_eq!(waveform.current_position, 0);
    }

    #[test]
    fn load_empty_payload_leaves_engine_idle() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        engine.load_for_playback(loaded(1_000)).unwrap();

        let mut empty = loaded(1_000);
        empty.payload.clear();
        assert!(matches!(
            engine.load_for_playback(empty),
            Err(EngineError::EmptyInput)
        ));
        assert_eq!(engine.state(), RecordingState::Idle);
        assert!(engine.envelope().is_empty());
        assert!(engine.events().waveform().amplitudes.is_empty());
    }

    #[test]
    fn load_missing_file_leaves_engine_idle() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        let dir = tempfile::tempdir().unwrap();

        let err = engine.load_file(&dir.path().join("nope.wav")).unwrap_err();
        assert!(matches!(err, EngineError::Storage(StorageError::NotFound(_))));
        assert_eq!(engine.state(), RecordingState::Idle);
        assert!(engine.envelope().is_empty());
    }

    #[test]
    fn load_file_uses_its_own_format() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let format = PcmFormat::new(22_050, 2, 16);
        std::fs::write(&path, wav::encode(&vec![0u8; 88_200], format).unwrap()).unwrap();

        engine.load_file(&path).unwrap();
        assert_eq!(engine.format(), format);
        assert_eq!(engine.duration_ms(), 1_000);
        assert_eq!(engine.envelope().len(), 20);

        let err = engine.start_or_resume().unwrap_err();
        assert!(matches!(err, EngineError::FormatMismatch { .. }));
        assert_eq!(engine.state(), RecordingState::Paused);
    }

    #[test]
    fn large_capture_chunks_keep_twenty_bars_per_second() {
        let backend = MockBackend::with_signal(tone(1_000, 900));
        let mut engine = engine_with(
            &backend,
            AudioConfig {
                capture_chunk_ms: 200,
                ..config()
            },
        );

        engine.start_or_resume().unwrap();
        wait_until("1 s captured", || engine.buffer_len() == 88_200);
        engine.pause();

        let live = engine.envelope();
        assert_eq!(live.len(), 20);

        let pcm = engine.finalize();
        engine
            .load_for_playback(wav::decode(&wav::encode(&pcm, PcmFormat::DEFAULT).unwrap()).unwrap())
            .unwrap();
        assert_eq!(engine.envelope(), live);
    }

    #[test]
    fn eight_bit_silent_file_has_flat_envelope() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiet.wav");
        let format = PcmFormat::new(8_000, 1, 8);
        std::fs::write(&path, wav::encode(&vec![0x80u8; 8_000], format).unwrap()).unwrap();

        engine.load_file(&path).unwrap();
        let envelope = engine.envelope();
        assert_eq!(envelope.len(), 20);
        assert!(envelope.iter().all(|&b| b == 0.0));
        assert_eq!(engine.max_amplitude(), 0.0);
    }

    #[test]
    fn overflowing_header_loads_as_raw_pcm() {
        let backend = MockBackend::new();
        let mut engine = engine(&backend);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.wav");
        let mut bytes = wav::encode(&vec![0u8; 88_156], PcmFormat::DEFAULT).unwrap();
        bytes[24..28].copy_from_slice(&2_000_000_000i32.to_le_bytes());
        bytes[34..36].copy_from_slice(&32i16.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        engine.load_file(&path).unwrap();
        assert_eq!(engine.state(), RecordingState::Paused);
        assert_eq!(engine.format(), PcmFormat::DEFAULT);
        assert_eq!(engine.duration_ms(), 1_000);
        assert_eq!(engine.envelope().len(), 20);
    }
}
