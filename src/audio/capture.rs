//! Microphone capture via `cpal`.
//!
//! [`CpalInput`] wraps the cpal device/stream lifecycle behind the blocking
//! [`InputStream`] interface the capture worker reads from. The device runs
//! at whatever rate, channel count and sample type it prefers; each callback
//! buffer is converted to the requested mono 16-bit format on the audio
//! thread and forwarded over an mpsc channel.
//!
//! Dropping the [`CpalInput`] drops the cpal stream, which stops the
//! hardware.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};

use super::device::{DeviceError, InputStream};
use super::resample::{downmix_to_mono, f32_to_pcm16, StreamResampler};
use super::PcmFormat;

/// Last asynchronous error reported by a cpal error callback.
pub(crate) type ErrorSlot = Arc<Mutex<Option<String>>>;

pub(crate) fn store_error(slot: &ErrorSlot, message: String) {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    // Keep the first error; later ones are usually consequences of it.
    if guard.is_none() {
        *guard = Some(message);
    }
}

pub(crate) fn take_error(slot: &ErrorSlot) -> Option<DeviceError> {
    slot.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .map(DeviceError::Stream)
}

// ---------------------------------------------------------------------------
// CpalInput
// ---------------------------------------------------------------------------

/// Live capture stream producing PCM bytes in a fixed [`PcmFormat`].
///
/// # Example
///
/// ```rust,no_run
/// use voice_recorder::audio::{AudioBackend, CpalBackend, PcmFormat};
///
/// let backend = CpalBackend::new();
/// let mut input = backend.open_input(PcmFormat::DEFAULT).unwrap();
/// let mut buf = [0u8; 882];
/// let n = input.read(&mut buf).unwrap();
/// println!("read {n} bytes");
/// ```
pub struct CpalInput {
    _stream: cpal::Stream,
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pending_pos: usize,
    errors: ErrorSlot,
    read_timeout: Duration,
}

impl CpalInput {
    /// Open `device` with its default input config and start streaming.
    ///
    /// Only 16-bit output formats are produced; `format.channels` is
    /// ignored beyond 1 because capture is always mixed down to mono.
    ///
    /// # Errors
    ///
    /// Fails when the device cannot report a default config, uses a sample
    /// type we don't convert, or the platform rejects the stream.
    pub fn open(
        device: &cpal::Device,
        format: PcmFormat,
        read_timeout: Duration,
    ) -> Result<Self, DeviceError> {
        if format.bits_per_sample != 16 {
            return Err(DeviceError::UnsupportedBitDepth(format.bits_per_sample));
        }

        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        log::debug!(
            "capture: device config {} Hz, {} ch, {:?} -> {} Hz mono",
            config.sample_rate.0,
            config.channels,
            sample_format,
            format.sample_rate
        );

        let (tx, rx) = mpsc::channel();
        let errors = ErrorSlot::default();

        let stream = match sample_format {
            SampleFormat::F32 => build_input::<f32>(device, &config, format, tx, errors.clone())?,
            SampleFormat::I16 => build_input::<i16>(device, &config, format, tx, errors.clone())?,
            SampleFormat::U16 => build_input::<u16>(device, &config, format, tx, errors.clone())?,
            SampleFormat::I32 => build_input::<i32>(device, &config, format, tx, errors.clone())?,
            other => return Err(DeviceError::UnsupportedSampleFormat(format!("{other:?}"))),
        };
        stream.play()?;

        Ok(Self {
            _stream: stream,
            rx,
            pending: Vec::new(),
            pending_pos: 0,
            errors,
            read_timeout,
        })
    }
}

impl InputStream for CpalInput {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        if let Some(err) = take_error(&self.errors) {
            return Err(err);
        }

        if self.pending_pos >= self.pending.len() {
            match self.rx.recv_timeout(self.read_timeout) {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pending_pos = 0;
                }
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => return Err(DeviceError::Disconnected),
            }
        }

        let available = &self.pending[self.pending_pos..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        Ok(n)
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    target: PcmFormat,
    tx: mpsc::Sender<Vec<u8>>,
    errors: ErrorSlot,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels;
    let mut resampler = StreamResampler::new(config.sample_rate.0, target.sample_rate);

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
            let mono = downmix_to_mono(&samples, channels);
            let bytes = f32_to_pcm16(&resampler.process(&mono));
            if !bytes.is_empty() {
                // The reader may already be gone while the stream winds down.
                let _ = tx.send(bytes);
            }
        },
        move |err: cpal::StreamError| {
            log::error!("capture: cpal stream error: {err}");
            store_error(&errors, err.to_string());
        },
        None,
    )?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_slot_keeps_first_error() {
        let slot = ErrorSlot::default();
        store_error(&slot, "first".into());
        store_error(&slot, "second".into());
        match take_error(&slot) {
            Some(DeviceError::Stream(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(take_error(&slot).is_none());
    }

    /// `cpal::Stream` is not `Send` everywhere, so the input must be opened
    /// on the thread that reads it. The receiver half, however, is movable.
    #[test]
    fn chunk_channel_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<mpsc::Receiver<Vec<u8>>>();
        assert_send::<ErrorSlot>();
    }
}
