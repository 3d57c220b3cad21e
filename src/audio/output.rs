//! Speaker playback via `cpal`.
//!
//! [`CpalOutput`] plays a [`PlaybackSource`] on the device's preferred
//! config. The source is read by a [`SourceReader`] inside the output
//! callback: it steps through the buffer at
//! `speed * source_rate / device_rate` frames per device frame, mixes each
//! source frame to mono and writes it to every device channel. Past the end
//! of the buffer it emits silence.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};

use super::capture::{store_error, take_error, ErrorSlot};
use super::device::{DeviceError, OutputStream, PlaybackSource};
use super::format::sample_at;
use super::PcmFormat;

// ---------------------------------------------------------------------------
// SourceReader
// ---------------------------------------------------------------------------

/// Fractional-position reader over an interleaved integer PCM buffer.
pub(crate) struct SourceReader {
    source: PlaybackSource,
    /// Read position in source frames.
    pos: f64,
    /// Source frames per device frame at speed 1.0.
    rate_ratio: f64,
    /// Source frames per device frame for the current callback block.
    step: f64,
}

impl SourceReader {
    pub(crate) fn new(source: PlaybackSource, device_rate: u32) -> Result<Self, DeviceError> {
        match source.format.bits_per_sample {
            8 | 16 | 24 | 32 => {}
            other => return Err(DeviceError::UnsupportedBitDepth(other)),
        }
        let align = source.format.block_align().max(1) as usize;
        let rate_ratio = source.format.sample_rate as f64 / device_rate.max(1) as f64;
        Ok(Self {
            pos: (source.start_offset / align) as f64,
            source,
            rate_ratio,
            step: rate_ratio,
        })
    }

    /// Re-read the speed control. Called once per device callback.
    pub(crate) fn begin_block(&mut self) {
        self.step = self.rate_ratio * self.source.speed.get() as f64;
    }

    fn frame_count(&self) -> usize {
        self.source.pcm.len() / self.source.format.block_align().max(1) as usize
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.pos >= self.frame_count() as f64
    }

    /// Next mono output sample in `[-1.0, 1.0]`.
    pub(crate) fn next_sample(&mut self) -> f32 {
        let frames = self.frame_count();
        if self.pos >= frames as f64 {
            return 0.0;
        }

        let i = self.pos.floor() as usize;
        let frac = (self.pos - i as f64) as f32;
        let a = self.frame_mono(i);
        let b = if i + 1 < frames { self.frame_mono(i + 1) } else { a };
        self.pos += self.step;
        a + (b - a) * frac
    }

    fn frame_mono(&self, frame: usize) -> f32 {
        let format = self.source.format;
        let width = (format.bits_per_sample / 8) as usize;
        let base = frame * format.block_align() as usize;
        let channels = format.channels.max(1) as usize;
        let sum: f32 = (0..channels)
            .map(|ch| sample_at(&self.source.pcm, base + ch * width, format.bits_per_sample))
            .sum();
        sum / channels as f32
    }
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

/// Prepared output stream. Nothing is heard until [`OutputStream::play`].
pub struct CpalOutput {
    stream: cpal::Stream,
    errors: ErrorSlot,
}

impl CpalOutput {
    pub fn open(device: &cpal::Device, source: PlaybackSource) -> Result<Self, DeviceError> {
        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        log::debug!(
            "playback: device config {} Hz, {} ch, {:?}; source {:?}",
            config.sample_rate.0,
            config.channels,
            sample_format,
            source.format
        );

        let reader = SourceReader::new(source, config.sample_rate.0)?;
        let errors = ErrorSlot::default();

        let stream = match sample_format {
            SampleFormat::F32 => build_output::<f32>(device, &config, reader, errors.clone())?,
            SampleFormat::I16 => build_output::<i16>(device, &config, reader, errors.clone())?,
            SampleFormat::U16 => build_output::<u16>(device, &config, reader, errors.clone())?,
            SampleFormat::I32 => build_output::<i32>(device, &config, reader, errors.clone())?,
            other => return Err(DeviceError::UnsupportedSampleFormat(format!("{other:?}"))),
        };

        Ok(Self { stream, errors })
    }
}

impl OutputStream for CpalOutput {
    fn play(&mut self) -> Result<(), DeviceError> {
        self.stream.play()?;
        Ok(())
    }

    fn stop(&mut self) {
        if let Err(e) = self.stream.pause() {
            log::debug!("playback: pause failed while stopping: {e}");
        }
    }

    fn take_error(&mut self) -> Option<DeviceError> {
        take_error(&self.errors)
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut reader: SourceReader,
    errors: ErrorSlot,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            reader.begin_block();
            for frame in data.chunks_mut(channels) {
                let value = T::from_sample(reader.next_sample());
                for slot in frame.iter_mut() {
                    *slot = value;
                }
            }
        },
        move |err: cpal::StreamError| {
            log::error!("playback: cpal stream error: {err}");
            store_error(&errors, err.to_string());
        },
        None,
    )?;
    Ok(stream)
}

/// Source format the reader understands, for callers that want to check a
/// loaded file before opening a device.
pub fn is_playable(format: PcmFormat) -> bool {
    matches!(format.bits_per_sample, 8 | 16 | 24 | 32)
        && format.channels > 0
        && format.sample_rate > 0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
