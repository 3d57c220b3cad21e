//! Channel mixing, sample-rate conversion and 16-bit PCM packing.
//!
//! Input devices deliver interleaved `f32` frames at whatever rate and
//! channel count they prefer; the recorder stores mono 16-bit PCM at a fixed
//! rate. The conversion runs per device callback:
//!
//! 1. [`downmix_to_mono`]: average all channels of each frame.
//! 2. [`StreamResampler::process`]: linear interpolation to the target rate,
//!    carrying state across callbacks so chunk boundaries stay continuous.
//! 3. [`f32_to_pcm16`]: clamp and pack as little-endian `i16`.

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// * `channels == 1` returns the input as an owned `Vec`.
/// * `channels == 0` returns an empty vector.
///
/// ```rust
/// use voice_recorder::audio::resample::downmix_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Linear-interpolation resampler for a continuous mono stream delivered in
/// chunks.
///
/// The last input sample and the fractional read position are kept between
/// calls, so feeding a signal in pieces gives the same output as feeding it
/// whole.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    source_rate: u32,
    target_rate: u32,
    /// Input samples advanced per output sample.
    step: f64,
    /// Read position relative to the start of the next chunk; `-1.0 ..= 0.0`
    /// refers to `prev`.
    pos: f64,
    prev: Option<f32>,
}

impl StreamResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            source_rate,
            target_rate,
            step: source_rate.max(1) as f64 / target_rate.max(1) as f64,
            pos: 0.0,
            prev: None,
        }
    }

    /// `true` when the rates match and [`process`](Self::process) copies its
    /// input unchanged.
    pub fn is_passthrough(&self) -> bool {
        self.source_rate == self.target_rate
    }

    /// Resample one chunk. Output length is about
    /// `input.len() * target_rate / source_rate`.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }
        if input.is_empty() {
            return Vec::new();
        }

        let len = input.len() as isize;
        let mut out = Vec::with_capacity((input.len() as f64 / self.step).ceil() as usize + 1);

        loop {
            let idx = self.pos.floor();
            let frac = (self.pos - idx) as f32;
            let i = idx as isize;
            if i + 1 >= len {
                break;
            }

            let a = if i < 0 {
                self.prev.unwrap_or(input[0])
            } else {
                input[i as usize]
            };
            let b = input[(i + 1) as usize];
            out.push(a + (b - a) * frac);
            self.pos += self.step;
        }

        self.pos -= input.len() as f64;
        self.prev = input.last().copied();
        out
    }
}

// ---------------------------------------------------------------------------
// PCM packing
// ---------------------------------------------------------------------------

/// Convert `[-1.0, 1.0]` floats to little-endian signed 16-bit PCM bytes.
/// Out-of-range values are clamped.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- downmix_to_mono ---------------------------------------------------

    #[test]
    fn downmix_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&input, 1), input);
    }

    #[test]
    fn downmix_two_channel() {
        let out = downmix_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_zero_channels() {
        assert!(downmix_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    // ---- StreamResampler ---------------------------------------------------

    #[test]
    fn same_rate_is_passthrough() {
        let mut r = StreamResampler::new(44_100, 44_100);
        let input: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        assert_eq!(r.process(&input), input);
    }

    #[test]
    fn downsample_48k_to_44k1_length() {
        let mut r = StreamResampler::new(48_000, 44_100);
        let mut total = 0;
        // 1 s in 10 ms chunks
        for _ in 0..100 {
            total += r.process(&[0.25_f32; 480]).len();
        }
        assert!(total.abs_diff(44_100) <= 4, "got {total}");
    }

    #[test]
    fn upsample_doubles_length() {
        let mut r = StreamResampler::new(22_050, 44_100);
        let mut total = 0;
        for _ in 0..10 {
            total += r.process(&[0.0_f32; 2_205]).len();
        }
        assert!(total.abs_diff(44_100) <= 4, "got {total}");
    }

    #[test]
    fn constant_signal_keeps_amplitude_across_chunks() {
        let mut r = StreamResampler::new(48_000, 44_100);
        for _ in 0..5 {
            for s in r.process(&[0.5_f32; 333]) {
                assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
            }
        }
    }

    #[test]
    fn chunked_ramp_matches_whole_ramp() {
        let ramp: Vec<f32> = (0..1_000).map(|i| i as f32 / 1_000.0).collect();

        let mut whole = StreamResampler::new(48_000, 16_000);
        let expected = whole.process(&ramp);

        let mut chunked = StreamResampler::new(48_000, 16_000);
        let got: Vec<f32> = ramp.chunks(97).flat_map(|c| chunked.process(c)).collect();

        assert_eq!(expected.len(), got.len());
        for (a, b) in expected.iter().zip(&got) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn empty_chunk_yields_nothing() {
        let mut r = StreamResampler::new(48_000, 44_100);
        assert!(r.process(&[]).is_empty());
    }

    // ---- PCM packing -------------------------------------------------------

    #[test]
    fn pack_clamps_and_round_trips_sign() {
        let bytes = f32_to_pcm16(&[0.0, 1.5, -1.5, 0.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -i16::MAX);
        assert!((crate::audio::format::sample_at(&bytes, 6, 16) - 0.5).abs() < 1e-3);
    }
}
