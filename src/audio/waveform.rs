//! Amplitude envelope extraction for the waveform display.
//!
//! The envelope is a list of bars, one per fixed time slice (50 ms by
//! default). Each bar is the mean absolute value of the samples inside its
//! slice on the signed 16-bit scale, so values range over `[0.0, 32768.0]`
//! whatever the bit depth of the source.
//!
//! Two callers share [`extract_amplitudes`]:
//!
//! * capture appends one bar per resolution tick, extracting a single bucket
//!   from the bytes recorded since the previous tick;
//! * loading a file extracts [`bar_count`] buckets from the whole payload at
//!   once.
//!
//! Both paths use the same resolution, so a live recording and the same
//! recording reloaded from disk produce the same number of bars.
//!
//! # Example
//!
//! ```rust
//! use voice_recorder::audio::waveform::extract_amplitudes;
//!
//! let pcm: Vec<u8> = [1000i16, -1000, 3000, -3000]
//!     .iter()
//!     .flat_map(|s| s.to_le_bytes())
//!     .collect();
//!
//! let bars = extract_amplitudes(&pcm, 2);
//! assert_eq!(bars, vec![1000.0, 3000.0]);
//! ```

use super::format::sample_at;
use super::PcmFormat;

/// Magnitude of a full-scale sample on the 16-bit scale.
const FULL_SCALE: f64 = 32_768.0;

/// Reduce `pcm` (signed 16-bit little-endian) to exactly `bucket_count`
/// amplitude values.
///
/// Samples are split into contiguous buckets of near-equal size; bucket `i`
/// covers samples `[i*n/k, (i+1)*n/k)`. A bucket that contains no samples
/// yields `0.0`, so the output length is always `bucket_count`, including for
/// empty input. A trailing odd byte is ignored.
pub fn extract_amplitudes(pcm: &[u8], bucket_count: usize) -> Vec<f32> {
    extract_amplitudes_at_depth(pcm, 16, bucket_count)
}

/// [`extract_amplitudes`] for 8-, 16-, 24- or 32-bit samples. Unsigned 8-bit
/// silence (`0x80`) reads as zero, and every depth is scaled to the 16-bit
/// range so envelopes from different files compare directly.
pub fn extract_amplitudes_at_depth(
    pcm: &[u8],
    bits_per_sample: u16,
    bucket_count: usize,
) -> Vec<f32> {
    let width = (bits_per_sample as usize / 8).max(1);
    let sample_count = pcm.len() / width;
    let mut bars = Vec::with_capacity(bucket_count);

    for i in 0..bucket_count {
        let start = i * sample_count / bucket_count;
        let end = (i + 1) * sample_count / bucket_count;
        bars.push(mean_magnitude(
            &pcm[start * width..end * width],
            bits_per_sample,
        ));
    }

    bars
}

/// Number of bars for a buffer of `len` bytes in `format` at one bar per
/// `resolution_ms`. Never less than one.
pub fn bar_count(format: PcmFormat, len: usize, resolution_ms: u64) -> usize {
    let bars_per_sec = 1000.0 / resolution_ms.max(1) as f64;
    let count = (format.duration_secs(len) * bars_per_sec).round() as usize;
    count.max(1)
}

/// Bulk envelope of a whole buffer, as built when a file is loaded.
pub fn envelope(pcm: &[u8], format: PcmFormat, resolution_ms: u64) -> Vec<f32> {
    extract_amplitudes_at_depth(
        pcm,
        format.bits_per_sample,
        bar_count(format, pcm.len(), resolution_ms),
    )
}

/// Largest bar value, or `0.0` for an empty envelope.
pub fn peak(amplitudes: &[f32]) -> f32 {
    amplitudes.iter().copied().fold(0.0_f32, f32::max)
}

fn mean_magnitude(bytes: &[u8], bits_per_sample: u16) -> f32 {
    let width = (bits_per_sample as usize / 8).max(1);
    let count = bytes.len() / width;
    if count == 0 {
        return 0.0;
    }

    let sum: f64 = (0..count)
        .map(|i| sample_at(bytes, i * width, bits_per_sample).abs() as f64)
        .sum();
    (sum * FULL_SCALE / count as f64) as f32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn output_length_matches_bucket_count() {
        let data = pcm(&[100; 1_000]);
        for n in [1, 2, 7, 20, 999, 1_000, 5_000] {
            assert_eq!(extract_amplitudes(&data, n).len(), n, "n = {n}");
        }
    }

    #[test]
    fn empty_input_yields_zero_bars() {
        let bars = extract_amplitudes(&[], 10);
        assert_eq!(bars, vec![0.0; 10]);
    }

    #[test]
    fn more_buckets_than_samples_pads_with_zero() {
        let bars = extract_amplitudes(&pcm(&[500, -500]), 4);
        assert_eq!(bars.len(), 4);
        assert_eq!(bars.iter().filter(|&&b| b == 500.0).count(), 2);
        assert_eq!(bars.iter().filter(|&&b| b == 0.0).count(), 2);
    }

    #[test]
    fn magnitude_is_mean_absolute_value() {
        let bars = extract_amplitudes(&pcm(&[-100, 300, -200, 400]), 1);
        assert_eq!(bars, vec![250.0]);
    }

    #[test]
    fn full_scale_negative_sample_does_not_overflow() {
        let bars = extract_amplitudes(&pcm(&[i16::MIN, i16::MIN]), 1);
        assert_eq!(bars, vec![32_768.0]);
    }

    #[test]
    fn trailing_odd_byte_is_ignored() {
        let mut data = pcm(&[1_000]);
        data.push(0xFF);
        assert_eq!(extract_amplitudes(&data, 1), vec![1_000.0]);
    }

    #[test]
    fn bar_count_is_twenty_per_second() {
        let f = PcmFormat::DEFAULT;
        assert_eq!(bar_count(f, 88_200, 50), 20);
        assert_eq!(bar_count(f, 88_200 * 3, 50), 60);
        // Under half a bar still yields one.
        assert_eq!(bar_count(f, 100, 50), 1);
        assert_eq!(bar_count(f, 0, 50), 1);
    }

    #[test]
    fn envelope_of_loaded_buffer() {
        let data = pcm(&vec![1_234; 44_100]); // 1 s
        let env = envelope(&data, PcmFormat::DEFAULT, 50);
        assert_eq!(env.len(), 20);
        assert!(env.iter().all(|&b| b == 1_234.0));
        assert_eq!(peak(&env), 1_234.0);
    }

    #[test]
    fn peak_of_empty_is_zero() {
        assert_eq!(peak(&[]), 0.0);
    }

    #[test]
    fn eight_bit_silence_is_flat() {
        let silence = vec![0x80u8; 8_000];
        let env = envelope(&silence, PcmFormat::new(8_000, 1, 8), 50);
        assert_eq!(env.len(), 20);
        assert!(env.iter().all(|&b| b == 0.0));

        let loud = extract_amplitudes_at_depth(&[0x00, 0xFF], 8, 1);
        assert!((loud[0] - 32_640.0).abs() < 1.0, "got {}", loud[0]);
    }

    #[test]
    fn twenty_four_bit_samples_keep_frame_boundaries() {
        // Half scale, alternating sign: 0x400000 and -0x400000.
        let data = [0x00, 0x00, 0x40, 0x00, 0x00, 0xC0];
        assert_eq!(extract_amplitudes_at_depth(&data, 24, 1), vec![16_384.0]);
        assert_eq!(extract_amplitudes_at_depth(&data, 24, 2), vec![16_384.0; 2]);
    }

    #[test]
    fn thirty_two_bit_full_scale() {
        let data = i32::MIN.to_le_bytes();
        assert_eq!(extract_amplitudes_at_depth(&data, 32, 1), vec![32_768.0]);
    }
}
