//! PCM stream parameters and the byte/time arithmetic built on them.
//!
//! Every buffer in the recorder is interleaved little-endian integer PCM.
//! [`PcmFormat`] carries the three numbers needed to map a byte count onto a
//! duration and back.

/// Sample rate, channel count and sample width of a PCM byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    /// Frames per second (Hz).
    pub sample_rate: u32,
    /// Interleaved channels per frame.
    pub channels: u16,
    /// Bits per individual sample.
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// Format used for capture and for headerless raw PCM: 44.1 kHz, mono,
    /// 16-bit.
    pub const DEFAULT: PcmFormat = PcmFormat {
        sample_rate: 44_100,
        channels: 1,
        bits_per_sample: 16,
    };

    pub const fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// Mono 16-bit PCM at `sample_rate`, the capture format.
    pub const fn mono16(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1, 16)
    }

    /// Bytes per interleaved frame (the WAV `blockAlign`).
    pub fn block_align(&self) -> u32 {
        self.channels as u32 * (self.bits_per_sample as u32 / 8)
    }

    /// Bytes per second of audio. Computed in `u64`: a 32-bit rate times a
    /// wide frame does not fit the WAV `byteRate` field.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.block_align() as u64
    }

    /// `(byteRate, blockAlign)` as stored in a WAV header, or `None` when
    /// either overflows its field.
    pub fn header_rates(&self) -> Option<(u32, u16)> {
        let byte_rate = u32::try_from(self.byte_rate()).ok()?;
        let block_align = u16::try_from(self.block_align()).ok()?;
        Some((byte_rate, block_align))
    }

    /// Fractional bytes per millisecond, e.g. `88.2` for the default format.
    pub fn bytes_per_ms(&self) -> f64 {
        self.byte_rate() as f64 / 1000.0
    }

    /// Duration of `len` bytes in whole milliseconds (rounded down).
    pub fn duration_ms(&self, len: usize) -> u64 {
        let rate = self.byte_rate() as u128;
        if rate == 0 {
            return 0;
        }
        (len as u128 * 1000 / rate) as u64
    }

    /// Duration of `len` bytes in seconds.
    pub fn duration_secs(&self, len: usize) -> f64 {
        let rate = self.byte_rate();
        if rate == 0 {
            return 0.0;
        }
        len as f64 / rate as f64
    }

    /// Byte length of `ms` milliseconds of audio, rounded down to a whole
    /// frame so the result never splits a sample.
    pub fn bytes_for_ms(&self, ms: u64) -> usize {
        let raw = (ms as f64 * self.bytes_per_ms()) as usize;
        self.align_down(raw)
    }

    /// Round `offset` down to the nearest frame boundary.
    pub fn align_down(&self, offset: usize) -> usize {
        let align = self.block_align().max(1) as usize;
        offset - offset % align
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Decode one little-endian integer sample to `[-1.0, 1.0]`. 8-bit PCM is
/// unsigned, wider widths are signed. Missing bytes and unsupported widths
/// read as silence.
pub fn sample_at(pcm: &[u8], offset: usize, bits: u16) -> f32 {
    let width = (bits / 8) as usize;
    let Some(b) = offset
        .checked_add(width)
        .and_then(|end| pcm.get(offset..end))
    else {
        return 0.0;
    };
    match bits {
        8 => (b[0] as f32 - 128.0) / 128.0,
        16 => i16::from_le_bytes([b[0], b[1]]) as f32 / 32_768.0,
        24 => {
            let v = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
            v as f32 / 8_388_608.0
        }
        32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0,
        _ => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
