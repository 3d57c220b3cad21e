//! Canonical 44-byte RIFF/WAVE container for PCM byte buffers.
//!
//! # Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 4    | `"RIFF"` |
//! | 4      | 4    | `36 + data_len` |
//! | 8      | 4    | `"WAVE"` |
//! | 12     | 4    | `"fmt "` |
//! | 16     | 4    | `16` (fmt chunk size) |
//! | 20     | 2    | `1` (PCM) |
//! | 22     | 2    | channels |
//! | 24     | 4    | sample rate |
//! | 28     | 4    | byte rate |
//! | 32     | 2    | block align |
//! | 34     | 2    | bits per sample |
//! | 36     | 4    | `"data"` |
//! | 40     | 4    | `data_len` |
//!
//! Decoding is deliberately lenient: anything without a usable header is
//! treated as raw PCM in [`PcmFormat::DEFAULT`] rather than rejected.
//!
//! # Example
//!
//! ```rust
//! use voice_recorder::audio::{wav, PcmFormat};
//!
//! let bytes = wav::encode(&[0u8; 100], PcmFormat::DEFAULT).unwrap();
//! assert_eq!(bytes.len(), 144);
//!
//! let parsed = wav::decode(&bytes).unwrap();
//! assert!(parsed.has_valid_header);
//! assert_eq!(parsed.payload.len(), 100);
//! ```

use thiserror::Error;

use super::PcmFormat;

/// Size of the canonical header emitted by [`encode`].
pub const HEADER_LEN: usize = 44;

const PCM_FORMAT_TAG: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

/// Largest data chunk whose RIFF size (`36 + data_len`) still fits in `u32`.
pub const MAX_DATA_LEN: u32 = u32::MAX - 36;

// ---------------------------------------------------------------------------
// WavError
// ---------------------------------------------------------------------------

/// Errors produced by [`encode`] and [`decode`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WavError {
    /// The input contained zero bytes.
    #[error("audio data is empty")]
    EmptyInput,

    #[error("payload of {0} bytes does not fit a WAV data chunk")]
    PayloadTooLarge(u64),

    #[error("format {0:?} cannot be described by a WAV header")]
    UnsupportedFormat(PcmFormat),
}

// ---------------------------------------------------------------------------
// ParsedAudioData
// ---------------------------------------------------------------------------

/// Result of decoding a WAV file or a headerless raw PCM file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAudioData {
    /// PCM bytes following the header, or the whole input when no valid
    /// header was found.
    pub payload: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// `false` when the input was interpreted as raw PCM with default
    /// parameters.
    pub has_valid_header: bool,
}

impl ParsedAudioData {
    /// The PCM format described by the parsed (or defaulted) header fields.
    pub fn format(&self) -> PcmFormat {
        PcmFormat::new(self.sample_rate, self.channels, self.bits_per_sample)
    }

    /// Duration of the payload in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.format().duration_ms(self.payload.len())
    }
}

// ---------------------------------------------------------------------------
// encode
// ---------------------------------------------------------------------------

/// Prefix `payload` with a canonical 44-byte PCM WAV header.
///
/// # Errors
///
/// [`WavError::PayloadTooLarge`] past [`MAX_DATA_LEN`] bytes and
/// [`WavError::UnsupportedFormat`] when the byte rate or block align overflow
/// their header fields.
pub fn encode(payload: &[u8], format: PcmFormat) -> Result<Vec<u8>, WavError> {
    let data_len = u32::try_from(payload.len())
        .map_err(|_| WavError::PayloadTooLarge(payload.len() as u64))?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header(data_len, format)?);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Build the 44-byte header for a data chunk of `data_len` bytes.
pub fn header(data_len: u32, format: PcmFormat) -> Result<[u8; HEADER_LEN], WavError> {
    if data_len > MAX_DATA_LEN {
        return Err(WavError::PayloadTooLarge(data_len as u64));
    }
    let (byte_rate, block_align) = format
        .header_rates()
        .ok_or(WavError::UnsupportedFormat(format))?;

    let mut h = [0u8; HEADER_LEN];
    h[0..4].copy_from_slice(b"RIFF");
    h[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    h[8..12].copy_from_slice(b"WAVE");
    h[12..16].copy_from_slice(b"fmt ");
    h[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    h[20..22].copy_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    h[22..24].copy_from_slice(&format.channels.to_le_bytes());
    h[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    h[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    h[32..34].copy_from_slice(&block_align.to_le_bytes());
    h[34..36].copy_from_slice(&format.bits_per_sample.to_le_bytes());
    h[36..40].copy_from_slice(b"data");
    h[40..44].copy_from_slice(&data_len.to_le_bytes());
    Ok(h)
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

/// Parse `bytes` as a WAV file, falling back to raw PCM.
///
/// A header is accepted when the input is longer than [`HEADER_LEN`] and the
/// signed sample rate (offset 24), channel count (offset 22) and bit depth
/// (offset 34) are all positive. Otherwise the entire input becomes the
/// payload and the format defaults to 44.1 kHz mono 16-bit.
///
/// # Errors
///
/// Returns [`WavError::EmptyInput`] for a zero-length input.
pub fn decode(bytes: &[u8]) -> Result<ParsedAudioData, WavError> {
    if bytes.is_empty() {
        return Err(WavError::EmptyInput);
    }

    if bytes.len() > HEADER_LEN {
        if let Some(format) = parse_header(bytes) {
            return Ok(ParsedAudioData {
                payload: bytes[HEADER_LEN..].to_vec(),
                sample_rate: format.sample_rate,
                channels: format.channels,
                bits_per_sample: format.bits_per_sample,
                has_valid_header: true,
            });
        }
    }

    log::debug!("wav: no valid header in {} bytes, treating as raw PCM", bytes.len());
    let fallback = PcmFormat::DEFAULT;
    Ok(ParsedAudioData {
        payload: bytes.to_vec(),
        sample_rate: fallback.sample_rate,
        channels: fallback.channels,
        bits_per_sample: fallback.bits_per_sample,
        has_valid_header: false,
    })
}

/// Read the format fields from the first [`HEADER_LEN`] bytes.
///
/// Returns `None` when `bytes` is too short, any field is not positive, or
/// the implied byte rate does not fit the header's 32-bit field.
pub fn parse_header(bytes: &[u8]) -> Option<PcmFormat> {
    if bytes.len() < HEADER_LEN {
        return None;
    }

    let channels = i16::from_le_bytes([bytes[22], bytes[23]]);
    let sample_rate = i32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
    let bits_per_sample = i16::from_le_bytes([bytes[34], bytes[35]]);

    if sample_rate <= 0 || channels <= 0 || bits_per_sample <= 0 {
        return None;
    }
    let format = PcmFormat::new(sample_rate as u32, channels as u16, bits_per_sample as u16);
    format.header_rates().map(|_| format)
}

/// Duration in milliseconds of a file of `file_len` bytes whose first bytes
/// are `header_bytes`.
///
/// With a valid header the payload is `file_len - 44` bytes in the header's
/// format; otherwise the whole file is raw PCM in [`PcmFormat::DEFAULT`].
pub fn duration_from_header(header_bytes: &[u8], file_len: u64) -> u64 {
    match parse_header(header_bytes).filter(|_| file_len > HEADER_LEN as u64) {
        Some(format) => format.duration_ms((file_len - HEADER_LEN as u64) as usize),
        None => PcmFormat::DEFAULT.duration_ms(file_len as usize),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
