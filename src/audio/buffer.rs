//! Growable PCM byte buffer that holds a recording session.
//!
//! Unlike a ring buffer nothing is ever overwritten: capture appends,
//! playback takes a shared snapshot and starts at a frame-aligned offset,
//! and finalising drains the whole thing.
//!
//! # Example
//!
//! ```rust
//! use voice_recorder::audio::{PcmBuffer, PcmFormat};
//!
//! let mut buf = PcmBuffer::new(PcmFormat::DEFAULT);
//! buf.push_slice(&[0u8; 882]); // 10 ms
//! assert_eq!(buf.duration_ms(), 10);
//! let data = buf.drain();
//! assert_eq!(data.len(), 882);
//! assert!(buf.is_empty());
//! ```

use std::sync::Arc;

use super::PcmFormat;

/// Append-only byte buffer tagged with the format of its contents.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    bytes: Vec<u8>,
    format: PcmFormat,
}

impl PcmBuffer {
    pub fn new(format: PcmFormat) -> Self {
        Self {
            bytes: Vec::new(),
            format,
        }
    }

    /// Append raw PCM bytes.
    pub fn push_slice(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Take every stored byte, leaving the buffer empty (format unchanged).
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    /// Discard all bytes and adopt `format` for whatever comes next.
    pub fn reset(&mut self, format: PcmFormat) {
        self.bytes.clear();
        self.format = format;
    }

    /// Replace the contents wholesale, e.g. with a loaded file's payload.
    pub fn replace(&mut self, bytes: Vec<u8>, format: PcmFormat) {
        self.bytes = bytes;
        self.format = format;
    }

    /// Immutable shared copy for a playback worker.
    pub fn snapshot(&self) -> Arc<[u8]> {
        Arc::from(self.bytes.as_slice())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Duration of the stored audio in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.format.duration_ms(self.bytes.len())
    }
}

impl Default for PcmBuffer {
    fn default() -> Self {
        Self::new(PcmFormat::DEFAULT)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
