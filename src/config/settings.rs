//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Missing keys fall back to their defaults, so a partial `settings.toml`
//! (or one written by an older version) still loads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::PcmFormat;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for capture, playback and the waveform envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz. Recordings are always mono 16-bit.
    pub sample_rate: u32,
    /// Time slice covered by one waveform bar, in milliseconds.
    pub waveform_resolution_ms: u64,
    /// Size of each capture read, in milliseconds of audio.
    pub capture_chunk_ms: u64,
    /// Interval between playback cursor updates, in milliseconds.
    pub playback_tick_ms: u64,
    /// How long to wait for a stopping worker before detaching it.
    pub worker_join_timeout_ms: u64,
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
    /// Output device name; `None` means the system default.
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            waveform_resolution_ms: 50,
            capture_chunk_ms: 10,
            playback_tick_ms: 10,
            worker_join_timeout_ms: 500,
            input_device: None,
            output_device: None,
        }
    }
}

impl AudioConfig {
    /// Format of newly captured audio.
    pub fn capture_format(&self) -> PcmFormat {
        PcmFormat::mono16(self.sample_rate)
    }

    /// Bytes requested from the input device per read. Always at least one
    /// frame.
    pub fn capture_chunk_bytes(&self) -> usize {
        let format = self.capture_format();
        format
            .bytes_for_ms(self.capture_chunk_ms)
            .max(format.block_align() as usize)
    }

    pub fn capture_chunk(&self) -> Duration {
        Duration::from_millis(self.capture_chunk_ms.max(1))
    }

    pub fn playback_tick(&self) -> Duration {
        Duration::from_millis(self.playback_tick_ms.max(1))
    }

    pub fn worker_join_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_join_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Where recordings are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Recordings directory; `None` means the platform data directory
    /// (see [`AppPaths::recordings_dir`]).
    pub recordings_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// The configured directory, or the platform default.
    pub fn resolve_recordings_dir(&self, paths: &AppPaths) -> PathBuf {
        self.recordings_dir
            .clone()
            .unwrap_or_else(|| paths.recordings_dir.clone())
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_recorder::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let mut config = AppConfig::load().unwrap();
///
/// config.audio.sample_rate = 48_000;
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture / playback settings.
    pub audio: AudioConfig,
    /// Recording storage settings.
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("config: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
