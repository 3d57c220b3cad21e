//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-recorder\
//!   macOS:   ~/Library/Application Support/voice-recorder/
//!   Linux:   ~/.config/voice-recorder/
//!
//! Data dir (recordings):
//!   Windows: %LOCALAPPDATA%\voice-recorder\
//!   macOS:   ~/Library/Application Support/voice-recorder/
//!   Linux:   ~/.local/share/voice-recorder/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Per-user data directory.
    pub data_dir: PathBuf,
    /// Default directory for saved `.wav` recordings.
    pub recordings_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-recorder";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            recordings_dir: data_dir.join("recordings"),
            config_dir,
            data_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
