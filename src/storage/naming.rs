//! Recording name validation and default names.

use chrono::{DateTime, Local, TimeZone};
use thiserror::Error;

use super::RecordingFile;

/// Why a proposed recording name was rejected. The messages are shown to
/// the user verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Name cannot be empty")]
    Empty,

    #[error("New name must be different from the current name")]
    Unchanged,

    #[error("A recording with this name already exists")]
    Duplicate,

    #[error("Name cannot contain {0:?}")]
    InvalidCharacter(char),
}

/// Characters that would escape the recordings directory or are rejected
/// by common filesystems.
const FORBIDDEN: &[char] = &['/', '\\', '\0'];

/// Reject blank names and names that cannot be used as a file stem.
pub fn check_name(name: &str) -> Result<(), NameError> {
    if name.trim().is_empty() {
        return Err(NameError::Empty);
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN.contains(c) || c.is_control()) {
        return Err(NameError::InvalidCharacter(c));
    }
    Ok(())
}

/// Validate the name for a new recording against the existing ones.
///
/// ```
/// use voice_recorder::storage::naming::{validate_new_name, NameError};
///
/// assert_eq!(validate_new_name("   ", &[]), Err(NameError::Empty));
/// assert_eq!(validate_new_name("Take 1", &[]), Ok(()));
/// ```
pub fn validate_new_name(name: &str, existing: &[RecordingFile]) -> Result<(), NameError> {
    check_name(name)?;
    if existing.iter().any(|r| r.name == name) {
        return Err(NameError::Duplicate);
    }
    Ok(())
}

/// Validate renaming `current` to `name`.
pub fn validate_rename(
    name: &str,
    current: &str,
    existing: &[RecordingFile],
) -> Result<(), NameError> {
    check_name(name)?;
    if name == current {
        return Err(NameError::Unchanged);
    }
    if existing.iter().any(|r| r.name == name && r.name != current) {
        return Err(NameError::Duplicate);
    }
    Ok(())
}

/// `"Recording ddMMyyyy_HHmmss"` for the current local time.
pub fn default_recording_name() -> String {
    default_recording_name_at(&Local::now())
}

pub fn default_recording_name_at<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("Recording {}", at.format("%d%m%Y_%H%M%S"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
