//! Saved recordings: the on-disk store, name rules and display helpers.
//!
//! Recordings are plain `.wav` files in one directory; the file stem is the
//! recording's name. Listing reads only the 44-byte header of each file.

pub mod display;
pub mod files;
pub mod naming;

pub use files::{read_recording, RecordingFile, RecordingStore, StorageError};
pub use naming::{default_recording_name, validate_new_name, validate_rename, NameError};
