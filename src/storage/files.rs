//! Recordings directory: listing, saving, renaming and deleting `.wav` files.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;

use super::naming::{check_name, NameError};
use crate::audio::wav::{self, ParsedAudioData, WavError};
use crate::audio::PcmFormat;

const EXTENSION: &str = "wav";

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

/// Errors from recording file operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("recording not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("recording is empty: {}", .0.display())]
    EmptyInput(PathBuf),

    #[error("a recording named {0:?} already exists")]
    NameConflict(String),

    #[error(transparent)]
    InvalidName(#[from] NameError),

    #[error("cannot write recording: {0}")]
    Wav(#[from] WavError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// RecordingFile
// ---------------------------------------------------------------------------

/// Metadata for one saved recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFile {
    /// File stem, shown as the recording's name.
    pub name: String,
    pub file_path: PathBuf,
    /// Computed from the header alone; the payload is never read.
    pub duration_ms: u64,
    /// Last-modified time, Unix milliseconds.
    pub created_time_ms: i64,
    pub size_kb: u64,
}

impl RecordingFile {
    /// Read metadata for `path`.
    pub fn from_path(path: &Path) -> Result<Self, StorageError> {
        let metadata = fs::metadata(path).map_err(|e| not_found_or_io(e, path))?;
        let len = metadata.len();

        let mut header = Vec::with_capacity(wav::HEADER_LEN);
        File::open(path)?
            .take(wav::HEADER_LEN as u64)
            .read_to_end(&mut header)?;

        let created_time_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Ok(Self {
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_path: path.to_path_buf(),
            duration_ms: wav::duration_from_header(&header, len),
            created_time_ms,
            size_kb: len / 1024,
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingStore
// ---------------------------------------------------------------------------

/// A directory of `.wav` recordings.
///
/// # Example
///
/// ```rust,no_run
/// use voice_recorder::audio::PcmFormat;
/// use voice_recorder::storage::RecordingStore;
///
/// let store = RecordingStore::new("/tmp/recordings");
/// store.save("Take 1", &[0u8; 882], PcmFormat::DEFAULT).unwrap();
/// for rec in store.list().unwrap() {
///     println!("{} ({} ms)", rec.name, rec.duration_ms);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RecordingStore {
    dir: PathBuf,
}

impl RecordingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a recording called `name` is stored at.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{EXTENSION}"))
    }

    /// All `.wav` files in the directory, newest first. The directory is
    /// created if missing. Unreadable entries are skipped with a warning.
    pub fn list(&self) -> Result<Vec<RecordingFile>, StorageError> {
        fs::create_dir_all(&self.dir)?;

        let mut recordings = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || !is_wav(&path) {
                continue;
            }
            match RecordingFile::from_path(&path) {
                Ok(rec) => recordings.push(rec),
                Err(e) => log::warn!("storage: skipping {}: {e}", path.display()),
            }
        }

        recordings.sort_by(|a, b| b.created_time_ms.cmp(&a.created_time_ms));
        Ok(recordings)
    }

    /// Look up a recording by name.
    pub fn find(&self, name: &str) -> Result<RecordingFile, StorageError> {
        RecordingFile::from_path(&self.path_for(name))
    }

    /// Write `payload` as `<name>.wav` with a header for `format`.
    ///
    /// # Errors
    ///
    /// [`StorageError::EmptyInput`] for an empty payload (nothing is
    /// written) and [`StorageError::InvalidName`] for names that cannot be a
    /// file stem. An existing file of the same name is overwritten.
    pub fn save(
        &self,
        name: &str,
        payload: &[u8],
        format: PcmFormat,
    ) -> Result<RecordingFile, StorageError> {
        check_name(name)?;
        let path = self.path_for(name);
        if payload.is_empty() {
            return Err(StorageError::EmptyInput(path));
        }

        let bytes = wav::encode(payload, format)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, bytes)?;
        log::info!("storage: saved {} ({} bytes)", path.display(), payload.len());
        RecordingFile::from_path(&path)
    }

    /// Rename `file` to `new_name` within its directory.
    ///
    /// # Errors
    ///
    /// [`StorageError::NameConflict`] when a file with the new name exists,
    /// [`StorageError::NotFound`] when `file` is gone.
    pub fn rename(
        &self,
        file: &RecordingFile,
        new_name: &str,
    ) -> Result<RecordingFile, StorageError> {
        check_name(new_name)?;
        let dir = file.file_path.parent().unwrap_or(&self.dir);
        let target = dir.join(format!("{new_name}.{EXTENSION}"));

        if !file.file_path.exists() {
            return Err(StorageError::NotFound(file.file_path.clone()));
        }

        // Link then unlink, so an existing target is never replaced.
        match fs::hard_link(&file.file_path, &target) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(&file.file_path) {
                    let _ = fs::remove_file(&target);
                    return Err(e.into());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::NameConflict(new_name.to_string()));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(file.file_path.clone()));
            }
            Err(e) => {
                log::debug!("storage: hard link unavailable ({e}), using rename");
                if target.exists() {
                    return Err(StorageError::NameConflict(new_name.to_string()));
                }
                fs::rename(&file.file_path, &target)?;
            }
        }
        log::info!("storage: renamed {:?} -> {:?}", file.name, new_name);
        RecordingFile::from_path(&target)
    }

    /// Delete `file`. A file that is already gone is not an error.
    pub fn delete(&self, file: &RecordingFile) -> Result<(), StorageError> {
        match fs::remove_file(&file.file_path) {
            Ok(()) => {
                log::info!("storage: deleted {}", file.file_path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("storage: {} already gone", file.file_path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Read and decode a recording for playback.
///
/// # Errors
///
/// [`StorageError::NotFound`] for a missing file and
/// [`StorageError::EmptyInput`] for a zero-length one. Anything else is
/// accepted: files without a usable header decode as raw PCM.
pub fn read_recording(path: &Path) -> Result<ParsedAudioData, StorageError> {
    let bytes = fs::read(path).map_err(|e| not_found_or_io(e, path))?;
    wav::decode(&bytes).map_err(|e| match e {
        WavError::EmptyInput => StorageError::EmptyInput(path.to_path_buf()),
        other => StorageError::Wav(other),
    })
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(EXTENSION))
}

fn not_found_or_io(e: io::Error, path: &Path) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_path_buf())
    } else {
        StorageError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use tempfile::tempdir;

    use super::*;

    fn one_second() -> Vec<u8> {
        vec![0u8; 88_200]
    }

    fn set_mtime(path: &Path, secs_after_epoch: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs_after_epoch))
            .unwrap();
    }

    #[test]
    fn save_then_list() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());

        let saved = store.save("Take 1", &one_second(), PcmFormat::DEFAULT).unwrap();
        assert_eq!(saved.name, "Take 1");
        assert_eq!(saved.duration_ms, 1_000);
        assert_eq!(saved.size_kb, (88_200 + 44) / 1024);

        let list = store.list().unwrap();
        assert_eq!(list, vec![saved]);
    }

    #[test]
    fn list_is_newest_first_and_wav_only() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());
        store.save("old", &one_second(), PcmFormat::DEFAULT).unwrap();
        store.save("new", &one_second(), PcmFormat::DEFAULT).unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub.wav")).unwrap();

        set_mtime(&store.path_for("old"), 1_000);
        set_mtime(&store.path_for("new"), 2_000);

        let names: Vec<_> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["new", "old"]);
    }

    #[test]
    fn list_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path().join("nested/recordings"));
        assert!(store.list().unwrap().is_empty());
        assert!(store.dir().is_dir());
    }

    #[test]
    fn raw_file_duration_uses_default_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.wav");
        fs::write(&path, vec![0u8; 44_100]).unwrap();
        let rec = RecordingFile::from_path(&path).unwrap();
        assert_eq!(rec.duration_ms, 500);
    }

    #[test]
    fn save_empty_payload_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());
        assert!(matches!(
            store.save("empty", &[], PcmFormat::DEFAULT),
            Err(StorageError::EmptyInput(_))
        ));
        assert!(!store.path_for("empty").exists());
    }

    #[test]
    fn save_rejects_path_like_names() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());
        assert!(matches!(
            store.save("../x", &one_second(), PcmFormat::DEFAULT),
            Err(StorageError::InvalidName(NameError::InvalidCharacter('/')))
        ));
    }

    #[test]
    fn rename_moves_file() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());
        let rec = store.save("a", &one_second(), PcmFormat::DEFAULT).unwrap();

        let renamed = store.rename(&rec, "b").unwrap();
        assert_eq!(renamed.name, "b");
        assert!(!rec.file_path.exists());
        assert!(renamed.file_path.exists());
        assert_eq!(renamed.duration_ms, 1_000);
    }

    #[test]
    fn rename_onto_existing_conflicts() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());
        let a = store.save("a", &one_second(), PcmFormat::DEFAULT).unwrap();
        store.save("b", &one_second(), PcmFormat::DEFAULT).unwrap();

        assert!(matches!(
            store.rename(&a, "b"),
            Err(StorageError::NameConflict(name)) if name == "b"
        ));
        assert!(a.file_path.exists());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());
        let rec = store.save("gone", &one_second(), PcmFormat::DEFAULT).unwrap();
        store.delete(&rec).unwrap();
        assert!(!rec.file_path.exists());
        store.delete(&rec).unwrap();
    }

    #[test]
    fn read_recording_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.wav");
        assert!(matches!(
            read_recording(&missing),
            Err(StorageError::NotFound(p)) if p == missing
        ));

        let empty = dir.path().join("empty.wav");
        fs::write(&empty, b"").unwrap();
        assert!(matches!(
            read_recording(&empty),
            Err(StorageError::EmptyInput(_))
        ));
    }

    #[test]
    fn read_recording_decodes_saved_file() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());
        let format = PcmFormat::new(48_000, 2, 16);
        let rec = store.save("stereo", &[1u8; 400], format).unwrap();

        let parsed = read_recording(&rec.file_path).unwrap();
        assert!(parsed.has_valid_header);
        assert_eq!(parsed.format(), format);
        assert_eq!(parsed.payload, vec![1u8; 400]);
    }

    #[test]
    fn find_by_name() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());
        store.save("x", &one_second(), PcmFormat::DEFAULT).unwrap();
        assert_eq!(store.find("x").unwrap().name, "x");
        assert!(matches!(store.find("y"), Err(StorageError::NotFound(_))));
    }

    /// A header whose fields are positive but whose byte rate overflows.
    fn overflowing_header_file(payload_len: usize) -> Vec<u8> {
        let mut bytes = wav::encode(&vec![0u8; payload_len], PcmFormat::DEFAULT).unwrap();
        bytes[24..28].copy_from_slice(&2_000_000_000i32.to_le_bytes());
        bytes[34..36].copy_from_slice(&32i16.to_le_bytes());
        bytes
    }

    #[test]
    fn overflowing_header_lists_and_reads_as_raw() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());
        let bytes = overflowing_header_file(88_156);
        fs::write(store.path_for("odd"), &bytes).unwrap();

        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].duration_ms, 1_000);

        let parsed = read_recording(&list[0].file_path).unwrap();
        assert!(!parsed.has_valid_header);
        assert_eq!(parsed.payload, bytes);
    }

    #[test]
    fn save_rejects_formats_without_a_header() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());
        assert!(matches!(
            store.save("huge", &one_second(), PcmFormat::new(2_000_000_000, 1, 32)),
            Err(StorageError::Wav(WavError::UnsupportedFormat(_)))
        ));
        assert!(!store.path_for("huge").exists());
    }

    #[test]
    fn rename_conflict_leaves_both_files_intact() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::new(dir.path());
        let a = store.save("a", &[1u8; 100], PcmFormat::DEFAULT).unwrap();
        let b = store.save("b", &[2u8; 200], PcmFormat::DEFAULT).unwrap();

        assert!(store.rename(&a, "b").is_err());
        assert_eq!(fs::read(&a.file_path).unwrap().len(), 144);
        assert_eq!(&fs::read(&b.file_path).unwrap()[44..], &[2u8; 200][..]);
    }
}
