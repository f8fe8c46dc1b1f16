//! Synchronous filesystem layer.
//!
//! This module centralizes path handling and raw file IO for the store:
//!
//! - [`StoreLocation`] maps a frame root directory to the files inside it.
//! - [`write_atomic`] gives chunk and side-file rewrites replace semantics:
//!   the payload goes to a temporary file next to the target, is synced,
//!   and is renamed into place, so readers never observe a half-written
//!   file through the normal path.
//! - Reads special-case `NotFound` so callers can distinguish "file is
//!   absent" (the integrity check cares) from other IO failures.
//!
//! Everything here is blocking and runs to completion; there are no
//! suspension points anywhere in the store. The API is shaped so that a
//! future object-storage backend could slot in without rewriting the frame
//! and collection layers.

use snafu::{Backtrace, prelude::*};
use std::{
    error::Error,
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// The root location of a frame or collection on a storage medium.
///
/// Currently only the local filesystem is supported.
#[derive(Clone, Debug)]
pub enum StoreLocation {
    /// A directory on the local filesystem.
    Local(PathBuf),
}

impl StoreLocation {
    /// A location rooted at a local directory.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        StoreLocation::Local(root.into())
    }

    /// The root path of this location.
    pub fn root(&self) -> &Path {
        match self {
            StoreLocation::Local(p) => p,
        }
    }

    /// Join a relative path onto the root.
    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root().join(rel)
    }
}

/// Backend-specific IO failure, wrapped so higher layers stay
/// backend-agnostic.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem IO error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors produced by the storage layer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The specified path was not found.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error.
        source: BackendError,
        /// Backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// Any other IO error.
    #[snafu(display("I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the error occurred.
        path: String,
        /// Underlying backend error.
        source: BackendError,
        /// Backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// Whether this error means the target simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

fn other_io(path: &Path, e: io::Error) -> StorageError {
    StorageError::OtherIo {
        path: path.display().to_string(),
        source: BackendError::Local(e),
        backtrace: Backtrace::capture(),
    }
}

fn classify(path: &Path, e: io::Error) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound {
            path: path.display().to_string(),
            source: BackendError::Local(e),
            backtrace: Backtrace::capture(),
        }
    } else {
        other_io(path, e)
    }
}

/// Guard that removes a temporary file on drop unless disarmed.
/// Ensures cleanup on error paths during atomic writes.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best-effort cleanup; we're likely already handling another error.
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Write `contents` to `rel_path` inside `location` with replace semantics.
///
/// Writes to a temporary file next to the target, syncs it, then renames it
/// into place. Parent directories are created as needed.
pub fn write_atomic(location: &StoreLocation, rel_path: &Path, contents: &[u8]) -> StorageResult<()> {
    let abs = location.join(rel_path);

    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent).map_err(|e| other_io(parent, e))?;
    }

    let tmp_path = abs.with_extension("tmp");
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let mut file = fs::File::create(&tmp_path).map_err(|e| other_io(&tmp_path, e))?;
        file.write_all(contents).map_err(|e| other_io(&tmp_path, e))?;
        file.sync_all().map_err(|e| other_io(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, &abs).map_err(|e| other_io(&abs, e))?;

    // Renamed into place; nothing left to clean up.
    guard.disarm();
    Ok(())
}

/// Read the full contents of `rel_path` within `location`.
///
/// A missing file maps to [`StorageError::NotFound`]; any other problem to
/// [`StorageError::OtherIo`].
pub fn read_all_bytes(location: &StoreLocation, rel_path: &Path) -> StorageResult<Vec<u8>> {
    let abs = location.join(rel_path);
    fs::read(&abs).map_err(|e| classify(&abs, e))
}

/// Read `rel_path` within `location` as a UTF-8 string.
pub fn read_to_string(location: &StoreLocation, rel_path: &Path) -> StorageResult<String> {
    let abs = location.join(rel_path);
    fs::read_to_string(&abs).map_err(|e| classify(&abs, e))
}

/// Whether `rel_path` exists as a regular file within `location`.
pub fn file_exists(location: &StoreLocation, rel_path: &Path) -> bool {
    location.join(rel_path).is_file()
}

/// Remove the file at `rel_path` within `location`.
pub fn remove_file(location: &StoreLocation, rel_path: &Path) -> StorageResult<()> {
    let abs = location.join(rel_path);
    fs::remove_file(&abs).map_err(|e| classify(&abs, e))
}

/// Remove the whole directory tree rooted at `location`.
pub fn remove_root(location: &StoreLocation) -> StorageResult<()> {
    let root = location.root();
    fs::remove_dir_all(root).map_err(|e| classify(root, e))
}

/// List the file names directly under `location`'s root, sorted.
pub fn list_files(location: &StoreLocation) -> StorageResult<Vec<String>> {
    let root = location.root();
    let mut names = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| classify(root, e))? {
        let entry = entry.map_err(|e| other_io(root, e))?;
        let path = entry.path();
        if path.is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// List the directory names directly under `location`'s root, sorted.
pub fn list_dirs(location: &StoreLocation) -> StorageResult<Vec<String>> {
    let root = location.root();
    let mut names = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| classify(root, e))? {
        let entry = entry.map_err(|e| other_io(root, e))?;
        let path = entry.path();
        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
