//! Store directory layout and the single-session lock.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK          # Advisory lock held by the open session
//! └─ cedrus.log    # Journal
//! ```

use crate::error::{EngineError, EngineResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "cedrus.log";

/// An open store directory.
///
/// Holds an exclusive advisory lock on `LOCK` for as long as it lives, so at
/// most one session mutates a given path.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens (and optionally creates) the directory at `path` and locks it.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidPath`] if the directory is missing and
    ///   `create_if_missing` is false, or `path` is not a directory
    /// - [`EngineError::Locked`] if another session holds the lock
    /// - I/O errors
    pub fn open(path: &Path, create_if_missing: bool) -> EngineResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(EngineError::invalid_path(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(EngineError::invalid_path(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the journal file path.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }
}
