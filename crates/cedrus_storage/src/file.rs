//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A backend over one file on the local file system.
///
/// The file handle and the tracked length sit behind a single mutex, so an
/// append and the length it produces are always observed together.
///
/// # Example
///
/// ```no_run
/// use cedrus_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("cedrus.log"), false).unwrap();
/// backend.append(b"record").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    state: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    len: u64,
}

impl FileBackend {
    /// Opens or creates the file at `path`.
    ///
    /// With `truncate` set, any existing contents are discarded before the
    /// backend is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, created or truncated.
    pub fn open(path: &Path, truncate: bool) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(FileState { file, len }),
        })
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut state = self.state.lock();
        let size = state.len;
        match offset.checked_add(len as u64) {
            Some(end) if end <= size => {}
            _ => return Err(StorageError::ReadPastEnd { offset, len, size }),
        }

        let mut buf = vec![0u8; len];
        if len > 0 {
            state.file.seek(SeekFrom::Start(offset))?;
            state.file.read_exact(&mut buf)?;
        }
        Ok(buf)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let state = self.state.get_mut();
        let offset = state.len;
        if !data.is_empty() {
            state.file.seek(SeekFrom::Start(offset))?;
            state.file.write_all(data)?;
            state.len += data.len() as u64;
        }
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.state.get_mut().file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.state.get_mut().file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.state.lock().len)
    }

    fn shrink_to(&mut self, len: u64) -> StorageResult<()> {
        let state = self.state.get_mut();
        if len > state.len {
            return Err(StorageError::InvalidShrink {
                requested: len,
                size: state.len,
            });
        }
        state.file.set_len(len)?;
        state.file.sync_all()?;
        state.len = len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cedrus.log");

        let backend = FileBackend::open(&path, false).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert_eq!(backend.path(), path);
        assert!(path.exists());
    }

    #[test]
    fn appends_at_the_end() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("cedrus.log"), false).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b"world").unwrap(), 5);
        assert_eq!(backend.read_at(5, 5).unwrap(), b"world");
        assert_eq!(backend.read_all().unwrap(), b"helloworld");
    }

    #[test]
    fn empty_append_keeps_offset() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("cedrus.log"), false).unwrap();

        backend.append(b"x").unwrap();
        assert_eq!(backend.append(b"").unwrap(), 1);
        assert_eq!(backend.size().unwrap(), 1);
        assert!(backend.read_at(1, 0).unwrap().is_empty());
    }

    #[test]
    fn read_past_end_is_rejected() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("cedrus.log"), false).unwrap();
        backend.append(b"abc").unwrap();

        assert!(matches!(
            backend.read_at(2, 5),
            Err(StorageError::ReadPastEnd { size: 3, .. })
        ));
        assert!(matches!(
            backend.read_at(u64::MAX, 1),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn contents_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cedrus.log");
        {
            let mut backend = FileBackend::open(&path, false).unwrap();
            backend.append(b"durable").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path, false).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"durable");
    }

    #[test]
    fn truncate_on_open_discards_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cedrus.log");
        {
            let mut backend = FileBackend::open(&path, false).unwrap();
            backend.append(b"stale").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path, true).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn shrink_cuts_the_tail() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("cedrus.log"), false).unwrap();
        backend.append(b"keep-torn").unwrap();

        backend.shrink_to(4).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"keep");
        assert_eq!(backend.append(b"!").unwrap(), 4);

        assert!(matches!(
            backend.shrink_to(100),
            Err(StorageError::InvalidShrink { requested: 100, size: 5 })
        ));
    }
}
