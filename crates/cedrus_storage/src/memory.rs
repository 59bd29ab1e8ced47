//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A backend over a shared in-process buffer.
///
/// Clones share the same buffer. A test can hand one clone to an engine and
/// keep another to inspect or damage the bytes the engine wrote.
///
/// # Example
///
/// ```rust
/// use cedrus_storage::{InMemoryBackend, StorageBackend};
///
/// let observer = InMemoryBackend::new();
/// let mut writer = observer.clone();
/// writer.append(b"abc").unwrap();
/// assert_eq!(observer.contents(), b"abc");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    buf: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            buf: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.buf.read().clone()
    }

    /// Runs `f` with mutable access to the raw buffer.
    ///
    /// Intended for tests that simulate torn writes or bit rot.
    pub fn modify<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        f(&mut self.buf.write())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let buf = self.buf.read();
        let size = buf.len() as u64;
        let start = usize::try_from(offset).ok();
        match start.and_then(|s| s.checked_add(len).map(|e| (s, e))) {
            Some((s, e)) if e <= buf.len() => Ok(buf[s..e].to_vec()),
            _ => Err(StorageError::ReadPastEnd { offset, len, size }),
        }
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.contents())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut buf = self.buf.write();
        let offset = buf.len() as u64;
        buf.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.buf.read().len() as u64)
    }

    fn shrink_to(&mut self, len: u64) -> StorageResult<()> {
        let mut buf = self.buf.write();
        let size = buf.len() as u64;
        if len > size {
            return Err(StorageError::InvalidShrink {
                requested: len,
                size,
            });
        }
        buf.truncate(len as usize);
        Ok(())
    }
}
