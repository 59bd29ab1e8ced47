//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// The engine log is the only writer. Offsets returned by [`append`] are
/// stable until the store is shrunk with [`shrink_to`].
///
/// # Invariants
///
/// - `append` writes at the current end and returns the offset it wrote at
/// - `read_at` returns exactly the bytes previously appended there
/// - `sync` makes every appended byte survive process termination
/// - `shrink_to` only ever removes a tail
///
/// [`append`]: StorageBackend::append
/// [`shrink_to`]: StorageBackend::shrink_to
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// if the range is not fully stored, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Reads every stored byte. Used by log replay and integrity checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the contents cannot be read.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        self.read_at(0, size as usize)
    }

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Makes all appended data and the store's length durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the number of stored bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Drops every byte at or after `len`.
    ///
    /// Used to clear a store on truncate-on-open and to cut a torn record
    /// off the end of the log during recovery.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidShrink`](crate::StorageError::InvalidShrink)
    /// if `len` is larger than the current size.
    fn shrink_to(&mut self, len: u64) -> StorageResult<()>;
}
