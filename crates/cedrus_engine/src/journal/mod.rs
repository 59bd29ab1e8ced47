//! The engine's append-only journal.
//!
//! Every completed mutation is one framed record:
//!
//! ```text
//! magic (4) | version (2) | type (1) | payload len (4) | payload | crc32 (4)
//! ```
//!
//! The checksum covers everything before it. A record cut short at the end
//! of the journal is a torn write and marks the end of the log; a checksum
//! or framing failure anywhere is corruption.

mod record;

pub use record::{Op, Record, RecordType};

use crate::error::{EngineError, EngineResult};
use cedrus_storage::StorageBackend;
use parking_lot::Mutex;

/// Magic bytes identifying a journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"CDRJ";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

const HEADER_SIZE: usize = 11;
const CRC_SIZE: usize = 4;

/// Result of decoding a journal image.
#[derive(Debug, Default)]
pub struct Scan {
    /// Every intact record, with its offset.
    pub records: Vec<(u64, Record)>,
    /// Length of the intact prefix.
    pub valid_len: u64,
    /// Bytes past `valid_len` that form an incomplete record.
    pub torn_bytes: u64,
}

/// Frames records onto a storage backend and reads them back.
pub struct Journal {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_write: bool,
}

impl Journal {
    /// Creates a journal over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_write,
        }
    }

    /// Appends one record and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or written.
    pub fn append(&self, record: &Record) -> EngineResult<u64> {
        let frame = encode_frame(record)?;
        let mut backend = self.backend.lock();
        let offset = backend.append(&frame)?;
        if self.sync_on_write {
            backend.flush()?;
        }
        Ok(offset)
    }

    /// Reads and decodes the whole journal.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Corrupted`] for a damaged record, or a storage
    /// error if the backend cannot be read.
    pub fn scan(&self) -> EngineResult<Scan> {
        let image = self.backend.lock().read_all()?;
        decode_image(&image)
    }

    /// Cuts the journal back to `len` bytes.
    pub fn shrink_to(&self, len: u64) -> EngineResult<()> {
        self.backend.lock().shrink_to(len)?;
        Ok(())
    }

    /// Returns the journal size in bytes.
    pub fn size(&self) -> EngineResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Flushes and syncs everything appended so far.
    pub fn sync(&self) -> EngineResult<()> {
        let mut backend = self.backend.lock();
        backend.flush()?;
        backend.sync()?;
        Ok(())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

/// Builds the framed bytes for one record.
pub fn encode_frame(record: &Record) -> EngineResult<Vec<u8>> {
    let payload = record.encode_payload()?;
    let len = u32::try_from(payload.len()).map_err(|_| EngineError::TooLarge {
        len: payload.len(),
    })?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    frame.push(record.record_type().as_byte());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Decodes a complete journal image.
///
/// # Errors
///
/// Returns [`EngineError::Corrupted`] on the first record with bad magic,
/// version, type, checksum or payload.
pub fn decode_image(image: &[u8]) -> EngineResult<Scan> {
    let mut scan = Scan::default();
    let mut pos = 0usize;

    while pos < image.len() {
        let offset = pos as u64;
        let rest = &image[pos..];
        if rest.len() < HEADER_SIZE {
            scan.torn_bytes = rest.len() as u64;
            break;
        }
        if rest[..4] != JOURNAL_MAGIC {
            return Err(EngineError::corrupted(offset, "bad record magic"));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version != JOURNAL_VERSION {
            return Err(EngineError::corrupted(
                offset,
                format!("unsupported journal version {version}"),
            ));
        }
        let record_type = RecordType::from_byte(rest[6]).ok_or_else(|| {
            EngineError::corrupted(offset, format!("unknown record type {}", rest[6]))
        })?;
        let payload_len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;
        let frame_len = HEADER_SIZE + payload_len + CRC_SIZE;
        if rest.len() < frame_len {
            // A damaged length field also overruns the image; records after
            // it must not be mistaken for a torn tail.
            if let Some(next) = next_intact_frame(&rest[1..]) {
                return Err(EngineError::corrupted(
                    offset,
                    format!(
                        "record length {payload_len} overruns an intact record at offset {}",
                        offset + 1 + next as u64
                    ),
                ));
            }
            scan.torn_bytes = rest.len() as u64;
            break;
        }

        let body = &rest[..HEADER_SIZE + payload_len];
        let stored = u32::from_le_bytes([
            rest[frame_len - 4],
            rest[frame_len - 3],
            rest[frame_len - 2],
            rest[frame_len - 1],
        ]);
        let actual = crc32fast::hash(body);
        if stored != actual {
            return Err(EngineError::corrupted(
                offset,
                format!("checksum mismatch: stored {stored:08x}, computed {actual:08x}"),
            ));
        }

        let record = Record::decode_payload(record_type, &body[HEADER_SIZE..], offset)?;
        scan.records.push((offset, record));
        pos += frame_len;
        scan.valid_len = pos as u64;
    }

    Ok(scan)
}

/// Returns the position of the first complete, checksum-valid frame in
/// `bytes`.
fn next_intact_frame(bytes: &[u8]) -> Option<usize> {
    (0..bytes.len())
        .filter(|&pos| bytes[pos..].starts_with(&JOURNAL_MAGIC))
        .find(|&pos| is_intact_frame(&bytes[pos..]))
}

fn is_intact_frame(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_SIZE + CRC_SIZE
        || u16::from_le_bytes([bytes[4], bytes[5]]) != JOURNAL_VERSION
        || RecordType::from_byte(bytes[6]).is_none()
    {
        return false;
    }
    let payload_len = u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]) as usize;
    let body_len = HEADER_SIZE + payload_len;
    let Some(stored) = bytes.get(body_len..body_len + CRC_SIZE) else {
        return false;
    };
    let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
    stored == crc32fast::hash(&bytes[..body_len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use cedrus_storage::InMemoryBackend;

    fn put(d: u8, v: &[u8]) -> Record {
        Record::Single(Op::Put {
            digest: vec![d; 32].into_boxed_slice(),
            value: v.to_vec(),
        })
    }

    #[test]
    fn appended_records_scan_back_in_order() {
        let journal = Journal::new(Box::new(InMemoryBackend::new()), false);
        let first = journal.append(&put(1, b"a")).unwrap();
        let second = journal.append(&put(2, b"b")).unwrap();

        let scan = journal.scan().unwrap();
        assert_eq!(first, 0);
        assert_eq!(
            scan.records,
            vec![(first, put(1, b"a")), (second, put(2, b"b"))]
        );
        assert_eq!(scan.valid_len, journal.size().unwrap());
        assert_eq!(scan.torn_bytes, 0);
    }

    #[test]
    fn empty_journal_scans_empty() {
        let scan = decode_image(&[]).unwrap();
        assert!(scan.records.is_empty());
        assert_eq!(scan.valid_len, 0);
    }

    #[test]
    fn torn_tail_ends_the_scan() {
        let mut image = encode_frame(&put(1, b"kept")).unwrap();
        let intact = image.len() as u64;
        let second = encode_frame(&put(2, b"torn")).unwrap();
        image.extend_from_slice(&second[..second.len() - 3]);

        let scan = decode_image(&image).unwrap();
        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.valid_len, intact);
        assert_eq!(scan.torn_bytes, second.len() as u64 - 3);
    }

    #[test]
    fn flipped_payload_bit_fails_checksum() {
        let mut image = encode_frame(&put(1, b"value")).unwrap();
        image[HEADER_SIZE + 3] ^= 0x01;

        let err = decode_image(&image).unwrap_err();
        assert!(matches!(err, EngineError::Corrupted { offset: 0, .. }));
    }

    #[test]
    fn damaged_length_before_intact_records_is_corruption() {
        let mut image = encode_frame(&put(1, b"first")).unwrap();
        image.extend(encode_frame(&put(2, b"second")).unwrap());
        image.extend(encode_frame(&put(3, b"third")).unwrap());
        // High byte of the first record's payload length.
        image[10] = 0x7f;

        let err = decode_image(&image).unwrap_err();
        assert!(matches!(err, EngineError::Corrupted { offset: 0, .. }));
    }

    #[test]
    fn damaged_length_of_last_record_is_torn() {
        let mut image = encode_frame(&put(1, b"kept")).unwrap();
        let intact = image.len();
        image.extend(encode_frame(&put(2, b"last")).unwrap());
        image[intact + 10] = 0x7f;

        let scan = decode_image(&image).unwrap();
        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.valid_len, intact as u64);
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut image = encode_frame(&put(1, b"value")).unwrap();
        image[0] = b'X';
        assert!(decode_image(&image).is_err());
    }

    #[test]
    fn shrink_drops_tail() {
        let journal = Journal::new(Box::new(InMemoryBackend::new()), true);
        journal.append(&put(1, b"a")).unwrap();
        let size = journal.size().unwrap();
        journal.append(&put(2, b"b")).unwrap();

        journal.shrink_to(size).unwrap();
        assert_eq!(journal.scan().unwrap().records.len(), 1);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;
        use proptest::prelude::prop;

        proptest! {
            #[test]
            fn any_cut_is_a_torn_tail(
                values in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 1..8),
                cut in any::<prop::sample::Index>(),
            ) {
                let mut image = Vec::new();
                let mut ends = Vec::new();
                for (i, value) in values.iter().enumerate() {
                    image.extend(encode_frame(&put(i as u8, value)).unwrap());
                    ends.push(image.len());
                }
                let cut = cut.index(image.len() + 1);

                let scan = decode_image(&image[..cut]).unwrap();
                let whole = ends.iter().filter(|end| **end <= cut).count();
                prop_assert_eq!(scan.records.len(), whole);
                prop_assert_eq!(scan.valid_len + scan.torn_bytes, cut as u64);
            }
        }
    }
}
