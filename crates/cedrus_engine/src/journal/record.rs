//! Log record types and their payload encoding.

use crate::error::{EngineError, EngineResult};
use crate::key::Digest;

/// Type tag of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// A single put.
    Put = 1,
    /// A single delete.
    Delete = 2,
    /// A committed write batch.
    Batch = 3,
}

impl RecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            3 => Some(Self::Batch),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One mutation of the slot table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Insert or overwrite.
    Put {
        /// Addressed digest.
        digest: Digest,
        /// New value.
        value: Vec<u8>,
    },
    /// Removal.
    Delete {
        /// Addressed digest.
        digest: Digest,
    },
}

impl Op {
    /// Returns the digest this op addresses.
    #[must_use]
    pub fn digest(&self) -> &[u8] {
        match self {
            Self::Put { digest, .. } | Self::Delete { digest } => &**digest,
        }
    }
}

/// A log record. Replaying every record in order rebuilds the slot table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A single put or delete.
    Single(Op),
    /// The operations of one committed batch, applied together.
    Batch(Vec<Op>),
}

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

impl Record {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Single(Op::Put { .. }) => RecordType::Put,
            Self::Single(Op::Delete { .. }) => RecordType::Delete,
            Self::Batch(_) => RecordType::Batch,
        }
    }

    /// Returns the operations carried by this record, in apply order.
    #[must_use]
    pub fn ops(&self) -> &[Op] {
        match self {
            Self::Single(op) => std::slice::from_ref(op),
            Self::Batch(ops) => ops,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TooLarge`] if a digest, a value or the batch
    /// does not fit its length field.
    pub fn encode_payload(&self) -> EngineResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::Single(op) => encode_op(&mut buf, op)?,
            Self::Batch(ops) => {
                let count =
                    u32::try_from(ops.len()).map_err(|_| EngineError::TooLarge { len: ops.len() })?;
                buf.extend_from_slice(&count.to_le_bytes());
                for op in ops {
                    buf.push(match op {
                        Op::Put { .. } => OP_PUT,
                        Op::Delete { .. } => OP_DELETE,
                    });
                    encode_op(&mut buf, op)?;
                }
            }
        }
        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// `offset` is only used to locate errors.
    pub fn decode_payload(
        record_type: RecordType,
        payload: &[u8],
        offset: u64,
    ) -> EngineResult<Self> {
        let mut cursor = Cursor {
            payload,
            pos: 0,
            offset,
        };
        let record = match record_type {
            RecordType::Put => Self::Single(cursor.op(OP_PUT)?),
            RecordType::Delete => Self::Single(cursor.op(OP_DELETE)?),
            RecordType::Batch => {
                let count = cursor.u32()? as usize;
                let mut ops = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let tag = cursor.u8()?;
                    ops.push(cursor.op(tag)?);
                }
                Self::Batch(ops)
            }
        };
        if cursor.pos != payload.len() {
            return Err(EngineError::corrupted(
                offset,
                format!(
                    "trailing bytes in {:?} record: decoded {} of {}",
                    record_type,
                    cursor.pos,
                    payload.len()
                ),
            ));
        }
        Ok(record)
    }
}

fn encode_op(buf: &mut Vec<u8>, op: &Op) -> EngineResult<()> {
    let digest = op.digest();
    let digest_len =
        u16::try_from(digest.len()).map_err(|_| EngineError::TooLarge { len: digest.len() })?;
    buf.extend_from_slice(&digest_len.to_le_bytes());
    buf.extend_from_slice(digest);
    if let Op::Put { value, .. } = op {
        let len = u32::try_from(value.len()).map_err(|_| EngineError::TooLarge { len: value.len() })?;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(value);
    }
    Ok(())
}

struct Cursor<'a> {
    payload: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> EngineResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.payload.len())
            .ok_or_else(|| EngineError::corrupted(self.offset, "unexpected end of payload"))?;
        let bytes = &self.payload[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> EngineResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> EngineResult<u16> {
        let mut bytes = [0u8; 2];
        bytes.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(bytes))
    }

    fn u32(&mut self) -> EngineResult<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    fn op(&mut self, tag: u8) -> EngineResult<Op> {
        let digest_len = self.u16()? as usize;
        let digest: Digest = self.take(digest_len)?.into();
        match tag {
            OP_PUT => {
                let len = self.u32()? as usize;
                let value = self.take(len)?.to_vec();
                Ok(Op::Put { digest, value })
            }
            OP_DELETE => Ok(Op::Delete { digest }),
            other => Err(EngineError::corrupted(
                self.offset,
                format!("unknown op tag {other}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(b: u8) -> Digest {
        vec![b; 32].into_boxed_slice()
    }

    #[test]
    fn record_type_from_byte() {
        assert_eq!(RecordType::from_byte(3), Some(RecordType::Batch));
        assert_eq!(RecordType::from_byte(0), None);
        assert_eq!(RecordType::from_byte(9), None);
    }

    #[test]
    fn batch_preserves_op_order() {
        let record = Record::Batch(vec![
            Op::Put {
                digest: digest(1),
                value: b"one".to_vec(),
            },
            Op::Delete { digest: digest(1) },
            Op::Put {
                digest: digest(2),
                value: Vec::new(),
            },
        ]);
        let payload = record.encode_payload().unwrap();
        let decoded = Record::decode_payload(RecordType::Batch, &payload, 0).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.ops()[1].digest(), &*digest(1));
    }

    #[test]
    fn digests_of_any_width_are_kept() {
        let record = Record::Single(Op::Delete {
            digest: vec![7u8; 5].into_boxed_slice(),
        });
        let payload = record.encode_payload().unwrap();
        assert_eq!(
            Record::decode_payload(RecordType::Delete, &payload, 0).unwrap(),
            record
        );
    }

    #[test]
    fn truncated_payload_is_corruption() {
        let record = Record::Single(Op::Put {
            digest: digest(3),
            value: b"value".to_vec(),
        });
        let payload = record.encode_payload().unwrap();
        let err = Record::decode_payload(RecordType::Put, &payload[..payload.len() - 1], 40)
            .unwrap_err();
        assert!(matches!(err, EngineError::Corrupted { offset: 40, .. }));
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut payload = Record::Single(Op::Delete { digest: digest(4) })
            .encode_payload()
            .unwrap();
        payload.push(0);
        assert!(Record::decode_payload(RecordType::Delete, &payload, 0).is_err());
    }

    #[test]
    fn unknown_batch_op_tag_is_corruption() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.push(9);
        payload.extend_from_slice(&0u16.to_le_bytes());
        assert!(Record::decode_payload(RecordType::Batch, &payload, 0).is_err());
    }
}
