//! Property-based test generators using proptest.
//!
//! Keys are drawn from a small alphabet so that generated operation
//! sequences revisit keys often enough to exercise updates and deletes.

use proptest::prelude::*;

/// One single-key store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `put(key, value)`.
    Put(Vec<u8>, Vec<u8>),
    /// `delete(key)`.
    Delete(Vec<u8>),
    /// `get(key)`.
    Get(Vec<u8>),
}

/// Strategy for keys, including the empty key.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(b'a'..=b'e', 0..3)
}

/// Strategy for arbitrary values, including empty ones.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for one store operation.
pub fn op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        3 => (key_strategy(), value_strategy()).prop_map(|(k, v)| StoreOp::Put(k, v)),
        2 => key_strategy().prop_map(StoreOp::Delete),
        2 => key_strategy().prop_map(StoreOp::Get),
    ]
}

/// Strategy for a sequence of store operations.
pub fn op_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(op_strategy(), 0..max_len)
}

/// Strategy for a batch: puts of distinct keys drawn from a wide space.
pub fn batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    prop::collection::hash_map(
        prop::collection::vec(any::<u8>(), 1..16),
        value_strategy(),
        0..max_len,
    )
    .prop_map(|entries| entries.into_iter().collect())
}
