//! Key addressing modes and the store-wide digest.
//!
//! Every value is addressed by a digest of [`HASH_WIDTH`] bytes. A caller
//! either hands over the raw key and lets the engine hash it, or supplies a
//! digest it computed itself. Pre-hashed keys are used verbatim; the engine
//! never checks their width.

use crate::error::{EngineError, EngineResult};
use sha2::{Digest as _, Sha256};
use std::borrow::Cow;

/// Width in bytes of the digest that addresses a value.
#[cfg(feature = "hash-64")]
pub const HASH_WIDTH: usize = 8;

/// Width in bytes of the digest that addresses a value.
#[cfg(all(feature = "hash-128", not(feature = "hash-64")))]
pub const HASH_WIDTH: usize = 16;

/// Width in bytes of the digest that addresses a value.
#[cfg(not(any(feature = "hash-64", feature = "hash-128")))]
pub const HASH_WIDTH: usize = 32;

/// An owned digest, as stored in the slot table and the log.
pub type Digest = Box<[u8]>;

/// A key in one of the two addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'a> {
    /// A raw key, hashed by the engine before lookup.
    Raw(&'a [u8]),
    /// A caller-computed digest, used as-is.
    Hashed(&'a [u8]),
}

impl<'a> Key<'a> {
    /// Resolves the key to the digest the engine addresses it by.
    #[must_use]
    pub fn digest(self) -> Cow<'a, [u8]> {
        match self {
            Self::Raw(raw) => Cow::Owned(hash_key(raw).into_vec()),
            Self::Hashed(hash) => Cow::Borrowed(hash),
        }
    }

    /// Returns true for the pre-hashed mode.
    #[must_use]
    pub fn is_hashed(self) -> bool {
        matches!(self, Self::Hashed(_))
    }
}

/// Computes the store digest of a raw key.
///
/// This is the first [`HASH_WIDTH`] bytes of the key's SHA-256.
#[must_use]
pub fn hash_key(raw: &[u8]) -> Digest {
    let full = Sha256::digest(raw);
    full[..HASH_WIDTH].into()
}

/// Checks that a pre-hashed key has the configured digest width.
///
/// The engine itself never calls this; the access layer runs it in debug
/// builds so a width mismatch surfaces as an error instead of a key that can
/// never be found.
///
/// # Errors
///
/// Returns [`EngineError::HashWidth`] if the lengths differ.
pub fn check_hash_width(hash: &[u8]) -> EngineResult<()> {
    if hash.len() == HASH_WIDTH {
        Ok(())
    } else {
        Err(EngineError::HashWidth {
            expected: HASH_WIDTH,
            actual: hash.len(),
        })
    }
}
