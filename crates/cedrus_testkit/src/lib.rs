//! # Cedrus Testkit
//!
//! Test utilities for CedrusDB.
//!
//! This crate provides:
//! - Test fixtures and store helpers
//! - An instrumented engine that counts guards and gates commits
//! - Property-based test generators using proptest
//! - Log capture for tests
//!
//! ## Usage
//!
//! ```rust
//! use cedrus_testkit::prelude::*;
//!
//! with_memory_store(|store| {
//!     store.put(b"k", b"v").unwrap();
//!     assert_eq!(store.get(b"k").unwrap().bytes(), Some(&b"v"[..]));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod instrumented;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::instrumented::*;
    pub use crate::logging::*;
}

pub use fixtures::*;
pub use generators::*;
pub use instrumented::*;
pub use logging::*;
