//! # Tessera Testkit
//!
//! Test utilities for Tessera.
//!
//! This crate provides:
//! - Record batch fixtures and temporary archives
//! - A fault-injecting filesystem for I/O failure and backpressure tests
//! - Property-based test generators using proptest
//! - Tracing setup for test binaries
//!
//! The end-to-end store scenarios live in this crate's `tests/` directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tessera_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_faults() {
//!     init_tracing();
//!     let (memory, _) = memory_fs();
//!     let fs = Arc::new(FaultyFilesystem::new(memory));
//!     fs.fail_next_writes(1);
//!     // ... drive a store through the failure
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
