//! # Tessera Storage
//!
//! The filesystem collaborator used by Tessera's partition stores.
//!
//! A [`Filesystem`] is an **opaque blob store**: it reads, writes and removes
//! whole byte blobs at paths relative to its root. It has no knowledge of the
//! segment format; the stores own all interpretation of the bytes.
//!
//! ## Design Principles
//!
//! - Writes replace a blob atomically; readers never observe a torn file
//! - "Never written" ([`FsError::NotFound`]) is distinct from "failed" ([`FsError::Io`])
//! - Must be `Send + Sync` so every store task can share one handle
//!
//! ## Available Implementations
//!
//! - [`InMemoryFilesystem`] - For testing and ephemeral storage
//! - [`LocalFilesystem`] - Rooted directory on the local disk
//!
//! ## Example
//!
//! ```rust
//! use std::path::Path;
//! use tessera_storage::{Filesystem, InMemoryFilesystem};
//!
//! let fs = InMemoryFilesystem::new();
//! fs.write(Path::new("archive/a.store"), b"hello").unwrap();
//! assert_eq!(fs.read(Path::new("archive/a.store")).unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod filesystem;
mod local;
mod memory;

pub use error::{FsError, FsResult};
pub use filesystem::Filesystem;
pub use local::LocalFilesystem;
pub use memory::InMemoryFilesystem;
