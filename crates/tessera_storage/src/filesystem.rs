//! Filesystem trait definition.

use crate::error::FsResult;
use std::path::Path;

/// A blob store addressed by relative paths.
///
/// Implementations are **opaque byte stores**. Tessera's stores decide what
/// goes into a blob; the filesystem only keeps it safe.
///
/// # Invariants
///
/// - `read` returns exactly the bytes of the last successful `write`
/// - `write` is all-or-nothing: after a failure the previous content is intact
/// - `read` and `remove` of an absent path fail with [`crate::FsError::NotFound`]
/// - Implementations must be `Send + Sync` for sharing between store tasks
///
/// Calls block the current thread; async callers should move them onto a
/// blocking pool.
pub trait Filesystem: Send + Sync + std::fmt::Debug {
    /// Reads the whole blob at `path`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing was written at `path`, or `Io` if the
    /// read fails.
    fn read(&self, path: &Path) -> FsResult<Vec<u8>>;

    /// Atomically replaces the blob at `path` with `data`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the data cannot be made durable. The previous blob, if
    /// any, is left untouched.
    fn write(&self, path: &Path, data: &[u8]) -> FsResult<()>;

    /// Removes the blob at `path`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing exists at `path`, or `Io` on failure.
    fn remove(&self, path: &Path) -> FsResult<()>;

    /// Returns true if a blob exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if existence cannot be determined.
    fn exists(&self, path: &Path) -> FsResult<bool>;
}
