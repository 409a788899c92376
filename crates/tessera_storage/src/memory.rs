//! In-memory filesystem for testing.

use crate::error::{FsError, FsResult};
use crate::filesystem::Filesystem;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An in-memory filesystem.
///
/// Stores every blob in a map keyed by path. Suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// Writes replace the whole entry under a single lock, so they are atomic.
///
/// # Example
///
/// ```rust
/// use std::path::Path;
/// use tessera_storage::{Filesystem, InMemoryFilesystem};
///
/// let fs = InMemoryFilesystem::new();
/// fs.write(Path::new("archive/a.store"), b"test data").unwrap();
/// assert_eq!(fs.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryFilesystem {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl InMemoryFilesystem {
    /// Creates a new empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the paths of all stored blobs, in sorted order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.read().keys().cloned().collect()
    }

    /// Returns the number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Returns true if no blob is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl Filesystem for InMemoryFilesystem {
    fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::not_found(path))
    }

    fn write(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        self.files.write().insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn remove(&self, path: &Path) -> FsResult<()> {
        self.files
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FsError::not_found(path))
    }

    fn exists(&self, path: &Path) -> FsResult<bool> {
        Ok(self.files.read().contains_key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let fs = InMemoryFilesystem::new();
        assert!(fs.is_empty());
        assert!(fs.paths().is_empty());
    }

    #[test]
    fn memory_write_and_read() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("a"), b"hello").unwrap();
        assert_eq!(fs.read(Path::new("a")).unwrap(), b"hello");
    }

    #[test]
    fn memory_overwrite() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("a"), b"hello").unwrap();
        fs.write(Path::new("a"), b"bye").unwrap();
        assert_eq!(fs.read(Path::new("a")).unwrap(), b"bye");
        assert_eq!(fs.len(), 1);
    }

    #[test]
    fn memory_read_missing_is_not_found() {
        let fs = InMemoryFilesystem::new();
        let err = fs.read(Path::new("missing")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn memory_remove() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("a"), b"x").unwrap();
        fs.remove(Path::new("a")).unwrap();
        assert!(!fs.exists(Path::new("a")).unwrap());
        assert!(fs.remove(Path::new("a")).unwrap_err().is_not_found());
    }

    #[test]
    fn memory_paths_sorted() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("b"), b"2").unwrap();
        fs.write(Path::new("a"), b"1").unwrap();
        assert_eq!(fs.paths(), vec![PathBuf::from("a"), PathBuf::from("b")]);
    }
}
