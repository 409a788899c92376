//! Local-disk filesystem rooted at a directory.

use crate::error::{FsError, FsResult};
use crate::filesystem::Filesystem;
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Name of the advisory lock file inside the root directory.
const LOCK_FILE: &str = "LOCK";

/// Suffix of the temporary file a write goes through before the rename.
const TEMP_SUFFIX: &str = ".tmp";

/// A filesystem rooted at a directory on the local disk.
///
/// All paths handed to the [`Filesystem`] methods are relative to the root.
///
/// # Durability
///
/// `write` uses the write-then-rename pattern:
/// 1. Write the data to `<path>.tmp`
/// 2. `sync_all` the temporary file
/// 3. Rename it over `<path>`
/// 4. Fsync the parent directory so the rename itself is durable
///
/// A crash at any point leaves either the old or the new blob, never a mix.
///
/// # Locking
///
/// The root holds an exclusive advisory lock on `LOCK` for the lifetime of
/// the value, so only one process writes to an archive at a time.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use tessera_storage::{Filesystem, LocalFilesystem};
///
/// let fs = LocalFilesystem::open(Path::new("/var/lib/tessera")).unwrap();
/// fs.write(Path::new("archive/x.store"), b"segment bytes").unwrap();
/// ```
#[derive(Debug)]
pub struct LocalFilesystem {
    root: PathBuf,
    _lock_file: File,
}

impl LocalFilesystem {
    /// Opens (creating if needed) the root directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns `Locked` if another process holds the lock, or `Io` if the
    /// directory cannot be created.
    pub fn open(root: &Path) -> FsResult<Self> {
        fs::create_dir_all(root)?;

        let lock_path = root.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(FsError::Locked {
                path: root.to_path_buf(),
            });
        }

        Ok(Self {
            root: root.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> FsResult<PathBuf> {
        if path.is_absolute() {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("expected a path relative to the root: {}", path.display()),
            )));
        }
        Ok(self.root.join(path))
    }

    fn map_not_found(err: io::Error, path: &Path) -> FsError {
        if err.kind() == io::ErrorKind::NotFound {
            FsError::not_found(path)
        } else {
            FsError::Io(err)
        }
    }

    fn temp_path(target: &Path) -> PathBuf {
        let mut name = OsString::from(target.as_os_str());
        name.push(TEMP_SUFFIX);
        PathBuf::from(name)
    }

    fn write_temp(temp: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = File::create(temp)?;
        file.write_all(data)?;
        file.sync_all()
    }

    #[cfg(unix)]
    fn sync_parent(target: &Path) -> io::Result<()> {
        if let Some(parent) = target.parent() {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_parent(_target: &Path) -> io::Result<()> {
        // NTFS journals metadata updates; directory handles cannot be fsynced.
        Ok(())
    }
}

impl Filesystem for LocalFilesystem {
    fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        let target = self.resolve(path)?;
        fs::read(&target).map_err(|e| Self::map_not_found(e, path))
    }

    fn write(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp = Self::temp_path(&target);
        if let Err(e) = Self::write_temp(&temp, data) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Self::sync_parent(&target)?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> FsResult<()> {
        let target = self.resolve(path)?;
        fs::remove_file(&target).map_err(|e| Self::map_not_found(e, path))?;
        Self::sync_parent(&target)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> FsResult<bool> {
        let target = self.resolve(path)?;
        Ok(target.try_exists()?)
    }
}
