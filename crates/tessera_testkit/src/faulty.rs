//! Fault injection for store tests.
//!
//! [`FaultyFilesystem`] wraps a real filesystem and fails or stalls
//! operations on demand, so tests can drive the stores through I/O failures
//! and slow disks.
//!
//! ## Usage
//!
//! ```rust
//! use std::path::Path;
//! use std::sync::Arc;
//! use tessera_storage::{Filesystem, InMemoryFilesystem};
//! use tessera_testkit::FaultyFilesystem;
//!
//! let fs = FaultyFilesystem::new(Arc::new(InMemoryFilesystem::new()));
//! fs.fail_next_writes(1);
//! assert!(fs.write(Path::new("a"), b"x").is_err());
//! assert!(fs.write(Path::new("a"), b"x").is_ok());
//! ```

use parking_lot::{Condvar, Mutex};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tessera_storage::{Filesystem, FsError, FsResult};

/// A filesystem wrapper that can simulate failures and stalls.
#[derive(Debug)]
pub struct FaultyFilesystem {
    inner: Arc<dyn Filesystem>,
    fail_next_writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_removes: AtomicBool,
    writes: AtomicUsize,
    failed_writes: AtomicUsize,
    gate: Mutex<bool>,
    gate_changed: Condvar,
    stalled: AtomicUsize,
}

impl FaultyFilesystem {
    /// Wraps `inner`. No faults are armed.
    pub fn new(inner: Arc<dyn Filesystem>) -> Self {
        Self {
            inner,
            fail_next_writes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            failed_writes: AtomicUsize::new(0),
            gate: Mutex::new(false),
            gate_changed: Condvar::new(),
            stalled: AtomicUsize::new(0),
        }
    }

    /// Fails the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_next_writes.store(count, Ordering::SeqCst);
    }

    /// Sets whether every write fails.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Sets whether every read fails.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Sets whether every remove fails.
    pub fn set_fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Makes writes block until [`FaultyFilesystem::release_writes`].
    pub fn hold_writes(&self) {
        *self.gate.lock() = true;
    }

    /// Unblocks held writes.
    pub fn release_writes(&self) {
        *self.gate.lock() = false;
        self.gate_changed.notify_all();
    }

    /// Returns the number of writes currently blocked by
    /// [`FaultyFilesystem::hold_writes`].
    pub fn stalled_writes(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }

    /// Returns the number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of writes failed on purpose.
    pub fn failed_writes(&self) -> usize {
        self.failed_writes.load(Ordering::SeqCst)
    }

    /// Disarms every fault and releases held writes.
    pub fn reset(&self) {
        self.fail_next_writes.store(0, Ordering::SeqCst);
        self.fail_writes.store(false, Ordering::SeqCst);
        self.fail_reads.store(false, Ordering::SeqCst);
        self.fail_removes.store(false, Ordering::SeqCst);
        self.release_writes();
    }

    fn wait_for_gate(&self) {
        let mut held = self.gate.lock();
        if !*held {
            return;
        }
        self.stalled.fetch_add(1, Ordering::SeqCst);
        while *held {
            self.gate_changed.wait(&mut held);
        }
        self.stalled.fetch_sub(1, Ordering::SeqCst);
    }

    fn should_fail_write(&self) -> bool {
        if self.fail_writes.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn simulated(operation: &str) -> FsError {
    FsError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("simulated {operation} failure"),
    ))
}

impl Filesystem for FaultyFilesystem {
    fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(simulated("read"));
        }
        self.inner.read(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        self.wait_for_gate();
        if self.should_fail_write() {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(simulated("write"));
        }
        self.inner.write(path, data)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, path: &Path) -> FsResult<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(simulated("remove"));
        }
        self.inner.remove(path)
    }

    fn exists(&self, path: &Path) -> FsResult<bool> {
        self.inner.exists(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tessera_storage::InMemoryFilesystem;

    fn faulty() -> FaultyFilesystem {
        FaultyFilesystem::new(Arc::new(InMemoryFilesystem::new()))
    }

    #[test]
    fn fail_next_writes_counts_down() {
        let fs = faulty();
        fs.fail_next_writes(2);
        assert!(fs.write(Path::new("a"), b"1").is_err());
        assert!(fs.write(Path::new("a"), b"2").is_err());
        fs.write(Path::new("a"), b"3").unwrap();
        assert_eq!(fs.read(Path::new("a")).unwrap(), b"3");
        assert_eq!(fs.writes(), 1);
        assert_eq!(fs.failed_writes(), 2);
    }

    #[test]
    fn failed_write_keeps_previous_content() {
        let fs = faulty();
        fs.write(Path::new("a"), b"old").unwrap();
        fs.set_fail_writes(true);
        assert!(fs.write(Path::new("a"), b"new").is_err());
        assert_eq!(fs.read(Path::new("a")).unwrap(), b"old");
    }

    #[test]
    fn read_and_remove_faults() {
        let fs = faulty();
        fs.write(Path::new("a"), b"x").unwrap();
        fs.set_fail_reads(true);
        fs.set_fail_removes(true);
        let err = fs.read(Path::new("a")).unwrap_err();
        assert!(!err.is_not_found());
        assert!(fs.remove(Path::new("a")).is_err());

        fs.reset();
        assert_eq!(fs.read(Path::new("a")).unwrap(), b"x");
        fs.remove(Path::new("a")).unwrap();
    }

    #[test]
    fn held_writes_wait_for_release() {
        let fs = Arc::new(faulty());
        fs.hold_writes();

        let writer = {
            let fs = Arc::clone(&fs);
            thread::spawn(move || fs.write(Path::new("a"), b"x"))
        };
        while fs.stalled_writes() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!fs.exists(Path::new("a")).unwrap());

        fs.release_writes();
        writer.join().unwrap().unwrap();
        assert!(fs.exists(Path::new("a")).unwrap());
        assert_eq!(fs.stalled_writes(), 0);
    }
}
