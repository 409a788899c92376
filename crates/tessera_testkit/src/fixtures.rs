//! Test fixtures and archive helpers.
//!
//! Provides record batch builders, temporary on-disk archives and tracing
//! setup for tests.

use std::path::Path;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tessera_core::{Data, Id, RecordBatch, Schema};
use tessera_storage::{Filesystem, InMemoryFilesystem, LocalFilesystem};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a `tracing` subscriber for test binaries. Safe to call multiple
/// times.
///
/// Honors `RUST_LOG`, defaulting to `warn`. Output goes through the test
/// harness so it is shown only for failing tests.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// The schema used by [`event_batch`]: `zeek.conn` with an `id` counter and a
/// `service` string.
pub fn conn_schema() -> Arc<Schema> {
    Arc::new(Schema::new("zeek.conn", ["id", "service"]))
}

/// Builds a batch of `len` rows starting at `offset`.
///
/// Row `id` holds `Count(id)` and a service that cycles through `dns`,
/// `http` and `ssh`, so predicates can select known subsets.
///
/// # Panics
///
/// Panics if `len` is zero or the range overflows.
pub fn event_batch(offset: Id, len: u64) -> RecordBatch {
    let rows = (offset..offset + len)
        .map(|id| vec![Data::Count(id), Data::from(service_of(id))])
        .collect();
    RecordBatch::new(conn_schema(), offset, rows).expect("valid fixture batch")
}

/// Returns the service [`event_batch`] assigns to `id`.
pub fn service_of(id: Id) -> &'static str {
    match id % 3 {
        0 => "dns",
        1 => "http",
        _ => "ssh",
    }
}

/// Flattens query results into the identifiers they carry, in order.
pub fn ids_of(batches: &[RecordBatch]) -> Vec<Id> {
    batches.iter().flat_map(RecordBatch::range).collect()
}

/// A temporary on-disk archive, removed on drop.
pub struct TestArchive {
    /// The filesystem rooted in the temporary directory.
    pub fs: Arc<LocalFilesystem>,
    _temp_dir: TempDir,
}

impl TestArchive {
    /// Creates an empty archive.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created or locked.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let fs = LocalFilesystem::open(temp_dir.path()).expect("Failed to open archive");
        Self {
            fs: Arc::new(fs),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the archive root.
    pub fn root(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Returns the filesystem as a shareable trait object.
    pub fn filesystem(&self) -> Arc<dyn Filesystem> {
        Arc::clone(&self.fs) as Arc<dyn Filesystem>
    }
}

impl Default for TestArchive {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a fresh in-memory filesystem and its trait-object view.
pub fn memory_fs() -> (Arc<InMemoryFilesystem>, Arc<dyn Filesystem>) {
    let fs = Arc::new(InMemoryFilesystem::new());
    let dynamic = Arc::clone(&fs) as Arc<dyn Filesystem>;
    (fs, dynamic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_batch_layout() {
        let batch = event_batch(10, 3);
        assert_eq!(batch.range(), 10..13);
        assert_eq!(
            batch.row(11),
            Some(&[Data::Count(11), Data::from("ssh")][..])
        );
    }

    #[test]
    fn archive_is_usable() {
        let archive = TestArchive::new();
        let fs = archive.filesystem();
        fs.write(Path::new("archive/x.store"), b"x").unwrap();
        assert!(archive.root().join("archive/x.store").exists());
    }

    #[test]
    fn ids_flatten_in_order() {
        let batches = vec![event_batch(0, 2), event_batch(5, 1)];
        assert_eq!(ids_of(&batches), vec![0, 1, 5]);
    }

    #[test]
    fn tracing_init_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
