//! Store configuration.

use std::path::PathBuf;
use uuid::Uuid;

/// Directory, relative to the filesystem root, holding segment files.
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";

/// File extension of a persisted segment.
pub const STORE_EXTENSION: &str = "store";

/// Configuration shared by the active and passive stores.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory, relative to the filesystem root, holding segment files.
    pub archive_dir: PathBuf,

    /// Number of requests (ingested batches included) that may queue ahead of
    /// a store before senders suspend.
    pub ingest_buffer: usize,

    /// Whether the active store writes the segment after every ingested batch.
    ///
    /// When disabled, the segment is persisted on erase and on finalize only.
    pub persist_each_batch: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            ingest_buffer: 64,
            persist_each_batch: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the archive directory.
    #[must_use]
    pub fn archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }

    /// Sets the request queue bound. Zero is raised to one.
    #[must_use]
    pub const fn ingest_buffer(mut self, capacity: usize) -> Self {
        self.ingest_buffer = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Sets whether every ingested batch is persisted immediately.
    #[must_use]
    pub const fn persist_each_batch(mut self, value: bool) -> Self {
        self.persist_each_batch = value;
        self
    }

    /// Returns the segment path of a partition: `<archive_dir>/<uuid>.store`.
    #[must_use]
    pub fn store_path(&self, partition: &Uuid) -> PathBuf {
        self.archive_dir
            .join(format!("{partition}.{STORE_EXTENSION}"))
    }
}
