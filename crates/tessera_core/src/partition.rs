//! Routing between the two stores of a partition.

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::expression::Expression;
use crate::ids::IdSet;
use crate::status::{Status, StatusVerbosity};
use crate::store::{ActiveStore, Ingestor, PassiveStore, QueryResults};
use std::sync::Arc;
use tessera_storage::Filesystem;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug)]
enum Store {
    Active(ActiveStore),
    Passive(PassiveStore),
}

/// A partition, reached through whichever store currently owns it.
///
/// A new partition starts with an [`ActiveStore`]. [`Partition::seal`] ends
/// ingestion and hands every later query and erase to a [`PassiveStore`]
/// over the same file.
#[derive(Debug)]
pub struct Partition {
    id: Uuid,
    fs: Arc<dyn Filesystem>,
    config: StoreConfig,
    store: Store,
}

impl Partition {
    /// Creates a partition that accepts ingestion.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn create(id: Uuid, fs: Arc<dyn Filesystem>, config: StoreConfig) -> Self {
        let store = Store::Active(ActiveStore::spawn(id, Arc::clone(&fs), config.clone()));
        Self {
            id,
            fs,
            config,
            store,
        }
    }

    /// References a partition persisted earlier.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn open(id: Uuid, fs: Arc<dyn Filesystem>, config: StoreConfig) -> Self {
        let store = Store::Passive(PassiveStore::open(id, Arc::clone(&fs), config.clone()));
        Self {
            id,
            fs,
            config,
            store,
        }
    }

    /// Returns the partition identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns true while the partition accepts ingestion.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.store, Store::Active(_))
    }

    /// Returns the ingestion handle, or `None` once sealed.
    #[must_use]
    pub fn ingestor(&self) -> Option<Ingestor> {
        match &self.store {
            Store::Active(store) => Some(store.ingestor()),
            Store::Passive(_) => None,
        }
    }

    /// Queries the rows in `ids` that satisfy `expression`.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the owning store has stopped.
    pub async fn query(&self, expression: Expression, ids: IdSet) -> StoreResult<QueryResults> {
        match &self.store {
            Store::Active(store) => store.query(expression, ids).await,
            Store::Passive(store) => store.query(expression, ids).await,
        }
    }

    /// Erases the rows in `ids`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// See [`ActiveStore::erase`] and [`PassiveStore::erase`].
    pub async fn erase(&self, ids: IdSet) -> StoreResult<u64> {
        match &self.store {
            Store::Active(store) => store.erase(ids).await,
            Store::Passive(store) => store.erase(ids).await,
        }
    }

    /// Reports the owning store's status.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the owning store has stopped.
    pub async fn status(&self, verbosity: StatusVerbosity) -> StoreResult<Status> {
        match &self.store {
            Store::Active(store) => store.status(verbosity).await,
            Store::Passive(store) => store.status(verbosity).await,
        }
    }

    /// Drops the passive store's cached segment. No-op while active.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the owning store has stopped.
    pub async fn evict(&self) -> StoreResult<()> {
        match &self.store {
            Store::Active(_) => Ok(()),
            Store::Passive(store) => store.evict().await,
        }
    }

    /// Ends ingestion and switches to the passive store.
    ///
    /// Sealing a passive partition does nothing.
    ///
    /// # Errors
    ///
    /// Returns the error of the final flush. The partition is passive
    /// afterwards either way; on error it serves the last segment persisted
    /// successfully.
    pub async fn seal(&mut self) -> StoreResult<()> {
        let Store::Active(active) = &self.store else {
            return Ok(());
        };
        let finalized = active.finalize().await;
        match finalized {
            Ok(descriptor) => {
                info!(partition = %self.id, rows = descriptor.segment.rows(), "sealed partition");
                self.store = Store::Passive(PassiveStore::from_descriptor(
                    descriptor,
                    Arc::clone(&self.fs),
                    self.config.clone(),
                ));
                Ok(())
            }
            Err(err) => {
                warn!(partition = %self.id, error = %err, "sealing fell back to persisted segment");
                self.store = Store::Passive(PassiveStore::open(
                    self.id,
                    Arc::clone(&self.fs),
                    self.config.clone(),
                ));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::RecordBatch;
    use crate::data::{Data, Schema};
    use serde_json::json;
    use tessera_storage::InMemoryFilesystem;

    fn batch(offset: u64, len: u64) -> RecordBatch {
        let schema = Arc::new(Schema::new("test.event", ["n"]));
        let rows = (offset..offset + len).map(|n| vec![Data::Count(n)]).collect();
        RecordBatch::new(schema, offset, rows).unwrap()
    }

    async fn count(partition: &Partition, ids: IdSet) -> u64 {
        let results = partition.query(Expression::True, ids).await.unwrap();
        results.collect().await.unwrap().1.rows_matched
    }

    #[tokio::test]
    async fn routes_to_passive_after_seal() {
        let fs: Arc<dyn Filesystem> = Arc::new(InMemoryFilesystem::new());
        let mut partition = Partition::create(Uuid::new_v4(), fs, StoreConfig::default());
        assert!(partition.is_active());

        let ingestor = partition.ingestor().unwrap();
        ingestor.send(batch(0, 50)).await.unwrap();
        assert_eq!(count(&partition, IdSet::from_range(0..100)).await, 50);

        partition.seal().await.unwrap();
        assert!(!partition.is_active());
        assert!(partition.ingestor().is_none());
        assert!(ingestor.send(batch(50, 1)).await.is_err());

        let status = partition.status(StatusVerbosity::Info).await.unwrap();
        assert_eq!(status["type"], json!("passive"));
        assert_eq!(status["state"], json!("loaded"));

        assert_eq!(partition.erase(IdSet::from_range(0..10)).await.unwrap(), 10);
        assert_eq!(count(&partition, IdSet::from_range(0..100)).await, 40);

        // Sealing twice is harmless.
        partition.seal().await.unwrap();
    }

    #[tokio::test]
    async fn open_reads_persisted_partition() {
        let fs: Arc<dyn Filesystem> = Arc::new(InMemoryFilesystem::new());
        let id = Uuid::new_v4();
        let mut partition = Partition::create(id, Arc::clone(&fs), StoreConfig::default());
        partition.ingestor().unwrap().send(batch(0, 20)).await.unwrap();
        partition.seal().await.unwrap();

        let reopened = Partition::open(id, fs, StoreConfig::default());
        assert_eq!(reopened.id(), id);
        assert_eq!(count(&reopened, IdSet::from_range(5..15)).await, 10);
        reopened.evict().await.unwrap();
        assert_eq!(count(&reopened, IdSet::from_range(5..15)).await, 10);
    }
}
