//! The store of a partition that is still being ingested.

use super::{write_blob, QueryReply, QueryResults};
use crate::batch::RecordBatch;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::expression::Expression;
use crate::ids::IdSet;
use crate::segment::Segment;
use crate::status::{self, Status, StatusVerbosity};
use bytes::Bytes;
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tessera_storage::Filesystem;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Lifecycle of an active store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveState {
    /// Accepting batches.
    Building,
    /// Finalize requested; buffered requests are being processed.
    Draining,
    /// Handed off to a passive store.
    Closed,
}

impl ActiveState {
    /// Returns the state's name as reported in status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ActiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a passive store needs to take over a finalized partition.
///
/// Carries the final segment and its encoding so the passive store starts
/// warm.
#[derive(Debug, Clone)]
pub struct PassiveStoreDescriptor {
    /// The partition.
    pub partition: Uuid,
    /// Path of the persisted segment.
    pub path: PathBuf,
    /// The persisted bytes.
    pub blob: Bytes,
    /// The decoded segment.
    pub segment: Segment,
}

enum Request {
    Ingest(RecordBatch),
    Query {
        expression: Expression,
        ids: IdSet,
        reply: QueryReply,
    },
    Erase {
        ids: IdSet,
        response: oneshot::Sender<StoreResult<u64>>,
    },
    Status {
        verbosity: StatusVerbosity,
        response: oneshot::Sender<Status>,
    },
    Finalize {
        response: oneshot::Sender<StoreResult<PassiveStoreDescriptor>>,
    },
}

/// Producer side of an active store's ingestion stream.
///
/// Batches share the store's bounded request queue: [`Ingestor::send`]
/// suspends while the queue is full and resumes as the store catches up.
#[derive(Debug, Clone)]
pub struct Ingestor {
    tx: mpsc::Sender<Request>,
}

impl Ingestor {
    /// Sends a batch to the store, waiting for queue space.
    ///
    /// A batch the store fails to persist is logged and dropped; the stream
    /// continues.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the store no longer accepts batches.
    pub async fn send(&self, batch: RecordBatch) -> StoreResult<()> {
        self.tx
            .send(Request::Ingest(batch))
            .await
            .map_err(|_| StoreError::Closed)
    }

    /// Returns the number of requests that can be queued without waiting.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    /// Returns the bound of the request queue.
    #[must_use]
    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingest(batch) => write!(f, "Ingest({:?})", batch.range()),
            Self::Query { expression, .. } => write!(f, "Query({expression})"),
            Self::Erase { ids, .. } => write!(f, "Erase({ids:?})"),
            Self::Status { verbosity, .. } => write!(f, "Status({verbosity:?})"),
            Self::Finalize { .. } => write!(f, "Finalize"),
        }
    }
}

/// Handle to the store of a partition under ingestion.
///
/// The store is a single task that owns the partition's [`Segment`]. Every
/// ingested batch is appended to the segment and, by default, the segment is
/// persisted before the next request is handled. Queries and erasures are
/// interleaved with ingestion in arrival order.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> tessera_core::StoreResult<()> {
/// use std::sync::Arc;
/// use tessera_core::{ActiveStore, Expression, IdSet, StoreConfig};
/// use tessera_storage::InMemoryFilesystem;
/// use uuid::Uuid;
///
/// let fs = Arc::new(InMemoryFilesystem::new());
/// let store = ActiveStore::spawn(Uuid::new_v4(), fs, StoreConfig::default());
///
/// let results = store.query(Expression::True, IdSet::from_range(0..100)).await?;
/// let (batches, _stats) = results.collect().await?;
/// assert!(batches.is_empty());
///
/// let descriptor = store.finalize().await?;
/// # let _ = descriptor;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ActiveStore {
    tx: mpsc::Sender<Request>,
    partition: Uuid,
    path: PathBuf,
}

impl ActiveStore {
    /// Starts the store of `partition`.
    ///
    /// The segment is persisted at [`StoreConfig::store_path`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn spawn(partition: Uuid, fs: Arc<dyn Filesystem>, config: StoreConfig) -> Self {
        let path = config.store_path(&partition);
        let (tx, rx) = mpsc::channel(config.ingest_buffer.max(1));

        let actor = ActiveActor {
            segment: Segment::new(partition),
            path: path.clone(),
            fs,
            persist_each_batch: config.persist_each_batch,
            state: ActiveState::Building,
            ingested_batches: 0,
            ingested_rows: 0,
            dropped_batches: 0,
            started: Instant::now(),
            last_blob: None,
            dirty: true,
        };
        debug!(partition = %partition, path = %path.display(), "spawning active store");
        tokio::spawn(actor.run(rx));

        Self {
            tx,
            partition,
            path,
        }
    }

    /// Returns the partition.
    #[must_use]
    pub fn partition(&self) -> Uuid {
        self.partition
    }

    /// Returns the path the segment is persisted at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a producer handle for the ingestion stream.
    #[must_use]
    pub fn ingestor(&self) -> Ingestor {
        Ingestor {
            tx: self.tx.clone(),
        }
    }

    /// Queries the rows in `ids` that satisfy `expression`.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the store has been finalized.
    pub async fn query(&self, expression: Expression, ids: IdSet) -> StoreResult<QueryResults> {
        let (reply, results) = QueryReply::channel();
        self.send(Request::Query {
            expression,
            ids,
            reply,
        })
        .await?;
        Ok(results)
    }

    /// Erases the rows in `ids`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the rewritten segment cannot be persisted, in which
    /// case nothing changes, or `Closed` if the store has been finalized.
    pub async fn erase(&self, ids: IdSet) -> StoreResult<u64> {
        let (response, rx) = oneshot::channel();
        self.send(Request::Erase { ids, response }).await?;
        rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Reports the store's status.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the store has been finalized.
    pub async fn status(&self, verbosity: StatusVerbosity) -> StoreResult<Status> {
        let (response, rx) = oneshot::channel();
        self.send(Request::Status {
            verbosity,
            response,
        })
        .await?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    /// Ends ingestion and hands the partition off.
    ///
    /// Requests already queued are processed first. The segment is then
    /// persisted one last time and the store stops; later requests fail with
    /// `Closed`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the final flush fails. The file then holds the last
    /// segment persisted successfully.
    pub async fn finalize(&self) -> StoreResult<PassiveStoreDescriptor> {
        let (response, rx) = oneshot::channel();
        self.send(Request::Finalize { response }).await?;
        rx.await.map_err(|_| StoreError::Closed)?
    }

    async fn send(&self, request: Request) -> StoreResult<()> {
        self.tx.send(request).await.map_err(|_| StoreError::Closed)
    }
}

struct ActiveActor {
    segment: Segment,
    path: PathBuf,
    fs: Arc<dyn Filesystem>,
    persist_each_batch: bool,
    state: ActiveState,
    ingested_batches: u64,
    ingested_rows: u64,
    dropped_batches: u64,
    started: Instant,
    last_blob: Option<Bytes>,
    /// Segment differs from `last_blob`.
    dirty: bool,
}

impl ActiveActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        while let Some(request) = rx.recv().await {
            let response = match request {
                Request::Finalize { response } => response,
                other => {
                    self.handle(other).await;
                    continue;
                }
            };

            self.state = ActiveState::Draining;
            debug!(partition = %self.segment.partition(), "draining active store");
            rx.close();
            while let Some(request) = rx.recv().await {
                self.handle(request).await;
            }

            let result = self.finalize().await;
            self.state = ActiveState::Closed;
            match &result {
                Ok(descriptor) => info!(
                    partition = %descriptor.partition,
                    rows = descriptor.segment.rows(),
                    ingested = self.ingested_batches,
                    dropped = self.dropped_batches,
                    "finalized active store"
                ),
                Err(err) => error!(
                    partition = %self.segment.partition(),
                    error = %err,
                    "failed to flush active store on finalize"
                ),
            }
            let _ = response.send(result);
            return;
        }
        debug!(partition = %self.segment.partition(), "active store handles dropped");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Ingest(batch) => self.ingest(batch).await,
            Request::Query {
                expression,
                ids,
                reply,
            } => reply.answer(&self.segment, &expression, &ids),
            Request::Erase { ids, response } => {
                let result = self.erase(&ids).await;
                let _ = response.send(result);
            }
            Request::Status {
                verbosity,
                response,
            } => {
                let _ = response.send(self.status(verbosity));
            }
            Request::Finalize { response } => {
                let _ = response.send(Err(StoreError::Closed));
            }
        }
    }

    async fn ingest(&mut self, batch: RecordBatch) {
        let first = batch.offset();
        let rows = batch.len();
        match self.append(batch).await {
            Ok(()) => {
                self.ingested_batches += 1;
                self.ingested_rows += rows;
            }
            Err(err) => {
                self.dropped_batches += 1;
                error!(
                    partition = %self.segment.partition(),
                    first,
                    rows,
                    error = %err,
                    "failed to add record batch to store"
                );
            }
        }
    }

    async fn append(&mut self, batch: RecordBatch) -> StoreResult<()> {
        self.segment.put(batch)?;
        self.dirty = true;
        if !self.persist_each_batch {
            return Ok(());
        }
        if let Err(err) = self.persist().await {
            self.segment.pop();
            self.dirty = self.last_blob.is_none();
            return Err(err);
        }
        Ok(())
    }

    async fn persist(&mut self) -> StoreResult<()> {
        let blob = self.segment.encode()?;
        write_blob(Arc::clone(&self.fs), self.path.clone(), blob.clone()).await?;
        self.last_blob = Some(blob);
        self.dirty = false;
        Ok(())
    }

    async fn erase(&mut self, ids: &IdSet) -> StoreResult<u64> {
        let (erased, stats) = self.segment.erase(ids);
        if stats.rows == 0 {
            return Ok(0);
        }
        let blob = erased.encode()?;
        write_blob(Arc::clone(&self.fs), self.path.clone(), blob.clone()).await?;
        self.segment = erased;
        self.last_blob = Some(blob);
        self.dirty = false;
        debug!(
            partition = %self.segment.partition(),
            rows = stats.rows,
            dropped = stats.dropped_batches,
            rewritten = stats.rewritten_batches,
            "erased rows from active store"
        );
        Ok(stats.rows)
    }

    async fn finalize(&mut self) -> StoreResult<PassiveStoreDescriptor> {
        if self.dirty {
            self.persist().await?;
        }
        let blob = self.last_blob.clone().ok_or(StoreError::Closed)?;
        let partition = self.segment.partition();
        let segment = std::mem::replace(&mut self.segment, Segment::new(partition));
        Ok(PassiveStoreDescriptor {
            partition: segment.partition(),
            path: self.path.clone(),
            blob,
            segment,
        })
    }

    fn status(&self, verbosity: StatusVerbosity) -> Status {
        let mut status = Status::new();
        status.insert("type".into(), json!("active"));
        status.insert("partition".into(), json!(self.segment.partition().to_string()));
        status.insert("path".into(), json!(self.path.display().to_string()));
        status.insert("state".into(), json!(self.state.as_str()));
        status::describe_segment(&mut status, &self.segment, verbosity);
        status.insert("ingested-batches".into(), json!(self.ingested_batches));
        status.insert("dropped-batches".into(), json!(self.dropped_batches));
        if verbosity >= StatusVerbosity::Detailed {
            let elapsed = self.started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                self.ingested_rows as f64 / elapsed
            } else {
                0.0
            };
            status.insert("ingested-rows".into(), json!(self.ingested_rows));
            status.insert("rows-per-second".into(), json!(rate));
        }
        if verbosity >= StatusVerbosity::Debug {
            if let Some(blob) = &self.last_blob {
                status::describe_blob(&mut status, blob);
            }
        }
        status
    }
}
