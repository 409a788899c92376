//! The store of a partition whose ingestion has ended.

use super::{read_blob, remove_blob, write_blob, PassiveStoreDescriptor, QueryReply, QueryResults};
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
use tessera_storage::Filesystem;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of a passive store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassiveState {
    /// Not loaded yet, or every load so far has failed.
    Unloaded,
    /// Segment decoded and cached.
    Loaded,
    /// Cache dropped; the next access reloads it.
    Evicted,
    /// Every row was erased and the file removed.
    Deleted,
}

impl PassiveState {
    /// Returns the state's name as reported in status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Evicted => "evicted",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for PassiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Request {
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
    Evict {
        response: oneshot::Sender<()>,
    },
}

/// Handle to the store of a finalized partition.
///
/// The store loads the persisted segment on first use and keeps it cached
/// until evicted. Erasure writes a complete replacement segment and swaps it
/// in only once the write has succeeded. When the last row is erased the file
/// is removed.
#[derive(Debug, Clone)]
pub struct PassiveStore {
    tx: mpsc::Sender<Request>,
    partition: Uuid,
    path: PathBuf,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query { expression, .. } => write!(f, "Query({expression})"),
            Self::Erase { ids, .. } => write!(f, "Erase({ids:?})"),
            Self::Status { verbosity, .. } => write!(f, "Status({verbosity:?})"),
            Self::Evict { .. } => write!(f, "Evict"),
        }
    }
}

impl PassiveStore {
    /// References the already persisted segment of `partition`.
    ///
    /// Nothing is read until the first query or erase.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn open(partition: Uuid, fs: Arc<dyn Filesystem>, config: StoreConfig) -> Self {
        let path = config.store_path(&partition);
        Self::start(partition, path, fs, &config, None)
    }

    /// Takes over a partition from a finalized active store.
    ///
    /// The store starts with the descriptor's segment cached.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn from_descriptor(
        descriptor: PassiveStoreDescriptor,
        fs: Arc<dyn Filesystem>,
        config: StoreConfig,
    ) -> Self {
        let PassiveStoreDescriptor {
            partition,
            path,
            blob,
            segment,
        } = descriptor;
        Self::start(partition, path, fs, &config, Some(Cached { blob, segment }))
    }

    fn start(
        partition: Uuid,
        path: PathBuf,
        fs: Arc<dyn Filesystem>,
        config: &StoreConfig,
        cache: Option<Cached>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.ingest_buffer.max(1));
        let state = if cache.is_some() {
            PassiveState::Loaded
        } else {
            PassiveState::Unloaded
        };
        let actor = PassiveActor {
            partition,
            path: path.clone(),
            fs,
            state,
            cache,
        };
        debug!(partition = %partition, path = %path.display(), %state, "spawning passive store");
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

    /// Returns the path of the persisted segment.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queries the rows in `ids` that satisfy `expression`.
    ///
    /// A segment that cannot be loaded fails the query's completion with
    /// `NotFound`, `CorruptSegment` or `Io`.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the store has stopped.
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
    /// Returns `NotFound` or `CorruptSegment` if the segment cannot be
    /// loaded, and `Io` if the replacement cannot be persisted. On error the
    /// cached and persisted segments are unchanged.
    pub async fn erase(&self, ids: IdSet) -> StoreResult<u64> {
        let (response, rx) = oneshot::channel();
        self.send(Request::Erase { ids, response }).await?;
        rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Reports the store's status.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the store has stopped.
    pub async fn status(&self, verbosity: StatusVerbosity) -> StoreResult<Status> {
        let (response, rx) = oneshot::channel();
        self.send(Request::Status {
            verbosity,
            response,
        })
        .await?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    /// Drops the cached segment. The next access reloads it from disk.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the store has stopped.
    pub async fn evict(&self) -> StoreResult<()> {
        let (response, rx) = oneshot::channel();
        self.send(Request::Evict { response }).await?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    async fn send(&self, request: Request) -> StoreResult<()> {
        self.tx.send(request).await.map_err(|_| StoreError::Closed)
    }
}

struct Cached {
    blob: Bytes,
    segment: Segment,
}

struct PassiveActor {
    partition: Uuid,
    path: PathBuf,
    fs: Arc<dyn Filesystem>,
    state: PassiveState,
    cache: Option<Cached>,
}

impl PassiveActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        while let Some(request) = rx.recv().await {
            match request {
                Request::Query {
                    expression,
                    ids,
                    reply,
                } => self.query(&expression, &ids, reply).await,
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
                Request::Evict { response } => {
                    self.evict();
                    let _ = response.send(());
                }
            }
        }
        debug!(partition = %self.partition, "passive store handles dropped");
    }

    /// Returns the cached segment, loading it first if needed.
    ///
    /// A failed load leaves the state untouched, so the next access retries.
    async fn load(&mut self) -> StoreResult<&Cached> {
        if self.cache.is_none() {
            let cached = match self.read().await {
                Ok(cached) => cached,
                Err(err) => {
                    warn!(
                        partition = %self.partition,
                        path = %self.path.display(),
                        error = %err,
                        "failed to load passive store"
                    );
                    return Err(err);
                }
            };
            debug!(
                partition = %self.partition,
                batches = cached.segment.batches().len(),
                rows = cached.segment.rows(),
                "loaded passive store"
            );
            self.state = PassiveState::Loaded;
            self.cache = Some(cached);
        }
        self.cache
            .as_ref()
            .ok_or_else(|| StoreError::io("segment cache unavailable"))
    }

    async fn read(&self) -> StoreResult<Cached> {
        let blob = read_blob(Arc::clone(&self.fs), self.path.clone()).await?;
        let segment = Segment::decode(&blob)?;
        if segment.partition() != self.partition {
            return Err(StoreError::corrupt_segment(format!(
                "segment belongs to partition {}",
                segment.partition()
            )));
        }
        Ok(Cached { blob, segment })
    }

    async fn query(&mut self, expression: &Expression, ids: &IdSet, reply: QueryReply) {
        if self.state == PassiveState::Deleted {
            reply.answer(&Segment::new(self.partition), expression, ids);
            return;
        }
        match self.load().await {
            Ok(cached) => reply.answer(&cached.segment, expression, ids),
            Err(err) => reply.fail(err),
        }
    }

    async fn erase(&mut self, ids: &IdSet) -> StoreResult<u64> {
        if self.state == PassiveState::Deleted {
            return Ok(0);
        }
        let (erased, stats) = self.load().await?.segment.erase(ids);
        if stats.rows == 0 {
            return Ok(0);
        }

        if erased.is_empty() {
            match remove_blob(Arc::clone(&self.fs), self.path.clone()).await {
                Ok(()) | Err(StoreError::NotFound { .. }) => {}
                Err(err) => return Err(err),
            }
            self.cache = None;
            self.state = PassiveState::Deleted;
            info!(
                partition = %self.partition,
                path = %self.path.display(),
                rows = stats.rows,
                "erased every row; removed segment file"
            );
            return Ok(stats.rows);
        }

        let blob = erased.encode()?;
        write_blob(Arc::clone(&self.fs), self.path.clone(), blob.clone()).await?;
        self.cache = Some(Cached {
            blob,
            segment: erased,
        });
        debug!(
            partition = %self.partition,
            rows = stats.rows,
            dropped = stats.dropped_batches,
            rewritten = stats.rewritten_batches,
            "erased rows from passive store"
        );
        Ok(stats.rows)
    }

    fn evict(&mut self) {
        if self.cache.take().is_some() {
            self.state = PassiveState::Evicted;
            debug!(partition = %self.partition, "evicted passive store");
        }
    }

    fn status(&self, verbosity: StatusVerbosity) -> Status {
        let mut status = Status::new();
        status.insert("type".into(), json!("passive"));
        status.insert("partition".into(), json!(self.partition.to_string()));
        status.insert("path".into(), json!(self.path.display().to_string()));
        status.insert("state".into(), json!(self.state.as_str()));
        if let Some(cached) = &self.cache {
            status::describe_segment(&mut status, &cached.segment, verbosity);
            if verbosity >= StatusVerbosity::Debug {
                status::describe_blob(&mut status, &cached.blob);
            }
        }
        status
    }
}
