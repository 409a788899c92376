//! Partition stores.
//!
//! A partition's data lives in one of two stores over its life:
//!
//! - [`ActiveStore`] while it is being ingested. It owns the growing
//!   [`Segment`] and persists it as batches arrive.
//! - [`PassiveStore`] once ingestion has ended. It lazily loads the persisted
//!   segment and rewrites it when rows are erased.
//!
//! Each store runs as a single Tokio task that owns its state outright and
//! handles one request at a time, in arrival order, from a bounded queue.
//! Callers talk to it through a cheap cloneable handle. Disk I/O runs on the
//! blocking pool so a store never stalls the runtime's workers.

mod active;
mod passive;

pub use active::{ActiveState, ActiveStore, Ingestor, PassiveStoreDescriptor};
pub use passive::{PassiveState, PassiveStore};

use crate::batch::RecordBatch;
use crate::error::{StoreError, StoreResult};
use crate::expression::Expression;
use crate::ids::IdSet;
use crate::query::{self, QueryStats};
use crate::segment::Segment;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_storage::Filesystem;
use tokio::sync::{mpsc, oneshot};

/// The results of a query.
///
/// Matching rows arrive as record batches. Once every match has been
/// delivered, the query completes exactly once with its statistics or an
/// error. Dropping the handle discards any remaining output.
#[derive(Debug)]
pub struct QueryResults {
    batches: mpsc::UnboundedReceiver<RecordBatch>,
    done: oneshot::Receiver<StoreResult<QueryStats>>,
}

impl QueryResults {
    /// Waits for the next batch of matches.
    ///
    /// Returns `None` once the store has delivered every match.
    pub async fn next(&mut self) -> Option<RecordBatch> {
        self.batches.recv().await
    }

    /// Waits for the query to complete.
    ///
    /// Undelivered matches are discarded.
    ///
    /// # Errors
    ///
    /// Returns the error the query failed with, or `Closed` if the store
    /// stopped before answering.
    pub async fn finish(self) -> StoreResult<QueryStats> {
        self.done.await.map_err(|_| StoreError::Closed)?
    }

    /// Gathers every match, then waits for completion.
    ///
    /// # Errors
    ///
    /// See [`QueryResults::finish`].
    pub async fn collect(mut self) -> StoreResult<(Vec<RecordBatch>, QueryStats)> {
        let mut batches = Vec::new();
        while let Some(batch) = self.next().await {
            batches.push(batch);
        }
        let stats = self.finish().await?;
        Ok((batches, stats))
    }
}

/// Store-side half of a query.
#[derive(Debug)]
struct QueryReply {
    batches: mpsc::UnboundedSender<RecordBatch>,
    done: oneshot::Sender<StoreResult<QueryStats>>,
}

impl QueryReply {
    fn channel() -> (Self, QueryResults) {
        let (batches_tx, batches_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        (
            Self {
                batches: batches_tx,
                done: done_tx,
            },
            QueryResults {
                batches: batches_rx,
                done: done_rx,
            },
        )
    }

    /// Delivers the matches of `expression` over `segment`, then completes.
    fn answer(self, segment: &Segment, expression: &Expression, ids: &IdSet) {
        let Self { batches, done } = self;
        let stats = query::execute(segment, expression, ids, |batch| {
            let _ = batches.send(batch);
        });
        drop(batches);
        let _ = done.send(Ok(stats));
    }

    fn fail(self, err: StoreError) {
        let Self { batches, done } = self;
        drop(batches);
        let _ = done.send(Err(err));
    }
}

fn join_error(err: tokio::task::JoinError) -> StoreError {
    StoreError::io(format!("blocking I/O task failed: {err}"))
}

async fn read_blob(fs: Arc<dyn Filesystem>, path: PathBuf) -> StoreResult<Bytes> {
    let data = tokio::task::spawn_blocking(move || fs.read(&path))
        .await
        .map_err(join_error)??;
    Ok(Bytes::from(data))
}

async fn write_blob(fs: Arc<dyn Filesystem>, path: PathBuf, blob: Bytes) -> StoreResult<()> {
    tokio::task::spawn_blocking(move || fs.write(&path, &blob))
        .await
        .map_err(join_error)??;
    Ok(())
}

async fn remove_blob(fs: Arc<dyn Filesystem>, path: PathBuf) -> StoreResult<()> {
    tokio::task::spawn_blocking(move || fs.remove(&path))
        .await
        .map_err(join_error)??;
    Ok(())
}
