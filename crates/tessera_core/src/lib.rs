//! # Tessera Core
//!
//! Per-partition segment stores for a security telemetry archive.
//!
//! Ingested events arrive as [`RecordBatch`]es, each tagged with a contiguous
//! range of globally unique identifiers. The batches of one partition form a
//! [`Segment`], persisted as a single self-checking file at
//! `archive/<partition>.store`.
//!
//! A partition is served by two stores over its life:
//!
//! - [`ActiveStore`] while ingesting: appends batches as they stream in and
//!   persists the segment after each one. A batch that fails is logged and
//!   dropped without stopping the stream.
//! - [`PassiveStore`] once sealed: loads the segment lazily and rewrites it
//!   atomically when rows are erased, removing the file once it is empty.
//!
//! Both answer predicate queries scoped by an [`IdSet`] and erasures by
//! identifier. [`Partition`] routes to whichever store currently owns the
//! partition.
//!
//! ## Example
//!
//! ```rust,no_run
//! # async fn example() -> tessera_core::StoreResult<()> {
//! use std::path::Path;
//! use std::sync::Arc;
//! use tessera_core::{
//!     Data, Expression, IdSet, Operator, Partition, Predicate, RecordBatch, Schema, StoreConfig,
//! };
//! use tessera_storage::LocalFilesystem;
//! use uuid::Uuid;
//!
//! let fs = Arc::new(LocalFilesystem::open(Path::new("/var/lib/tessera")).unwrap());
//! let mut partition = Partition::create(Uuid::new_v4(), fs, StoreConfig::default());
//!
//! let schema = Arc::new(Schema::new("zeek.conn", ["service"]));
//! let batch = RecordBatch::new(schema, 1, vec![vec![Data::from("dns")]])?;
//! if let Some(ingestor) = partition.ingestor() {
//!     ingestor.send(batch).await?;
//! }
//!
//! let dns = Expression::from(Predicate::field("service", Operator::Equal, "dns"));
//! let (matches, stats) = partition.query(dns, IdSet::from_range(0..100)).await?.collect().await?;
//! assert_eq!(stats.rows_matched, 1);
//! # let _ = matches;
//!
//! partition.seal().await?;
//! partition.erase(IdSet::from_range(1..2)).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod config;
mod data;
mod error;
mod expression;
mod ids;
mod partition;
mod query;
mod segment;
mod status;
mod store;

pub use batch::RecordBatch;
pub use config::{StoreConfig, DEFAULT_ARCHIVE_DIR, STORE_EXTENSION};
pub use data::{Data, Schema};
pub use error::{StoreError, StoreResult};
pub use expression::{Expression, Extractor, Operator, Predicate};
pub use ids::{Id, IdSet, MAX_ID};
pub use partition::Partition;
pub use query::{execute as execute_query, QueryStats};
pub use segment::{Digest, EraseStats, Segment, SEGMENT_MAGIC, SEGMENT_VERSION};
pub use status::{Status, StatusVerbosity};
pub use store::{
    ActiveState, ActiveStore, Ingestor, PassiveState, PassiveStore, PassiveStoreDescriptor,
    QueryResults,
};
