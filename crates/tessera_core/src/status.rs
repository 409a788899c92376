//! Diagnostic status reports.

use crate::segment::{Digest, Segment};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A status report: diagnostic keys and their values.
pub type Status = Map<String, Value>;

/// How much detail a status report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusVerbosity {
    /// Identity, lifecycle state and counters.
    Info,
    /// Adds per-batch details and rates.
    Detailed,
    /// Adds content digests and encoded sizes.
    Debug,
}

pub(crate) fn describe_segment(status: &mut Status, segment: &Segment, verbosity: StatusVerbosity) {
    status.insert("batches".into(), json!(segment.batches().len()));
    status.insert("rows".into(), json!(segment.rows()));
    if verbosity >= StatusVerbosity::Detailed {
        let batches: Vec<Value> = segment
            .batches()
            .iter()
            .map(|batch| {
                json!({
                    "offset": batch.offset(),
                    "rows": batch.len(),
                    "schema": batch.schema().name(),
                })
            })
            .collect();
        status.insert("batch-details".into(), Value::Array(batches));
    }
}

pub(crate) fn describe_blob(status: &mut Status, blob: &[u8]) {
    if let Some(digest) = Digest::from_encoded(blob) {
        status.insert("digest".into(), json!(digest.to_string()));
    }
    status.insert("encoded-bytes".into(), json!(blob.len()));
}
