//! Segments: the persisted content of one partition.
//!
//! A segment is an ordered list of [`RecordBatch`]es whose identifier ranges
//! are pairwise disjoint. Its coverage is exactly the union of those ranges.
//!
//! ## Encoding
//!
//! ```text
//! +-------+---------+----------------+------------------------+
//! | magic | version | sha256(payload)| payload (CBOR)         |
//! | TSEG  | u16 LE  | 32 bytes       | partition + batches    |
//! +-------+---------+----------------+------------------------+
//! ```
//!
//! The digest is the segment's content address. Decoding checks every part
//! of the layout and the disjointness of the decoded batches; any mismatch is
//! reported as [`StoreError::CorruptSegment`].

use crate::batch::RecordBatch;
use crate::data::{Data, Schema};
use crate::error::{StoreError, StoreResult};
use crate::ids::{Id, IdSet};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Magic bytes opening every segment file.
pub const SEGMENT_MAGIC: [u8; 4] = *b"TSEG";

/// Current segment format version.
pub const SEGMENT_VERSION: u16 = 1;

const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = SEGMENT_MAGIC.len() + 2 + DIGEST_LEN;

/// SHA-256 content address of an encoded segment.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Reads the digest from the header of an encoded segment.
    ///
    /// Does not verify the payload.
    #[must_use]
    pub fn from_encoded(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(HEADER_LEN - DIGEST_LEN..HEADER_LEN)?;
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(raw);
        Some(Self(digest))
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

/// Batch as laid out in the payload.
#[derive(Serialize)]
struct BatchRef<'a> {
    schema: &'a Schema,
    offset: Id,
    rows: &'a [Vec<Data>],
}

#[derive(Deserialize)]
struct OwnedBatch {
    schema: Schema,
    offset: Id,
    rows: Vec<Vec<Data>>,
}

#[derive(Serialize)]
struct PayloadRef<'a> {
    partition: Uuid,
    batches: Vec<BatchRef<'a>>,
}

#[derive(Deserialize)]
struct OwnedPayload {
    partition: Uuid,
    batches: Vec<OwnedBatch>,
}

/// What an erase removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EraseStats {
    /// Rows removed.
    pub rows: u64,
    /// Batches dropped because every row was removed.
    pub dropped_batches: usize,
    /// Batches rewritten because some of their rows were removed.
    pub rewritten_batches: usize,
}

/// The record batches of one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    partition: Uuid,
    batches: Vec<RecordBatch>,
    coverage: IdSet,
}

impl Segment {
    /// Creates an empty segment for `partition`.
    #[must_use]
    pub fn new(partition: Uuid) -> Self {
        Self {
            partition,
            batches: Vec::new(),
            coverage: IdSet::new(),
        }
    }

    /// Returns the partition this segment belongs to.
    #[must_use]
    pub fn partition(&self) -> Uuid {
        self.partition
    }

    /// Returns the batches in insertion order.
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Returns the identifiers held by the segment.
    #[must_use]
    pub fn coverage(&self) -> &IdSet {
        &self.coverage
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.coverage.len()
    }

    /// Returns true if the segment holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Appends a batch.
    ///
    /// # Errors
    ///
    /// Returns `IdentifierCollision` if any identifier of the batch is
    /// already covered. The segment is unchanged on error.
    pub fn put(&mut self, batch: RecordBatch) -> StoreResult<()> {
        if self.coverage.intersects(&batch.ids()) {
            return Err(StoreError::IdentifierCollision {
                first: batch.offset(),
                last: batch.last_id(),
            });
        }
        self.coverage.insert_range(batch.range());
        self.batches.push(batch);
        Ok(())
    }

    /// Removes and returns the most recently appended batch.
    pub fn pop(&mut self) -> Option<RecordBatch> {
        let batch = self.batches.pop()?;
        self.coverage.remove_range(batch.range());
        Some(batch)
    }

    /// Returns the batches whose range intersects `ids`, in segment order.
    pub fn lookup<'a>(&'a self, ids: &'a IdSet) -> impl Iterator<Item = &'a RecordBatch> + 'a {
        self.batches
            .iter()
            .filter(move |batch| batch.ids().intersects(ids))
    }

    /// Returns a copy of the segment without the rows in `ids`.
    ///
    /// Batches untouched by `ids` are kept as they are. Batches entirely in
    /// `ids` are dropped. Any other batch is replaced by one batch per
    /// maximal contiguous run of its surviving rows, keeping row order.
    #[must_use]
    pub fn erase(&self, ids: &IdSet) -> (Self, EraseStats) {
        let mut stats = EraseStats::default();
        let mut result = Self::new(self.partition);

        for batch in &self.batches {
            let range = batch.ids();
            let removed = range.intersection(ids);
            if removed.is_empty() {
                result.push_unchecked(batch.clone());
                continue;
            }
            stats.rows += removed.len();
            let remaining = range.difference(&removed);
            if remaining.is_empty() {
                stats.dropped_batches += 1;
                continue;
            }
            stats.rewritten_batches += 1;
            for part in batch.select(&remaining) {
                result.push_unchecked(part);
            }
        }

        (result, stats)
    }

    /// Appends a batch already known not to collide.
    fn push_unchecked(&mut self, batch: RecordBatch) {
        self.coverage.insert_range(batch.range());
        self.batches.push(batch);
    }

    fn payload(&self) -> StoreResult<Vec<u8>> {
        let payload = PayloadRef {
            partition: self.partition,
            batches: self
                .batches
                .iter()
                .map(|batch| BatchRef {
                    schema: batch.schema(),
                    offset: batch.offset(),
                    rows: batch.rows(),
                })
                .collect(),
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&payload, &mut buf)
            .map_err(|e| StoreError::io(format!("failed to encode segment: {e}")))?;
        Ok(buf)
    }

    /// Returns the content address of the segment.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the segment cannot be serialized.
    pub fn digest(&self) -> StoreResult<Digest> {
        let payload = self.payload()?;
        Ok(Digest(Sha256::digest(&payload).into()))
    }

    /// Encodes the segment.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the segment cannot be serialized.
    pub fn encode(&self) -> StoreResult<Bytes> {
        let payload = self.payload()?;
        let digest: [u8; DIGEST_LEN] = Sha256::digest(&payload).into();

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&SEGMENT_MAGIC);
        buf.extend_from_slice(&SEGMENT_VERSION.to_le_bytes());
        buf.extend_from_slice(&digest);
        buf.extend_from_slice(&payload);
        Ok(Bytes::from(buf))
    }

    /// Decodes a segment produced by [`Segment::encode`].
    ///
    /// # Errors
    ///
    /// Returns `CorruptSegment` if the bytes are truncated, carry the wrong
    /// magic or version, fail the digest check, do not parse, or describe
    /// overlapping batches.
    pub fn decode(data: &[u8]) -> StoreResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(StoreError::corrupt_segment(format!(
                "segment too short: {} bytes",
                data.len()
            )));
        }
        if data[0..4] != SEGMENT_MAGIC {
            return Err(StoreError::corrupt_segment("invalid segment magic"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != SEGMENT_VERSION {
            return Err(StoreError::corrupt_segment(format!(
                "unsupported segment version: {version}"
            )));
        }
        let payload = &data[HEADER_LEN..];
        let expected = &data[6..HEADER_LEN];
        let actual: [u8; DIGEST_LEN] = Sha256::digest(payload).into();
        if expected != actual {
            return Err(StoreError::corrupt_segment("segment digest mismatch"));
        }

        let decoded: OwnedPayload = ciborium::from_reader(payload)
            .map_err(|e| StoreError::corrupt_segment(format!("invalid payload: {e}")))?;

        let mut schemas: Vec<Arc<Schema>> = Vec::new();
        let mut segment = Self::new(decoded.partition);
        for batch in decoded.batches {
            let schema = match schemas.iter().find(|s| ***s == batch.schema) {
                Some(shared) => Arc::clone(shared),
                None => {
                    let schema = Arc::new(batch.schema);
                    schemas.push(Arc::clone(&schema));
                    schema
                }
            };
            let batch = RecordBatch::new(schema, batch.offset, batch.rows)
                .map_err(|e| StoreError::corrupt_segment(e.to_string()))?;
            segment
                .put(batch)
                .map_err(|e| StoreError::corrupt_segment(e.to_string()))?;
        }
        Ok(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new("test.event", ["n", "tag"]))
    }

    fn batch(offset: Id, len: u64) -> RecordBatch {
        let rows = (offset..offset + len)
            .map(|id| vec![Data::Count(id), Data::from("x")])
            .collect();
        RecordBatch::new(schema(), offset, rows).unwrap()
    }

    fn segment(batches: &[(Id, u64)]) -> Segment {
        let mut segment = Segment::new(Uuid::new_v4());
        for &(offset, len) in batches {
            segment.put(batch(offset, len)).unwrap();
        }
        segment
    }

    #[test]
    fn put_tracks_coverage() {
        let segment = segment(&[(0, 10), (20, 5)]);
        assert_eq!(segment.rows(), 15);
        assert_eq!(segment.batches().len(), 2);
        assert!(segment.coverage().contains(24));
        assert!(!segment.coverage().contains(15));
    }

    #[test]
    fn put_rejects_overlap() {
        let mut segment = segment(&[(0, 10)]);
        let err = segment.put(batch(9, 5)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::IdentifierCollision { first: 9, last: 13 }
        ));
        assert_eq!(segment.rows(), 10);
    }

    #[test]
    fn pop_restores_coverage() {
        let mut segment = segment(&[(0, 10), (10, 10)]);
        assert_eq!(segment.pop().unwrap().offset(), 10);
        assert_eq!(segment.coverage(), &IdSet::from_range(0..10));
        segment.put(batch(10, 3)).unwrap();
    }

    #[test]
    fn lookup_selects_intersecting_batches() {
        let segment = segment(&[(0, 10), (10, 10), (30, 10)]);
        let ids = IdSet::from_range(15..35);
        let offsets: Vec<Id> = segment.lookup(&ids).map(RecordBatch::offset).collect();
        assert_eq!(offsets, vec![10, 30]);
    }

    #[test]
    fn erase_drops_keeps_and_rewrites() {
        let segment = segment(&[(0, 10), (10, 10), (20, 10)]);
        let ids: IdSet = (10..20).chain([25]).collect();

        let (erased, stats) = segment.erase(&ids);
        assert_eq!(stats.rows, 11);
        assert_eq!(stats.dropped_batches, 1);
        assert_eq!(stats.rewritten_batches, 1);

        let ranges: Vec<_> = erased.batches().iter().map(RecordBatch::range).collect();
        assert_eq!(ranges, vec![0..10, 20..25, 26..30]);
        assert_eq!(erased.batches()[0], segment.batches()[0]);
        assert_eq!(erased.batches()[2].rows()[0][0], Data::Count(26));
        assert_eq!(erased.rows(), 19);
        // The source segment is untouched.
        assert_eq!(segment.rows(), 30);
    }

    #[test]
    fn erase_disjoint_is_identity() {
        let segment = segment(&[(0, 10)]);
        let (erased, stats) = segment.erase(&IdSet::from_range(50..60));
        assert_eq!(stats, EraseStats::default());
        assert_eq!(erased, segment);
    }

    #[test]
    fn encode_decode() {
        let segment = segment(&[(0, 10), (100, 3)]);
        let bytes = segment.encode().unwrap();
        assert_eq!(&bytes[0..4], b"TSEG");

        let decoded = Segment::decode(&bytes).unwrap();
        assert_eq!(decoded, segment);
        assert!(Arc::ptr_eq(
            decoded.batches()[0].schema(),
            decoded.batches()[1].schema()
        ));
        assert_eq!(Digest::from_encoded(&bytes), Some(segment.digest().unwrap()));
    }

    #[test]
    fn empty_segment_encodes() {
        let segment = Segment::new(Uuid::new_v4());
        let decoded = Segment::decode(&segment.encode().unwrap()).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.partition(), segment.partition());
    }

    #[test]
    fn digest_is_content_address() {
        let a = segment(&[(0, 10)]);
        let mut b = a.clone();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        b.put(batch(10, 1)).unwrap();
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap().to_string().len(), 64);
    }

    #[test]
    fn decode_rejects_truncation() {
        let bytes = segment(&[(0, 10)]).encode().unwrap();
        let err = Segment::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, StoreError::CorruptSegment { .. }));
        let err = Segment::decode(&bytes[..10]).unwrap_err();
        assert!(matches!(err, StoreError::CorruptSegment { .. }));
    }

    #[test]
    fn decode_rejects_bad_magic_and_version() {
        let mut bytes = segment(&[(0, 10)]).encode().unwrap().to_vec();
        bytes[0] = b'X';
        assert!(Segment::decode(&bytes).unwrap_err().to_string().contains("magic"));

        let mut bytes = segment(&[(0, 10)]).encode().unwrap().to_vec();
        bytes[4] = 9;
        assert!(Segment::decode(&bytes).unwrap_err().to_string().contains("version"));
    }

    #[test]
    fn decode_rejects_flipped_payload_bit() {
        let mut bytes = segment(&[(0, 10)]).encode().unwrap().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let err = Segment::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("digest"));
    }

    #[test]
    fn decode_rejects_overlapping_batches() {
        // Bypass `put` to build a payload that violates disjointness.
        let a = batch(0, 10);
        let b = batch(5, 10);
        let payload = PayloadRef {
            partition: Uuid::new_v4(),
            batches: [&a, &b]
                .iter()
                .map(|batch| BatchRef {
                    schema: batch.schema(),
                    offset: batch.offset(),
                    rows: batch.rows(),
                })
                .collect(),
        };
        let mut body = Vec::new();
        ciborium::into_writer(&payload, &mut body).unwrap();
        let digest: [u8; DIGEST_LEN] = Sha256::digest(&body).into();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SEGMENT_MAGIC);
        bytes.extend_from_slice(&SEGMENT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&digest);
        bytes.extend_from_slice(&body);

        let err = Segment::decode(&bytes).unwrap_err();
        assert!(matches!(err, StoreError::CorruptSegment { .. }));
        assert!(err.to_string().contains("identifier collision"));
    }

    fn layout() -> impl Strategy<Value = Vec<(Id, u64)>> {
        prop::collection::vec((0u64..5, 1u64..20), 1..8).prop_map(|parts| {
            let mut next = 0;
            parts
                .into_iter()
                .map(|(gap, len)| {
                    let offset = next + gap;
                    next = offset + len;
                    (offset, len)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn erase_is_idempotent(parts in layout(), ids in prop::collection::vec(0u64..200, 0..80)) {
            let segment = segment(&parts);
            let ids: IdSet = ids.into_iter().collect();
            let (once, _) = segment.erase(&ids);
            let (twice, stats) = once.erase(&ids);
            prop_assert_eq!(stats.rows, 0);
            prop_assert_eq!(twice, once);
        }

        #[test]
        fn erase_removes_exactly_the_scope(parts in layout(), ids in prop::collection::vec(0u64..200, 0..80)) {
            let segment = segment(&parts);
            let ids: IdSet = ids.into_iter().collect();
            let (erased, stats) = segment.erase(&ids);
            prop_assert_eq!(erased.coverage(), &(segment.coverage() - &ids));
            prop_assert_eq!(stats.rows, segment.coverage().intersection(&ids).len());
            prop_assert_eq!(erased.lookup(&ids).count(), 0);
            for batch in erased.batches() {
                for (id, row) in batch.iter() {
                    prop_assert_eq!(&row[0], &Data::Count(id));
                }
            }
        }
    }
}
