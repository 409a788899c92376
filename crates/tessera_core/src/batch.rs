//! Record batches.

use crate::data::{Data, Schema};
use crate::error::{StoreError, StoreResult};
use crate::ids::{Id, IdSet, MAX_ID};
use std::ops::Range;
use std::sync::Arc;

/// An ordered run of rows sharing one schema.
///
/// Row `i` carries identifier `offset + i`, so a batch always covers the
/// contiguous range `[offset, offset + len)`. Batches are immutable; erasure
/// and query selection produce new batches.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    schema: Arc<Schema>,
    offset: Id,
    rows: Vec<Vec<Data>>,
}

impl RecordBatch {
    /// Creates a batch whose first row has identifier `offset`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBatch` if `rows` is empty, if a row's width differs
    /// from the schema's, or if the identifier range would exceed
    /// [`MAX_ID`].
    pub fn new(schema: Arc<Schema>, offset: Id, rows: Vec<Vec<Data>>) -> StoreResult<Self> {
        if rows.is_empty() {
            return Err(StoreError::invalid_batch("batch has no rows"));
        }
        if let Some(position) = rows.iter().position(|row| row.len() != schema.width()) {
            return Err(StoreError::invalid_batch(format!(
                "row {position} has {} values, schema {} has {} fields",
                rows[position].len(),
                schema.name(),
                schema.width()
            )));
        }
        let len = rows.len() as u64;
        match offset.checked_add(len - 1) {
            Some(last) if last <= MAX_ID => {}
            _ => {
                return Err(StoreError::invalid_batch(format!(
                    "{len} rows at offset {offset} overflow the identifier space"
                )))
            }
        }
        Ok(Self {
            schema,
            offset,
            rows,
        })
    }

    /// Returns the shared schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the identifier of the first row.
    #[must_use]
    pub fn offset(&self) -> Id {
        self.offset
    }

    /// Returns the identifier of the last row.
    #[must_use]
    pub fn last_id(&self) -> Id {
        self.offset + self.len() - 1
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.rows.len() as u64
    }

    /// Always false; a batch holds at least one row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the half-open identifier range of the batch.
    #[must_use]
    pub fn range(&self) -> Range<Id> {
        self.offset..self.offset + self.len()
    }

    /// Returns the identifiers of the batch as a set.
    #[must_use]
    pub fn ids(&self) -> IdSet {
        IdSet::from_range(self.range())
    }

    /// Returns the rows in identifier order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Data>] {
        &self.rows
    }

    /// Returns the row with identifier `id`.
    #[must_use]
    pub fn row(&self, id: Id) -> Option<&[Data]> {
        let index = usize::try_from(id.checked_sub(self.offset)?).ok()?;
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Iterates over `(identifier, row)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Id, &[Data])> + '_ {
        self.range().zip(self.rows.iter().map(Vec::as_slice))
    }

    /// Returns the rows whose identifiers are in `ids`.
    ///
    /// One batch is produced per maximal contiguous run of selected
    /// identifiers, in ascending order. Identifiers outside the batch are
    /// ignored.
    #[must_use]
    pub fn select(&self, ids: &IdSet) -> Vec<Self> {
        let selected = self.ids().intersection(ids);
        selected
            .runs()
            .map(|run| self.slice(run))
            .collect()
    }

    /// Copies the rows of a non-empty sub-range of the batch.
    fn slice(&self, run: Range<Id>) -> Self {
        let start = (run.start - self.offset) as usize;
        let end = (run.end - self.offset) as usize;
        Self {
            schema: Arc::clone(&self.schema),
            offset: run.start,
            rows: self.rows[start..end].to_vec(),
        }
    }
}
