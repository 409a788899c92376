//! Query execution over a segment.

use crate::batch::RecordBatch;
use crate::expression::Expression;
use crate::ids::IdSet;
use crate::segment::Segment;
use serde::Serialize;

/// Counters describing one query execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    /// Batches whose range intersected the scope.
    pub batches_considered: usize,
    /// Batches skipped without evaluating the predicate.
    pub batches_skipped: usize,
    /// Rows the predicate was evaluated on.
    pub rows_evaluated: u64,
    /// Rows that matched.
    pub rows_matched: u64,
}

/// Runs `expression` over the rows of `segment` whose identifier is in `ids`.
///
/// Batches are visited in segment order. A batch disjoint from `ids` is
/// skipped without touching the predicate. Matches are handed to `sink` as
/// record batches, one per maximal run of consecutive matching identifiers,
/// in batch order and row order within each batch.
pub fn execute<F>(segment: &Segment, expression: &Expression, ids: &IdSet, mut sink: F) -> QueryStats
where
    F: FnMut(RecordBatch),
{
    let mut stats = QueryStats::default();

    for batch in segment.batches() {
        let scope = batch.ids().intersection(ids);
        if scope.is_empty() {
            stats.batches_skipped += 1;
            continue;
        }
        stats.batches_considered += 1;

        let schema = batch.schema();
        let mut hits = IdSet::new();
        for id in scope.iter() {
            let Some(row) = batch.row(id) else {
                continue;
            };
            stats.rows_evaluated += 1;
            if expression.matches(schema, row) {
                hits.insert(id);
            }
        }

        if hits.is_empty() {
            continue;
        }
        stats.rows_matched += hits.len();
        for part in batch.select(&hits) {
            sink(part);
        }
    }

    stats
}
