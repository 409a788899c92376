//! Property-based test generators using proptest.
//!
//! Provides strategies for generating row values, batch layouts and
//! identifier sets that respect the stores' invariants.

use proptest::prelude::*;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tessera_core::{Data, Id, IdSet, RecordBatch, Schema};

/// Strategy for generating scalar row values.
pub fn data_strategy() -> impl Strategy<Value = Data> {
    prop_oneof![
        Just(Data::Null),
        any::<bool>().prop_map(Data::Bool),
        any::<i64>().prop_map(Data::Integer),
        any::<u64>().prop_map(Data::Count),
        (-1.0e9f64..1.0e9).prop_map(Data::Real),
        "[a-z.]{0,12}".prop_map(Data::Text),
        any::<[u8; 4]>().prop_map(|octets| Data::Address(IpAddr::V4(Ipv4Addr::from(octets)))),
        any::<i64>().prop_map(Data::Time),
    ]
}

/// Strategy for generating non-overlapping batch layouts.
///
/// Yields `(offset, len)` pairs in ascending offset order, separated by gaps
/// of up to `max_gap` identifiers.
pub fn layout_strategy(
    batches: std::ops::Range<usize>,
    max_len: u64,
    max_gap: u64,
) -> impl Strategy<Value = Vec<(Id, u64)>> {
    prop::collection::vec((0..=max_gap, 1..=max_len), batches).prop_map(|parts| {
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

/// Strategy for generating identifier sets below `bound`.
pub fn id_set_strategy(bound: Id) -> impl Strategy<Value = IdSet> {
    prop_oneof![
        prop::collection::vec(0..bound, 0..64).prop_map(|ids| ids.into_iter().collect::<IdSet>()),
        (0..bound, 0..bound).prop_map(|(a, b)| IdSet::from_range(a.min(b)..a.max(b))),
    ]
}

/// Strategy for generating a batch with random values at a fixed range.
pub fn batch_strategy(offset: Id, len: usize) -> impl Strategy<Value = RecordBatch> {
    let schema = Arc::new(Schema::new("test.random", ["a", "b"]));
    prop::collection::vec(prop::collection::vec(data_strategy(), 2), len).prop_map(move |rows| {
        RecordBatch::new(Arc::clone(&schema), offset, rows).expect("rows match schema width")
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self { cases: 256 }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    pub fn quick() -> Self {
        Self { cases: 32 }
    }

    /// Converts to a proptest configuration.
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig::with_cases(self.cases)
    }
}
