//! Event identifiers and identifier sets.
//!
//! Every ingested row carries an [`Id`]: a globally unique, monotonically
//! assigned, never reused unsigned integer. An [`IdSet`] scopes queries and
//! erasures. It stores maximal runs of consecutive identifiers, so a set
//! costs one entry per run however wide the runs are; "every identifier" is
//! a single run.

use rangemap::RangeSet;
use std::fmt;
use std::ops::{BitAnd, BitOr, Range, Sub};

/// A row identifier.
pub type Id = u64;

/// The largest identifier a record batch may carry.
///
/// Ranges are half-open, so `u64::MAX` itself is reserved as the exclusive
/// end of the last possible range.
pub const MAX_ID: Id = u64::MAX - 1;

/// A set of identifiers.
///
/// Supports membership, intersection, union, difference and ascending
/// iteration, either one id at a time ([`IdSet::iter`]) or in maximal
/// contiguous runs ([`IdSet::runs`]). Identifiers above [`MAX_ID`] are never
/// members.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct IdSet {
    runs: RangeSet<Id>,
}

fn span(range: &Range<Id>) -> u64 {
    range.end - range.start
}

impl IdSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding every identifier of the half-open `range`.
    #[must_use]
    pub fn from_range(range: Range<Id>) -> Self {
        let mut set = Self::new();
        set.insert_range(range);
        set
    }

    /// Inserts `id`, returning true if it was not present.
    pub fn insert(&mut self, id: Id) -> bool {
        if id > MAX_ID {
            return false;
        }
        self.insert_range(id..id + 1) == 1
    }

    /// Inserts every identifier of `range`, returning how many were new.
    pub fn insert_range(&mut self, range: Range<Id>) -> u64 {
        if range.is_empty() {
            return 0;
        }
        let present = self.overlap(&range);
        self.runs.insert(range.clone());
        span(&range) - present
    }

    /// Removes `id`, returning true if it was present.
    pub fn remove(&mut self, id: Id) -> bool {
        if id > MAX_ID {
            return false;
        }
        self.remove_range(id..id + 1) == 1
    }

    /// Removes every identifier of `range`, returning how many were present.
    pub fn remove_range(&mut self, range: Range<Id>) -> u64 {
        if range.is_empty() {
            return 0;
        }
        let present = self.overlap(&range);
        if present > 0 {
            self.runs.remove(range);
        }
        present
    }

    /// Counts the members of `range`.
    fn overlap(&self, range: &Range<Id>) -> u64 {
        self.runs
            .overlapping(range)
            .map(|run| span(&(run.start.max(range.start)..run.end.min(range.end))))
            .sum()
    }

    /// Returns true if `id` is in the set.
    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        self.runs.contains(&id)
    }

    /// Returns the number of identifiers in the set.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.runs.iter().map(span).sum()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.iter().next().is_none()
    }

    /// Returns the smallest identifier.
    #[must_use]
    pub fn first(&self) -> Option<Id> {
        self.runs.iter().next().map(|run| run.start)
    }

    /// Returns the largest identifier.
    #[must_use]
    pub fn last(&self) -> Option<Id> {
        self.runs.iter().last().map(|run| run.end - 1)
    }

    /// Returns the identifiers present in both sets.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut result = Self::new();
        for run in self.runs.iter() {
            for shared in other.runs.overlapping(run) {
                result
                    .runs
                    .insert(run.start.max(shared.start)..run.end.min(shared.end));
            }
        }
        result
    }

    /// Returns the identifiers present in either set.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for run in other.runs.iter() {
            result.runs.insert(run.clone());
        }
        result
    }

    /// Returns the identifiers of `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for run in other.runs.iter() {
            result.runs.remove(run.clone());
        }
        result
    }

    /// Returns true if the sets share at least one identifier.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.runs
            .iter()
            .any(|run| other.runs.overlapping(run).next().is_some())
    }

    /// Returns true if every identifier of `self` is in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.difference(other).is_empty()
    }

    /// Iterates over the identifiers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Id> + '_ {
        self.runs.iter().flat_map(Clone::clone)
    }

    /// Iterates over maximal runs of consecutive identifiers, ascending.
    ///
    /// `{1, 2, 3, 7, 8}` yields `1..4` and `7..9`.
    pub fn runs(&self) -> impl Iterator<Item = Range<Id>> + '_ {
        self.runs.iter().cloned()
    }
}

impl From<Range<Id>> for IdSet {
    fn from(range: Range<Id>) -> Self {
        Self::from_range(range)
    }
}

impl FromIterator<Id> for IdSet {
    fn from_iter<I: IntoIterator<Item = Id>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Id> for IdSet {
    fn extend<I: IntoIterator<Item = Id>>(&mut self, iter: I) {
        for id in iter {
            self.insert(id);
        }
    }
}

impl BitAnd for &IdSet {
    type Output = IdSet;

    fn bitand(self, rhs: Self) -> IdSet {
        self.intersection(rhs)
    }
}

impl BitOr for &IdSet {
    type Output = IdSet;

    fn bitor(self, rhs: Self) -> IdSet {
        self.union(rhs)
    }
}

impl Sub for &IdSet {
    type Output = IdSet;

    fn sub(self, rhs: Self) -> IdSet {
        self.difference(rhs)
    }
}

impl fmt::Debug for IdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.runs()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn range_membership() {
        let set = IdSet::from_range(10..20);
        assert_eq!(set.len(), 10);
        assert!(set.contains(10));
        assert!(set.contains(19));
        assert!(!set.contains(20));
        assert_eq!(set.first(), Some(10));
        assert_eq!(set.last(), Some(19));
    }

    #[test]
    fn empty_range_is_empty_set() {
        let set = IdSet::from_range(5..5);
        assert!(set.is_empty());
        assert_eq!(set.first(), None);
        assert_eq!(set.runs().count(), 0);
    }

    #[test]
    fn set_algebra() {
        let a = IdSet::from_range(0..10);
        let b = IdSet::from_range(5..15);

        assert_eq!(&a & &b, IdSet::from_range(5..10));
        assert_eq!(&a | &b, IdSet::from_range(0..15));
        assert_eq!(&a - &b, IdSet::from_range(0..5));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&IdSet::from_range(10..20)));
        assert!(IdSet::from_range(2..4).is_subset(&a));
    }

    #[test]
    fn runs_split_on_gaps() {
        let set: IdSet = [1, 2, 3, 7, 8, 20].into_iter().collect();
        let runs: Vec<_> = set.runs().collect();
        assert_eq!(runs, vec![1..4, 7..9, 20..21]);
    }

    #[test]
    fn iteration_is_ascending() {
        let set: IdSet = [9, 3, 5, 1].into_iter().collect();
        let ids: Vec<_> = set.iter().collect();
        assert_eq!(ids, vec![1, 3, 5, 9]);
    }

    #[test]
    fn insert_and_remove() {
        let mut set = IdSet::new();
        assert!(set.insert(4));
        assert!(!set.insert(4));
        assert_eq!(set.insert_range(4..8), 3);
        assert!(set.remove(5));
        assert_eq!(set.runs().collect::<Vec<_>>(), vec![4..5, 6..8]);
        assert_eq!(set.remove_range(0..7), 2);
        assert_eq!(set.runs().collect::<Vec<_>>(), vec![7..8]);
    }

    #[test]
    fn full_range_is_a_single_run() {
        let everything = IdSet::from_range(0..MAX_ID);
        assert_eq!(everything.len(), MAX_ID);
        assert_eq!(everything.runs().count(), 1);
        assert_eq!(everything.last(), Some(MAX_ID - 1));

        let scope = IdSet::from_range(10..20);
        assert_eq!(&everything & &scope, scope);
        assert!(scope.is_subset(&everything));

        let rest = &everything - &scope;
        assert_eq!(rest.runs().collect::<Vec<_>>(), vec![0..10, 20..MAX_ID]);
        assert_eq!(rest.len(), MAX_ID - 10);
        assert!(!rest.intersects(&scope));
        assert_eq!(&rest | &scope, everything);
    }

    #[test]
    fn wide_ranges_count_overlap() {
        let mut set = IdSet::from_range(1 << 40..1 << 41);
        assert_eq!(set.insert_range(0..(1 << 40) + 5), 1 << 40);
        assert_eq!(set.remove_range(1 << 39..1 << 40), 1 << 39);
        assert_eq!(set.runs().collect::<Vec<_>>(), vec![0..1 << 39, 1 << 40..1 << 41]);
    }

    #[test]
    fn ids_above_max_are_rejected() {
        let mut set = IdSet::new();
        assert!(!set.insert(u64::MAX));
        assert!(!set.contains(u64::MAX));
        assert!(set.insert(MAX_ID));
        assert_eq!(set.runs().collect::<Vec<_>>(), vec![MAX_ID..u64::MAX]);
        assert!(!set.remove(u64::MAX));
    }

    #[test]
    fn debug_shows_runs() {
        let set: IdSet = [1, 2, 5].into_iter().collect();
        assert_eq!(format!("{set:?}"), "{1..3, 5..6}");
    }

    proptest! {
        #[test]
        fn runs_cover_exactly_the_set(ids in prop::collection::vec(0u64..500, 0..200)) {
            let set: IdSet = ids.into_iter().collect();
            let mut rebuilt = IdSet::new();
            let mut previous_end: Option<Id> = None;
            for run in set.runs() {
                if let Some(end) = previous_end {
                    // Runs are maximal, so consecutive runs never touch.
                    prop_assert!(run.start > end);
                }
                previous_end = Some(run.end);
                rebuilt.insert_range(run);
            }
            prop_assert_eq!(rebuilt, set);
        }

        #[test]
        fn difference_and_intersection_partition_the_set(
            a in prop::collection::vec(0u64..300, 0..100),
            b in prop::collection::vec(0u64..300, 0..100),
        ) {
            let a: IdSet = a.into_iter().collect();
            let b: IdSet = b.into_iter().collect();
            let kept = &a - &b;
            let removed = &a & &b;
            prop_assert!(!kept.intersects(&removed));
            prop_assert_eq!(&kept | &removed, a);
        }
    }
}
