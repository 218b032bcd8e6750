//! Sparse, sorted table of packed offsets keyed by state tag.
//!
//! Each per-process accumulator table holds one [`PackedOffset`] per state
//! bucket that has ever been observed, sorted by the 8-bit tag embedded in
//! the offset. Most processes visit a handful of the 80 possible buckets, so
//! the table stays tiny and lookup is a short binary search.

use crate::long_pool::{LongPool, PackedOffset};

/// A per-record sorted vector of packed offsets.
///
/// Invariant: entry tags are strictly ascending, and each entry's tag equals
/// the state key it was inserted under.
#[derive(Debug, Default)]
pub struct SparseStateTable {
    entries: Vec<PackedOffset>,
}

impl SparseStateTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binary search on the tag byte. `Ok(i)` is a hit, `Err(i)` the
    /// insertion point.
    pub fn find(&self, tag: u8) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&tag, |off| off.tag())
    }

    /// The offset stored under `tag`, if present.
    #[must_use]
    pub fn get(&self, tag: u8) -> Option<PackedOffset> {
        self.find(tag).ok().map(|i| self.entries[i])
    }

    /// The offset stored under `tag`, allocating a zeroed `slots`-long group
    /// from `pool` on a miss.
    pub fn get_or_insert(&mut self, tag: u8, slots: usize, pool: &mut LongPool) -> PackedOffset {
        match self.find(tag) {
            Ok(i) => self.entries[i],
            Err(i) => {
                let off = pool.alloc(slots).with_tag(tag);
                self.entries.insert(i, off);
                off
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending tag order.
    pub fn iter(&self) -> impl Iterator<Item = PackedOffset> + '_ {
        self.entries.iter().copied()
    }

    /// Rebuild from deserialized entries. The caller has already validated
    /// each offset against the pool and checked the ascending-tag invariant.
    pub(crate) fn from_entries(entries: Vec<PackedOffset>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].tag() < w[1].tag()));
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_tags_sorted() {
        let mut pool = LongPool::new();
        let mut table = SparseStateTable::new();
        for tag in [41u8, 3, 79, 0, 12] {
            table.get_or_insert(tag, 1, &mut pool);
        }
        let tags: Vec<u8> = table.iter().map(|o| o.tag()).collect();
        assert_eq!(tags, vec![0, 3, 12, 41, 79]);
    }

    #[test]
    fn get_or_insert_is_idempotent_per_tag() {
        let mut pool = LongPool::new();
        let mut table = SparseStateTable::new();
        let first = table.get_or_insert(9, 4, &mut pool);
        let second = table.get_or_insert(9, 4, &mut pool);
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn find_reports_insertion_point_on_miss() {
        let mut pool = LongPool::new();
        let mut table = SparseStateTable::new();
        table.get_or_insert(10, 1, &mut pool);
        table.get_or_insert(30, 1, &mut pool);
        assert_eq!(table.find(10), Ok(0));
        assert_eq!(table.find(20), Err(1));
        assert_eq!(table.find(40), Err(2));
    }

    #[test]
    fn stored_tag_matches_lookup_key() {
        let mut pool = LongPool::new();
        let mut table = SparseStateTable::new();
        let off = table.get_or_insert(61, 4, &mut pool);
        assert_eq!(off.tag(), 61);
        assert_eq!(table.get(61), Some(off));
        assert_eq!(table.get(62), None);
    }

    #[test]
    fn inserted_groups_are_zeroed_and_distinct() {
        let mut pool = LongPool::new();
        let mut table = SparseStateTable::new();
        let a = table.get_or_insert(1, 4, &mut pool);
        let b = table.get_or_insert(2, 4, &mut pool);
        pool.set(a, 0, 99);
        assert_eq!(pool.get(b, 0), 0);
        assert_ne!((a.array(), a.index()), (b.array(), b.index()));
    }
}
