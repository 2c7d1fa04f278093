use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;

use super::Interval;
use crate::StoreError;

/// The free byte intervals of the data file, mirrored in two orderings:
/// by begin offset for containment and neighbor queries, and by
/// `(length, begin)` for best-fit allocation. Every interval lives in
/// both views or in neither.
///
/// Intervals are not coalesced on insert; [`FreeSpaceMap::merge_all`]
/// does that in one pass when the engine compacts.
#[derive(Debug, Default)]
pub struct FreeSpaceMap {
    by_begin: BTreeMap<u64, u64>,
    by_length: BTreeSet<(u64, u64)>,
}

impl FreeSpaceMap {
    /// Insert a free interval. The caller guarantees it is disjoint
    /// from every stored interval; empty intervals are dropped.
    pub fn add(&mut self, iv: Interval) {
        if iv.is_empty() {
            return;
        }

        self.by_begin.insert(iv.begin, iv.end);
        self.by_length.insert((iv.length(), iv.begin));
    }

    fn remove(&mut self, iv: Interval) {
        self.by_begin.remove(&iv.begin);
        self.by_length.remove(&(iv.length(), iv.begin));
    }

    /// Subtract `iv` from the one stored interval that fully contains
    /// it, keeping any remainder on either side.
    pub fn reserve(&mut self, iv: Interval) -> Result<(), StoreError> {
        if iv.is_empty() {
            return Ok(());
        }

        let container = self
            .by_begin
            .range(..=iv.begin)
            .next_back()
            .map(|(&begin, &end)| Interval::new(begin, end))
            .filter(|container| container.contains(&iv))
            .ok_or(StoreError::NoFreeContainer(iv))?;

        self.remove(container);
        self.add(Interval::new(container.begin, iv.begin));
        self.add(Interval::new(iv.end, container.end));

        Ok(())
    }

    /// Best fit: remove and return the smallest stored interval of
    /// length at least `size`, breaking ties by begin offset. The
    /// caller splits off and re-adds any surplus.
    pub fn take(&mut self, size: u64) -> Option<Interval> {
        let &(length, begin) = self.by_length.range((size, 0)..).next()?;
        let iv = Interval::new(begin, begin + length);
        self.remove(iv);
        Some(iv)
    }

    /// Merge every pair of adjacent intervals and rebuild both views.
    pub fn merge_all(&mut self) {
        let merged = self
            .by_begin
            .iter()
            .map(|(&begin, &end)| Interval::new(begin, end))
            .coalesce(|left, right| {
                if left.end == right.begin {
                    Ok(Interval::new(left.begin, right.end))
                } else {
                    Err((left, right))
                }
            })
            .collect::<Vec<_>>();

        self.by_begin.clear();
        self.by_length.clear();

        for iv in merged {
            self.add(iv);
        }
    }

    /// Repeatedly remove the tail interval whose end touches
    /// `file_end`, returning the final end so the caller can truncate
    /// the file down to it.
    pub fn trim_tail(&mut self, mut file_end: u64) -> u64 {
        while let Some((&begin, &end)) = self.by_begin.iter().next_back() {
            if end != file_end {
                break;
            }

            self.remove(Interval::new(begin, end));
            file_end = begin;
        }

        file_end
    }

    pub fn len(&self) -> usize {
        self.by_begin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_begin.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = Interval> + '_ {
        self.by_begin
            .iter()
            .map(|(&begin, &end)| Interval::new(begin, end))
    }
}
