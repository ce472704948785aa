//! Utility functions for destination-line interval manipulation.
//!
//! This module provides the lookup and consistency algorithms shared by the
//! SMAP model, the composer and the method binder.

use std::cmp::Ordering;
use std::ops::Range;

use foldhash::quality::RandomState as FoldHasher;

use crate::models::{FileMapping, FoldIndexMap, RangeMapping};

/// Finds the destination lines two mappings have in common.
///
/// Returns the half-open intersection of both destination ranges, or `None`
/// if they are disjoint. Ranges that merely touch (`a.dest_end() ==
/// b.dest_start()`) share no line.
pub fn common_dest_lines(r1: RangeMapping, r2: RangeMapping) -> Option<Range<u32>> {
    if r2.dest_start() < r1.dest_start() {
        return common_dest_lines(r2, r1);
    }
    let until = r1.dest_end().min(r2.dest_end());
    if until <= r2.dest_start() {
        return None;
    }
    Some(r2.dest_start()..until)
}

/// Compares an interval against a target line for binary search.
///
/// A line falling inside the interval compares equal, so a search with a
/// single line lands on the interval containing it rather than on the one
/// with the nearest start.
pub fn compare_to_line(interval: &RangeMapping, line: u32) -> Ordering {
    if interval.contains(line) {
        Ordering::Equal
    } else if interval.dest_start() > line {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

/// Binary searches destination-sorted, non-overlapping `intervals` for the
/// one containing `line` and returns its index.
pub fn find_interval(intervals: &[RangeMapping], line: u32) -> Option<usize> {
    intervals
        .binary_search_by(|interval| compare_to_line(interval, line))
        .ok()
}

/// Flattens the ranges of every file into one destination-sorted vector.
pub fn sorted_intervals(files: &[FileMapping]) -> Vec<RangeMapping> {
    let mut intervals: Vec<RangeMapping> = files
        .iter()
        .flat_map(|f| f.mappings().iter().copied())
        .collect();
    intervals.sort_unstable();
    intervals
}

/// Line order listing every range file by file, in declaration order.
pub fn grouped_line_order(files: &[FileMapping]) -> Vec<u32> {
    files
        .iter()
        .flat_map(|f| std::iter::repeat_n(f.id(), f.mappings().len()))
        .collect()
}

/// Resolves a line order to the ranges it names.
///
/// The `k`-th occurrence of a file id in `order` stands for that file's
/// `k`-th range. Returns `None` unless every range is named exactly once.
pub fn ordered_mappings<'a>(
    files: &'a [FileMapping],
    order: &[u32],
) -> Option<Vec<&'a RangeMapping>> {
    let total: usize = files.iter().map(|f| f.mappings().len()).sum();
    if order.len() != total {
        return None;
    }
    let mut cursors: FoldIndexMap<u32, (usize, usize)> =
        FoldIndexMap::with_capacity_and_hasher(files.len(), FoldHasher::default());
    for (idx, file) in files.iter().enumerate() {
        cursors.entry(file.id()).or_insert((idx, 0));
    }
    let mut out = Vec::with_capacity(total);
    for id in order {
        let (idx, next) = cursors.get_mut(id)?;
        out.push(files[*idx].mappings().get(*next)?);
        *next += 1;
    }
    Some(out)
}

/// Returns the first pair of sorted intervals sharing a destination line.
///
/// Runs in a single pass by tracking the interval reaching furthest so far,
/// which also catches an interval nested inside an earlier, longer one.
pub fn first_overlap(sorted: &[RangeMapping]) -> Option<(RangeMapping, RangeMapping)> {
    let mut widest = *sorted.first()?;
    for &next in &sorted[1..] {
        if common_dest_lines(widest, next).is_some() {
            return Some((widest, next));
        }
        if next.dest_end() > widest.dest_end() {
            widest = next;
        }
    }
    None
}

/// Index at which `mapping` would be inserted to keep `sorted` ordered,
/// or the neighbour it collides with.
pub fn insertion_point(
    sorted: &[RangeMapping],
    mapping: RangeMapping,
) -> Result<usize, RangeMapping> {
    let idx = sorted.partition_point(|m| m < &mapping);
    let before = idx.checked_sub(1).and_then(|i| sorted.get(i));
    let after = sorted.get(idx);
    for neighbour in before.into_iter().chain(after) {
        if neighbour.overlaps(&mapping) {
            return Err(*neighbour);
        }
    }
    Ok(idx)
}
