//! Structured differences between two array snapshots.
//!
//! [`diff`] describes how to turn one sequence into another as removals,
//! additions and moves:
//!
//! 1. The k-th occurrence of a value in the old sequence is matched with the
//!    k-th occurrence of the same value in the new one. Unmatched old
//!    positions are removed, unmatched new positions are added.
//! 2. Among the matched pairs, taken in old order, the longest run whose new
//!    positions increase stays put. Every other matched pair is reported as
//!    a move from its old index to its new index.
//!
//! [`diff`] only needs `PartialEq` and matches in `O(n·m)`. [`diff_hashed`]
//! gives the same result in `O(n log n)` for hashable element types.
//!
//! # Example
//!
//! ```
//! use meta_property::diff;
//!
//! let changes = diff(&[1, 2, 3, 4], &[1, 5, 6, 4]);
//! assert_eq!(changes.indexes_removed, vec![1, 2]);
//! assert_eq!(changes.values_added, vec![(5, 1), (6, 2)]);
//! assert!(changes.position_changed.is_empty());
//!
//! let moved = diff(&[0, 1], &[1, 0]);
//! assert_eq!(moved.position_changed, vec![(0, 1)]);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use crate::error::{PropertyError, Result};

/// The difference between two array snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayChanges<T> {
    /// Indexes into the old sequence that were removed, ascending.
    pub indexes_removed: Vec<usize>,
    /// Values that were added with their index in the new sequence, ascending
    /// by index.
    pub values_added: Vec<(T, usize)>,
    /// `(old index, new index)` of values that moved, ascending by new index.
    pub position_changed: Vec<(usize, usize)>,
}

impl<T> Default for ArrayChanges<T> {
    fn default() -> Self {
        Self {
            indexes_removed: Vec::new(),
            values_added: Vec::new(),
            position_changed: Vec::new(),
        }
    }
}

impl<T> ArrayChanges<T> {
    /// Whether the two sequences were identical.
    pub fn is_empty(&self) -> bool {
        self.indexes_removed.is_empty()
            && self.values_added.is_empty()
            && self.position_changed.is_empty()
    }
}

impl<T: Clone> ArrayChanges<T> {
    /// Rebuild the new sequence from the old one.
    ///
    /// Fails with [`PropertyError::InvalidArgument`] if the changes do not
    /// describe an edit of `old`.
    pub fn apply(&self, old: &[T]) -> Result<Vec<T>> {
        let malformed = || PropertyError::invalid_argument("changes do not fit the sequence");
        let len = old
            .len()
            .checked_sub(self.indexes_removed.len())
            .ok_or_else(malformed)?
            + self.values_added.len();

        let mut slots: Vec<Option<T>> = vec![None; len];
        for (value, index) in &self.values_added {
            *slots.get_mut(*index).ok_or_else(malformed)? = Some(value.clone());
        }
        let mut moved = HashSet::new();
        for &(from, to) in &self.position_changed {
            let value = old.get(from).ok_or_else(malformed)?;
            *slots.get_mut(to).ok_or_else(malformed)? = Some(value.clone());
            moved.insert(from);
        }

        let mut stable = old.iter().enumerate().filter_map(|(index, value)| {
            let skip = moved.contains(&index) || self.indexes_removed.contains(&index);
            (!skip).then(|| value.clone())
        });
        let result = slots
            .into_iter()
            .map(|slot| slot.or_else(|| stable.next()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(malformed)?;
        if stable.next().is_some() {
            return Err(malformed());
        }
        Ok(result)
    }
}

/// Compute the changes turning `old` into `new`.
pub fn diff<T: PartialEq + Clone>(old: &[T], new: &[T]) -> ArrayChanges<T> {
    let mut matched_new = vec![false; new.len()];
    settle(old, new, |value| {
        let found = new
            .iter()
            .enumerate()
            .position(|(new_index, candidate)| !matched_new[new_index] && candidate == value);
        if let Some(new_index) = found {
            matched_new[new_index] = true;
        }
        found
    })
}

/// [`diff`] for hashable elements, without rescanning `new` per element.
pub fn diff_hashed<T: Hash + Eq + Clone>(old: &[T], new: &[T]) -> ArrayChanges<T> {
    let mut positions: HashMap<&T, VecDeque<usize>> = HashMap::new();
    for (index, value) in new.iter().enumerate() {
        positions.entry(value).or_default().push_back(index);
    }
    settle(old, new, |value| positions.get_mut(value)?.pop_front())
}

/// Builds the changes from a matcher returning the new index of the next
/// unmatched occurrence of a value.
fn settle<T: Clone>(
    old: &[T],
    new: &[T],
    mut next_match: impl FnMut(&T) -> Option<usize>,
) -> ArrayChanges<T> {
    let mut matched_new = vec![false; new.len()];
    // (old index, new index), in old order.
    let mut pairs = Vec::new();
    let mut indexes_removed = Vec::new();
    for (old_index, value) in old.iter().enumerate() {
        match next_match(value) {
            Some(new_index) => {
                matched_new[new_index] = true;
                pairs.push((old_index, new_index));
            }
            None => indexes_removed.push(old_index),
        }
    }

    let values_added = new
        .iter()
        .enumerate()
        .filter(|(index, _)| !matched_new[*index])
        .map(|(index, value)| (value.clone(), index))
        .collect();

    let targets: Vec<usize> = pairs.iter().map(|&(_, new_index)| new_index).collect();
    let stable = longest_increasing(&targets);
    let mut position_changed: Vec<(usize, usize)> = pairs
        .into_iter()
        .zip(stable)
        .filter(|(_, keep)| !keep)
        .map(|(pair, _)| pair)
        .collect();
    position_changed.sort_by_key(|&(_, new_index)| new_index);

    ArrayChanges {
        indexes_removed,
        values_added,
        position_changed,
    }
}

/// Marks one longest strictly increasing subsequence of `seq`.
///
/// Patience sorting; among equally long candidates the one ending in the
/// smallest values is kept.
fn longest_increasing(seq: &[usize]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut previous = vec![None; seq.len()];
    for (position, &value) in seq.iter().enumerate() {
        let slot = tails.partition_point(|&tail| seq[tail] < value);
        if slot > 0 {
            previous[position] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(position);
        } else {
            tails[slot] = position;
        }
    }

    let mut keep = vec![false; seq.len()];
    let mut cursor = tails.last().copied();
    while let Some(position) = cursor {
        keep[position] = true;
        cursor = previous[position];
    }
    keep
}
