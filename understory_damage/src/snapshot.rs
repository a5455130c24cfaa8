// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Immutable record of a finished frame.

use alloc::vec::Vec;
use core::fmt;
use core::hash::BuildHasher;

use hashbrown::{DefaultHashBuilder, HashTable};
use kurbo::Size;

use crate::contribution::Contribution;

/// The contributions of one finished frame, plus its canvas size.
///
/// Produced by [`DamageContext::finish_frame`](crate::DamageContext::finish_frame)
/// and handed back to [`DamageContext::init_frame`](crate::DamageContext::init_frame)
/// as the previous frame of the next one. Contributions are kept in paint order
/// and indexed by their cross-frame identity.
pub struct FrameSnapshot<L: ?Sized> {
    size: Size,
    entries: Vec<Contribution<L>>,
    lookup: HashTable<usize>,
    hasher: DefaultHashBuilder,
}

impl<L: ?Sized> FrameSnapshot<L> {
    pub(crate) fn with_capacity(size: Size, capacity: usize) -> Self {
        Self {
            size,
            entries: Vec::with_capacity(capacity),
            lookup: HashTable::with_capacity(capacity),
            hasher: DefaultHashBuilder::default(),
        }
    }

    /// Appends a contribution unless an equal one is already present.
    ///
    /// Returns `false` for duplicates.
    pub(crate) fn insert(&mut self, contribution: Contribution<L>) -> bool {
        let hash = self.hasher.hash_one(&contribution);
        let entries = &self.entries;
        if self
            .lookup
            .find(hash, |&i| entries[i] == contribution)
            .is_some()
        {
            return false;
        }
        let hasher = &self.hasher;
        self.lookup
            .insert_unique(hash, entries.len(), |&i| hasher.hash_one(&entries[i]));
        self.entries.push(contribution);
        true
    }

    /// Canvas size of the frame.
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Number of recorded contributions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the frame painted nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the contributions in paint order.
    pub fn iter(&self) -> impl Iterator<Item = &Contribution<L>> + '_ {
        self.entries.iter()
    }

    /// Returns the recorded contribution that is the same logical unit as
    /// `contribution`, if any.
    #[must_use]
    pub fn find(&self, contribution: &Contribution<L>) -> Option<&Contribution<L>> {
        self.find_index(contribution).map(|i| &self.entries[i])
    }

    /// Returns `true` if an equal contribution was recorded.
    #[must_use]
    pub fn contains(&self, contribution: &Contribution<L>) -> bool {
        self.find_index(contribution).is_some()
    }

    pub(crate) fn find_index(&self, contribution: &Contribution<L>) -> Option<usize> {
        let hash = self.hasher.hash_one(contribution);
        self.lookup
            .find(hash, |&i| self.entries[i] == *contribution)
            .copied()
    }

    pub(crate) fn get(&self, index: usize) -> &Contribution<L> {
        &self.entries[index]
    }
}

impl<L: ?Sized> fmt::Debug for FrameSnapshot<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSnapshot")
            .field("size", &self.size)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contribution::{Comparator, LayerKind};
    use crate::mutator::MutatorChain;
    use alloc::rc::Rc;
    use kurbo::Rect;

    struct Node(u32);

    const KIND: Comparator<Node> = Comparator::new(LayerKind::new(0), |a, b| a.0 == b.0);

    fn contribution(value: u32, bounds: Rect, paint_order: usize) -> Contribution<Node> {
        Contribution {
            paint_bounds: bounds,
            layer: Rc::new(Node(value)),
            comparator: KIND,
            mutators: MutatorChain::new(),
            paint_order,
        }
    }

    #[test]
    fn keeps_paint_order_and_finds_by_identity() {
        let mut snapshot = FrameSnapshot::with_capacity(Size::new(100.0, 100.0), 4);
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 0.0, 30.0, 10.0);
        assert!(snapshot.insert(contribution(1, a, 0)));
        assert!(snapshot.insert(contribution(2, b, 1)));
        assert_eq!(snapshot.len(), 2);

        let orders: Vec<_> = snapshot.iter().map(Contribution::paint_order).collect();
        assert_eq!(orders, [0, 1]);

        // A rebuilt node with equal content is found; paint order is irrelevant.
        let probe = contribution(2, b, 9);
        assert_eq!(snapshot.find(&probe).map(Contribution::paint_order), Some(1));
        assert!(!snapshot.contains(&contribution(3, b, 1)));
        assert!(!snapshot.contains(&contribution(2, a, 1)));
    }

    #[test]
    fn duplicates_are_kept_once() {
        let mut snapshot = FrameSnapshot::with_capacity(Size::new(10.0, 10.0), 2);
        let r = Rect::new(0.0, 0.0, 5.0, 5.0);
        assert!(snapshot.insert(contribution(1, r, 0)));
        assert!(!snapshot.insert(contribution(1, r, 1)));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn many_entries_survive_rehash() {
        let mut snapshot = FrameSnapshot::with_capacity(Size::new(1000.0, 1000.0), 0);
        for i in 0..200_u32 {
            let x = f64::from(i);
            assert!(snapshot.insert(contribution(i, Rect::new(x, 0.0, x + 1.0, 1.0), i as usize)));
        }
        for i in 0..200_u32 {
            let x = f64::from(i);
            let found = snapshot.find(&contribution(i, Rect::new(x, 0.0, x + 1.0, 1.0), 0));
            assert_eq!(found.map(Contribution::paint_order), Some(i as usize));
        }
    }
}
