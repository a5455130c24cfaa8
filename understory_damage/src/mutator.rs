// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visual modifiers active above a drawing unit.
//!
//! Traversal code pushes a [`Mutator`] for every clip, opacity, filter, or
//! transform it enters. The resulting [`MutatorChain`] is an immutable,
//! reference-counted list linked from the innermost modifier outwards, so all
//! contributions below the same ancestors share one tail.

use alloc::rc::Rc;
use core::fmt;

use kurbo::{Affine, BezPath, Rect, RoundedRect};
use peniko::BlendMode;

/// A single visual modifier.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutator {
    /// Clip to a rectangle, in the local space of the modifier.
    ClipRect(Rect),
    /// Clip to a rounded rectangle.
    ClipRoundedRect(RoundedRect),
    /// Clip to an arbitrary path.
    ClipPath(BezPath),
    /// Coordinate transform.
    ///
    /// Transforms are dropped when a chain is captured for a contribution: paint
    /// bounds are already expressed in screen space.
    Transform(Affine),
    /// Group opacity, as an 8-bit alpha.
    Opacity(u8),
    /// Color filter as a row-major 4x5 color matrix.
    ColorFilter([f32; 20]),
    /// Group blend mode.
    Blend(BlendMode),
}

impl Mutator {
    /// Returns `true` for pure coordinate transforms.
    #[must_use]
    pub fn is_transform(&self) -> bool {
        matches!(self, Self::Transform(_))
    }
}

struct MutatorLink {
    mutator: Mutator,
    parent: Option<Rc<MutatorLink>>,
    len: usize,
}

/// An immutable, structurally shared list of [`Mutator`]s.
///
/// The chain is ordered from the innermost modifier (closest to the drawing
/// unit) to the outermost one. Pushing returns a new chain and leaves the
/// original untouched; both share every link below the new head.
///
/// Two chains are equal when they hold pairwise-equal mutators in the same
/// order. Comparison walks both chains in lock-step and stops early at the
/// first mismatch or as soon as both sides reach the same shared link.
///
/// # Example
///
/// ```
/// use kurbo::Rect;
/// use understory_damage::{Mutator, MutatorChain};
///
/// let root = MutatorChain::new().push(Mutator::ClipRect(Rect::new(0.0, 0.0, 100.0, 100.0)));
/// let a = root.push(Mutator::Opacity(128));
/// let b = MutatorChain::new()
///     .push(Mutator::ClipRect(Rect::new(0.0, 0.0, 100.0, 100.0)))
///     .push(Mutator::Opacity(128));
///
/// // Different links, same content.
/// assert_eq!(a, b);
/// assert_ne!(a, root);
/// ```
#[derive(Clone, Default)]
pub struct MutatorChain {
    head: Option<Rc<MutatorLink>>,
}

impl MutatorChain {
    /// Creates an empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Returns a new chain with `mutator` as its innermost modifier.
    #[must_use]
    pub fn push(&self, mutator: Mutator) -> Self {
        Self {
            head: Some(Rc::new(MutatorLink {
                mutator,
                parent: self.head.clone(),
                len: self.len() + 1,
            })),
        }
    }

    /// Returns the chain without its innermost modifier.
    #[must_use]
    pub fn parent(&self) -> Self {
        Self {
            head: self.head.as_ref().and_then(|link| link.parent.clone()),
        }
    }

    /// Returns the innermost modifier, if any.
    #[must_use]
    pub fn innermost(&self) -> Option<&Mutator> {
        self.head.as_ref().map(|link| &link.mutator)
    }

    /// Number of modifiers in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, |link| link.len)
    }

    /// Returns `true` if the chain holds no modifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Iterates from the innermost modifier outwards.
    pub fn iter(&self) -> impl Iterator<Item = &Mutator> + '_ {
        let mut next = self.head.as_deref();
        core::iter::from_fn(move || {
            let link = next?;
            next = link.parent.as_deref();
            Some(&link.mutator)
        })
    }

    /// Returns `true` if both chains start at the same link.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Returns the chain with every [`Mutator::Transform`] removed.
    ///
    /// The longest transform-free tail is reused as-is, so chains that contain no
    /// transforms are returned without allocating.
    #[must_use]
    pub fn without_transforms(&self) -> Self {
        // Find the outermost transform; everything beyond it can be shared.
        let mut shared_tail = self.head.clone();
        let mut kept = alloc::vec::Vec::new();
        let mut pending = alloc::vec::Vec::new();
        let mut cursor = self.head.as_deref();
        while let Some(link) = cursor {
            if link.mutator.is_transform() {
                kept.append(&mut pending);
                shared_tail = link.parent.clone();
            } else {
                pending.push(&link.mutator);
            }
            cursor = link.parent.as_deref();
        }
        // Links in `kept` sit above the shared tail; transforms were skipped.
        let mut out = Self { head: shared_tail };
        for mutator in kept.into_iter().rev() {
            out = out.push(mutator.clone());
        }
        out
    }
}

impl PartialEq for MutatorChain {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut a = self.head.as_ref();
        let mut b = other.head.as_ref();
        loop {
            match (a, b) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if Rc::ptr_eq(x, y) {
                        return true;
                    }
                    if x.mutator != y.mutator {
                        return false;
                    }
                    a = x.parent.as_ref();
                    b = y.parent.as_ref();
                }
                _ => return false,
            }
        }
    }
}

impl fmt::Debug for MutatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn clip(x: f64) -> Mutator {
        Mutator::ClipRect(Rect::new(0.0, 0.0, x, x))
    }

    #[test]
    fn push_shares_tail() {
        let base = MutatorChain::new().push(clip(10.0));
        let a = base.push(Mutator::Opacity(10));
        let b = base.push(Mutator::Opacity(20));
        assert!(a.parent().ptr_eq(&base));
        assert!(b.parent().ptr_eq(&base));
        assert_eq!(a.len(), 2);
        assert_eq!(base.len(), 1);
        assert_ne!(a, b);
    }

    #[test]
    fn iterates_inner_to_outer() {
        let chain = MutatorChain::new()
            .push(clip(10.0))
            .push(Mutator::Opacity(5));
        let items: Vec<_> = chain.iter().cloned().collect();
        assert_eq!(items, [Mutator::Opacity(5), clip(10.0)]);
        assert_eq!(chain.innermost(), Some(&Mutator::Opacity(5)));
    }

    #[test]
    fn equality_is_by_content() {
        let a = MutatorChain::new().push(clip(10.0)).push(Mutator::Opacity(5));
        let b = MutatorChain::new().push(clip(10.0)).push(Mutator::Opacity(5));
        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
        assert_eq!(b, a);
    }

    #[test]
    fn distinct_tails_with_equal_content_compare_equal() {
        // Same heads on top of tails that are equal but separately allocated.
        let tail_a = MutatorChain::new().push(clip(50.0));
        let tail_b = MutatorChain::new().push(clip(50.0));
        let a = tail_a.push(Mutator::Opacity(1));
        let b = tail_b.push(Mutator::Opacity(1));
        assert_eq!(a, b);
        assert_eq!(b, a);
    }

    #[test]
    fn different_lengths_are_unequal() {
        let a = MutatorChain::new().push(clip(10.0));
        let b = a.push(Mutator::Opacity(5));
        assert_ne!(a, b);
        assert_ne!(b, a);
        assert_ne!(MutatorChain::new(), a);
        assert_eq!(MutatorChain::new(), MutatorChain::new());
    }

    #[test]
    fn mismatch_deep_in_chain() {
        let a = MutatorChain::new().push(clip(10.0)).push(Mutator::Opacity(5));
        let b = MutatorChain::new().push(clip(11.0)).push(Mutator::Opacity(5));
        assert_ne!(a, b);
    }

    #[test]
    fn without_transforms_strips_and_shares() {
        let outer = MutatorChain::new().push(clip(100.0));
        let chain = outer
            .push(Mutator::Transform(Affine::translate((5.0, 5.0))))
            .push(Mutator::Opacity(7))
            .push(Mutator::Transform(Affine::scale(2.0)))
            .push(clip(10.0));
        let stripped = chain.without_transforms();
        let items: Vec<_> = stripped.iter().cloned().collect();
        assert_eq!(items, [clip(10.0), Mutator::Opacity(7), clip(100.0)]);
        // The part outside the outermost transform is shared.
        assert!(stripped.parent().parent().ptr_eq(&outer));
    }

    #[test]
    fn without_transforms_is_free_when_none_present() {
        let chain = MutatorChain::new().push(clip(10.0)).push(Mutator::Opacity(7));
        assert!(chain.without_transforms().ptr_eq(&chain));
        assert!(MutatorChain::new().without_transforms().is_empty());
    }
}
