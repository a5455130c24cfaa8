// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer contributions and their cross-frame identity.

use alloc::rc::Rc;
use core::fmt;
use core::hash::{Hash, Hasher};

use kurbo::Rect;

use crate::mutator::MutatorChain;
use crate::util;

/// A scene node that can contribute to the screen.
pub trait Layer {
    /// The area the node paints, in its own coordinate space.
    ///
    /// Read at registration time by
    /// [`DamageContext::add_contribution`](crate::DamageContext::add_contribution)
    /// and again by
    /// [`ContributionHandle::update_paint_bounds`](crate::ContributionHandle::update_paint_bounds).
    fn paint_bounds(&self) -> Rect;
}

/// Tag identifying a kind of layer for damage comparison.
///
/// Contributions with different kinds are never the same logical unit, even
/// when their bounds match.
///
/// # Example
///
/// ```
/// use understory_damage::LayerKind;
///
/// const PICTURE: LayerKind = LayerKind::new(0);
/// const BACKDROP_FILTER: LayerKind = LayerKind::new(1);
///
/// assert_ne!(PICTURE, BACKDROP_FILTER);
/// assert_eq!(BACKDROP_FILTER.index(), 1);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKind(u32);

impl LayerKind {
    /// Creates a layer kind from an application-chosen index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the index of this kind.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Content comparison for one [`LayerKind`].
///
/// The comparison function is called with two layers of this kind from
/// different frames whose bounds and mutators already match. It returns `true`
/// when both would paint exactly the same pixels, which lets a node rebuilt
/// every frame with unchanged parameters keep its screen area clean.
///
/// Two comparators are the same when their kinds are equal; the function itself
/// is not compared.
///
/// # Example
///
/// ```
/// use understory_damage::{Comparator, LayerKind};
///
/// struct Blur {
///     sigma: f64,
/// }
///
/// const BLUR: Comparator<Blur> = Comparator::new(LayerKind::new(3), |a, b| a.sigma == b.sigma);
///
/// assert!(BLUR.same_content(&Blur { sigma: 2.0 }, &Blur { sigma: 2.0 }));
/// assert!(!BLUR.same_content(&Blur { sigma: 2.0 }, &Blur { sigma: 4.0 }));
/// ```
pub struct Comparator<L: ?Sized> {
    kind: LayerKind,
    same_content: fn(&L, &L) -> bool,
}

impl<L: ?Sized> Comparator<L> {
    /// Creates a comparator for `kind`.
    #[must_use]
    pub const fn new(kind: LayerKind, same_content: fn(&L, &L) -> bool) -> Self {
        Self { kind, same_content }
    }

    /// Creates a comparator that only considers a layer equal to itself.
    ///
    /// Suitable for kinds whose nodes are retained across frames when unchanged.
    #[must_use]
    pub const fn identity(kind: LayerKind) -> Self {
        Self {
            kind,
            same_content: |_, _| false,
        }
    }

    /// Returns the kind this comparator belongs to.
    #[must_use]
    pub const fn kind(&self) -> LayerKind {
        self.kind
    }

    /// Returns `true` if both layers would paint the same content.
    #[must_use]
    pub fn same_content(&self, a: &L, b: &L) -> bool {
        (self.same_content)(a, b)
    }
}

impl<L: ?Sized> Clone for Comparator<L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L: ?Sized> Copy for Comparator<L> {}

impl<L: ?Sized> PartialEq for Comparator<L> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl<L: ?Sized> Eq for Comparator<L> {}

impl<L: ?Sized> fmt::Debug for Comparator<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Comparator").field(&self.kind).finish()
    }
}

/// One drawing unit's footprint for a frame.
///
/// Equality and hashing implement cross-frame identity: two contributions are
/// the same logical unit when their comparators match, their screen bounds are
/// bit-identical, their mutator chains are equal, and they either reference
/// the same layer or the comparator reports equal content. Paint order takes
/// no part in identity.
pub struct Contribution<L: ?Sized> {
    pub(crate) paint_bounds: Rect,
    pub(crate) layer: Rc<L>,
    pub(crate) comparator: Comparator<L>,
    pub(crate) mutators: MutatorChain,
    pub(crate) paint_order: usize,
}

impl<L: ?Sized> Contribution<L> {
    /// Screen-space bounds of this contribution.
    #[must_use]
    pub fn paint_bounds(&self) -> Rect {
        self.paint_bounds
    }

    /// The layer that produced this contribution.
    #[must_use]
    pub fn layer(&self) -> &Rc<L> {
        &self.layer
    }

    /// The comparator this contribution was registered with.
    #[must_use]
    pub fn comparator(&self) -> Comparator<L> {
        self.comparator
    }

    /// Non-transform modifiers active above the drawing unit.
    #[must_use]
    pub fn mutators(&self) -> &MutatorChain {
        &self.mutators
    }

    /// Position in the frame's paint sequence.
    #[must_use]
    pub fn paint_order(&self) -> usize {
        self.paint_order
    }
}

impl<L: ?Sized> Clone for Contribution<L> {
    fn clone(&self) -> Self {
        Self {
            paint_bounds: self.paint_bounds,
            layer: self.layer.clone(),
            comparator: self.comparator,
            mutators: self.mutators.clone(),
            paint_order: self.paint_order,
        }
    }
}

impl<L: ?Sized> PartialEq for Contribution<L> {
    fn eq(&self, other: &Self) -> bool {
        self.comparator == other.comparator
            && util::bits_eq(self.paint_bounds, other.paint_bounds)
            && self.mutators == other.mutators
            && (Rc::ptr_eq(&self.layer, &other.layer)
                || self.comparator.same_content(&self.layer, &other.layer))
    }
}

impl<L: ?Sized> Eq for Contribution<L> {}

impl<L: ?Sized> Hash for Contribution<L> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Only the cheap structural prefilter participates; layers and mutator
        // chains are left to `eq`.
        util::rect_bits(self.paint_bounds).hash(state);
        self.comparator.kind.hash(state);
    }
}

impl<L: ?Sized> fmt::Debug for Contribution<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contribution")
            .field("paint_bounds", &self.paint_bounds)
            .field("kind", &self.comparator.kind)
            .field("mutators", &self.mutators)
            .field("paint_order", &self.paint_order)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::Mutator;

    #[derive(Debug)]
    struct Node {
        color: u32,
    }

    const SOLID: Comparator<Node> = Comparator::new(LayerKind::new(0), |a, b| a.color == b.color);
    const OTHER: Comparator<Node> = Comparator::new(LayerKind::new(1), |a, b| a.color == b.color);
    const RETAINED: Comparator<Node> = Comparator::identity(LayerKind::new(2));

    fn contribution(
        layer: &Rc<Node>,
        comparator: Comparator<Node>,
        bounds: Rect,
        mutators: MutatorChain,
    ) -> Contribution<Node> {
        Contribution {
            paint_bounds: bounds,
            layer: layer.clone(),
            comparator,
            mutators,
            paint_order: 0,
        }
    }

    const R: Rect = Rect::new(0.0, 0.0, 10.0, 10.0);

    #[test]
    fn same_layer_same_bounds_is_equal() {
        let layer = Rc::new(Node { color: 1 });
        let a = contribution(&layer, SOLID, R, MutatorChain::new());
        let mut b = contribution(&layer, SOLID, R, MutatorChain::new());
        b.paint_order = 7;
        assert_eq!(a, b);
    }

    #[test]
    fn rebuilt_layer_with_same_content_is_equal() {
        let a = contribution(&Rc::new(Node { color: 1 }), SOLID, R, MutatorChain::new());
        let b = contribution(&Rc::new(Node { color: 1 }), SOLID, R, MutatorChain::new());
        let c = contribution(&Rc::new(Node { color: 2 }), SOLID, R, MutatorChain::new());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn identity_comparator_needs_same_layer() {
        let layer = Rc::new(Node { color: 1 });
        let a = contribution(&layer, RETAINED, R, MutatorChain::new());
        let b = contribution(&layer, RETAINED, R, MutatorChain::new());
        let c = contribution(&Rc::new(Node { color: 1 }), RETAINED, R, MutatorChain::new());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn kind_is_part_of_identity() {
        let layer = Rc::new(Node { color: 1 });
        let a = contribution(&layer, SOLID, R, MutatorChain::new());
        let b = contribution(&layer, OTHER, R, MutatorChain::new());
        assert_ne!(a, b);
    }

    #[test]
    fn bounds_and_mutators_are_part_of_identity() {
        let layer = Rc::new(Node { color: 1 });
        let a = contribution(&layer, SOLID, R, MutatorChain::new());
        let moved = contribution(&layer, SOLID, R + kurbo::Vec2::new(0.5, 0.0), MutatorChain::new());
        let faded = contribution(
            &layer,
            SOLID,
            R,
            MutatorChain::new().push(Mutator::Opacity(100)),
        );
        assert_ne!(a, moved);
        assert_ne!(a, faded);
    }

    #[test]
    fn equal_contributions_hash_equal() {
        use core::hash::BuildHasher;
        let hasher = hashbrown::DefaultHashBuilder::default();
        let a = contribution(
            &Rc::new(Node { color: 1 }),
            SOLID,
            R,
            MutatorChain::new().push(Mutator::Opacity(3)),
        );
        let b = contribution(
            &Rc::new(Node { color: 1 }),
            SOLID,
            R,
            MutatorChain::new().push(Mutator::Opacity(3)),
        );
        assert_eq!(a, b);
        assert_eq!(hasher.hash_one(&a), hasher.hash_one(&b));
    }
}
