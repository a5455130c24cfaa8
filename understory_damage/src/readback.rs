// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Damage delegate and snapshot cache for layers that sample the backdrop.
//!
//! A backdrop filter reads whatever was painted below it inside its readback
//! region. Its output therefore changes when anything below it changes, even
//! though its own contribution is identical to the previous frame. Conversely,
//! when nothing below changed for a while, its filtered output can be cached and
//! reused instead of being recomputed every frame.
//!
//! [`ReadbackDelegate`] handles the first part during the damage pass;
//! [`ReadbackCache`] carries the cached output across frames.

use core::cell::Cell;

use kurbo::Rect;

use crate::context::{ContributionHandle, DamageContext};
use crate::delegate::{DamageDelegate, DamageSource};
use crate::util;

/// Tracks damage below a readback layer and reports its readback region.
///
/// Damage counts as "below" when it comes from a contribution that paints
/// before this layer: a lower paint order in the current frame, or a lower
/// paint order than this layer's match in the previous frame.
///
/// As additional damage, the delegate reports its whole readback region:
/// - with a cached snapshot, only when something changed below it, since the
///   cached pixels are then stale;
/// - without one, whenever the total damage touches the readback region, since
///   repainting any part of the region requires filtering all of it again.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use kurbo::{Affine, Rect, Size};
/// use understory_damage::{
///     ClipContext, Comparator, DamageContext, Layer, LayerKind, ReadbackDelegate,
/// };
///
/// struct Node(Rect);
/// impl Layer for Node {
///     fn paint_bounds(&self) -> Rect {
///         self.0
///     }
/// }
///
/// const NODE: Comparator<Node> = Comparator::identity(LayerKind::new(0));
/// let clip = ClipContext::new(Rect::new(0.0, 0.0, 100.0, 100.0));
/// let size = Size::new(100.0, 100.0);
///
/// let background = Rc::new(Node(Rect::new(0.0, 0.0, 100.0, 100.0)));
/// let backdrop = Rc::new(Node(Rect::new(20.0, 20.0, 40.0, 40.0)));
///
/// // Frame 1: establish a previous frame.
/// let mut ctx = DamageContext::new();
/// ctx.init_frame(size, None);
/// ctx.add_contribution(&background, NODE, Affine::IDENTITY, &clip);
/// ctx.add_contribution(&backdrop, NODE, Affine::IDENTITY, &clip);
/// let first = ctx.finish_frame();
///
/// // Frame 2: a small change below the backdrop, next to it.
/// let changed = Rc::new(Node(Rect::new(0.0, 0.0, 100.0, 100.0)));
/// ctx.init_frame(size, Some(first.snapshot));
/// ctx.add_contribution(&changed, NODE, Affine::IDENTITY, &clip);
/// let handle = ctx.add_contribution(&backdrop, NODE, Affine::IDENTITY, &clip);
/// let delegate = Rc::new(ReadbackDelegate::from_handle(
///     &handle,
///     &ctx,
///     Rect::new(10.0, 10.0, 50.0, 50.0),
///     true,
/// ));
/// handle.add_delegate(&mut ctx, delegate.clone());
/// let result = ctx.finish_frame();
///
/// assert!(delegate.damage_below().area() > 0.0);
/// assert_eq!(result.area.bounds(), Rect::new(0.0, 0.0, 100.0, 100.0));
/// ```
#[derive(Debug)]
pub struct ReadbackDelegate {
    paint_order: Option<usize>,
    previous_paint_order: Option<usize>,
    readback_bounds: Rect,
    has_snapshot: bool,
    damage_below: Cell<Rect>,
}

impl ReadbackDelegate {
    /// Creates a delegate for a layer painted at `paint_order`.
    ///
    /// `readback_bounds` is the screen area the layer samples from;
    /// `has_snapshot` tells whether the layer currently reuses cached output.
    #[must_use]
    pub fn new(
        paint_order: Option<usize>,
        previous_paint_order: Option<usize>,
        readback_bounds: Rect,
        has_snapshot: bool,
    ) -> Self {
        Self {
            paint_order,
            previous_paint_order,
            readback_bounds,
            has_snapshot,
            damage_below: Cell::new(Rect::ZERO),
        }
    }

    /// Creates a delegate using the paint orders known to `handle`.
    #[must_use]
    pub fn from_handle<L: ?Sized>(
        handle: &ContributionHandle,
        context: &DamageContext<L>,
        readback_bounds: Rect,
        has_snapshot: bool,
    ) -> Self {
        Self::new(
            handle.paint_order(),
            handle.previous_paint_order(context),
            readback_bounds,
            has_snapshot,
        )
    }

    /// Damage collected below this layer within its readback region.
    #[must_use]
    pub fn damage_below(&self) -> Rect {
        self.damage_below.get()
    }

    /// Screen area the layer samples from.
    #[must_use]
    pub fn readback_bounds(&self) -> Rect {
        self.readback_bounds
    }

    fn is_below(&self, source: DamageSource, paint_order: Option<usize>) -> bool {
        let own = match source {
            DamageSource::ThisFrame => self.paint_order,
            DamageSource::PreviousFrame => self.previous_paint_order,
        };
        match (paint_order, own) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(order), Some(own)) => order < own,
        }
    }
}

impl DamageDelegate for ReadbackDelegate {
    fn on_damage_added(&self, rect: Rect, source: DamageSource, paint_order: Option<usize>) {
        if self.is_below(source, paint_order) && util::intersects(self.readback_bounds, rect) {
            self.damage_below
                .set(util::join(self.damage_below.get(), rect));
        }
    }

    fn on_report_additional_damage(&self, total_damage: Rect) -> Rect {
        let stale = if self.has_snapshot {
            !util::is_empty_rect(self.damage_below.get())
        } else {
            util::intersects(self.readback_bounds, total_damage)
        };
        if stale {
            self.readback_bounds
        } else {
            Rect::ZERO
        }
    }
}

/// Cached output of a readback layer, shared between matching layers across
/// frames.
///
/// The cache counts consecutive frames in which nothing changed below the
/// layer. Once the count exceeds the threshold, [`should_capture`] asks the
/// layer to capture a snapshot; any later damage below invalidates it.
///
/// Invalidated snapshots are handed back to the caller rather than dropped
/// here. Graphics resources usually have to be released on the thread that owns
/// the graphics context, which this crate knows nothing about.
///
/// [`should_capture`]: Self::should_capture
#[derive(Debug)]
pub struct ReadbackCache<T> {
    snapshot: Option<T>,
    stable_frames: u32,
    threshold: u32,
}

impl<T> Default for ReadbackCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReadbackCache<T> {
    /// Number of unchanged frames after which a snapshot is captured.
    pub const DEFAULT_STABLE_FRAME_THRESHOLD: u32 = 60;

    /// Creates an empty cache with the default threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::with_threshold(Self::DEFAULT_STABLE_FRAME_THRESHOLD)
    }

    /// Creates an empty cache that captures after `threshold` unchanged frames.
    #[must_use]
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            snapshot: None,
            stable_frames: 0,
            threshold,
        }
    }

    /// Records the outcome of a damage pass.
    ///
    /// `damage_below` is [`ReadbackDelegate::damage_below`] after the frame was
    /// finished. Returns the snapshot that became stale, if any.
    #[must_use = "stale snapshots must be released by the caller"]
    pub fn record_frame(&mut self, damage_below: Rect) -> Option<T> {
        if util::is_empty_rect(damage_below) {
            self.stable_frames = self.stable_frames.saturating_add(1);
            None
        } else {
            self.stable_frames = 0;
            self.snapshot.take()
        }
    }

    /// Returns `true` if the layer should capture its output this frame.
    #[must_use]
    pub fn should_capture(&self) -> bool {
        self.snapshot.is_none() && self.stable_frames > self.threshold
    }

    /// Stores a captured snapshot, returning the one it replaces.
    pub fn store(&mut self, snapshot: T) -> Option<T> {
        self.snapshot.replace(snapshot)
    }

    /// The cached snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<&T> {
        self.snapshot.as_ref()
    }

    /// Returns `true` if a snapshot is cached.
    #[must_use]
    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Number of consecutive frames without damage below.
    #[must_use]
    pub fn stable_frames(&self) -> u32 {
        self.stable_frames
    }
}
