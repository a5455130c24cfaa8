// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Damage context: collects contributions, diffs frames, and negotiates with
//! delegates.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
use core::mem;
use core::ops::Range;

use kurbo::{Affine, Rect, Size};
use smallvec::SmallVec;

use crate::area::DamageArea;
use crate::contribution::{Comparator, Contribution, Layer};
use crate::delegate::{DamageDelegate, DamageSource, DelegateRecord};
use crate::mutator::{Mutator, MutatorChain};
use crate::snapshot::FrameSnapshot;
use crate::trace::{DamageCause, DamageEvent, DamageTrace};
use crate::util;

/// Default number of negotiation rounds before falling back to full-canvas
/// damage.
pub const DEFAULT_MAX_ROUNDS: u32 = 64;

/// Bound on delegate negotiation rounds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConvergenceLimit {
    /// Allow this many rounds that change an answer. If the round after them
    /// still changes one, damage the whole canvas and stop.
    ///
    /// This is the default, with [`DEFAULT_MAX_ROUNDS`].
    Rounds(u32),
    /// Keep negotiating until every delegate is stable.
    ///
    /// Termination then relies entirely on delegates honoring the
    /// [convergence contract](DamageDelegate#convergence-contract).
    Unbounded,
}

impl Default for ConvergenceLimit {
    fn default() -> Self {
        Self::Rounds(DEFAULT_MAX_ROUNDS)
    }
}

/// How delegate negotiation ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Convergence {
    /// Every delegate repeated its previous answer.
    ///
    /// `rounds` counts the final, unchanged round; it is zero when no delegate
    /// was registered.
    Stable {
        /// Rounds run.
        rounds: u32,
    },
    /// The round limit was exceeded and the whole canvas was damaged.
    Exhausted {
        /// Rounds run.
        rounds: u32,
    },
}

/// Visibility state of the traversal at the point a contribution is registered.
#[derive(Clone, Debug)]
pub struct ClipContext {
    /// Visible region in the layer's local coordinates.
    pub cull_rect: Rect,
    /// Modifiers active above the layer, innermost first.
    pub mutators: MutatorChain,
}

impl ClipContext {
    /// Creates a context with no active modifiers.
    #[must_use]
    pub fn new(cull_rect: Rect) -> Self {
        Self {
            cull_rect,
            mutators: MutatorChain::new(),
        }
    }

    /// Returns a context with `mutator` pushed onto the modifier chain.
    #[must_use]
    pub fn push(&self, mutator: Mutator) -> Self {
        Self {
            cull_rect: self.cull_rect,
            mutators: self.mutators.push(mutator),
        }
    }

    /// Returns a context with a different cull rectangle and the same modifiers.
    #[must_use]
    pub fn with_cull_rect(&self, cull_rect: Rect) -> Self {
        Self {
            cull_rect,
            mutators: self.mutators.clone(),
        }
    }
}

/// Error returned when a transform cannot be inverted.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SingularTransformError {
    /// The offending transform.
    pub transform: Affine,
}

impl fmt::Display for SingularTransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transform {:?} is not invertible", self.transform.as_coeffs())
    }
}

impl core::error::Error for SingularTransformError {}

/// Outcome of [`DamageContext::finish_frame`].
pub struct DamageResult<L: ?Sized> {
    /// Area to repaint.
    pub area: DamageArea,
    /// Record of the finished frame, to pass to the next
    /// [`DamageContext::init_frame`].
    pub snapshot: FrameSnapshot<L>,
    /// How delegate negotiation ended.
    pub convergence: Convergence,
}

impl<L: ?Sized> fmt::Debug for DamageResult<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DamageResult")
            .field("area", &self.area)
            .field("snapshot", &self.snapshot)
            .field("convergence", &self.convergence)
            .finish()
    }
}

/// Token returned when a layer registers a contribution.
///
/// A handle is only meaningful during the frame it was created in. Handles of
/// contributions that were skipped (empty canvas or empty bounds), and handles
/// used after their frame finished, are inert: they match nothing and delegates
/// registered through them are ignored.
#[derive(Copy, Clone, Debug)]
pub struct ContributionHandle {
    index: Option<usize>,
    frame: u64,
    transform: Affine,
    cull_rect: Rect,
}

impl ContributionHandle {
    /// Paint order of the contribution within the current frame.
    ///
    /// `None` for inert handles.
    #[must_use]
    pub fn paint_order(&self) -> Option<usize> {
        self.index
    }

    /// Returns `true` if the contribution was recorded.
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        self.index.is_some()
    }

    fn live_index<L: ?Sized>(&self, context: &DamageContext<L>) -> Option<usize> {
        self.index
            .filter(|&i| self.frame == context.frame && i < context.entries.len())
    }

    fn previous_match<'a, L: ?Sized>(
        &self,
        context: &'a DamageContext<L>,
    ) -> Option<&'a Contribution<L>> {
        let index = self.live_index(context)?;
        context.previous.as_ref()?.find(&context.entries[index])
    }

    /// Recomputes the screen bounds from the layer's current
    /// [`paint_bounds`](Layer::paint_bounds), using the transform and cull
    /// rectangle captured at registration.
    ///
    /// Calling it repeatedly before the frame finishes is harmless. If the bounds
    /// become empty the contribution is dropped from the frame.
    pub fn update_paint_bounds<L: Layer + ?Sized>(&self, context: &mut DamageContext<L>) {
        if let Some(index) = self.live_index(context) {
            let entry = &mut context.entries[index];
            entry.paint_bounds =
                screen_bounds(entry.layer.paint_bounds(), self.transform, self.cull_rect);
        }
    }

    /// Layer of the matching contribution in the previous frame, if any.
    #[must_use]
    pub fn previous_layer<'a, L: ?Sized>(&self, context: &'a DamageContext<L>) -> Option<&'a Rc<L>> {
        self.previous_match(context).map(Contribution::layer)
    }

    /// Paint order of the matching contribution in the previous frame, if any.
    #[must_use]
    pub fn previous_paint_order<L: ?Sized>(&self, context: &DamageContext<L>) -> Option<usize> {
        self.previous_match(context).map(Contribution::paint_order)
    }

    /// Registers `delegate` for the current frame at this contribution's paint
    /// order.
    ///
    /// The registration ends when the frame finishes.
    pub fn add_delegate<L: ?Sized>(
        &self,
        context: &mut DamageContext<L>,
        delegate: Rc<dyn DamageDelegate>,
    ) {
        match self.live_index(context) {
            Some(index) => context.delegates.push(DelegateRecord::new(delegate, index)),
            None => {
                tracing::debug!(target: "understory_damage", "delegate ignored for inert handle");
            }
        }
    }
}

/// Computes the damage between consecutive frames of a layer tree.
///
/// Each frame follows the same sequence:
///
/// 1. [`init_frame`](Self::init_frame) with the canvas size and the snapshot of the
///    previous frame.
/// 2. One [`add_contribution`](Self::add_contribution) per visible layer, in paint
///    order. The returned [`ContributionHandle`] lets the layer find its match in
///    the previous frame and register a [`DamageDelegate`].
/// 3. [`finish_frame`](Self::finish_frame), which yields the [`DamageArea`] and
///    the snapshot to keep for the next frame.
///
/// Contributions absent from either frame are damaged, as are contributions
/// that changed paint order relative to an overlapping one. Without a previous
/// snapshot, or when the canvas size changed, the whole canvas is damaged.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use kurbo::{Affine, Rect, Size};
/// use understory_damage::{ClipContext, Comparator, DamageContext, Layer, LayerKind};
///
/// struct Picture {
///     bounds: Rect,
///     color: u32,
/// }
///
/// impl Layer for Picture {
///     fn paint_bounds(&self) -> Rect {
///         self.bounds
///     }
/// }
///
/// const PICTURE: Comparator<Picture> =
///     Comparator::new(LayerKind::new(0), |a, b| a.color == b.color);
///
/// let size = Size::new(200.0, 100.0);
/// let clip = ClipContext::new(Rect::new(0.0, 0.0, 200.0, 100.0));
/// let mut ctx = DamageContext::new();
///
/// // First frame: everything is damaged.
/// ctx.init_frame(size, None);
/// let a = Rc::new(Picture { bounds: Rect::new(0.0, 0.0, 50.0, 50.0), color: 1 });
/// ctx.add_contribution(&a, PICTURE, Affine::IDENTITY, &clip);
/// let first = ctx.finish_frame();
/// assert_eq!(first.area.bounds(), Rect::new(0.0, 0.0, 200.0, 100.0));
///
/// // Second frame: `a` is rebuilt unchanged and `b` appears.
/// ctx.init_frame(size, Some(first.snapshot));
/// let a = Rc::new(Picture { bounds: Rect::new(0.0, 0.0, 50.0, 50.0), color: 1 });
/// let b = Rc::new(Picture { bounds: Rect::new(0.0, 0.0, 10.0, 10.0), color: 2 });
/// ctx.add_contribution(&a, PICTURE, Affine::IDENTITY, &clip);
/// ctx.add_contribution(&b, PICTURE, Affine::translate((100.0, 20.0)), &clip);
/// let second = ctx.finish_frame();
/// assert_eq!(second.area.bounds(), Rect::new(100.0, 20.0, 110.0, 30.0));
/// ```
pub struct DamageContext<L: ?Sized> {
    previous: Option<FrameSnapshot<L>>,
    size: Size,
    entries: Vec<Contribution<L>>,
    delegates: SmallVec<[DelegateRecord; 4]>,
    frame: u64,
    convergence_limit: ConvergenceLimit,
}

impl<L: ?Sized> Default for DamageContext<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for DamageContext<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DamageContext")
            .field("size", &self.size)
            .field("previous", &self.previous)
            .field("entries", &self.entries)
            .field("delegates", &self.delegates)
            .field("frame", &self.frame)
            .field("convergence_limit", &self.convergence_limit)
            .finish()
    }
}

impl<L: ?Sized> DamageContext<L> {
    /// Creates a context with the default [`ConvergenceLimit`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_convergence_limit(ConvergenceLimit::default())
    }

    /// Creates a context with the given [`ConvergenceLimit`].
    #[must_use]
    pub fn with_convergence_limit(convergence_limit: ConvergenceLimit) -> Self {
        Self {
            previous: None,
            size: Size::ZERO,
            entries: Vec::new(),
            delegates: SmallVec::new(),
            frame: 0,
            convergence_limit,
        }
    }

    /// Returns the current convergence limit.
    #[must_use]
    pub fn convergence_limit(&self) -> ConvergenceLimit {
        self.convergence_limit
    }

    /// Sets the convergence limit for future frames.
    pub fn set_convergence_limit(&mut self, limit: ConvergenceLimit) {
        self.convergence_limit = limit;
    }

    /// Starts a frame.
    ///
    /// Any state of an unfinished frame is discarded. Without a previous
    /// snapshot, or with one of a different canvas size, the frame will report
    /// full-canvas damage.
    ///
    /// `size` is expected in whole pixels. Damage is rounded out to integral
    /// coordinates, so full-canvas damage for a fractional size extends to the
    /// next pixel boundary.
    pub fn init_frame(&mut self, size: Size, previous: Option<FrameSnapshot<L>>) {
        self.frame = self.frame.wrapping_add(1);
        self.size = size;
        self.previous = previous;
        self.entries.clear();
        self.delegates.clear();
    }

    /// Returns `true` if the frame is being diffed against a previous snapshot.
    ///
    /// Layers can skip damage-specific work, such as creating delegates, when
    /// this is `false`.
    #[must_use]
    pub fn is_determining_damage(&self) -> bool {
        self.previous.is_some()
    }

    /// Canvas size of the current frame.
    #[must_use]
    pub fn canvas_size(&self) -> Size {
        self.size
    }

    /// Snapshot the current frame is diffed against.
    #[must_use]
    pub fn previous_snapshot(&self) -> Option<&FrameSnapshot<L>> {
        self.previous.as_ref()
    }

    /// Number of contributions recorded so far this frame.
    ///
    /// Useful as the start of a range for [`apply_image_filter`](Self::apply_image_filter).
    #[must_use]
    pub fn contribution_count(&self) -> usize {
        self.entries.len()
    }

    /// Registers a contribution with explicit local `bounds`.
    ///
    /// The bounds are clipped to `clip.cull_rect` and mapped through `transform`
    /// into screen space. Transforms in `clip.mutators` are ignored. Layers that
    /// paint beyond their nominal bounds (filters, for example) pass the expanded
    /// area here.
    ///
    /// On an empty canvas, or when the resulting bounds are empty, nothing is
    /// recorded and the returned handle is inert.
    pub fn add_contribution_with_bounds(
        &mut self,
        layer: &Rc<L>,
        comparator: Comparator<L>,
        transform: Affine,
        bounds: Rect,
        clip: &ClipContext,
    ) -> ContributionHandle {
        let mut handle = ContributionHandle {
            index: None,
            frame: self.frame,
            transform,
            cull_rect: clip.cull_rect,
        };
        if util::is_empty_size(self.size) {
            tracing::debug!(target: "understory_damage", size = ?self.size, "contribution skipped on empty canvas");
            return handle;
        }
        let paint_bounds = screen_bounds(bounds, transform, clip.cull_rect);
        if util::is_empty_rect(paint_bounds) {
            tracing::debug!(target: "understory_damage", ?bounds, "contribution skipped with empty bounds");
            return handle;
        }
        let index = self.entries.len();
        self.entries.push(Contribution {
            paint_bounds,
            layer: layer.clone(),
            comparator,
            mutators: clip.mutators.without_transforms(),
            paint_order: index,
        });
        handle.index = Some(index);
        handle
    }

    /// Expands the bounds of already registered contributions for an image filter.
    ///
    /// `range` selects contributions, typically the children of the filtering
    /// layer (see [`contribution_count`](Self::contribution_count)). `transform`
    /// maps the filtering layer's local space to the screen and `filter_region`
    /// is the area it filters, in local space. Every selected contribution that
    /// touches `filter_region` has its bounds replaced by `filter_bounds` of its
    /// local bounds, capped to the union of the local bounds and the region.
    ///
    /// Nothing is modified if `transform` cannot be inverted.
    pub fn apply_image_filter(
        &mut self,
        range: Range<usize>,
        filter_bounds: impl Fn(Rect) -> Rect,
        transform: Affine,
        filter_region: Rect,
    ) -> Result<(), SingularTransformError> {
        let det = transform.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(SingularTransformError { transform });
        }
        let inverse = transform.inverse();
        let end = range.end.min(self.entries.len());
        let start = range.start.min(end);
        for entry in &mut self.entries[start..end] {
            let local = inverse.transform_rect_bbox(entry.paint_bounds);
            if !util::intersects(local, filter_region) {
                continue;
            }
            let max = util::join(local, filter_region);
            let filtered = util::intersect(filter_bounds(local), max);
            entry.paint_bounds = transform.transform_rect_bbox(filtered);
        }
        Ok(())
    }

    /// Finishes the frame, returning its damage and snapshot.
    ///
    /// All per-frame state, including delegate registrations, is cleared.
    pub fn finish_frame(&mut self) -> DamageResult<L> {
        self.finish_frame_traced(&mut ())
    }

    /// Like [`finish_frame`](Self::finish_frame), reporting every damage event to
    /// `trace`.
    pub fn finish_frame_traced<T: DamageTrace + ?Sized>(&mut self, trace: &mut T) -> DamageResult<L> {
        let entries = mem::take(&mut self.entries);
        let delegates = mem::take(&mut self.delegates);
        let previous = self.previous.take();
        let size = mem::replace(&mut self.size, Size::ZERO);
        // Handles of this frame go inert.
        self.frame = self.frame.wrapping_add(1);

        let mut snapshot = FrameSnapshot::with_capacity(size, entries.len());
        // Registration order of each snapshot entry; delegates know contributions
        // by that order.
        let mut registered = Vec::with_capacity(entries.len());
        let mut position = 0;
        for mut entry in entries {
            if util::is_empty_rect(entry.paint_bounds) {
                continue;
            }
            let order = entry.paint_order;
            entry.paint_order = position;
            if snapshot.insert(entry) {
                registered.push(order);
                position += 1;
            } else {
                tracing::trace!(target: "understory_damage", order, "duplicate contribution");
            }
        }

        let mut sink = DamageSink {
            area: DamageArea::new(),
            delegates: &delegates,
            trace,
        };

        match previous {
            Some(previous) if previous.size() == size => {
                diff(&previous, &snapshot, &registered, &mut sink);
            }
            previous => {
                tracing::debug!(
                    target: "understory_damage",
                    ?size,
                    previous_size = ?previous.as_ref().map(FrameSnapshot::size),
                    "full canvas damage"
                );
                sink.add(
                    util::canvas_rect(size),
                    DamageSource::ThisFrame,
                    None,
                    DamageCause::FullFrame,
                );
            }
        }

        let convergence = converge(&mut sink, size, self.convergence_limit);
        DamageResult {
            area: sink.area,
            snapshot,
            convergence,
        }
    }
}

impl<L: Layer + ?Sized> DamageContext<L> {
    /// Registers a contribution using the layer's own
    /// [`paint_bounds`](Layer::paint_bounds).
    ///
    /// See [`add_contribution_with_bounds`](Self::add_contribution_with_bounds).
    pub fn add_contribution(
        &mut self,
        layer: &Rc<L>,
        comparator: Comparator<L>,
        transform: Affine,
        clip: &ClipContext,
    ) -> ContributionHandle {
        let bounds = layer.paint_bounds();
        self.add_contribution_with_bounds(layer, comparator, transform, bounds, clip)
    }
}

fn screen_bounds(bounds: Rect, transform: Affine, cull_rect: Rect) -> Rect {
    let visible = util::intersect(bounds, cull_rect);
    if util::is_empty_rect(visible) {
        return Rect::ZERO;
    }
    transform.transform_rect_bbox(visible)
}

/// Single funnel for damage: grows the area, traces, and notifies delegates.
struct DamageSink<'a, T: ?Sized> {
    area: DamageArea,
    delegates: &'a [DelegateRecord],
    trace: &'a mut T,
}

impl<T: DamageTrace + ?Sized> DamageSink<'_, T> {
    fn add(
        &mut self,
        rect: Rect,
        source: DamageSource,
        paint_order: Option<usize>,
        cause: DamageCause,
    ) {
        self.add_except(rect, source, paint_order, cause, None);
    }

    fn add_except(
        &mut self,
        rect: Rect,
        source: DamageSource,
        paint_order: Option<usize>,
        cause: DamageCause,
        skip: Option<usize>,
    ) {
        tracing::trace!(target: "understory_damage", ?rect, ?source, ?paint_order, ?cause, "damage");
        self.area.add_rect(rect);
        self.trace.damage(DamageEvent {
            rect,
            source,
            paint_order,
            cause,
        });
        for (i, record) in self.delegates.iter().enumerate() {
            if Some(i) != skip {
                record.delegate.on_damage_added(rect, source, paint_order);
            }
        }
    }
}

/// Damages contributions present in only one frame, then overlapping
/// contributions whose relative paint order changed.
fn diff<L: ?Sized, T: DamageTrace + ?Sized>(
    previous: &FrameSnapshot<L>,
    current: &FrameSnapshot<L>,
    registered: &[usize],
    sink: &mut DamageSink<'_, T>,
) {
    // (previous index, current index) of contributions found in both frames.
    let mut matched: Vec<(usize, usize)> = Vec::new();
    for (ci, entry) in current.iter().enumerate() {
        match previous.find_index(entry) {
            Some(pi) => matched.push((pi, ci)),
            None => sink.add(
                entry.paint_bounds,
                DamageSource::ThisFrame,
                Some(registered[ci]),
                DamageCause::Added,
            ),
        }
    }
    for entry in previous.iter() {
        if !current.contains(entry) {
            sink.add(
                entry.paint_bounds,
                DamageSource::PreviousFrame,
                Some(entry.paint_order),
                DamageCause::Removed,
            );
        }
    }

    // Both lists hold indices into `matched`, each sorted by its own frame's
    // paint order.
    let mut by_previous: Vec<usize> = (0..matched.len()).collect();
    by_previous.sort_unstable_by_key(|&m| previous.get(matched[m].0).paint_order);
    let mut by_current: Vec<usize> = (0..matched.len()).collect();
    by_current.sort_unstable_by_key(|&m| current.get(matched[m].1).paint_order);

    // Align from the top of the paint stack. Everything in `by_current` above the
    // partner of the topmost previous entry has moved relative to it.
    while let Some(p) = by_previous.pop() {
        let prev_entry = previous.get(matched[p].0);
        let mut found = None;
        for (i, &c) in by_current.iter().enumerate().rev() {
            if c == p {
                found = Some(i);
                break;
            }
            let ci = matched[c].1;
            let cur_entry = current.get(ci);
            if util::intersects(prev_entry.paint_bounds, cur_entry.paint_bounds) {
                sink.add(
                    prev_entry.paint_bounds,
                    DamageSource::PreviousFrame,
                    Some(prev_entry.paint_order),
                    DamageCause::Reordered,
                );
                sink.add(
                    cur_entry.paint_bounds,
                    DamageSource::ThisFrame,
                    Some(registered[ci]),
                    DamageCause::Reordered,
                );
            }
        }
        if let Some(i) = found {
            by_current.remove(i);
        }
    }
}

/// Asks delegates for additional damage until none changes its answer.
fn converge<T: DamageTrace + ?Sized>(
    sink: &mut DamageSink<'_, T>,
    size: Size,
    limit: ConvergenceLimit,
) -> Convergence {
    let delegates = sink.delegates;
    if delegates.is_empty() {
        return Convergence::Stable { rounds: 0 };
    }
    let mut rounds = 0_u32;
    loop {
        rounds += 1;
        let mut changed = false;
        for (i, record) in delegates.iter().enumerate() {
            let rect = record
                .delegate
                .on_report_additional_damage(sink.area.bounds());
            if util::bits_eq(rect, record.reported.get()) {
                continue;
            }
            changed = true;
            record.reported.set(rect);
            sink.add_except(
                rect,
                DamageSource::ThisFrame,
                Some(record.paint_order),
                DamageCause::Delegate,
                Some(i),
            );
        }
        if !changed {
            return Convergence::Stable { rounds };
        }
        if let ConvergenceLimit::Rounds(max) = limit
            && rounds > max
        {
            tracing::warn!(
                target: "understory_damage",
                rounds,
                delegates = delegates.len(),
                "delegate negotiation did not converge, damaging the whole canvas"
            );
            sink.add(
                util::canvas_rect(size),
                DamageSource::ThisFrame,
                None,
                DamageCause::ConvergenceLimit,
            );
            return Convergence::Exhausted { rounds };
        }
    }
}
