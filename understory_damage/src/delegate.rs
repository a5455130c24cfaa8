// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Damage delegates: layers that take part in damage negotiation.

use alloc::rc::Rc;
use core::cell::Cell;
use core::fmt;

use kurbo::Rect;

/// Which frame a damage event originates from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DamageSource {
    /// A contribution of the frame being built.
    ThisFrame,
    /// A contribution of the frame last rendered into the target.
    PreviousFrame,
}

/// A layer whose damage depends on damage elsewhere in the frame.
///
/// Layers that sample already-composited pixels (backdrop filters, for example)
/// cannot tell from their own bounds alone whether they need to be repainted.
/// They register a delegate through
/// [`ContributionHandle::add_delegate`](crate::ContributionHandle::add_delegate)
/// and are then told about every damage rectangle of the frame, together with
/// the paint order of the contribution responsible for it.
///
/// Delegates are registered for a single frame only; the registration is dropped
/// when the frame finishes.
///
/// # Convergence contract
///
/// After the diff, every delegate is asked for additional damage repeatedly until
/// no delegate changes its answer. Implementations must report rectangles that
/// stay within the canvas and never shrink from one call to the next within a
/// frame. The loop is additionally bounded by a
/// [`ConvergenceLimit`](crate::ConvergenceLimit).
///
/// Methods take `&self`; delegates that track state keep it in `Cell`s or
/// `RefCell`s.
pub trait DamageDelegate {
    /// Called every time a contribution of this or the previous frame adds
    /// damage.
    ///
    /// `paint_order` identifies the responsible contribution within the frame
    /// named by `source`. `None` means no single contribution is responsible
    /// (for example full-canvas damage); it orders below every contribution.
    fn on_damage_added(&self, rect: Rect, source: DamageSource, paint_order: Option<usize>) {
        let _ = (rect, source, paint_order);
    }

    /// Returns damage this delegate adds on top of `total_damage`.
    ///
    /// May be called several times per frame, since additional damage reported by
    /// one delegate can change the answer of another.
    fn on_report_additional_damage(&self, total_damage: Rect) -> Rect {
        let _ = total_damage;
        Rect::ZERO
    }
}

/// A delegate registered for the current frame.
pub(crate) struct DelegateRecord {
    pub(crate) delegate: Rc<dyn DamageDelegate>,
    pub(crate) paint_order: usize,
    /// Last additional damage reported during negotiation.
    pub(crate) reported: Cell<Rect>,
}

impl DelegateRecord {
    pub(crate) fn new(delegate: Rc<dyn DamageDelegate>, paint_order: usize) -> Self {
        Self {
            delegate,
            paint_order,
            reported: Cell::new(Rect::ZERO),
        }
    }
}

impl fmt::Debug for DelegateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateRecord")
            .field("paint_order", &self.paint_order)
            .field("reported", &self.reported.get())
            .finish_non_exhaustive()
    }
}
