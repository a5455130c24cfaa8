// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Explainability helpers for frame damage.
//!
//! [`DamageArea`](crate::DamageArea) only keeps a bounding box, so by the time a
//! frame is finished it can no longer answer "why is this region damaged?".
//! [`DamageContext::finish_frame_traced`](crate::DamageContext::finish_frame_traced)
//! reports every damage event to a [`DamageTrace`] sink as it happens.
//! [`EventRecorder`] is a minimal sink that keeps all events in order.

use alloc::vec::Vec;

use kurbo::Rect;

use crate::delegate::DamageSource;

/// Why a damage event was emitted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DamageCause {
    /// No usable previous frame, or the canvas size changed.
    FullFrame,
    /// The contribution is new, or changed in a way that breaks its identity.
    Added,
    /// The contribution existed in the previous frame only.
    Removed,
    /// The contribution moved in paint order relative to an overlapping one.
    Reordered,
    /// Additional damage reported by a delegate.
    Delegate,
    /// Delegate negotiation hit its round limit.
    ConvergenceLimit,
}

/// A single damage event.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DamageEvent {
    /// Damaged rectangle in screen space, before rounding.
    pub rect: Rect,
    /// Frame the responsible contribution belongs to.
    pub source: DamageSource,
    /// Paint order of the responsible contribution, if there is one.
    pub paint_order: Option<usize>,
    /// Why the damage was emitted.
    pub cause: DamageCause,
}

/// A callback sink for damage events.
pub trait DamageTrace {
    /// Called once per damage event, in emission order.
    fn damage(&mut self, event: DamageEvent);
}

/// Discards all events.
impl DamageTrace for () {
    #[inline]
    fn damage(&mut self, _event: DamageEvent) {}
}

/// Records every event of a frame.
#[derive(Clone, Debug, Default)]
pub struct EventRecorder {
    events: Vec<DamageEvent>,
}

impl EventRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Recorded events, in emission order.
    #[must_use]
    pub fn events(&self) -> &[DamageEvent] {
        &self.events
    }

    /// Iterates over events with the given cause.
    pub fn with_cause(&self, cause: DamageCause) -> impl Iterator<Item = &DamageEvent> + '_ {
        self.events.iter().filter(move |e| e.cause == cause)
    }

    /// Clears all recorded events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl DamageTrace for EventRecorder {
    fn damage(&mut self, event: DamageEvent) {
        self.events.push(event);
    }
}
