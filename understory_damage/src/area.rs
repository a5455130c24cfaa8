// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounding accumulator for frame damage.

use alloc::vec;
use alloc::vec::Vec;

use kurbo::Rect;

use crate::util;

/// Screen area that has to be repainted for a frame.
///
/// `DamageArea` is a running union of rectangles, kept as a single bounding box
/// rounded out to whole pixels. It is intentionally coarse: two small damaged
/// regions in opposite corners produce one rectangle spanning the whole canvas.
///
/// An empty area is a valid result and means nothing visible changed.
///
/// # Example
///
/// ```
/// use kurbo::Rect;
/// use understory_damage::DamageArea;
///
/// let mut area = DamageArea::new();
/// assert!(area.is_empty());
///
/// area.add_rect(Rect::new(10.2, 10.0, 20.0, 20.7));
/// area.add_rect(Rect::new(30.0, 5.0, 40.0, 15.0));
///
/// assert_eq!(area.bounds(), Rect::new(10.0, 5.0, 40.0, 21.0));
/// assert_eq!(area.to_rects(), vec![Rect::new(10.0, 5.0, 40.0, 21.0)]);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DamageArea {
    bounds: Rect,
}

impl DamageArea {
    /// Creates an empty damage area.
    #[must_use]
    pub fn new() -> Self {
        Self { bounds: Rect::ZERO }
    }

    /// Returns the bounding rectangle of all damage, in whole pixels.
    ///
    /// The result has zero area when nothing is damaged.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Returns `true` if no damage has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        util::is_empty_rect(self.bounds)
    }

    /// Returns the damage as a list of rectangles.
    ///
    /// Currently this is either empty or the single bounding rectangle.
    #[must_use]
    pub fn to_rects(&self) -> Vec<Rect> {
        if self.is_empty() {
            Vec::new()
        } else {
            vec![self.bounds]
        }
    }

    /// Grows the area to cover `rect`.
    ///
    /// The rectangle is rounded out to integer coordinates. Empty rectangles are
    /// ignored.
    pub fn add_rect(&mut self, rect: Rect) {
        if util::is_empty_rect(rect) {
            return;
        }
        self.bounds = util::join(self.bounds, rect.expand());
    }

    /// Grows the area to cover another area.
    ///
    /// Useful for combining this frame's damage with damage recorded for earlier
    /// frames, e.g. when a recycled buffer lags behind the front buffer.
    pub fn add_area(&mut self, other: &Self) {
        self.add_rect(other.bounds);
    }
}
