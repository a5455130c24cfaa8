// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rectangle helpers with the "empty rect" conventions used throughout the crate.
//!
//! A rectangle is empty when it has no positive area. Empty rectangles are the
//! identity for [`join`] and never intersect anything. `NaN` coordinates count as
//! empty.

use kurbo::{Rect, Size};

pub(crate) fn is_empty_rect(r: Rect) -> bool {
    !(r.x0 < r.x1 && r.y0 < r.y1)
}

pub(crate) fn is_empty_size(s: Size) -> bool {
    !(s.width > 0.0 && s.height > 0.0)
}

/// Union that ignores empty inputs.
pub(crate) fn join(a: Rect, b: Rect) -> Rect {
    if is_empty_rect(b) {
        a
    } else if is_empty_rect(a) {
        b
    } else {
        a.union(b)
    }
}

/// Returns `true` if both rectangles are non-empty and share a region of positive area.
pub(crate) fn intersects(a: Rect, b: Rect) -> bool {
    !is_empty_rect(a)
        && !is_empty_rect(b)
        && a.x0 < b.x1
        && b.x0 < a.x1
        && a.y0 < b.y1
        && b.y0 < a.y1
}

/// Intersection; disjoint inputs produce an empty rectangle.
pub(crate) fn intersect(a: Rect, b: Rect) -> Rect {
    if intersects(a, b) {
        a.intersect(b)
    } else {
        Rect::ZERO
    }
}

/// Bitwise equality of coordinates.
///
/// Unlike `==`, this distinguishes `0.0` from `-0.0` and treats identical `NaN`s as
/// equal, which keeps it consistent with [`rect_bits`].
pub(crate) fn bits_eq(a: Rect, b: Rect) -> bool {
    rect_bits(a) == rect_bits(b)
}

pub(crate) fn rect_bits(r: Rect) -> [u64; 4] {
    [r.x0.to_bits(), r.y0.to_bits(), r.x1.to_bits(), r.y1.to_bits()]
}

pub(crate) fn canvas_rect(size: Size) -> Rect {
    Rect::new(0.0, 0.0, size.width, size.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rects() {
        assert!(is_empty_rect(Rect::ZERO));
        assert!(is_empty_rect(Rect::new(10.0, 0.0, 10.0, 5.0)));
        assert!(is_empty_rect(Rect::new(0.0, 0.0, f64::NAN, 5.0)));
        assert!(!is_empty_rect(Rect::new(0.0, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn join_skips_empty() {
        let r = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert_eq!(join(Rect::ZERO, r), r);
        assert_eq!(join(r, Rect::ZERO), r);
        assert_eq!(
            join(r, Rect::new(30.0, 0.0, 40.0, 5.0)),
            Rect::new(10.0, 0.0, 40.0, 20.0)
        );
    }

    #[test]
    fn touching_edges_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 20.0, 10.0);
        assert!(!intersects(a, b));
        assert!(is_empty_rect(intersect(a, b)));
        let c = Rect::new(5.0, 5.0, 15.0, 15.0);
        assert!(intersects(a, c));
        assert_eq!(intersect(a, c), Rect::new(5.0, 5.0, 10.0, 10.0));
    }

    #[test]
    fn degenerate_rect_never_intersects() {
        let a = Rect::new(5.0, 0.0, 5.0, 10.0);
        let b = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(!intersects(a, b));
    }

    #[test]
    fn signed_zero_is_distinct_in_bits() {
        let a = Rect::new(0.0, 0.0, 1.0, 1.0);
        let b = Rect::new(-0.0, 0.0, 1.0, 1.0);
        assert!(!bits_eq(a, b));
        assert!(bits_eq(a, a));
    }
}
