//! Bounding-box predicates used by the block clusterer.
//!
//! All overlap tests are inclusive at both ends: boxes that exactly touch
//! count as overlapping.

use crate::models::Rect;

/// True when the vertical extents of `a` and `b` intersect (or touch).
pub fn overlaps_vertically(a: &Rect, b: &Rect) -> bool {
    a.top <= b.bottom && b.top <= a.bottom
}

/// True when the horizontal extents of `a` and `b` intersect (or touch).
pub fn overlaps_horizontally(a: &Rect, b: &Rect) -> bool {
    a.left <= b.right && b.left <= a.right
}

/// Smallest rectangle containing both `a` and `b`.
pub fn union(a: &Rect, b: &Rect) -> Rect {
    Rect {
        left: a.left.min(b.left),
        top: a.top.min(b.top),
        right: a.right.max(b.right),
        bottom: a.bottom.max(b.bottom),
    }
}

/// True when `inner` lies entirely within `outer` (edges included).
pub fn contains(outer: &Rect, inner: &Rect) -> bool {
    outer.left <= inner.left
        && outer.top <= inner.top
        && outer.right >= inner.right
        && outer.bottom >= inner.bottom
}
