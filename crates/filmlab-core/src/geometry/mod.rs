//! Crop and rotation geometry.
//!
//! Everything in this module is pure `f64` math on `glam::DVec2` and never
//! fails: degenerate input degrades to minimum-size rectangles instead of
//! raising, because interactive dragging routinely passes through invalid
//! intermediate states.

pub mod crop;
pub mod polygon;

/// Binary-search the largest `t ∈ [0, 1]` for which `fits(t)` holds.
///
/// `fits` must be monotone along the path (true up to some `t*`, false
/// after) and `fits(0.0)` is assumed to hold. Returns the last known-good `t`,
/// which is within `2^-iterations` of `t*`.
pub(crate) fn bisect_largest(iterations: u32, mut fits: impl FnMut(f64) -> bool) -> f64 {
    let mut lo = 0.0;
    let mut hi = 1.0;
    for _ in 0..iterations {
        let mid = 0.5 * (lo + hi);
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}
