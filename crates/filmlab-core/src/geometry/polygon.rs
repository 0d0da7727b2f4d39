//! Rotated image boundary and containment tests.
//!
//! The image polygon is the frame rectangle after offset translation, fine
//! rotation and zoom, expressed in the unrotated frame space the crop
//! rectangle lives in. A crop rect is valid iff all four of its corners lie
//! inside this polygon.
//!
//! # Coordinates
//! y grows downwards; corners are produced in the fixed order
//! top-left, top-right, bottom-right, bottom-left of the unrotated frame.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::bisect_largest;
use super::crop::CropRect;

/// Four corners in fixed winding order.
pub type Polygon = [DVec2; 4];

/// Cross products within this distance of zero count as "on the edge".
pub const BOUNDARY_EPSILON: f64 = 1e-6;

/// Bisection steps used by [`fit_centered_rect_to_polygon`].
pub const FIT_ITERATIONS: u32 = 18;

/// Half-extent shrink applied after bisection, in frame pixels.
pub const FIT_SAFETY_MARGIN: f64 = 0.5;

/// Offsets are percentages of the half frame, bounded to this magnitude.
pub const MAX_OFFSET_PERCENT: f64 = 100.0;

/// Continuous frame transform applied to the image under a fixed crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameTransform {
    /// Clockwise 90° turns, `0..=3`.
    pub quarter_turns: u8,
    /// Fine rotation in degrees.
    pub rotate_deg: f64,
    /// Horizontal offset in percent of the half frame width (`±100`).
    pub h_offset: f64,
    /// Vertical offset in percent of the half frame height (`±100`).
    pub v_offset: f64,
    /// Zoom about the image centre, `>= 1`.
    pub scale: f64,
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self {
            quarter_turns: 0,
            rotate_deg: 0.0,
            h_offset: 0.0,
            v_offset: 0.0,
            scale: 1.0,
        }
    }
}

impl FrameTransform {
    /// Frame size after quarter turns (width/height swap on odd turns).
    pub fn oriented_size(&self, source: DVec2) -> DVec2 {
        if self.quarter_turns % 2 == 1 {
            DVec2::new(source.y, source.x)
        } else {
            source
        }
    }

    /// Image polygon inside an oriented frame of `frame` size.
    pub fn polygon(&self, frame: DVec2) -> Polygon {
        image_polygon(frame, self.rotate_deg, self.h_offset, self.v_offset, self.scale)
    }

    /// Total rotation in degrees including quarter turns.
    pub fn total_rotation_deg(&self) -> f64 {
        f64::from(self.quarter_turns % 4) * 90.0 + sanitize(self.rotate_deg)
    }

    /// Component-wise interpolation of the continuous parameters.
    ///
    /// Quarter turns are discrete and taken from `self`.
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        Self {
            quarter_turns: self.quarter_turns,
            rotate_deg: mix(self.rotate_deg, other.rotate_deg),
            h_offset: mix(self.h_offset, other.h_offset),
            v_offset: mix(self.v_offset, other.v_offset),
            scale: mix(self.scale, other.scale),
        }
    }
}

/// Build the image polygon for a frame rotated by `rotate_deg` about its
/// offset-translated centre.
///
/// `h_offset`/`v_offset` are percentages bounded to `±100`; at `100` the
/// centre moves by half the frame dimension.
pub fn build_image_polygon(
    frame_w: f64,
    frame_h: f64,
    rotate_deg: f64,
    h_offset: f64,
    v_offset: f64,
) -> Polygon {
    image_polygon(DVec2::new(frame_w, frame_h), rotate_deg, h_offset, v_offset, 1.0)
}

fn image_polygon(frame: DVec2, rotate_deg: f64, h_offset: f64, v_offset: f64, scale: f64) -> Polygon {
    let size = DVec2::new(sanitize(frame.x).max(0.0), sanitize(frame.y).max(0.0));
    let half = size * 0.5;
    let offset = DVec2::new(
        sanitize(h_offset).clamp(-MAX_OFFSET_PERCENT, MAX_OFFSET_PERCENT),
        sanitize(v_offset).clamp(-MAX_OFFSET_PERCENT, MAX_OFFSET_PERCENT),
    ) / MAX_OFFSET_PERCENT;
    let center = half + offset * half;
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };

    let rotation = DVec2::from_angle(sanitize(rotate_deg).to_radians());
    [
        DVec2::new(-half.x, -half.y),
        DVec2::new(half.x, -half.y),
        DVec2::new(half.x, half.y),
        DVec2::new(-half.x, half.y),
    ]
    .map(|corner| center + rotation.rotate(corner * scale))
}

/// Signed cross-product containment test for a convex polygon.
///
/// Inside iff every edge agrees in sign; near-zero cross products are
/// treated as inside.
pub fn point_in_convex_polygon(point: DVec2, polygon: &[DVec2]) -> bool {
    let mut sign = 0.0_f64;
    for (i, &a) in polygon.iter().enumerate() {
        let b = polygon[(i + 1) % polygon.len()];
        let cross = (b - a).perp_dot(point - a);
        if cross.abs() <= BOUNDARY_EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// True iff every corner of `rect` passes [`point_in_convex_polygon`].
pub fn rect_inside_polygon(rect: &CropRect, polygon: &[DVec2]) -> bool {
    rect.corners()
        .iter()
        .all(|&corner| point_in_convex_polygon(corner, polygon))
}

/// Largest centred rect between `start_half` and `target_half` that fits.
///
/// Returns `target_half` unchanged when it already fits. Otherwise searches
/// from an anchor (`start_half` if it fits, else zero) toward the target and
/// returns the last fitting extents, shrunk by [`FIT_SAFETY_MARGIN`] and
/// re-validated. Falls back to the anchor if the shrunk extents still miss.
pub fn fit_centered_rect_to_polygon(
    center: DVec2,
    start_half: DVec2,
    target_half: DVec2,
    polygon: &[DVec2],
) -> DVec2 {
    let fits = |half: DVec2| rect_inside_polygon(&CropRect::from_center(center, half), polygon);

    let target_half = sanitize_extent(target_half);
    if fits(target_half) {
        return target_half;
    }

    let start_half = sanitize_extent(start_half);
    let anchor = if fits(start_half) {
        start_half
    } else {
        DVec2::ZERO
    };

    let t = bisect_largest(FIT_ITERATIONS, |t| fits(anchor.lerp(target_half, t)));
    let best = anchor.lerp(target_half, t);
    let shrunk = (best - DVec2::splat(FIT_SAFETY_MARGIN)).max(DVec2::ZERO);

    if fits(shrunk) { shrunk } else { anchor }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn sanitize_extent(half: DVec2) -> DVec2 {
    DVec2::new(sanitize(half.x).max(0.0), sanitize(half.y).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: DVec2, b: DVec2) -> bool {
        (a - b).length() < 1e-9
    }

    #[test]
    fn test_unrotated_polygon_is_frame_corners() {
        let poly = build_image_polygon(1000.0, 800.0, 0.0, 0.0, 0.0);
        let expected = [
            DVec2::new(0.0, 0.0),
            DVec2::new(1000.0, 0.0),
            DVec2::new(1000.0, 800.0),
            DVec2::new(0.0, 800.0),
        ];
        for (got, want) in poly.iter().zip(expected) {
            assert!(approx(*got, want), "got {got:?}, want {want:?}");
        }
    }

    #[test]
    fn test_offsets_are_bounded_half_frame_percentages() {
        let poly = build_image_polygon(1000.0, 800.0, 0.0, 50.0, -250.0);
        // +50% of half width = 250; -100% (clamped) of half height = -400.
        assert!(approx(poly[0], DVec2::new(250.0, -400.0)), "{:?}", poly[0]);
        assert!(approx(poly[2], DVec2::new(1250.0, 400.0)), "{:?}", poly[2]);
    }

    #[test]
    fn test_point_on_edge_counts_as_inside() {
        let poly = build_image_polygon(100.0, 100.0, 0.0, 0.0, 0.0);
        assert!(point_in_convex_polygon(DVec2::new(0.0, 50.0), &poly));
        assert!(point_in_convex_polygon(DVec2::new(100.0, 100.0), &poly));
        assert!(!point_in_convex_polygon(DVec2::new(100.001, 50.0), &poly));
    }

    #[test]
    fn test_rect_inside_requires_every_corner() {
        let poly = build_image_polygon(100.0, 100.0, 0.0, 0.0, 0.0);
        assert!(rect_inside_polygon(&CropRect::new(0.0, 0.0, 100.0, 100.0), &poly));
        assert!(!rect_inside_polygon(&CropRect::new(10.0, 10.0, 91.0, 20.0), &poly));
    }

    #[test]
    fn test_rotated_frame_rejects_large_centered_crop() {
        let poly = build_image_polygon(1000.0, 800.0, 30.0, 0.0, 0.0);
        let rect = CropRect::from_center(DVec2::new(500.0, 400.0), DVec2::new(450.0, 350.0));
        assert!(!rect_inside_polygon(&rect, &poly));
    }

    #[test]
    fn test_fit_finds_largest_extent_within_bisection_tolerance() {
        let poly = build_image_polygon(1000.0, 800.0, 30.0, 0.0, 0.0);
        let center = DVec2::new(500.0, 400.0);
        let target = DVec2::new(450.0, 350.0);

        let half = fit_centered_rect_to_polygon(center, DVec2::ZERO, target, &poly);
        assert!(half.x > 0.0 && half.y > 0.0, "{half:?}");
        assert!(half.x <= target.x && half.y <= target.y);
        assert!(rect_inside_polygon(&CropRect::from_center(center, half), &poly));

        let tolerance = target * 2f64.powi(-17);
        let grown = half + DVec2::splat(FIT_SAFETY_MARGIN) + tolerance;
        assert!(
            !rect_inside_polygon(&CropRect::from_center(center, grown), &poly),
            "fit {half:?} is not maximal"
        );
    }

    #[test]
    fn test_fit_fast_path_returns_target() {
        let poly = build_image_polygon(1000.0, 800.0, 0.0, 0.0, 0.0);
        let target = DVec2::new(300.0, 200.0);
        let half = fit_centered_rect_to_polygon(DVec2::new(500.0, 400.0), DVec2::ZERO, target, &poly);
        assert_eq!(half, target);
    }

    #[test]
    fn test_fit_keeps_valid_start_as_anchor() {
        let poly = build_image_polygon(1000.0, 800.0, 20.0, 0.0, 0.0);
        let center = DVec2::new(500.0, 400.0);
        let start = DVec2::new(200.0, 150.0);
        let half = fit_centered_rect_to_polygon(center, start, DVec2::new(500.0, 400.0), &poly);
        assert!(half.x >= start.x - FIT_SAFETY_MARGIN && half.y >= start.y - FIT_SAFETY_MARGIN);
    }

    #[test]
    fn test_fit_with_center_outside_collapses_to_zero() {
        let poly = build_image_polygon(100.0, 100.0, 0.0, 0.0, 0.0);
        let half = fit_centered_rect_to_polygon(DVec2::new(500.0, 500.0), DVec2::ZERO, DVec2::splat(10.0), &poly);
        assert_eq!(half, DVec2::ZERO);
    }

    #[test]
    fn test_degenerate_input_does_not_panic() {
        let poly = build_image_polygon(f64::NAN, -5.0, f64::INFINITY, f64::NAN, 0.0);
        for p in poly {
            assert!(p.is_finite());
        }
    }

    #[test]
    fn test_oriented_size_swaps_on_odd_turns() {
        let t = FrameTransform { quarter_turns: 1, ..FrameTransform::default() };
        assert_eq!(t.oriented_size(DVec2::new(1000.0, 800.0)), DVec2::new(800.0, 1000.0));
        let t = FrameTransform { quarter_turns: 2, ..FrameTransform::default() };
        assert_eq!(t.oriented_size(DVec2::new(1000.0, 800.0)), DVec2::new(1000.0, 800.0));
    }

    #[test]
    fn test_scale_grows_polygon_about_center() {
        let t = FrameTransform { scale: 2.0, ..FrameTransform::default() };
        let poly = t.polygon(DVec2::new(100.0, 50.0));
        assert!(approx(poly[0], DVec2::new(-50.0, -25.0)), "{:?}", poly[0]);
        assert!(approx(poly[2], DVec2::new(150.0, 75.0)), "{:?}", poly[2]);
    }

    proptest! {
        #[test]
        fn prop_fit_always_inside_and_bounded(
            w in 50.0f64..3000.0,
            h in 50.0f64..3000.0,
            rot in -45.0f64..45.0,
            hx in -60.0f64..60.0,
            vy in -60.0f64..60.0,
            tx in 0.0f64..2000.0,
            ty in 0.0f64..2000.0,
        ) {
            let poly = build_image_polygon(w, h, rot, hx, vy);
            let center = poly.iter().copied().sum::<DVec2>() * 0.25;
            let target = DVec2::new(tx, ty);
            let half = fit_centered_rect_to_polygon(center, DVec2::ZERO, target, &poly);
            prop_assert!(half.x <= target.x && half.y <= target.y);
            prop_assert!(rect_inside_polygon(&CropRect::from_center(center, half), &poly));
        }

        #[test]
        fn prop_zero_rotation_contains_frame(w in 1.0f64..5000.0, h in 1.0f64..5000.0) {
            let poly = build_image_polygon(w, h, 0.0, 0.0, 0.0);
            prop_assert!(rect_inside_polygon(&CropRect::new(0.0, 0.0, w, h), &poly));
        }
    }
}
