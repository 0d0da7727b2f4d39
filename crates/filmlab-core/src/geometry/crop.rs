//! Crop rectangle interaction: default placement, handle drags, moves and
//! transform clamping, all constrained to the image polygon.
//!
//! The crop rect lives in oriented-frame space (after quarter turns, before
//! fine rotation). Callers feed already-translated deltas; nothing here knows
//! about pointers.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::bisect_largest;
use super::polygon::{
    FIT_ITERATIONS, FrameTransform, Polygon, fit_centered_rect_to_polygon,
    point_in_convex_polygon, rect_inside_polygon,
};

/// Smallest crop edge, in frame pixels.
pub const MIN_CROP_SIZE: f64 = 16.0;

/// Axis-aligned rectangle in unrotated frame space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rect centred on `center` with the given half extents.
    pub fn from_center(center: DVec2, half: DVec2) -> Self {
        Self::new(
            center.x - half.x,
            center.y - half.y,
            half.x * 2.0,
            half.y * 2.0,
        )
    }

    pub fn center(&self) -> DVec2 {
        DVec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn half_extents(&self) -> DVec2 {
        DVec2::new(self.width, self.height) * 0.5
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Corners in top-left, top-right, bottom-right, bottom-left order.
    pub fn corners(&self) -> [DVec2; 4] {
        [
            DVec2::new(self.x, self.y),
            DVec2::new(self.right(), self.y),
            DVec2::new(self.right(), self.bottom()),
            DVec2::new(self.x, self.bottom()),
        ]
    }

    pub fn translated(&self, delta: DVec2) -> Self {
        Self::new(self.x + delta.x, self.y + delta.y, self.width, self.height)
    }

    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        Self::new(
            mix(self.x, other.x),
            mix(self.y, other.y),
            mix(self.width, other.width),
            mix(self.height, other.height),
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    fn from_edges(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }
}

/// Interactive crop handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CropHandle {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl CropHandle {
    fn moves_left(self) -> bool {
        matches!(self, Self::TopLeft | Self::Left | Self::BottomLeft)
    }

    fn moves_right(self) -> bool {
        matches!(self, Self::TopRight | Self::Right | Self::BottomRight)
    }

    fn moves_top(self) -> bool {
        matches!(self, Self::TopLeft | Self::Top | Self::TopRight)
    }

    fn moves_bottom(self) -> bool {
        matches!(self, Self::BottomLeft | Self::Bottom | Self::BottomRight)
    }

    fn is_corner(self) -> bool {
        matches!(
            self,
            Self::TopLeft | Self::TopRight | Self::BottomRight | Self::BottomLeft
        )
    }
}

/// The frame a crop rect is constrained to: source size, current transform
/// and the resulting image polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct CropFrame {
    source: DVec2,
    size: DVec2,
    transform: FrameTransform,
    polygon: Polygon,
}

impl CropFrame {
    pub fn new(source_width: f64, source_height: f64, transform: FrameTransform) -> Self {
        let source = DVec2::new(source_width, source_height);
        let size = transform.oriented_size(source);
        Self {
            source,
            size,
            transform,
            polygon: transform.polygon(size),
        }
    }

    /// Same source, different transform.
    pub fn with_transform(&self, transform: FrameTransform) -> Self {
        Self::new(self.source.x, self.source.y, transform)
    }

    /// Oriented frame size.
    pub fn size(&self) -> DVec2 {
        self.size
    }

    pub fn transform(&self) -> &FrameTransform {
        &self.transform
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn contains(&self, rect: &CropRect) -> bool {
        rect.is_finite() && rect_inside_polygon(rect, &self.polygon)
    }

    /// Largest rect of the requested aspect (frame aspect when `None`),
    /// centred on the frame centre, or on the image centre when the frame
    /// centre has left the polygon.
    pub fn default_rect(&self, aspect: Option<f64>) -> CropRect {
        let frame_center = self.size * 0.5;
        let center = if point_in_convex_polygon(frame_center, &self.polygon) {
            frame_center
        } else {
            self.image_center()
        };

        let target_half = aspect_extent(self.size, aspect) * 0.5;
        let half = fit_centered_rect_to_polygon(center, DVec2::ZERO, target_half, &self.polygon);
        floor_size(CropRect::from_center(center, half), aspect)
    }

    /// Crop rect to use after the transform changed from `previous` to the
    /// current one.
    ///
    /// A quarter-turn change discards `previous_rect` and returns a fresh
    /// default. Otherwise the previous rect is kept if it still fits, or
    /// shrunk about its centre until it does.
    pub fn recompute_after_rotation(
        &self,
        previous: &FrameTransform,
        previous_rect: Option<&CropRect>,
        aspect: Option<f64>,
    ) -> CropRect {
        let Some(rect) = previous_rect else {
            return self.default_rect(aspect);
        };
        if previous.quarter_turns % 4 != self.transform.quarter_turns % 4 {
            return self.default_rect(aspect);
        }
        if self.contains(rect) {
            return *rect;
        }
        self.refit(rect, aspect)
    }

    /// `rect` grown to [`MIN_CROP_SIZE`] and, if it then leaves the
    /// polygon, shrunk about its centre until it fits.
    pub fn constrain(&self, rect: &CropRect, aspect: Option<f64>) -> CropRect {
        if !rect.is_finite() {
            return self.default_rect(aspect);
        }
        if rect.width >= MIN_CROP_SIZE && rect.height >= MIN_CROP_SIZE && self.contains(rect) {
            return *rect;
        }
        let floored = floor_size(*rect, aspect);
        if self.contains(&floored) {
            return floored;
        }
        self.refit(&floored, aspect)
    }

    /// Drag `handle` of `start` by `delta`, honouring an optional aspect
    /// lock and [`MIN_CROP_SIZE`]. When the requested rect leaves the
    /// polygon, the result is the furthest fitting rect between `start` and
    /// the request.
    pub fn drag_handle(
        &self,
        start: &CropRect,
        handle: CropHandle,
        delta: DVec2,
        aspect: Option<f64>,
    ) -> CropRect {
        let desired = resize_by_handle(start, handle, delta, valid_aspect(aspect));
        if self.contains(&desired) {
            return desired;
        }
        if !self.contains(start) {
            return self.refit(&desired, aspect);
        }
        let t = bisect_largest(FIT_ITERATIONS, |t| self.contains(&start.lerp(&desired, t)));
        start.lerp(&desired, t)
    }

    /// Translate `start` by `delta`, sliding along the polygon boundary one
    /// axis at a time.
    pub fn move_rect(&self, start: &CropRect, delta: DVec2) -> CropRect {
        if !self.contains(start) || !delta.is_finite() {
            return *start;
        }
        let mut rect = *start;
        for step in [DVec2::new(delta.x, 0.0), DVec2::new(0.0, delta.y)] {
            let t = if self.contains(&rect.translated(step)) {
                1.0
            } else {
                bisect_largest(FIT_ITERATIONS, |t| self.contains(&rect.translated(step * t)))
            };
            rect = rect.translated(step * t);
        }
        rect
    }

    /// Clamp a proposed offset/scale/rotation change so `rect` stays inside
    /// the image.
    ///
    /// Returns `proposed` when it already keeps `rect` inside, or when the
    /// current transform does not either (the caller then refits the rect).
    /// Quarter turns are not clamped.
    pub fn clamp_transform(&self, rect: &CropRect, proposed: FrameTransform) -> FrameTransform {
        let proposed = FrameTransform {
            scale: if proposed.scale.is_finite() { proposed.scale.max(1.0) } else { 1.0 },
            ..proposed
        };
        if proposed.quarter_turns % 4 != self.transform.quarter_turns % 4 {
            return proposed;
        }

        let fits = |t: &FrameTransform| rect.is_finite() && rect_inside_polygon(rect, &t.polygon(self.size));
        if fits(&proposed) || !fits(&self.transform) {
            return proposed;
        }
        let t = bisect_largest(FIT_ITERATIONS, |t| fits(&self.transform.lerp(&proposed, t)));
        self.transform.lerp(&proposed, t)
    }

    fn image_center(&self) -> DVec2 {
        self.polygon.iter().copied().sum::<DVec2>() * 0.25
    }

    /// Shrink `rect` about its centre until it fits, falling back to the
    /// default rect when its centre is outside the image.
    fn refit(&self, rect: &CropRect, aspect: Option<f64>) -> CropRect {
        let center = rect.center();
        if !rect.is_finite() || !point_in_convex_polygon(center, &self.polygon) {
            return self.default_rect(aspect);
        }
        let half = fit_centered_rect_to_polygon(center, DVec2::ZERO, rect.half_extents(), &self.polygon);
        floor_size(CropRect::from_center(center, half), aspect)
    }
}

fn valid_aspect(aspect: Option<f64>) -> Option<f64> {
    aspect.filter(|a| a.is_finite() && *a > 0.0)
}

/// Largest `aspect` rect inside a frame of `size`.
fn aspect_extent(size: DVec2, aspect: Option<f64>) -> DVec2 {
    match valid_aspect(aspect) {
        Some(aspect) => {
            let width = size.x.min(size.y * aspect);
            DVec2::new(width, width / aspect)
        }
        None => size,
    }
}

/// Grow a rect about its centre to at least [`MIN_CROP_SIZE`] per edge.
fn floor_size(rect: CropRect, aspect: Option<f64>) -> CropRect {
    let mut half = rect.half_extents();
    let min_half = MIN_CROP_SIZE * 0.5;
    match valid_aspect(aspect) {
        Some(aspect) if half.x < min_half || half.y < min_half => {
            let h = min_half.max(min_half / aspect);
            half = DVec2::new(h * aspect, h);
        }
        _ => half = half.max(DVec2::splat(min_half)),
    }
    CropRect::from_center(rect.center(), half)
}

fn resize_by_handle(start: &CropRect, handle: CropHandle, delta: DVec2, aspect: Option<f64>) -> CropRect {
    let delta = if delta.is_finite() { delta } else { DVec2::ZERO };
    let (mut left, mut top, mut right, mut bottom) = (start.x, start.y, start.right(), start.bottom());

    if handle.moves_left() {
        left = (left + delta.x).min(right - MIN_CROP_SIZE);
    }
    if handle.moves_right() {
        right = (right + delta.x).max(left + MIN_CROP_SIZE);
    }
    if handle.moves_top() {
        top = (top + delta.y).min(bottom - MIN_CROP_SIZE);
    }
    if handle.moves_bottom() {
        bottom = (bottom + delta.y).max(top + MIN_CROP_SIZE);
    }

    let Some(aspect) = aspect else {
        return CropRect::from_edges(left, top, right, bottom);
    };

    let (mut width, mut height) = (right - left, bottom - top);
    if handle.is_corner() {
        if width / height > aspect {
            height = width / aspect;
        } else {
            width = height * aspect;
        }
    } else if handle.moves_left() || handle.moves_right() {
        height = width / aspect;
    } else {
        width = height * aspect;
    }
    if height < MIN_CROP_SIZE {
        height = MIN_CROP_SIZE;
        width = height * aspect;
    }
    if width < MIN_CROP_SIZE {
        width = MIN_CROP_SIZE;
        height = width / aspect;
    }

    // The edges opposite the dragged handle stay anchored; a free axis grows
    // about the start centre.
    let center = start.center();
    let x = if handle.moves_left() {
        right - width
    } else if handle.moves_right() {
        left
    } else {
        center.x - width * 0.5
    };
    let y = if handle.moves_top() {
        bottom - height
    } else if handle.moves_bottom() {
        top
    } else {
        center.y - height * 0.5
    };
    CropRect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(rotate_deg: f64) -> CropFrame {
        CropFrame::new(
            1000.0,
            800.0,
            FrameTransform {
                rotate_deg,
                ..FrameTransform::default()
            },
        )
    }

    #[test]
    fn test_default_rect_fills_unrotated_frame() {
        let rect = frame(0.0).default_rect(None);
        assert_eq!(rect, CropRect::new(0.0, 0.0, 1000.0, 800.0));
    }

    #[test]
    fn test_default_rect_honours_aspect() {
        let rect = frame(0.0).default_rect(Some(1.0));
        assert_eq!(rect, CropRect::new(100.0, 0.0, 800.0, 800.0));
    }

    #[test]
    fn test_default_rect_rotated_fits() {
        let f = frame(30.0);
        let rect = f.default_rect(None);
        assert!(f.contains(&rect), "{rect:?}");
        assert!(rect.width >= MIN_CROP_SIZE && rect.height >= MIN_CROP_SIZE);
        assert!((rect.center() - DVec2::new(500.0, 400.0)).length() < 1e-9);
    }

    #[test]
    fn test_degenerate_frame_yields_minimum_rect() {
        let rect = CropFrame::new(0.0, 0.0, FrameTransform::default()).default_rect(None);
        assert_eq!(rect.width, MIN_CROP_SIZE);
        assert_eq!(rect.height, MIN_CROP_SIZE);
    }

    #[test]
    fn test_constrain_keeps_fitting_rect() {
        let rect = CropRect::new(100.0, 100.0, 300.0, 200.0);
        assert_eq!(frame(5.0).constrain(&rect, None), rect);
    }

    #[test]
    fn test_constrain_shrinks_rect_outside_rotated_image() {
        let f = frame(30.0);
        let rect = f.constrain(&CropRect::new(0.0, 0.0, 1000.0, 800.0), None);
        assert!(f.contains(&rect), "{rect:?}");
        assert!(rect.width < 1000.0 && rect.height < 800.0);
        assert!((rect.center() - DVec2::new(500.0, 400.0)).length() < 1e-9);
    }

    #[test]
    fn test_constrain_grows_tiny_rect_to_minimum() {
        let f = frame(5.0);
        let rect = f.constrain(&CropRect::new(499.0, 399.0, 2.0, 2.0), None);
        assert_eq!(rect.width, MIN_CROP_SIZE);
        assert_eq!(rect.height, MIN_CROP_SIZE);
        assert!(f.contains(&rect));
    }

    #[test]
    fn test_quarter_turn_discards_previous_rect() {
        let before = FrameTransform::default();
        let after = FrameTransform {
            quarter_turns: 1,
            ..before
        };
        let f = CropFrame::new(1000.0, 800.0, after);
        let previous = CropRect::new(10.0, 10.0, 100.0, 100.0);
        let rect = f.recompute_after_rotation(&before, Some(&previous), None);
        assert_eq!(rect, CropRect::new(0.0, 0.0, 800.0, 1000.0));
    }

    #[test]
    fn test_small_rect_survives_fine_rotation() {
        let previous = CropRect::new(400.0, 300.0, 200.0, 200.0);
        let rect = frame(10.0).recompute_after_rotation(&FrameTransform::default(), Some(&previous), None);
        assert_eq!(rect, previous);
    }

    #[test]
    fn test_full_rect_shrinks_about_center_after_rotation() {
        let f = frame(10.0);
        let previous = CropRect::new(0.0, 0.0, 1000.0, 800.0);
        let rect = f.recompute_after_rotation(&FrameTransform::default(), Some(&previous), None);
        assert!(f.contains(&rect), "{rect:?}");
        assert!(rect.width < 1000.0 && rect.height < 800.0);
        assert!((rect.center() - previous.center()).length() < 1e-9);
        let ratio = rect.width / rect.height;
        assert!((ratio - 1.25).abs() < 0.01, "ratio {ratio}");
    }

    #[test]
    fn test_drag_outward_stops_at_frame_edge() {
        let f = frame(0.0);
        let start = CropRect::new(100.0, 100.0, 200.0, 200.0);
        let rect = f.drag_handle(&start, CropHandle::BottomRight, DVec2::new(2000.0, 2000.0), None);
        assert!(f.contains(&rect), "{rect:?}");
        assert_eq!((rect.x, rect.y), (100.0, 100.0));
        assert!(rect.bottom() > 799.9, "{rect:?}");
    }

    #[test]
    fn test_drag_inward_respects_minimum_size() {
        let start = CropRect::new(100.0, 100.0, 200.0, 200.0);
        let rect = frame(0.0).drag_handle(&start, CropHandle::TopLeft, DVec2::new(500.0, 500.0), None);
        assert_eq!(rect.width, MIN_CROP_SIZE);
        assert_eq!(rect.height, MIN_CROP_SIZE);
        assert_eq!((rect.right(), rect.bottom()), (300.0, 300.0));
    }

    #[test]
    fn test_edge_drag_with_aspect_lock_adjusts_height() {
        let start = CropRect::new(100.0, 100.0, 200.0, 100.0);
        let rect = frame(0.0).drag_handle(&start, CropHandle::Right, DVec2::new(100.0, 0.0), Some(2.0));
        assert_eq!(rect.width, 300.0);
        assert_eq!(rect.height, 150.0);
        assert_eq!(rect.x, 100.0);
        assert_eq!(rect.center().y, start.center().y);
    }

    #[test]
    fn test_corner_drag_with_aspect_lock_keeps_anchor() {
        let start = CropRect::new(100.0, 100.0, 200.0, 100.0);
        let rect = frame(0.0).drag_handle(&start, CropHandle::TopLeft, DVec2::new(-40.0, -5.0), Some(2.0));
        assert_eq!((rect.right(), rect.bottom()), (300.0, 200.0));
        assert!((rect.width / rect.height - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_move_slides_along_edge() {
        let f = frame(0.0);
        let start = CropRect::new(0.0, 0.0, 100.0, 100.0);
        let rect = f.move_rect(&start, DVec2::new(-50.0, 300.0));
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 300.0);
    }

    #[test]
    fn test_clamp_transform_limits_offset() {
        let f = frame(0.0);
        let rect = CropRect::new(0.0, 0.0, 1000.0, 800.0);
        let proposed = FrameTransform {
            h_offset: 50.0,
            ..FrameTransform::default()
        };
        let clamped = f.clamp_transform(&rect, proposed);
        assert!(clamped.h_offset.abs() < 1e-3, "{clamped:?}");
    }

    #[test]
    fn test_clamp_transform_accepts_offset_when_zoomed() {
        let f = frame(0.0);
        let rect = CropRect::new(0.0, 0.0, 1000.0, 800.0);
        let proposed = FrameTransform {
            h_offset: 50.0,
            scale: 2.0,
            ..FrameTransform::default()
        };
        assert_eq!(f.clamp_transform(&rect, proposed), proposed);
    }

    #[test]
    fn test_clamp_transform_limits_rotation() {
        let f = frame(0.0);
        let rect = CropRect::new(100.0, 100.0, 800.0, 600.0);
        let proposed = FrameTransform {
            rotate_deg: 40.0,
            ..FrameTransform::default()
        };
        let clamped = f.clamp_transform(&rect, proposed);
        assert!(clamped.rotate_deg > 0.0 && clamped.rotate_deg < 40.0, "{clamped:?}");
        assert!(rect_inside_polygon(&rect, &clamped.polygon(f.size())));
    }
}
