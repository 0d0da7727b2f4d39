//! Point-curve construction: sparse control points to a 256-entry table.
//!
//! Uses monotone cubic Hermite interpolation (Fritsch-Carlson tangents with
//! the Brodlie weighted harmonic mean at interior knots), so monotone control
//! points never produce a table that folds back on itself.
//!
//! # Algorithm
//! For each segment `[x_k, x_k+1]` with width `h`, secant `δ` and knot
//! tangents `m_k`, `m_k+1`:
//! ```text
//! y(t) = y_k + (y_k+1 - y_k)·h01(t) + h·(m_k·h10(t) + m_k+1·h11(t))
//! ```
//! Evaluated in `f64` so flat segments stay exactly flat.

use serde::{Deserialize, Serialize};

/// Upper bound of the 8-bit level domain.
const LEVEL_MAX: f64 = 255.0;

/// Endpoint tangents are clamped to this multiple of the boundary secant.
const ENDPOINT_TANGENT_LIMIT: f64 = 3.0;

/// A single curve control point in 8-bit level space (`[0, 255]²`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Input level.
    pub x: f32,
    /// Output level.
    pub y: f32,
}

impl CurvePoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A complete 256-entry lookup table: `table[input] = output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurveTable(pub [u8; 256]);

impl CurveTable {
    /// The `y = x` table.
    pub fn identity() -> Self {
        let mut table = [0u8; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = i as u8;
        }
        Self(table)
    }

    pub fn is_identity(&self) -> bool {
        self.0.iter().enumerate().all(|(i, &v)| v == i as u8)
    }

    /// Output level for an input level.
    #[inline]
    pub fn lookup(&self, level: u8) -> u8 {
        self.0[level as usize]
    }

    pub fn as_bytes(&self) -> &[u8; 256] {
        &self.0
    }
}

impl Default for CurveTable {
    fn default() -> Self {
        Self::identity()
    }
}

/// Build a 256-entry table from control points.
///
/// Points are clamped to `[0, 255]²` and ordered by x; duplicate x values
/// collapse to the last supplied y. Non-finite points are ignored. With fewer
/// than two distinct x values the identity table is returned. Missing knots
/// at x = 0 and x = 255 are synthesized from the nearest existing y.
///
/// Never fails: the result is always a complete, clamped table.
pub fn build_curve_table(points: &[CurvePoint]) -> CurveTable {
    let knots = normalize_knots(points);
    if knots.len() < 2 {
        return CurveTable::identity();
    }

    let knots = with_boundary_knots(knots);
    let tangents = monotone_tangents(&knots);

    let mut table = [0u8; 256];
    let mut segment = 0;
    for (i, out) in table.iter_mut().enumerate() {
        let x = i as f64;
        while segment + 2 < knots.len() && x > knots[segment + 1].0 {
            segment += 1;
        }
        let y = evaluate_segment(&knots, &tangents, segment, x);
        *out = y.round().clamp(0.0, LEVEL_MAX) as u8;
    }

    CurveTable(table)
}

/// Sort, clamp and de-duplicate control points into `(x, y)` knots.
fn normalize_knots(points: &[CurvePoint]) -> Vec<(f64, f64)> {
    let mut knots: Vec<(f64, f64)> = points
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|p| {
            (
                f64::from(p.x).clamp(0.0, LEVEL_MAX),
                f64::from(p.y).clamp(0.0, LEVEL_MAX),
            )
        })
        .collect();

    // Stable sort keeps supply order among equal x, so "last wins" holds.
    knots.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut deduped: Vec<(f64, f64)> = Vec::with_capacity(knots.len());
    for knot in knots {
        match deduped.last_mut() {
            Some(last) if last.0 == knot.0 => last.1 = knot.1,
            _ => deduped.push(knot),
        }
    }
    deduped
}

fn with_boundary_knots(mut knots: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    let (first, last) = match (knots.first(), knots.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return knots,
    };
    if first.0 > 0.0 {
        knots.insert(0, (0.0, first.1));
    }
    if last.0 < LEVEL_MAX {
        knots.push((LEVEL_MAX, last.1));
    }
    knots
}

/// Monotone tangents for each knot. Requires at least two knots.
fn monotone_tangents(knots: &[(f64, f64)]) -> Vec<f64> {
    let n = knots.len();
    let h: Vec<f64> = knots.windows(2).map(|w| w[1].0 - w[0].0).collect();
    let delta: Vec<f64> = knots
        .windows(2)
        .zip(&h)
        .map(|(w, &hk)| (w[1].1 - w[0].1) / hk)
        .collect();

    let mut m = vec![0.0; n];

    if n == 2 {
        m[0] = delta[0];
        m[1] = delta[0];
        return m;
    }

    for i in 1..n - 1 {
        let (d0, d1) = (delta[i - 1], delta[i]);
        if d0 == 0.0 || d1 == 0.0 || d0.signum() != d1.signum() {
            continue;
        }
        let w1 = 2.0 * h[i] + h[i - 1];
        let w2 = h[i] + 2.0 * h[i - 1];
        m[i] = (w1 + w2) / (w1 / d0 + w2 / d1);
    }

    m[0] = endpoint_tangent(h[0], h[1], delta[0], delta[1]);
    m[n - 1] = endpoint_tangent(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
    m
}

/// One-sided three-point tangent at a boundary knot.
///
/// `h0`/`d0` describe the boundary segment and `h1`/`d1` its neighbour.
fn endpoint_tangent(h0: f64, h1: f64, d0: f64, d1: f64) -> f64 {
    if d0 == 0.0 {
        return 0.0;
    }
    let m = ((2.0 * h0 + h1) * d0 - h0 * d1) / (h0 + h1);
    if m.signum() != d0.signum() {
        return 0.0;
    }
    let limit = ENDPOINT_TANGENT_LIMIT * d0.abs();
    m.clamp(-limit, limit)
}

fn evaluate_segment(knots: &[(f64, f64)], m: &[f64], k: usize, x: f64) -> f64 {
    let (x0, y0) = knots[k];
    let (x1, y1) = knots[k + 1];
    let h = x1 - x0;
    let t = ((x - x0) / h).clamp(0.0, 1.0);
    let t2 = t * t;
    let t3 = t2 * t;

    let h01 = -2.0 * t3 + 3.0 * t2;
    let h10 = t3 - 2.0 * t2 + t;
    let h11 = t3 - t2;

    y0 + (y1 - y0) * h01 + h * (m[k] * h10 + m[k + 1] * h11)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pts(raw: &[(f32, f32)]) -> Vec<CurvePoint> {
        raw.iter().map(|&(x, y)| CurvePoint::new(x, y)).collect()
    }

    #[test]
    fn test_two_point_identity_is_exact() {
        let table = build_curve_table(&pts(&[(0.0, 0.0), (255.0, 255.0)]));
        for i in 0..256 {
            assert_eq!(table.0[i], i as u8, "table[{i}]");
        }
        assert!(table.is_identity());
    }

    #[test]
    fn test_fewer_than_two_distinct_points_is_identity() {
        assert!(build_curve_table(&[]).is_identity());
        assert!(build_curve_table(&pts(&[(64.0, 200.0)])).is_identity());
        assert!(build_curve_table(&pts(&[(64.0, 10.0), (64.0, 200.0)])).is_identity());
    }

    #[test]
    fn test_single_interior_bump_has_no_overshoot() {
        let table = build_curve_table(&pts(&[(0.0, 0.0), (128.0, 180.0), (255.0, 255.0)]));
        assert_eq!(table.0[0], 0);
        assert_eq!(table.0[255], 255);
        assert!(
            (170..=190).contains(&table.0[128]),
            "table[128] = {}",
            table.0[128]
        );
        assert_eq!(table.0[128], 180);
    }

    #[test]
    fn test_duplicate_x_keeps_last_y() {
        let a = build_curve_table(&pts(&[(0.0, 0.0), (128.0, 40.0), (128.0, 100.0), (255.0, 255.0)]));
        let b = build_curve_table(&pts(&[(0.0, 0.0), (128.0, 100.0), (255.0, 255.0)]));
        assert_eq!(a, b);
        assert_eq!(a.0[128], 100);
    }

    #[test]
    fn test_missing_boundaries_reuse_nearest_y() {
        let table = build_curve_table(&pts(&[(64.0, 30.0), (192.0, 220.0)]));
        for i in 0..=64 {
            assert_eq!(table.0[i], 30, "table[{i}]");
        }
        for i in 192..256 {
            assert_eq!(table.0[i], 220, "table[{i}]");
        }
    }

    #[test]
    fn test_out_of_range_points_are_clamped() {
        let table = build_curve_table(&pts(&[(-40.0, -10.0), (400.0, 900.0)]));
        assert_eq!(table.0[0], 0);
        assert_eq!(table.0[255], 255);
    }

    #[test]
    fn test_unsorted_input_matches_sorted() {
        let sorted = build_curve_table(&pts(&[(0.0, 10.0), (90.0, 60.0), (200.0, 230.0)]));
        let shuffled = build_curve_table(&pts(&[(200.0, 230.0), (0.0, 10.0), (90.0, 60.0)]));
        assert_eq!(sorted, shuffled);
    }

    #[test]
    fn test_non_monotone_points_stay_clamped() {
        let table = build_curve_table(&pts(&[(0.0, 255.0), (40.0, 0.0), (80.0, 255.0), (255.0, 0.0)]));
        assert_eq!(table.0[0], 255);
        assert_eq!(table.0[40], 0);
        assert_eq!(table.0[80], 255);
        assert_eq!(table.0[255], 0);
    }

    fn monotone_points() -> impl Strategy<Value = Vec<CurvePoint>> {
        (
            prop::collection::btree_set(0u8..=255, 2..8),
            prop::collection::vec(0u8..=255, 8),
        )
            .prop_map(|(xs, mut ys)| {
                ys.truncate(xs.len());
                ys.sort_unstable();
                xs.into_iter()
                    .zip(ys)
                    .map(|(x, y)| CurvePoint::new(f32::from(x), f32::from(y)))
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn prop_monotone_points_give_monotone_table(points in monotone_points()) {
            let table = build_curve_table(&points);
            for i in 1..256 {
                prop_assert!(
                    table.0[i] >= table.0[i - 1],
                    "table[{}]={} < table[{}]={}",
                    i, table.0[i], i - 1, table.0[i - 1]
                );
            }
        }

        #[test]
        fn prop_table_passes_through_knots(points in monotone_points()) {
            let table = build_curve_table(&points);
            for p in &points {
                prop_assert_eq!(table.0[p.x as usize], p.y as u8);
            }
        }

        #[test]
        fn prop_build_is_deterministic(points in prop::collection::vec((0.0f32..=255.0, 0.0f32..=255.0), 0..10)) {
            let points: Vec<CurvePoint> = points.into_iter().map(|(x, y)| CurvePoint::new(x, y)).collect();
            prop_assert_eq!(build_curve_table(&points), build_curve_table(&points));
        }
    }
}
