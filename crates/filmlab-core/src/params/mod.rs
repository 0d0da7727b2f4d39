//! Editing-state records read by the renderer.
//!
//! Both records are owned and versioned by the host application; the
//! renderer only reads a resolved snapshot per frame. Values use UI ranges
//! (mostly `±100`) and are rescaled by the GPU uniform resolvers.

pub mod adjustments;
pub mod film;

/// Below this magnitude a slider counts as untouched.
pub const NEUTRAL_EPSILON: f32 = 1e-3;

/// `value`, or `fallback` when it is NaN or infinite.
pub fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}

/// Non-finite values count as untouched.
pub(crate) fn is_neutral(value: f32) -> bool {
    finite_or(value, 0.0).abs() < NEUTRAL_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_sliders_are_neutral() {
        assert!(is_neutral(f32::NAN));
        assert!(is_neutral(f32::INFINITY));
        assert!(!is_neutral(0.5));
        assert_eq!(finite_or(f32::NEG_INFINITY, 2.0), 2.0);
        assert_eq!(finite_or(-3.0, 2.0), -3.0);
    }
}
