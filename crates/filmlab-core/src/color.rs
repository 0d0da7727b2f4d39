//! Scalar color helpers shared by the stock LUT generator and CPU references.
//!
//! The GPU shaders carry their own copies of these transfer functions; the
//! constants here must stay in sync with `master.wgsl` and `film.wgsl`.

/// Rec. 709 luminance weights (linear light).
pub const LUMA_REC709: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// sRGB EOTF: encoded value to linear light.
pub fn srgb_to_linear(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Inverse sRGB EOTF: linear light to encoded value.
pub fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Rec. 709 luminance of a linear RGB triple.
pub fn luma(rgb: [f32; 3]) -> f32 {
    rgb[0] * LUMA_REC709[0] + rgb[1] * LUMA_REC709[1] + rgb[2] * LUMA_REC709[2]
}
