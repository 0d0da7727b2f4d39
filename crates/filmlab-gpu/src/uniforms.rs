//! Per-stage uniform bundles and the pure resolvers that derive them from an
//! adjustment snapshot and film profile.
//!
//! Every struct is `#[repr(C)]` and built from `vec4` rows so it matches the
//! WGSL uniform layout without padding fields.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bytemuck::{Pod, Zeroable};
use filmlab_core::color::luma;
use filmlab_core::params::adjustments::{ColorWheel, CropGeometry, CurveSet, DetailSettings, LensCorrection};
use filmlab_core::params::film::HalationModule;
use filmlab_core::params::finite_or;
use filmlab_core::{AdjustmentSet, FilmProfile};
use glam::{DAffine2, DVec2};

use crate::plan::{StageKind, StageMask};

/// Fine rotation/offset/zoom/flip/quarter-turn mapping plus lens correction.
///
/// `row_x`/`row_y` map an output pixel centre to source pixel coordinates:
/// `src.x = dot(row_x.xyz, (px, py, 1))`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GeometryUniforms {
    pub row_x: [f32; 4],
    pub row_y: [f32; 4],
    /// `[source_w, source_h, output_w, output_h]`
    pub sizes: [f32; 4],
    /// `[distortion_k, chromatic_aberration, 0, 0]`
    pub lens: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MasterUniforms {
    /// `[exposure_gain, contrast, highlights, shadows]`
    pub light: [f32; 4],
    /// `[whites, blacks, vibrance, saturation]`
    pub light2: [f32; 4],
    /// Linear RGB white-balance gains.
    pub white_balance: [f32; 4],
    /// Per zone: RGB offset and luminance shift.
    pub grade_shadows: [f32; 4],
    pub grade_midtones: [f32; 4],
    pub grade_highlights: [f32; 4],
    /// `[balance, blending, 0, 0]`
    pub grade_params: [f32; 4],
}

/// One `[hue_shift_deg, saturation, luminance, 0]` row per hue band.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct HslUniforms {
    pub bands: [[f32; 4]; 8],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DetailUniforms {
    /// `[clarity, texture, sharpening, sharpen_radius]`
    pub params: [f32; 4],
    /// `[noise_reduction, 1/width, 1/height, 0]`
    pub extra: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FilmUniforms {
    /// `[amount, toe, shoulder, gamma]`; amount 0 disables.
    pub tone: [f32; 4],
    pub matrix_r: [f32; 4],
    pub matrix_g: [f32; 4],
    pub matrix_b: [f32; 4],
    /// `[intensity, size, 0, 0]`; intensity is 0 without a loaded LUT.
    pub lut: [f32; 4],
    pub cast_shadows: [f32; 4],
    pub cast_midtones: [f32; 4],
    pub cast_highlights: [f32; 4],
    /// `[amount, size, roughness, seed]`
    pub grain: [f32; 4],
    /// `[amount, midpoint, feather, roundness]`
    pub vignette: [f32; 4],
    /// `[width, height, 0, 0]`
    pub frame: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct HalationUniforms {
    /// `[halation_amount, bloom_amount, threshold, radius]`
    pub params: [f32; 4],
    pub tint: [f32; 4],
    /// `[dir_x, dir_y, tap_step, 0]`; zero direction outside the blur passes.
    pub blur: [f32; 4],
}

/// Everything one frame uploads, plus the active stage mask.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameUniforms {
    pub mask: StageMask,
    pub output_size: (u32, u32),
    pub geometry: GeometryUniforms,
    pub master: MasterUniforms,
    pub hsl: HslUniforms,
    /// 256 RGBA8 texels: `[red, green, blue, master]` per input level.
    pub curve: Vec<u8>,
    pub detail: DetailUniforms,
    pub film: FilmUniforms,
    /// Main, horizontal-blur and vertical-blur parameter blocks.
    pub halation: [HalationUniforms; 3],
    pub halation_iterations: u32,
}

impl FrameUniforms {
    /// Resolve a frame. `lut_size` is the per-axis size of the loaded LUT
    /// texture, if any.
    pub fn resolve(
        adjustments: &AdjustmentSet,
        film: &FilmProfile,
        source_size: (u32, u32),
        lut_size: Option<u32>,
    ) -> Self {
        let (geometry, output_size) = resolve_geometry(&adjustments.crop, &adjustments.lens, source_size);
        let film_uniforms = resolve_film(film, output_size, lut_size);
        let lut_loaded = film_uniforms.lut[0] > 0.0;

        let mut mask = StageMask::EMPTY;
        mask.set(
            StageKind::Geometry,
            !adjustments.crop.is_identity() || !adjustments.lens.is_neutral(),
        );
        mask.set(StageKind::Master, adjustments.has_master());
        mask.set(StageKind::Hsl, adjustments.has_hsl());
        mask.set(StageKind::Curve, !adjustments.curves.is_identity());
        mask.set(StageKind::Detail, adjustments.has_detail());
        mask.set(
            StageKind::Film,
            film.tone.is_active()
                || film.color_matrix.is_active()
                || film.color_cast.is_active()
                || film.grain.is_active()
                || film.vignette.is_active()
                || lut_loaded,
        );
        mask.set(StageKind::Halation, film.halation.is_active());

        Self {
            mask,
            output_size,
            geometry,
            master: resolve_master(adjustments),
            hsl: resolve_hsl(adjustments),
            curve: curve_texels(&adjustments.curves),
            detail: resolve_detail(&adjustments.detail, output_size),
            film: film_uniforms,
            halation: resolve_halation(&film.halation),
            halation_iterations: halation_iterations(film.halation.radius),
        }
    }

    /// Bytes uploaded for `kind`.
    pub fn bytes(&self, kind: StageKind) -> &[u8] {
        match kind {
            StageKind::Geometry => bytemuck::bytes_of(&self.geometry),
            StageKind::Master => bytemuck::bytes_of(&self.master),
            StageKind::Hsl => bytemuck::bytes_of(&self.hsl),
            StageKind::Curve => &self.curve,
            StageKind::Detail => bytemuck::bytes_of(&self.detail),
            StageKind::Film => bytemuck::bytes_of(&self.film),
            StageKind::Halation => bytemuck::cast_slice(&self.halation),
        }
    }
}

/// Stable hash over byte slices, used for dirty checks and cache keys.
pub(crate) fn content_key(parts: &[&[u8]]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
    }
    hasher.finish()
}

fn unit(value: f32) -> f32 {
    finite_or(value, 0.0).clamp(-100.0, 100.0) / 100.0
}

fn percent(value: f32) -> f32 {
    finite_or(value, 0.0).clamp(0.0, 100.0) / 100.0
}

/// `value` clamped to `min..=max`, `fallback` when non-finite.
fn bounded(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    finite_or(value, fallback).clamp(min, max)
}

// ── Geometry ────────────────────────────────────────────────────────

/// Barrel/pincushion coefficient at `distortion = ±100`.
const LENS_DISTORTION_SCALE: f32 = 0.3;
/// Red/blue radial scale difference at `chromatic_aberration = ±100`.
const LENS_CA_SCALE: f32 = 0.01;

/// Output-pixel → source-pixel affine and the output size.
pub fn geometry_affine(crop: &CropGeometry, source_size: (u32, u32)) -> (DAffine2, (u32, u32)) {
    let (source_w, source_h) = source_size;
    let frame = crop.crop_frame(source_w, source_h);
    let rect = crop.resolved_rect(source_w, source_h);
    let (out_w, out_h) = crop.output_size(source_w, source_h);
    let transform = frame.transform();
    let size = frame.size();
    let image_center = frame.polygon().iter().copied().sum::<DVec2>() * 0.25;
    let angle = if transform.rotate_deg.is_finite() {
        transform.rotate_deg.to_radians()
    } else {
        0.0
    };

    // Output pixels into oriented-frame space.
    let to_frame = DAffine2::from_translation(DVec2::new(rect.x, rect.y))
        * DAffine2::from_scale(DVec2::new(
            rect.width / f64::from(out_w),
            rect.height / f64::from(out_h),
        ));
    // Frame space into the oriented, unrotated image.
    let to_image = DAffine2::from_translation(size * 0.5)
        * DAffine2::from_angle(-angle)
        * DAffine2::from_scale(DVec2::splat(1.0 / transform.scale))
        * DAffine2::from_translation(-image_center);
    let flip = DAffine2::from_cols(
        DVec2::new(if crop.flip_horizontal { -1.0 } else { 1.0 }, 0.0),
        DVec2::new(0.0, if crop.flip_vertical { -1.0 } else { 1.0 }),
        DVec2::new(
            if crop.flip_horizontal { size.x } else { 0.0 },
            if crop.flip_vertical { size.y } else { 0.0 },
        ),
    );
    let (sw, sh) = (f64::from(source_w), f64::from(source_h));
    let unturn = match transform.quarter_turns % 4 {
        1 => DAffine2::from_cols(DVec2::new(0.0, -1.0), DVec2::new(1.0, 0.0), DVec2::new(0.0, sh)),
        2 => DAffine2::from_cols(DVec2::new(-1.0, 0.0), DVec2::new(0.0, -1.0), DVec2::new(sw, sh)),
        3 => DAffine2::from_cols(DVec2::new(0.0, 1.0), DVec2::new(-1.0, 0.0), DVec2::new(sw, 0.0)),
        _ => DAffine2::IDENTITY,
    };

    (unturn * flip * to_image * to_frame, (out_w, out_h))
}

pub fn resolve_geometry(
    crop: &CropGeometry,
    lens: &LensCorrection,
    source_size: (u32, u32),
) -> (GeometryUniforms, (u32, u32)) {
    let (affine, (out_w, out_h)) = geometry_affine(crop, source_size);
    let m = affine.matrix2;
    let t = affine.translation;
    let uniforms = GeometryUniforms {
        row_x: [m.x_axis.x as f32, m.y_axis.x as f32, t.x as f32, 0.0],
        row_y: [m.x_axis.y as f32, m.y_axis.y as f32, t.y as f32, 0.0],
        sizes: [
            source_size.0 as f32,
            source_size.1 as f32,
            out_w as f32,
            out_h as f32,
        ],
        lens: [
            unit(lens.distortion) * LENS_DISTORTION_SCALE,
            unit(lens.chromatic_aberration) * LENS_CA_SCALE,
            0.0,
            0.0,
        ],
    };
    (uniforms, (out_w, out_h))
}

// ── Master / HSL / curve / detail ───────────────────────────────────

/// Channel gain swing at `temperature = ±100`.
const TEMPERATURE_SCALE: f32 = 0.3;
/// Green gain swing at `tint = ±100`.
const TINT_SCALE: f32 = 0.2;
/// Chroma of a fully saturated grading wheel.
const GRADE_CHROMA: f32 = 0.25;
/// Luminance shift of a grading wheel at `±100`.
const GRADE_LUMA: f32 = 0.25;
/// Hue band shift at `hue = ±100`, in degrees.
const HSL_HUE_DEGREES: f32 = 30.0;

pub fn resolve_master(adjustments: &AdjustmentSet) -> MasterUniforms {
    let grading = &adjustments.color_grading;
    let [r, g, b] = white_balance_gains(adjustments.temperature, adjustments.tint);
    MasterUniforms {
        light: [
            adjustments.exposure_stops().exp2(),
            unit(adjustments.contrast),
            unit(adjustments.highlights),
            unit(adjustments.shadows),
        ],
        light2: [
            unit(adjustments.whites),
            unit(adjustments.blacks),
            unit(adjustments.vibrance),
            unit(adjustments.saturation),
        ],
        white_balance: [r, g, b, 0.0],
        grade_shadows: wheel_offset(&grading.shadows),
        grade_midtones: wheel_offset(&grading.midtones),
        grade_highlights: wheel_offset(&grading.highlights),
        grade_params: [unit(grading.balance), percent(grading.blending), 0.0, 0.0],
    }
}

/// Luminance-normalized linear gains; warm raises red and lowers blue,
/// positive tint lowers green.
pub fn white_balance_gains(temperature: f32, tint: f32) -> [f32; 3] {
    let t = unit(temperature) * TEMPERATURE_SCALE;
    let m = unit(tint) * TINT_SCALE;
    let gains = [1.0 + t + m * 0.5, 1.0 - m, 1.0 - t + m * 0.5];
    let l = luma(gains);
    gains.map(|g| g / l)
}

/// Fully saturated RGB for a hue in degrees.
pub fn hue_to_rgb(hue_deg: f32) -> [f32; 3] {
    let h = if hue_deg.is_finite() { hue_deg.rem_euclid(360.0) / 60.0 } else { 0.0 };
    let channel = |n: f32| {
        let k = (n + h) % 6.0;
        1.0 - k.min(4.0 - k).clamp(0.0, 1.0)
    };
    [channel(5.0), channel(3.0), channel(1.0)]
}

fn wheel_offset(wheel: &ColorWheel) -> [f32; 4] {
    let rgb = hue_to_rgb(wheel.hue);
    let l = luma(rgb);
    let chroma = percent(wheel.saturation) * GRADE_CHROMA;
    [
        (rgb[0] - l) * chroma,
        (rgb[1] - l) * chroma,
        (rgb[2] - l) * chroma,
        unit(wheel.luminance) * GRADE_LUMA,
    ]
}

pub fn resolve_hsl(adjustments: &AdjustmentSet) -> HslUniforms {
    HslUniforms {
        bands: adjustments.hsl.map(|band| {
            [
                unit(band.hue) * HSL_HUE_DEGREES,
                unit(band.saturation),
                unit(band.luminance),
                0.0,
            ]
        }),
    }
}

/// Interleave the four curve tables into one 256×1 RGBA8 row.
pub fn curve_texels(curves: &CurveSet) -> Vec<u8> {
    let tables = curves.tables();
    (0..256)
        .flat_map(|i| tables.iter().map(move |t| t.0[i]))
        .collect()
}

pub fn resolve_detail(detail: &DetailSettings, output_size: (u32, u32)) -> DetailUniforms {
    let radius = bounded(detail.sharpen_radius, 0.5, 3.0, 1.0);
    DetailUniforms {
        params: [
            unit(detail.clarity),
            unit(detail.texture),
            percent(detail.sharpening),
            radius,
        ],
        extra: [
            percent(detail.noise_reduction),
            1.0 / output_size.0.max(1) as f32,
            1.0 / output_size.1.max(1) as f32,
            0.0,
        ],
    }
}

// ── Film / halation ─────────────────────────────────────────────────

pub fn resolve_film(film: &FilmProfile, output_size: (u32, u32), lut_size: Option<u32>) -> FilmUniforms {
    let tone = if film.tone.is_active() {
        [
            bounded(film.tone.amount, 0.0, 1.0, 0.0),
            bounded(film.tone.toe, 0.0, 1.0, 0.0),
            bounded(film.tone.shoulder, 0.0, 1.0, 0.0),
            bounded(film.tone.gamma, 0.1, 10.0, 1.0),
        ]
    } else {
        [0.0, 0.0, 0.0, 1.0]
    };

    let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let matrix = if film.color_matrix.is_active() {
        let amount = finite_or(film.color_matrix.amount, 0.0);
        let m = film.color_matrix.matrix.map(|row| row.map(|v| finite_or(v, 0.0)));
        std::array::from_fn(|r| std::array::from_fn(|c| identity[r][c] + amount * (m[r][c] - identity[r][c])))
    } else {
        identity
    };
    let row = |r: [f32; 3]| [r[0], r[1], r[2], 0.0];

    let lut = match lut_size {
        Some(size) if film.lut.is_active() => [bounded(film.lut.intensity, 0.0, 1.0, 0.0), size as f32, 0.0, 0.0],
        _ => [0.0, 2.0, 0.0, 0.0],
    };

    let cast = |zone: [f32; 3]| {
        if film.color_cast.is_active() {
            let a = finite_or(film.color_cast.amount, 0.0);
            let [r, g, b] = zone.map(|v| finite_or(v, 0.0) * a);
            [r, g, b, 0.0]
        } else {
            [0.0; 4]
        }
    };

    let grain = if film.grain.is_active() {
        [
            bounded(film.grain.amount, 0.0, 1.0, 0.0),
            bounded(film.grain.size, 0.5, 16.0, 1.5),
            bounded(film.grain.roughness, 0.0, 1.0, 0.5),
            (film.grain.seed % 65_536) as f32,
        ]
    } else {
        [0.0; 4]
    };

    let vignette = if film.vignette.is_active() {
        [
            bounded(film.vignette.amount, -1.0, 1.0, 0.0),
            bounded(film.vignette.midpoint, 0.0, 1.0, 0.5),
            bounded(film.vignette.feather, 0.01, 1.0, 0.5),
            bounded(film.vignette.roundness, 0.0, 1.0, 0.0),
        ]
    } else {
        [0.0; 4]
    };

    FilmUniforms {
        tone,
        matrix_r: row(matrix[0]),
        matrix_g: row(matrix[1]),
        matrix_b: row(matrix[2]),
        lut,
        cast_shadows: cast(film.color_cast.shadows),
        cast_midtones: cast(film.color_cast.midtones),
        cast_highlights: cast(film.color_cast.highlights),
        grain,
        vignette,
        frame: [output_size.0 as f32, output_size.1 as f32, 0.0, 0.0],
    }
}

/// Blur radius (half-resolution pixels) above which a third blur iteration
/// runs.
const HALATION_WIDE_RADIUS: f32 = 16.0;
/// Taps on each side of the blur kernel centre.
const HALATION_TAPS: f32 = 4.0;

/// Separable blur iterations for `radius`: 2, or 3 for wide glows.
pub fn halation_iterations(radius: f32) -> u32 {
    if radius.is_finite() && radius > HALATION_WIDE_RADIUS { 3 } else { 2 }
}

/// Main, horizontal and vertical parameter blocks.
pub fn resolve_halation(halation: &HalationModule) -> [HalationUniforms; 3] {
    let radius = bounded(halation.radius, 1.0, 64.0, 1.0);
    let (halation_amount, bloom_amount) = if halation.is_active() {
        (
            bounded(halation.halation_amount, 0.0, 1.0, 0.0),
            bounded(halation.bloom_amount, 0.0, 1.0, 0.0),
        )
    } else {
        (0.0, 0.0)
    };
    let main = HalationUniforms {
        params: [
            halation_amount,
            bloom_amount,
            bounded(halation.threshold, 0.0, 0.99, 0.8),
            radius,
        ],
        tint: {
            let [r, g, b] = halation.tint.map(|v| finite_or(v, 0.0));
            [r, g, b, 0.0]
        },
        blur: [0.0; 4],
    };
    let step = radius / HALATION_TAPS;
    [
        main,
        HalationUniforms {
            blur: [1.0, 0.0, step, 0.0],
            ..main
        },
        HalationUniforms {
            blur: [0.0, 1.0, step, 0.0],
            ..main
        },
    ]
}
