//! Per-image adjustment snapshot.

use serde::{Deserialize, Serialize};

use super::{finite_or, is_neutral};
use crate::curve::{CurvePoint, CurveTable, build_curve_table};
use crate::geometry::crop::{CropFrame, CropRect};
use crate::geometry::polygon::FrameTransform;

/// Exposure slider range maps to this many stops at either end.
pub const EXPOSURE_STOPS: f32 = 5.0;

/// Hue band names, in shader order.
pub const HSL_BANDS: [&str; 8] = [
    "red", "orange", "yellow", "green", "aqua", "blue", "purple", "magenta",
];

/// Complete adjustment snapshot. `Default` is the identity edit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentSet {
    // Light (±100)
    pub exposure: f32,
    pub contrast: f32,
    pub highlights: f32,
    pub shadows: f32,
    pub whites: f32,
    pub blacks: f32,

    // Color (±100)
    pub temperature: f32,
    pub tint: f32,
    pub vibrance: f32,
    pub saturation: f32,

    /// Selective hue/saturation/luminance, one entry per [`HSL_BANDS`] name.
    pub hsl: [HslBand; 8],
    pub color_grading: ColorGrading,
    pub curves: CurveSet,
    pub detail: DetailSettings,
    pub lens: LensCorrection,
    pub crop: CropGeometry,
}

impl AdjustmentSet {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Exposure in stops (`±100` → `±5`); non-finite reads as 0.
    pub fn exposure_stops(&self) -> f32 {
        finite_or(self.exposure, 0.0).clamp(-100.0, 100.0) / 100.0 * EXPOSURE_STOPS
    }

    /// Whether any master light/color control is away from neutral.
    pub fn has_master(&self) -> bool {
        [
            self.exposure,
            self.contrast,
            self.highlights,
            self.shadows,
            self.whites,
            self.blacks,
            self.temperature,
            self.tint,
            self.vibrance,
            self.saturation,
        ]
        .into_iter()
        .any(|v| !is_neutral(v))
            || !self.color_grading.is_neutral()
    }

    pub fn has_hsl(&self) -> bool {
        self.hsl.iter().any(|band| !band.is_neutral())
    }

    pub fn has_detail(&self) -> bool {
        self.detail.is_active()
    }
}

/// One selective-color band (`±100` each).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HslBand {
    pub hue: f32,
    pub saturation: f32,
    pub luminance: f32,
}

impl HslBand {
    pub fn is_neutral(&self) -> bool {
        is_neutral(self.hue) && is_neutral(self.saturation) && is_neutral(self.luminance)
    }
}

/// A color wheel: hue in degrees, saturation `0..100`, luminance `±100`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorWheel {
    pub hue: f32,
    pub saturation: f32,
    pub luminance: f32,
}

impl ColorWheel {
    pub fn is_neutral(&self) -> bool {
        is_neutral(self.saturation) && is_neutral(self.luminance)
    }
}

/// Three-zone color grading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorGrading {
    pub shadows: ColorWheel,
    pub midtones: ColorWheel,
    pub highlights: ColorWheel,
    /// Shifts the shadow/highlight split (`±100`).
    pub balance: f32,
    /// Zone overlap (`0..100`).
    pub blending: f32,
}

impl Default for ColorGrading {
    fn default() -> Self {
        Self {
            shadows: ColorWheel::default(),
            midtones: ColorWheel::default(),
            highlights: ColorWheel::default(),
            balance: 0.0,
            blending: 50.0,
        }
    }
}

impl ColorGrading {
    pub fn is_neutral(&self) -> bool {
        self.shadows.is_neutral() && self.midtones.is_neutral() && self.highlights.is_neutral()
    }
}

/// Point curves in 8-bit level space. Empty lists are identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveSet {
    pub master: Vec<CurvePoint>,
    pub red: Vec<CurvePoint>,
    pub green: Vec<CurvePoint>,
    pub blue: Vec<CurvePoint>,
}

impl CurveSet {
    /// Tables in `[red, green, blue, master]` order.
    pub fn tables(&self) -> [CurveTable; 4] {
        [
            build_curve_table(&self.red),
            build_curve_table(&self.green),
            build_curve_table(&self.blue),
            build_curve_table(&self.master),
        ]
    }

    pub fn is_identity(&self) -> bool {
        self.tables().iter().all(CurveTable::is_identity)
    }
}

/// Local contrast, sharpening and noise reduction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailSettings {
    /// Large-radius local contrast (`±100`).
    pub clarity: f32,
    /// Mid-frequency local contrast (`±100`).
    pub texture: f32,
    /// Unsharp-mask amount (`0..100`).
    pub sharpening: f32,
    /// Unsharp-mask radius in pixels (`0.5..3.0`).
    pub sharpen_radius: f32,
    /// Edge-preserving smoothing (`0..100`).
    pub noise_reduction: f32,
}

impl Default for DetailSettings {
    fn default() -> Self {
        Self {
            clarity: 0.0,
            texture: 0.0,
            sharpening: 0.0,
            sharpen_radius: 1.0,
            noise_reduction: 0.0,
        }
    }
}

impl DetailSettings {
    pub fn is_active(&self) -> bool {
        !is_neutral(self.clarity)
            || !is_neutral(self.texture)
            || !is_neutral(self.sharpening)
            || !is_neutral(self.noise_reduction)
    }
}

/// Lens correction (`±100` each).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LensCorrection {
    pub distortion: f32,
    pub chromatic_aberration: f32,
}

impl LensCorrection {
    pub fn is_neutral(&self) -> bool {
        is_neutral(self.distortion) && is_neutral(self.chromatic_aberration)
    }
}

/// Crop and orientation state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropGeometry {
    /// Clockwise 90° turns, `0..=3`.
    pub quarter_turns: u8,
    /// Fine rotation in degrees (`±45`).
    pub rotate: f64,
    pub h_offset: f64,
    pub v_offset: f64,
    /// Zoom, `>= 1`.
    pub scale: f64,
    /// Locked width/height ratio, if any.
    pub aspect_ratio: Option<f64>,
    /// Crop in oriented-frame pixels; `None` means the default rect.
    pub rect: Option<CropRect>,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl Default for CropGeometry {
    fn default() -> Self {
        Self {
            quarter_turns: 0,
            rotate: 0.0,
            h_offset: 0.0,
            v_offset: 0.0,
            scale: 1.0,
            aspect_ratio: None,
            rect: None,
            flip_horizontal: false,
            flip_vertical: false,
        }
    }
}

impl CropGeometry {
    pub fn frame_transform(&self) -> FrameTransform {
        FrameTransform {
            quarter_turns: self.quarter_turns % 4,
            rotate_deg: self.rotate.clamp(-45.0, 45.0),
            h_offset: self.h_offset,
            v_offset: self.v_offset,
            scale: if self.scale.is_finite() { self.scale.max(1.0) } else { 1.0 },
        }
    }

    pub fn crop_frame(&self, source_width: u32, source_height: u32) -> CropFrame {
        CropFrame::new(
            f64::from(source_width),
            f64::from(source_height),
            self.frame_transform(),
        )
    }

    /// The crop rect to render: the stored rect constrained to the image
    /// polygon and the minimum size, or the default rect when none is stored
    /// or the stored one is degenerate. An identity geometry always covers
    /// the whole frame, however small.
    pub fn resolved_rect(&self, source_width: u32, source_height: u32) -> CropRect {
        if self.is_identity() {
            return CropRect::new(0.0, 0.0, f64::from(source_width), f64::from(source_height));
        }
        let frame = self.crop_frame(source_width, source_height);
        match self.rect {
            Some(rect) if rect.is_finite() && rect.width > 0.0 && rect.height > 0.0 => {
                frame.constrain(&rect, self.aspect_ratio)
            }
            _ => frame.default_rect(self.aspect_ratio),
        }
    }

    /// Rendered output size in whole pixels (at least 1×1).
    pub fn output_size(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        let rect = self.resolved_rect(source_width, source_height);
        (
            rect.width.round().max(1.0) as u32,
            rect.height.round().max(1.0) as u32,
        )
    }

    /// True when the geometry stage would be a plain copy.
    pub fn is_identity(&self) -> bool {
        let t = self.frame_transform();
        t.quarter_turns == 0
            && t.rotate_deg.abs() < 1e-6
            && t.h_offset.abs() < 1e-6
            && t.v_offset.abs() < 1e-6
            && (t.scale - 1.0).abs() < 1e-6
            && self.rect.is_none()
            && self.aspect_ratio.is_none()
            && !self.flip_horizontal
            && !self.flip_vertical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::crop::MIN_CROP_SIZE;

    #[test]
    fn test_default_is_identity() {
        let adj = AdjustmentSet::default();
        assert!(!adj.has_master());
        assert!(!adj.has_hsl());
        assert!(!adj.has_detail());
        assert!(adj.curves.is_identity());
        assert!(adj.crop.is_identity());
        assert!(adj.lens.is_neutral());
    }

    #[test]
    fn test_exposure_maps_to_stops() {
        let adj = AdjustmentSet {
            exposure: 100.0,
            ..AdjustmentSet::default()
        };
        assert_eq!(adj.exposure_stops(), 5.0);
        let adj = AdjustmentSet {
            exposure: -250.0,
            ..AdjustmentSet::default()
        };
        assert_eq!(adj.exposure_stops(), -5.0);
    }

    #[test]
    fn test_non_finite_exposure_stays_neutral() {
        let adj = AdjustmentSet {
            exposure: f32::NAN,
            saturation: f32::INFINITY,
            ..AdjustmentSet::default()
        };
        assert_eq!(adj.exposure_stops(), 0.0);
        assert!(!adj.has_master());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let adj = AdjustmentSet::from_json(
            r#"{
                "exposure": 20,
                "hsl": [{}, {"hue": 15}, {}, {}, {}, {}, {}, {}],
                "curves": { "master": [{"x": 0, "y": 10}, {"x": 255, "y": 245}] },
                "crop": { "rotate": 12.5 }
            }"#,
        )
        .unwrap();
        assert_eq!(adj.exposure, 20.0);
        assert!(adj.has_master());
        assert!(adj.has_hsl());
        assert!(!adj.curves.is_identity());
        assert_eq!(adj.crop.scale, 1.0);
        assert_eq!(adj.color_grading.blending, 50.0);
        assert!(!adj.crop.is_identity());
    }

    #[test]
    fn test_output_size_follows_crop_rect() {
        let crop = CropGeometry {
            rect: Some(CropRect::new(10.0, 20.0, 300.4, 199.6)),
            ..CropGeometry::default()
        };
        assert_eq!(crop.output_size(1000, 800), (300, 200));
        assert_eq!(CropGeometry::default().output_size(1000, 800), (1000, 800));
    }

    #[test]
    fn test_stored_rect_is_kept_inside_rotated_image() {
        let crop = CropGeometry {
            rotate: 30.0,
            rect: Some(CropRect::new(0.0, 0.0, 1000.0, 800.0)),
            ..CropGeometry::default()
        };
        let rect = crop.resolved_rect(1000, 800);
        assert!(crop.crop_frame(1000, 800).contains(&rect), "{rect:?}");
        let (width, height) = crop.output_size(1000, 800);
        assert!(width < 1000 && height < 800);
    }

    #[test]
    fn test_stored_rect_respects_minimum_size() {
        let crop = CropGeometry {
            rotate: 5.0,
            rect: Some(CropRect::new(499.0, 399.0, 2.0, 2.0)),
            ..CropGeometry::default()
        };
        let min = MIN_CROP_SIZE as u32;
        assert_eq!(crop.output_size(1000, 800), (min, min));
    }

    #[test]
    fn test_identity_output_matches_tiny_sources() {
        assert_eq!(CropGeometry::default().output_size(4, 2), (4, 2));
    }

    #[test]
    fn test_quarter_turn_swaps_output() {
        let crop = CropGeometry {
            quarter_turns: 1,
            ..CropGeometry::default()
        };
        assert_eq!(crop.output_size(1000, 800), (800, 1000));
    }
}
