//! Film profiles: named bundles of simulation modules.

use serde::{Deserialize, Serialize};

use super::NEUTRAL_EPSILON;
use crate::lut::hald::DEFAULT_LEVEL;
use crate::lut::stock::StockFilm;

/// Halation/bloom below this strength is skipped entirely.
pub const HALATION_EPSILON: f32 = 1e-3;

/// A complete film simulation. Every module is independently enabled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilmProfile {
    pub id: String,
    pub name: String,
    pub tone: ToneModule,
    pub color_matrix: ColorMatrixModule,
    pub lut: LutModule,
    pub color_cast: ColorCastModule,
    pub grain: GrainModule,
    pub vignette: VignetteModule,
    pub halation: HalationModule,
}

impl FilmProfile {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Profile that applies a bundled stock LUT found under `lut_dir`.
    pub fn stock(stock: StockFilm, lut_dir: &str) -> Self {
        let dir = lut_dir.trim_end_matches('/');
        Self {
            id: format!("stock-{}", stock.file_name().trim_end_matches(".png")),
            name: stock.label().to_string(),
            lut: LutModule {
                enabled: true,
                path: Some(format!("{dir}/{}", stock.file_name())),
                level: DEFAULT_LEVEL,
                intensity: 1.0,
            },
            ..Self::default()
        }
    }

    /// `(path, level)` of the LUT to load, when the LUT module is active.
    pub fn lut_request(&self) -> Option<(&str, u32)> {
        if !self.lut.is_active() {
            return None;
        }
        self.lut.path.as_deref().map(|path| (path, self.lut.level))
    }

    /// Whether the film stage has anything to do.
    pub fn has_film(&self) -> bool {
        self.tone.is_active()
            || self.color_matrix.is_active()
            || self.lut.is_active()
            || self.color_cast.is_active()
            || self.grain.is_active()
            || self.vignette.is_active()
    }

    pub fn has_halation(&self) -> bool {
        self.halation.is_active()
    }
}

fn active(enabled: bool, amount: f32) -> bool {
    enabled && amount.abs() >= NEUTRAL_EPSILON
}

/// Filmic tone response: toe/shoulder roll-off blended by `amount`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneModule {
    pub enabled: bool,
    /// Blend with the untouched signal (`0..1`).
    pub amount: f32,
    /// Shadow compression (`0..1`).
    pub toe: f32,
    /// Highlight compression (`0..1`).
    pub shoulder: f32,
    /// Mid-tone gamma applied after the curve.
    pub gamma: f32,
}

impl Default for ToneModule {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 1.0,
            toe: 0.0,
            shoulder: 0.0,
            gamma: 1.0,
        }
    }
}

impl ToneModule {
    pub fn is_active(&self) -> bool {
        active(self.enabled, self.amount)
    }
}

/// 3×3 color matrix applied in linear light (rows are output channels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorMatrixModule {
    pub enabled: bool,
    pub amount: f32,
    pub matrix: [[f32; 3]; 3],
}

impl Default for ColorMatrixModule {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 1.0,
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

impl ColorMatrixModule {
    pub fn is_active(&self) -> bool {
        active(self.enabled, self.amount)
    }
}

/// 3D LUT reference and blend intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LutModule {
    pub enabled: bool,
    pub path: Option<String>,
    /// HaldCLUT level of the referenced file.
    pub level: u32,
    /// Blend with the pre-LUT color (`0..1`).
    pub intensity: f32,
}

impl Default for LutModule {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            level: DEFAULT_LEVEL,
            intensity: 1.0,
        }
    }
}

impl LutModule {
    pub fn is_active(&self) -> bool {
        active(self.enabled, self.intensity) && self.path.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Zonal color cast: additive RGB offsets per tonal zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorCastModule {
    pub enabled: bool,
    pub amount: f32,
    pub shadows: [f32; 3],
    pub midtones: [f32; 3],
    pub highlights: [f32; 3],
}

impl Default for ColorCastModule {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 1.0,
            shadows: [0.0; 3],
            midtones: [0.0; 3],
            highlights: [0.0; 3],
        }
    }
}

impl ColorCastModule {
    pub fn is_active(&self) -> bool {
        active(self.enabled, self.amount)
    }
}

/// Procedural luminance grain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrainModule {
    pub enabled: bool,
    /// Strength (`0..1`).
    pub amount: f32,
    /// Grain cell size in output pixels.
    pub size: f32,
    /// Mix of fine noise over the base cell noise (`0..1`).
    pub roughness: f32,
    /// Noise seed; fixed per profile so re-renders match.
    pub seed: u32,
}

impl Default for GrainModule {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 0.0,
            size: 1.5,
            roughness: 0.5,
            seed: 0,
        }
    }
}

impl GrainModule {
    pub fn is_active(&self) -> bool {
        active(self.enabled, self.amount)
    }
}

/// Radial vignette; negative amounts darken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VignetteModule {
    pub enabled: bool,
    /// `-1..1`.
    pub amount: f32,
    /// Normalized radius where the falloff starts (`0..1`).
    pub midpoint: f32,
    /// Edge softness (`0..1`).
    pub feather: f32,
    /// 0 follows the frame aspect, 1 is circular.
    pub roundness: f32,
}

impl Default for VignetteModule {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 0.0,
            midpoint: 0.5,
            feather: 0.5,
            roundness: 0.0,
        }
    }
}

impl VignetteModule {
    pub fn is_active(&self) -> bool {
        active(self.enabled, self.amount)
    }
}

/// Red-fringed halation and neutral bloom around highlights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalationModule {
    pub enabled: bool,
    /// Tinted glow strength (`0..1`).
    pub halation_amount: f32,
    /// Neutral glow strength (`0..1`).
    pub bloom_amount: f32,
    /// Luminance above which highlights glow (`0..1`).
    pub threshold: f32,
    /// Blur radius in half-resolution pixels.
    pub radius: f32,
    pub tint: [f32; 3],
}

impl Default for HalationModule {
    fn default() -> Self {
        Self {
            enabled: false,
            halation_amount: 0.0,
            bloom_amount: 0.0,
            threshold: 0.8,
            radius: 8.0,
            tint: [1.0, 0.35, 0.15],
        }
    }
}

impl HalationModule {
    /// Active only when either sub-effect is above [`HALATION_EPSILON`].
    pub fn is_active(&self) -> bool {
        self.enabled && self.halation_amount.max(self.bloom_amount) > HALATION_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_inert() {
        let film = FilmProfile::default();
        assert!(!film.has_film());
        assert!(!film.has_halation());
        assert_eq!(film.lut_request(), None);
    }

    #[test]
    fn test_stock_profile_requests_bundled_lut() {
        let film = FilmProfile::stock(StockFilm::Portra400, "luts/stocks/");
        assert_eq!(film.lut_request(), Some(("luts/stocks/portra400.png", 8)));
        assert!(film.has_film());
        assert_eq!(film.id, "stock-portra400");
    }

    #[test]
    fn test_halation_needs_either_amount() {
        let mut halation = HalationModule {
            enabled: true,
            ..HalationModule::default()
        };
        assert!(!halation.is_active());
        halation.bloom_amount = 0.0005;
        assert!(!halation.is_active());
        halation.bloom_amount = 0.2;
        assert!(halation.is_active());
        halation.enabled = false;
        assert!(!halation.is_active());
    }

    #[test]
    fn test_lut_without_path_is_inactive() {
        let film = FilmProfile {
            lut: LutModule {
                enabled: true,
                path: Some(String::new()),
                ..LutModule::default()
            },
            ..FilmProfile::default()
        };
        assert!(film.lut_request().is_none());
    }

    #[test]
    fn test_profile_from_json() {
        let film = FilmProfile::from_json(
            r#"{
                "id": "warm",
                "name": "Warm Print",
                "grain": { "enabled": true, "amount": 0.3 },
                "halation": { "enabled": true, "halation_amount": 0.4 }
            }"#,
        )
        .unwrap();
        assert!(film.grain.is_active());
        assert_eq!(film.grain.size, 1.5);
        assert!(film.has_halation());
        assert!(!film.lut.is_active());
    }
}
