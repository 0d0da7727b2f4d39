//! Built-in film stock looks.
//!
//! Each stock is a closed-form color transform evaluated in linear light
//! and baked into a HaldCLUT, so the pipeline treats bundled and user LUTs
//! the same way.

use serde::{Deserialize, Serialize};

use super::hald::HaldLut;
use crate::color::{linear_to_srgb, luma, srgb_to_linear};
use crate::error::LutError;

/// Contrast pivot (18% grey, linear).
const PIVOT: f32 = 0.18;

/// Bundled film stocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockFilm {
    Portra400,
    Ektar100,
    Gold200,
    CineStill800T,
    Provia100F,
    Velvia50,
    TriX400,
    Hp5Plus,
}

impl StockFilm {
    pub const ALL: [Self; 8] = [
        Self::Portra400,
        Self::Ektar100,
        Self::Gold200,
        Self::CineStill800T,
        Self::Provia100F,
        Self::Velvia50,
        Self::TriX400,
        Self::Hp5Plus,
    ];

    /// Human-readable label for UI menus.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Portra400 => "Portra 400",
            Self::Ektar100 => "Ektar 100",
            Self::Gold200 => "Gold 200",
            Self::CineStill800T => "CineStill 800T",
            Self::Provia100F => "Provia 100F",
            Self::Velvia50 => "Velvia 50",
            Self::TriX400 => "Tri-X 400",
            Self::Hp5Plus => "HP5 Plus",
        }
    }

    /// File name of the baked PNG.
    pub const fn file_name(&self) -> &'static str {
        match self {
            Self::Portra400 => "portra400.png",
            Self::Ektar100 => "ektar100.png",
            Self::Gold200 => "gold200.png",
            Self::CineStill800T => "cinestill800t.png",
            Self::Provia100F => "provia100f.png",
            Self::Velvia50 => "velvia50.png",
            Self::TriX400 => "trix400.png",
            Self::Hp5Plus => "hp5plus.png",
        }
    }

    pub const fn is_monochrome(&self) -> bool {
        matches!(self, Self::TriX400 | Self::Hp5Plus)
    }

    /// Apply the stock look to an sRGB-encoded `[0, 1]` triple.
    pub fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        match self {
            Self::Portra400 => ColorGrade {
                saturation: 0.93,
                contrast: 0.95,
                gamma: 0.98,
                lift: 0.010,
                warmth: 0.22,
                ..ColorGrade::default()
            }
            .apply(rgb),
            Self::Ektar100 => ColorGrade {
                saturation: 1.26,
                contrast: 1.12,
                gamma: 1.02,
                gain: 1.01,
                warmth: 0.10,
                ..ColorGrade::default()
            }
            .apply(rgb),
            Self::Gold200 => ColorGrade {
                saturation: 1.05,
                contrast: 0.98,
                gamma: 0.99,
                lift: 0.014,
                warmth: 0.28,
                ..ColorGrade::default()
            }
            .apply(rgb),
            Self::CineStill800T => {
                let [r, g, b] = ColorGrade {
                    saturation: 1.08,
                    contrast: 1.05,
                    gamma: 1.01,
                    lift: 0.006,
                    cool: 0.24,
                    shadow_teal: 0.55,
                    ..ColorGrade::default()
                }
                .apply(rgb);
                // Warm the highlights against the teal shadows.
                let highlight = (((r + g + b) / 3.0 - 0.55) * 2.0).clamp(0.0, 1.0);
                [
                    (r + highlight * 0.020).clamp(0.0, 1.0),
                    (g + highlight * 0.004).clamp(0.0, 1.0),
                    (b - highlight * 0.016).clamp(0.0, 1.0),
                ]
            }
            Self::Provia100F => ColorGrade {
                saturation: 1.05,
                contrast: 1.08,
                gamma: 1.01,
                cool: 0.05,
                ..ColorGrade::default()
            }
            .apply(rgb),
            Self::Velvia50 => ColorGrade {
                saturation: 1.36,
                contrast: 1.18,
                gamma: 1.04,
                lift: -0.004,
                gain: 1.02,
                cool: 0.02,
                ..ColorGrade::default()
            }
            .apply(rgb),
            Self::TriX400 => MonoGrade {
                weights: [0.32, 0.56, 0.12],
                contrast: 1.20,
                gamma: 1.02,
                warm_tone: 0.06,
            }
            .apply(rgb),
            Self::Hp5Plus => MonoGrade {
                weights: [0.28, 0.62, 0.10],
                contrast: 1.08,
                gamma: 0.99,
                warm_tone: 0.02,
            }
            .apply(rgb),
        }
    }

    /// Bake this stock into a HaldCLUT of the given level.
    pub fn generate(&self, level: u32) -> Result<HaldLut, LutError> {
        HaldLut::from_fn(level, |rgb| self.apply(rgb))
    }
}

/// Color-negative/slide grade in linear light.
#[derive(Debug, Clone, Copy)]
struct ColorGrade {
    saturation: f32,
    contrast: f32,
    gamma: f32,
    lift: f32,
    gain: f32,
    warmth: f32,
    cool: f32,
    shadow_teal: f32,
}

impl Default for ColorGrade {
    fn default() -> Self {
        Self {
            saturation: 1.0,
            contrast: 1.0,
            gamma: 1.0,
            lift: 0.0,
            gain: 1.0,
            warmth: 0.0,
            cool: 0.0,
            shadow_teal: 0.0,
        }
    }
}

impl ColorGrade {
    fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        let mut lin = rgb.map(srgb_to_linear);
        let lum = luma(lin);

        // White balance shift.
        lin[0] *= 1.0 + self.warmth * 0.12 - self.cool * 0.05;
        lin[1] *= 1.0 + self.warmth * 0.02 - self.cool * 0.01;
        lin[2] *= 1.0 - self.warmth * 0.10 + self.cool * 0.12;

        // Teal bias fading out above ~55% luma.
        let shadow = (1.0 - lum * 1.8).clamp(0.0, 1.0);
        lin[0] -= self.shadow_teal * 0.03 * shadow;
        lin[1] += self.shadow_teal * 0.01 * shadow;
        lin[2] += self.shadow_teal * 0.04 * shadow;

        let lum = luma(lin);
        let gamma_active = (self.gamma - 1.0).abs() > 1e-6;
        lin.map(|c| {
            let c = lum + (c - lum) * self.saturation;
            let c = (c - PIVOT) * self.contrast + PIVOT;
            let c = (c + self.lift) * self.gain;
            let c = if gamma_active { c.max(0.0).powf(self.gamma) } else { c };
            linear_to_srgb(c)
        })
    }
}

/// Monochrome grade with channel mixing and a faint paper tone.
#[derive(Debug, Clone, Copy)]
struct MonoGrade {
    weights: [f32; 3],
    contrast: f32,
    gamma: f32,
    warm_tone: f32,
}

impl MonoGrade {
    fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        let lin = rgb.map(srgb_to_linear);
        let lum = (lin[0] * self.weights[0] + lin[1] * self.weights[1] + lin[2] * self.weights[2])
            .clamp(0.0, 1.0);
        let lum = ((lum - PIVOT) * self.contrast + PIVOT).clamp(0.0, 1.0);
        let lum = lum.max(0.0).powf(self.gamma);
        [
            linear_to_srgb(lum * (1.0 + self.warm_tone * 0.025)),
            linear_to_srgb(lum * (1.0 + self.warm_tone * 0.008)),
            linear_to_srgb(lum * (1.0 - self.warm_tone * 0.02)),
        ]
    }
}
