//! HaldCLUT decoding.
//!
//! A level-`L` HaldCLUT stores an `L²`-per-axis 3D table in a square raster of
//! side `L³`. Raster pixel `i` (row-major) holds the entry for
//! `i = b·size² + g·size + r` with `size = L²`.
//!
//! The parsed table is a flat RGBA8 buffer with red varying fastest, then
//! green, then blue: the layout `wgpu` expects for a `D3` texture upload of
//! `size × size × size` texels.

use image::RgbaImage;

use crate::error::LutError;

/// Smallest supported HaldCLUT level.
pub const MIN_LEVEL: u32 = 2;
/// Largest supported HaldCLUT level (4096² raster).
pub const MAX_LEVEL: u32 = 16;
/// Level used by the bundled stock LUTs (512² raster, 64³ table).
pub const DEFAULT_LEVEL: u32 = 8;

/// A parsed 3D lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaldLut {
    level: u32,
    size: u32,
    data: Vec<u8>,
}

impl HaldLut {
    /// Table size per axis for `level`.
    pub fn size_for_level(level: u32) -> Result<u32, LutError> {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return Err(LutError::InvalidLevel(level));
        }
        Ok(level * level)
    }

    /// Raster side length for `level`.
    pub fn side_for_level(level: u32) -> Result<u32, LutError> {
        Ok(Self::size_for_level(level)? * level)
    }

    /// Parse a raw RGBA8 raster of `width × height` pixels.
    ///
    /// Rejects anything that is not exactly `L³ × L³` pixels with four bytes
    /// per pixel.
    pub fn parse(level: u32, width: u32, height: u32, rgba: &[u8]) -> Result<Self, LutError> {
        let size = Self::size_for_level(level)?;
        let side = size * level;
        if width != side || height != side {
            return Err(LutError::DimensionMismatch {
                expected: side,
                width,
                height,
            });
        }

        let texels = (size as usize).pow(3);
        let expected = texels * 4;
        if rgba.len() != expected {
            return Err(LutError::PixelCountMismatch {
                expected,
                actual: rgba.len(),
            });
        }

        let size = size as usize;
        let mut data = vec![0u8; expected];
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    let raster = (b * size * size + g * size + r) * 4;
                    let flat = texel_offset(size, r, g, b);
                    data[flat..flat + 4].copy_from_slice(&rgba[raster..raster + 4]);
                }
            }
        }

        Ok(Self {
            level,
            size: size as u32,
            data,
        })
    }

    /// Parse a decoded image.
    pub fn from_image(level: u32, image: &RgbaImage) -> Result<Self, LutError> {
        Self::parse(level, image.width(), image.height(), image.as_raw())
    }

    /// Identity table: every entry maps to its own coordinate.
    pub fn identity(level: u32) -> Result<Self, LutError> {
        Self::from_fn(level, |rgb| rgb)
    }

    /// Bake a color transform over normalized `[0, 1]` RGB into a table.
    pub fn from_fn(level: u32, transform: impl Fn([f32; 3]) -> [f32; 3]) -> Result<Self, LutError> {
        let size = Self::size_for_level(level)? as usize;
        let denom = (size - 1) as f32;
        let mut data = vec![0u8; size.pow(3) * 4];
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    let out = transform([r as f32 / denom, g as f32 / denom, b as f32 / denom]);
                    let offset = texel_offset(size, r, g, b);
                    data[offset] = to_u8(out[0]);
                    data[offset + 1] = to_u8(out[1]);
                    data[offset + 2] = to_u8(out[2]);
                    data[offset + 3] = u8::MAX;
                }
            }
        }
        Ok(Self {
            level,
            size: size as u32,
            data,
        })
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Entries per axis (`level²`).
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Flat RGBA8 texels, red fastest.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Entry at integer lattice coordinates.
    pub fn entry(&self, r: u32, g: u32, b: u32) -> [u8; 4] {
        let max = self.size - 1;
        let offset = texel_offset(
            self.size as usize,
            r.min(max) as usize,
            g.min(max) as usize,
            b.min(max) as usize,
        );
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]
    }

    /// Trilinear lookup of a normalized RGB triple, with edge clamping.
    pub fn sample(&self, rgb: [f32; 3]) -> [f32; 3] {
        let max = (self.size - 1) as f32;
        let coord = rgb.map(|c| if c.is_finite() { c.clamp(0.0, 1.0) * max } else { 0.0 });
        let base = coord.map(|c| (c.floor() as u32).min(self.size - 2));
        let frac = [
            coord[0] - base[0] as f32,
            coord[1] - base[1] as f32,
            coord[2] - base[2] as f32,
        ];

        let mut out = [0.0f32; 3];
        for corner in 0..8u32 {
            let (dr, dg, db) = (corner & 1, (corner >> 1) & 1, (corner >> 2) & 1);
            let weight = axis_weight(frac[0], dr) * axis_weight(frac[1], dg) * axis_weight(frac[2], db);
            if weight == 0.0 {
                continue;
            }
            let texel = self.entry(base[0] + dr, base[1] + dg, base[2] + db);
            for (o, &v) in out.iter_mut().zip(&texel[..3]) {
                *o += weight * f32::from(v) / 255.0;
            }
        }
        out
    }

    /// Re-encode as a HaldCLUT raster.
    pub fn to_image(&self) -> RgbaImage {
        let side = self.size * self.level;
        // Raster order equals the flat red-fastest order, row-major.
        RgbaImage::from_raw(side, side, self.data.clone())
            .unwrap_or_else(|| RgbaImage::new(side, side))
    }
}

fn texel_offset(size: usize, r: usize, g: usize, b: usize) -> usize {
    ((b * size + g) * size + r) * 4
}

fn axis_weight(frac: f32, upper: u32) -> f32 {
    if upper == 1 { frac } else { 1.0 - frac }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
