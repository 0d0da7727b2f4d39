//! FilmLab Core: domain layer for the film-simulation editor.
//!
//! This crate contains the adjustment and film-profile records, tone-curve
//! construction, crop/rotation geometry and HaldCLUT decoding. No GPU or
//! framework dependencies: everything here is pure and safe to call from any
//! thread.

pub mod color;
pub mod curve;
pub mod error;
pub mod geometry;
pub mod lut;
pub mod params;
pub mod source;

// Re-exports for convenience.
pub use curve::{CurvePoint, CurveTable, build_curve_table};
pub use error::LutError;
pub use geometry::crop::{CropFrame, CropHandle, CropRect, MIN_CROP_SIZE};
pub use geometry::polygon::{
    FrameTransform, Polygon, build_image_polygon, fit_centered_rect_to_polygon,
    point_in_convex_polygon, rect_inside_polygon,
};
pub use lut::hald::HaldLut;
pub use lut::stock::StockFilm;
pub use params::adjustments::AdjustmentSet;
pub use params::film::FilmProfile;
pub use source::SourceImage;
