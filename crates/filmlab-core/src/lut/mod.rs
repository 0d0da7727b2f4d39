//! 3D color lookup tables.
//!
//! - [`hald`]: HaldCLUT raster parsing and the flat RGBA texture layout.
//! - [`stock`]: built-in film-stock transforms baked into HaldCLUTs.

pub mod hald;
pub mod stock;
