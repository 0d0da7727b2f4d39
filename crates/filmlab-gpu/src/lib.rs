//! FilmLab GPU: wgpu compute pipeline for adjustment and film-simulation
//! rendering.
//!
//! This crate owns all GPU resources: one [`GpuContext`] and
//! [`PipelineOrchestrator`] per render slot, the per-slot [`LutCache`] of 3D
//! LUT textures, and the [`RenderManager`] that recreates slots after
//! device loss. Everything pure (parameter records, curves, crop geometry,
//! HaldCLUT parsing) lives in `filmlab-core`.

pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod lut_cache;
pub mod lut_loader;
pub mod pipeline;
pub mod plan;
pub mod readback;
pub mod render_manager;
pub mod stages;
pub mod targets;
pub mod uniforms;

pub use config::RenderConfig;
pub use context::{GpuContext, GpuLutTexture};
pub use error::GpuError;
pub use export::{ExportJob, ExportOutcome, run_export_batch};
pub use lut_cache::{LutCache, LutContext, LutKey, LutLookup};
pub use lut_loader::{AbortSignal, FileLutLoader, LutLoader, LutRequestTracker};
pub use pipeline::{FrameInfo, PipelineOrchestrator, RenderOptions, RenderRequest};
pub use plan::{PlanStart, StageKind, StageMask};
pub use render_manager::{RenderManager, SlotId, SlotKind};

/// Compute workgroup edge length shared by every stage shader.
pub const WORKGROUP_SIZE: u32 = 8;

/// Device features the pipeline needs. Everything runs on core WebGPU.
pub fn required_features() -> wgpu::Features {
    wgpu::Features::empty()
}
