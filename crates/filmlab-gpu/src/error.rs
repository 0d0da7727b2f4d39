use filmlab_core::LutError;

use crate::render_manager::SlotId;

/// Failures from GPU setup, rendering and readback.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to create GPU device: {0}")]
    RequestDevice(String),
    #[error("GPU context lost")]
    ContextLost,
    #[error("image {width}x{height} exceeds the maximum texture size {max}")]
    ImageTooLarge { width: u32, height: u32, max: u32 },
    #[error("unknown render slot {0}")]
    UnknownSlot(SlotId),
    #[error("readback failed: {0}")]
    Readback(String),
    #[error(transparent)]
    Lut(#[from] LutError),
}
