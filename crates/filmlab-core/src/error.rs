use std::time::Duration;

/// Failures raised while fetching, decoding, validating or uploading a 3D LUT.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LutError {
    #[error("invalid HaldCLUT level {0}: must be between 2 and 16")]
    InvalidLevel(u32),
    #[error("HaldCLUT size mismatch: expected {expected}x{expected}, got {width}x{height}")]
    DimensionMismatch {
        expected: u32,
        width: u32,
        height: u32,
    },
    #[error("HaldCLUT pixel count mismatch: expected {expected} bytes, got {actual}")]
    PixelCountMismatch { expected: usize, actual: usize },
    #[error("failed to read LUT '{path}': {message}")]
    Fetch { path: String, message: String },
    #[error("failed to decode LUT '{path}': {message}")]
    Decode { path: String, message: String },
    #[error("LUT '{path}' failed recently; retry suppressed for {retry_in:?}")]
    RecentlyFailed { path: String, retry_in: Duration },
    #[error("LUT load for '{path}' was superseded by a newer request")]
    Superseded { path: String },
    #[error("LUT load for '{path}' was aborted")]
    Aborted { path: String },
    #[error("failed to upload LUT '{path}': {message}")]
    Upload { path: String, message: String },
}

impl LutError {
    /// Whether this failure should be remembered by the negative cache.
    ///
    /// Cancellation outcomes say nothing about the referenced file, so they
    /// are never cached; neither is a short-circuited repeat.
    pub fn is_negative_cacheable(&self) -> bool {
        !matches!(
            self,
            Self::RecentlyFailed { .. } | Self::Superseded { .. } | Self::Aborted { .. }
        )
    }
}
