//! Renderer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of export worker slots.
const DEFAULT_EXPORT_WORKERS: usize = 2;
/// Default LRU bound for the preview slot's LUT cache.
const DEFAULT_PREVIEW_LUT_CACHE_SIZE: usize = 5;
/// Default LRU bound for export slots (batches cycle through more looks).
const DEFAULT_EXPORT_LUT_CACHE_SIZE: usize = 8;
/// Default negative-cache TTL for failed LUT loads.
const DEFAULT_LUT_FAILURE_TTL: Duration = Duration::from_secs(30);

/// Adapter power preference, serializable for config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
    HighPerformance,
    LowPower,
}

impl PowerPreference {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high-performance" | "high" => Some(Self::HighPerformance),
            "low-power" | "low" => Some(Self::LowPower),
            _ => None,
        }
    }
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(value: PowerPreference) -> Self {
        match value {
            PowerPreference::HighPerformance => Self::HighPerformance,
            PowerPreference::LowPower => Self::LowPower,
        }
    }
}

/// Runtime configuration for render slots and LUT caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Export worker slots used by batch export.
    pub export_workers: usize,
    /// LRU bound of the preview slot's LUT cache.
    pub preview_lut_cache_size: usize,
    /// LRU bound of each export slot's LUT cache.
    pub export_lut_cache_size: usize,
    /// How long a failed LUT path is suppressed.
    pub lut_failure_ttl: Duration,
    pub power_preference: PowerPreference,
    /// Request a software adapter (useful in CI).
    pub force_fallback_adapter: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            export_workers: DEFAULT_EXPORT_WORKERS,
            preview_lut_cache_size: DEFAULT_PREVIEW_LUT_CACHE_SIZE,
            export_lut_cache_size: DEFAULT_EXPORT_LUT_CACHE_SIZE,
            lut_failure_ttl: DEFAULT_LUT_FAILURE_TTL,
            power_preference: PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

impl RenderConfig {
    /// Defaults overlaid with `FILMLAB_*` environment variables.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(workers) = lookup("FILMLAB_EXPORT_WORKERS").and_then(|s| s.parse().ok()) {
            config.export_workers = usize::max(workers, 1);
        }
        if let Some(size) = lookup("FILMLAB_LUT_CACHE_SIZE").and_then(|s| s.parse().ok()) {
            config.preview_lut_cache_size = usize::max(size, 1);
        }
        if let Some(secs) = lookup("FILMLAB_LUT_FAILURE_TTL_SECS").and_then(|s| s.parse().ok()) {
            config.lut_failure_ttl = Duration::from_secs(secs);
        }
        if let Some(power) = lookup("FILMLAB_GPU_POWER").and_then(|s| PowerPreference::parse(&s)) {
            config.power_preference = power;
        }
        if let Some(fallback) = lookup("FILMLAB_GPU_FALLBACK") {
            config.force_fallback_adapter = matches!(fallback.trim(), "1" | "true" | "yes");
        }
        config
    }
}
