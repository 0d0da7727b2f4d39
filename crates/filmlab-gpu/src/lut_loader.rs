//! LUT loading: fetch + decode + HaldCLUT parse, with abort signalling and
//! generation tracking for superseded requests.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use filmlab_core::{HaldLut, LutError};
use parking_lot::Mutex;
use tracing::debug;

use crate::lut_cache::LutKey;

/// Cooperative cancellation flag for an in-flight load.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Aborted)` once aborted.
    pub fn check(&self, path: &str) -> Result<(), LutError> {
        if self.is_aborted() {
            Err(LutError::Aborted {
                path: path.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Produces parsed LUTs for cache misses.
pub trait LutLoader: Send + Sync {
    fn load(
        &self,
        key: &LutKey,
        abort: &AbortSignal,
    ) -> impl Future<Output = Result<HaldLut, LutError>> + Send;
}

/// Loads HaldCLUT images from the filesystem.
///
/// Relative paths resolve against `root`. Decoding runs on the tokio
/// blocking pool when a runtime is available, inline otherwise.
#[derive(Debug, Clone, Default)]
pub struct FileLutLoader {
    root: Option<PathBuf>,
}

impl FileLutLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path),
            None => PathBuf::from(path),
        }
    }
}

impl LutLoader for FileLutLoader {
    fn load(
        &self,
        key: &LutKey,
        abort: &AbortSignal,
    ) -> impl Future<Output = Result<HaldLut, LutError>> + Send {
        let key = key.clone();
        let abort = abort.clone();
        let file = self.resolve(&key.path);
        async move {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let path = key.path.clone();
                    handle
                        .spawn_blocking(move || load_hald_file(&file, &key, &abort))
                        .await
                        .map_err(|e| LutError::Fetch {
                            path,
                            message: e.to_string(),
                        })?
                }
                Err(_) => load_hald_file(&file, &key, &abort),
            }
        }
    }
}

fn load_hald_file(file: &std::path::Path, key: &LutKey, abort: &AbortSignal) -> Result<HaldLut, LutError> {
    abort.check(&key.path)?;
    let bytes = std::fs::read(file).map_err(|e| LutError::Fetch {
        path: key.path.clone(),
        message: e.to_string(),
    })?;

    abort.check(&key.path)?;
    let image = decode_image(&bytes, key)?;

    abort.check(&key.path)?;
    let lut = HaldLut::from_image(key.level, &image)?;
    debug!(path = %key.path, level = key.level, "decoded HaldCLUT");
    Ok(lut)
}

fn decode_image(bytes: &[u8], key: &LutKey) -> Result<image::RgbaImage, LutError> {
    Ok(image::load_from_memory(bytes)
        .map_err(|e| LutError::Decode {
            path: key.path.clone(),
            message: e.to_string(),
        })?
        .to_rgba8())
}

/// Decode an encoded image (PNG/JPEG) and parse it as a HaldCLUT.
pub fn decode_hald_bytes(bytes: &[u8], key: &LutKey) -> Result<HaldLut, LutError> {
    HaldLut::from_image(key.level, &decode_image(bytes, key)?)
}

/// Generation counter plus abort signal for one logical LUT request stream.
///
/// Starting a request aborts the previous one; a finished load is applied
/// only if its generation is still current.
#[derive(Debug, Default)]
pub struct LutRequestTracker {
    generation: AtomicU64,
    current: Mutex<AbortSignal>,
}

impl LutRequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new request, aborting any in-flight one.
    pub fn begin(&self) -> (u64, AbortSignal) {
        let signal = AbortSignal::new();
        let previous = std::mem::replace(&mut *self.current.lock(), signal.clone());
        previous.abort();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        (generation, signal)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Abort the in-flight request and make every outstanding generation stale.
    pub fn invalidate(&self) {
        self.current.lock().abort();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}
