//! LRU cache of GPU 3D LUT textures with negative caching of failures.
//!
//! - Positive entries are keyed by `(path, level)` and kept in access order;
//!   a hit moves the entry to the most-recently-used end.
//! - Failed paths are remembered with a timestamp. Requests inside the TTL
//!   short-circuit with [`LutError::RecentlyFailed`] instead of re-running
//!   the loader on every frame.
//! - Inserting past `max_size` evicts from the least-recently-used end and
//!   releases the evicted handle through the owning [`LutContext`].
//!
//! Concurrent misses for the same key are not de-duplicated; the cache is
//! owned by a single render slot and `get` takes `&mut self`.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use filmlab_core::{HaldLut, LutError};
use tracing::{debug, warn};

use crate::lut_loader::{AbortSignal, LutLoader};

/// Default LRU bound.
pub const DEFAULT_MAX_SIZE: usize = 5;
/// Default negative-cache TTL.
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(30);

/// Identifies a LUT texture: source path and HaldCLUT level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LutKey {
    pub path: String,
    pub level: u32,
}

impl LutKey {
    pub fn new(path: impl Into<String>, level: u32) -> Self {
        Self {
            path: path.into(),
            level,
        }
    }
}

impl fmt::Display for LutKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.level)
    }
}

/// The GPU side of the cache: turns parsed tables into handles and frees them.
pub trait LutContext {
    type Handle: Clone;

    fn create(&self, key: &LutKey, lut: &HaldLut) -> Result<Self::Handle, LutError>;

    fn release(&self, handle: Self::Handle);
}

/// Time source for negative-cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Result of a synchronous cache probe.
#[derive(Debug)]
pub enum LutLookup<H> {
    Hit(H),
    /// The path failed within the TTL.
    Failed(LutError),
    Miss,
}

/// LRU + negative cache of LUT handles for one render slot.
pub struct LutCache<C: LutContext, L> {
    entries: HashMap<LutKey, C::Handle>,
    /// Least-recently-used first.
    order: VecDeque<LutKey>,
    failures: HashMap<String, Instant>,
    loader: Arc<L>,
    clock: Arc<dyn Clock>,
    max_size: usize,
    failure_ttl: Duration,
}

impl<C: LutContext, L> LutCache<C, L> {
    pub fn new(loader: Arc<L>, max_size: usize) -> Self {
        Self::with_clock(loader, max_size, DEFAULT_FAILURE_TTL, Arc::new(SystemClock))
    }

    pub fn with_clock(
        loader: Arc<L>,
        max_size: usize,
        failure_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            failures: HashMap::new(),
            loader,
            clock,
            max_size: max_size.max(1),
            failure_ttl,
        }
    }

    pub fn loader(&self) -> &Arc<L> {
        &self.loader
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Cached keys, least-recently-used first.
    pub fn keys(&self) -> impl Iterator<Item = &LutKey> {
        self.order.iter()
    }

    /// Handle for `key` without touching LRU order.
    pub fn peek(&self, key: &LutKey) -> Option<&C::Handle> {
        self.entries.get(key)
    }

    /// Probe the positive and negative caches.
    ///
    /// A hit becomes most-recently-used. An expired failure is cleared and
    /// reported as a miss.
    pub fn lookup(&mut self, key: &LutKey) -> LutLookup<C::Handle> {
        if let Some(handle) = self.entries.get(key).cloned() {
            self.touch(key);
            debug!(lut = %key, "LUT cache hit");
            return LutLookup::Hit(handle);
        }

        if let Some(&failed_at) = self.failures.get(&key.path) {
            let elapsed = self.clock.now().saturating_duration_since(failed_at);
            if elapsed < self.failure_ttl {
                debug!(lut = %key, "LUT load suppressed by negative cache");
                return LutLookup::Failed(LutError::RecentlyFailed {
                    path: key.path.clone(),
                    retry_in: self.failure_ttl - elapsed,
                });
            }
            self.failures.remove(&key.path);
        }

        debug!(lut = %key, "LUT cache miss");
        LutLookup::Miss
    }

    /// Upload a freshly loaded table and insert it as most-recently-used,
    /// evicting past `max_size`.
    ///
    /// Upload failures are negatively cached. If `key` is already present
    /// (a concurrent load won), the new handle is released and the cached
    /// one returned.
    pub fn insert_loaded(&mut self, ctx: &C, key: LutKey, lut: &HaldLut) -> Result<C::Handle, LutError> {
        let handle = match ctx.create(&key, lut) {
            Ok(handle) => handle,
            Err(err) => {
                self.record_failure(&key.path, &err);
                return Err(err);
            }
        };

        self.failures.remove(&key.path);
        if let Some(existing) = self.entries.get(&key).cloned() {
            ctx.release(handle);
            self.touch(&key);
            return Ok(existing);
        }

        self.entries.insert(key.clone(), handle.clone());
        self.order.push_back(key);
        self.evict_overflow(ctx);
        Ok(handle)
    }

    /// Apply the outcome of a loader call made after a [`LutLookup::Miss`]:
    /// upload and insert on success, negatively cache on failure.
    pub fn complete_load(
        &mut self,
        ctx: &C,
        key: &LutKey,
        loaded: Result<HaldLut, LutError>,
    ) -> Result<C::Handle, LutError> {
        match loaded {
            Ok(lut) => self.insert_loaded(ctx, key.clone(), &lut),
            Err(err) => {
                self.record_failure(&key.path, &err);
                Err(err)
            }
        }
    }

    /// Remember a failed load for `path` when the error is cacheable.
    pub fn record_failure(&mut self, path: &str, err: &LutError) {
        warn!(path, error = %err, "LUT load failed");
        if err.is_negative_cacheable() {
            self.failures.insert(path.to_string(), self.clock.now());
        }
    }

    /// Release every handle and clear both caches.
    pub fn dispose(&mut self, ctx: &C) {
        for key in self.order.drain(..) {
            if let Some(handle) = self.entries.remove(&key) {
                ctx.release(handle);
            }
        }
        self.entries.clear();
        self.failures.clear();
    }

    fn touch(&mut self, key: &LutKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn evict_overflow(&mut self, ctx: &C) {
        while self.entries.len() > self.max_size {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(handle) = self.entries.remove(&oldest) {
                debug!(lut = %oldest, "evicting LUT texture");
                ctx.release(handle);
            }
        }
    }
}

impl<C: LutContext, L: LutLoader> LutCache<C, L> {
    /// Memoizing load: hit, short-circuited failure, or load + upload.
    ///
    /// Borrows the cache for the whole load. Shared owners instead call
    /// [`lookup`](Self::lookup), run the loader unlocked and finish with
    /// [`complete_load`](Self::complete_load).
    pub async fn get(&mut self, ctx: &C, key: &LutKey, abort: &AbortSignal) -> Result<C::Handle, LutError> {
        match self.lookup(key) {
            LutLookup::Hit(handle) => Ok(handle),
            LutLookup::Failed(err) => Err(err),
            LutLookup::Miss => {
                let loader = Arc::clone(&self.loader);
                let loaded = loader.load(key, abort).await;
                self.complete_load(ctx, key, loaded)
            }
        }
    }
}
