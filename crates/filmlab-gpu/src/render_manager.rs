//! Render slots: one interactive preview plus a pool of export workers.
//!
//! Each slot owns its own [`GpuContext`], [`PipelineOrchestrator`] and
//! [`LutCache`]; nothing GPU-side is shared between slots. A slot is
//! created on first use and torn down when its context is lost, so the next
//! call transparently rebuilds it.

use std::fmt;
use std::sync::Arc;

use filmlab_core::LutError;
use image::RgbaImage;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::context::GpuContext;
use crate::error::GpuError;
use crate::lut_cache::{LutCache, LutKey, LutLookup, SystemClock};
use crate::lut_loader::{FileLutLoader, LutLoader, LutRequestTracker};
use crate::pipeline::{FrameInfo, PipelineOrchestrator, RenderRequest};

/// Slot category, for disposal by mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Preview,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    Preview,
    /// Export worker `n`, `0..export_workers`.
    Export(usize),
}

impl SlotId {
    pub fn kind(self) -> SlotKind {
        match self {
            Self::Preview => SlotKind::Preview,
            Self::Export(_) => SlotKind::Export,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preview => f.write_str("preview"),
            Self::Export(n) => write!(f, "export-{n}"),
        }
    }
}

struct SlotState<L> {
    context: GpuContext,
    orchestrator: PipelineOrchestrator,
    luts: LutCache<GpuContext, L>,
}

impl<L> SlotState<L> {
    fn teardown(mut self) {
        self.luts.dispose(&self.context);
        self.orchestrator.dispose();
    }
}

struct SlotCell<L> {
    state: Mutex<Option<SlotState<L>>>,
    /// One request stream per slot, not per key. Outlives slot recreation so
    /// loads started before a loss stay stale.
    requests: LutRequestTracker,
}

impl<L> SlotCell<L> {
    fn new() -> Self {
        Self {
            state: Mutex::new(None),
            requests: LutRequestTracker::new(),
        }
    }
}

/// Owns every render slot.
pub struct RenderManager<L = FileLutLoader> {
    config: RenderConfig,
    loader: Arc<L>,
    preview: SlotCell<L>,
    exports: Vec<SlotCell<L>>,
}

impl RenderManager<FileLutLoader> {
    /// Manager loading LUTs from the filesystem.
    pub fn with_file_loader(config: RenderConfig) -> Self {
        Self::new(config, Arc::new(FileLutLoader::new()))
    }
}

impl<L: LutLoader> RenderManager<L> {
    pub fn new(config: RenderConfig, loader: Arc<L>) -> Self {
        let exports = (0..config.export_workers.max(1)).map(|_| SlotCell::new()).collect();
        Self {
            config,
            loader,
            preview: SlotCell::new(),
            exports,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn export_slot_count(&self) -> usize {
        self.exports.len()
    }

    /// Every slot of `kind`.
    pub fn slots(&self, kind: SlotKind) -> Vec<SlotId> {
        match kind {
            SlotKind::Preview => vec![SlotId::Preview],
            SlotKind::Export => (0..self.exports.len()).map(SlotId::Export).collect(),
        }
    }

    /// Whether `slot` currently holds live GPU resources.
    pub fn is_live(&self, slot: SlotId) -> bool {
        self.cell(slot)
            .is_ok_and(|cell| cell.state.lock().as_ref().is_some_and(|s| !s.context.is_lost()))
    }

    /// Render a frame in `slot`, creating the slot if needed.
    ///
    /// A LUT the film profile names is used if it is already cached; call
    /// [`ensure_lut`](Self::ensure_lut) first to wait for it. Against a lost
    /// context the slot is torn down and a dropped frame is returned.
    pub fn render(&self, slot: SlotId, request: &RenderRequest<'_>) -> Result<FrameInfo, GpuError> {
        let cell = self.cell(slot)?;
        let mut guard = cell.state.lock();
        let Some(state) = self.live_state(slot, cell, &mut guard, true)? else {
            return Ok(FrameInfo::dropped());
        };
        render_in(state, request)
    }

    /// Render and read back in one step. A dropped frame is an error here.
    pub fn render_image(&self, slot: SlotId, request: &RenderRequest<'_>) -> Result<RgbaImage, GpuError> {
        let cell = self.cell(slot)?;
        let mut guard = cell.state.lock();
        let Some(state) = self.live_state(slot, cell, &mut guard, true)? else {
            return Err(GpuError::ContextLost);
        };
        let info = render_in(state, request)?;
        if info.dropped {
            return Err(GpuError::ContextLost);
        }
        state.orchestrator.read_pixels()
    }

    /// Read back the slot's last frame; empty when there is none or the
    /// context is lost.
    pub fn read_pixels(&self, slot: SlotId) -> Result<RgbaImage, GpuError> {
        let cell = self.cell(slot)?;
        let mut guard = cell.state.lock();
        match self.live_state(slot, cell, &mut guard, false)? {
            Some(state) => state.orchestrator.read_pixels(),
            None => Ok(RgbaImage::new(0, 0)),
        }
    }

    /// Make sure `key` is resident in the slot's LUT cache.
    ///
    /// Starting a load supersedes any load still in flight for the same
    /// slot, whatever key that load is for: a preview request for LUT B
    /// cancels a pending load of LUT A. The older one resolves to
    /// [`LutError::Superseded`] and its result is discarded. Cache hits and
    /// suppressed failures return without starting a load. The slot lock is
    /// not held while loading.
    pub async fn ensure_lut(&self, slot: SlotId, key: &LutKey) -> Result<(), GpuError> {
        let cell = self.cell(slot)?;
        let loader = {
            let mut guard = cell.state.lock();
            let Some(state) = self.live_state(slot, cell, &mut guard, true)? else {
                return Err(GpuError::ContextLost);
            };
            match state.luts.lookup(key) {
                LutLookup::Hit(_) => return Ok(()),
                LutLookup::Failed(err) => return Err(err.into()),
                LutLookup::Miss => Arc::clone(state.luts.loader()),
            }
        };

        let (generation, abort) = cell.requests.begin();
        let loaded = loader.load(key, &abort).await;

        let mut guard = cell.state.lock();
        let superseded = || {
            debug!(%slot, lut = %key, "discarding superseded LUT load");
            GpuError::from(LutError::Superseded {
                path: key.path.clone(),
            })
        };
        if !cell.requests.is_current(generation) {
            return Err(superseded());
        }
        let Some(state) = guard.as_mut() else {
            return Err(superseded());
        };
        let SlotState { context, luts, .. } = state;
        luts.complete_load(context, key, loaded)?;
        Ok(())
    }

    /// Keys resident in the slot's LUT cache, least-recently-used first.
    pub fn cached_luts(&self, slot: SlotId) -> Result<Vec<LutKey>, GpuError> {
        let cell = self.cell(slot)?;
        let guard = cell.state.lock();
        Ok(guard
            .as_ref()
            .map(|state| state.luts.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Report an externally detected context loss. The slot is rebuilt on
    /// its next use.
    pub fn notify_context_lost(&self, slot: SlotId) -> Result<(), GpuError> {
        let cell = self.cell(slot)?;
        if let Some(state) = cell.state.lock().as_ref() {
            warn!(%slot, "context loss reported");
            state.context.mark_lost();
        }
        cell.requests.invalidate();
        Ok(())
    }

    /// Release every GPU resource of `slot`.
    pub fn dispose_slot(&self, slot: SlotId) -> Result<(), GpuError> {
        let cell = self.cell(slot)?;
        cell.requests.invalidate();
        if let Some(state) = cell.state.lock().take() {
            state.teardown();
            info!(%slot, "disposed render slot");
        }
        Ok(())
    }

    pub fn dispose_kind(&self, kind: SlotKind) {
        for slot in self.slots(kind) {
            // Every listed slot exists.
            let _ = self.dispose_slot(slot);
        }
    }

    pub fn dispose_all(&self) {
        self.dispose_kind(SlotKind::Preview);
        self.dispose_kind(SlotKind::Export);
    }

    fn cell(&self, slot: SlotId) -> Result<&SlotCell<L>, GpuError> {
        match slot {
            SlotId::Preview => Ok(&self.preview),
            SlotId::Export(n) => self.exports.get(n).ok_or(GpuError::UnknownSlot(slot)),
        }
    }

    /// The slot's state, after tearing down a lost context and, if
    /// `create`, building a missing one. `None` means nothing usable.
    fn live_state<'g>(
        &self,
        slot: SlotId,
        cell: &SlotCell<L>,
        guard: &'g mut Option<SlotState<L>>,
        create: bool,
    ) -> Result<Option<&'g mut SlotState<L>>, GpuError> {
        if guard.as_ref().is_some_and(|state| state.context.is_lost()) {
            if let Some(state) = guard.take() {
                warn!(%slot, "GPU context lost, tearing down slot");
                state.teardown();
            }
            cell.requests.invalidate();
            return Ok(None);
        }
        if guard.is_none() {
            if !create {
                return Ok(None);
            }
            *guard = Some(self.create_slot(slot)?);
        }
        Ok(guard.as_mut())
    }

    fn create_slot(&self, slot: SlotId) -> Result<SlotState<L>, GpuError> {
        let context = GpuContext::new(&self.config, &format!("filmlab_{slot}"))?;
        let orchestrator = PipelineOrchestrator::new(&context);
        let cache_size = match slot.kind() {
            SlotKind::Preview => self.config.preview_lut_cache_size,
            SlotKind::Export => self.config.export_lut_cache_size,
        };
        let luts = LutCache::with_clock(
            Arc::clone(&self.loader),
            cache_size,
            self.config.lut_failure_ttl,
            Arc::new(SystemClock),
        );
        info!(%slot, adapter = context.adapter_name(), "created render slot");
        Ok(SlotState {
            context,
            orchestrator,
            luts,
        })
    }
}

/// Render with whatever LUT the cache already holds.
fn render_in<L>(state: &mut SlotState<L>, request: &RenderRequest<'_>) -> Result<FrameInfo, GpuError> {
    let lut = request.film.lut_request().and_then(|(path, level)| {
        match state.luts.lookup(&LutKey::new(path, level)) {
            LutLookup::Hit(handle) => Some(handle),
            LutLookup::Failed(_) | LutLookup::Miss => None,
        }
    });
    state.orchestrator.render(request, lut.as_deref())
}
