//! Batch export across the export slots.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use filmlab_core::{AdjustmentSet, FilmProfile, LutError, SourceImage};
use image::RgbaImage;
use tracing::{info, warn};

use crate::error::GpuError;
use crate::lut_cache::LutKey;
use crate::lut_loader::LutLoader;
use crate::pipeline::RenderRequest;
use crate::render_manager::{RenderManager, SlotId};

/// One work item.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub source: SourceImage,
    pub adjustments: AdjustmentSet,
    pub film: FilmProfile,
}

#[derive(Debug)]
pub struct ExportOutcome {
    /// Position of the job in the batch.
    pub index: usize,
    pub slot: SlotId,
    pub result: Result<RgbaImage, GpuError>,
    /// Set when the profile's LUT could not be loaded and the item was
    /// rendered without it.
    pub lut_error: Option<LutError>,
}

/// Render every job on up to `concurrency` export slots.
///
/// Outcomes come back in job order. A failed item is reported in its
/// outcome and the rest of the batch continues.
pub fn run_export_batch<L: LutLoader>(
    manager: &RenderManager<L>,
    jobs: &[ExportJob],
    concurrency: usize,
) -> Vec<ExportOutcome> {
    if jobs.is_empty() {
        return Vec::new();
    }
    let workers = concurrency.clamp(1, manager.export_slot_count()).min(jobs.len());
    info!(jobs = jobs.len(), workers, "export batch started");

    let next = AtomicUsize::new(0);
    let mut outcomes: Vec<ExportOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let next = &next;
                scope.spawn(move || export_worker(manager, SlotId::Export(worker), jobs, next))
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(outcomes) => outcomes,
                Err(_) => {
                    warn!("export worker panicked");
                    Vec::new()
                }
            })
            .collect()
    });
    outcomes.sort_by_key(|outcome| outcome.index);

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(jobs = jobs.len(), failed, "export batch finished");
    outcomes
}

fn export_worker<L: LutLoader>(
    manager: &RenderManager<L>,
    slot: SlotId,
    jobs: &[ExportJob],
    next: &AtomicUsize,
) -> Vec<ExportOutcome> {
    let mut outcomes = Vec::new();
    loop {
        let index = next.fetch_add(1, Ordering::Relaxed);
        let Some(job) = jobs.get(index) else {
            break;
        };

        let mut lut_error = None;
        let mut result = Ok(());
        if let Some((path, level)) = job.film.lut_request() {
            match pollster::block_on(manager.ensure_lut(slot, &LutKey::new(path, level))) {
                Ok(()) => {}
                Err(GpuError::Lut(err)) => {
                    warn!(%slot, index, error = %err, "rendering export item without its LUT");
                    lut_error = Some(err);
                }
                Err(err) => result = Err(err),
            }
        }

        let result = result.and_then(|()| {
            let request = RenderRequest::new(&job.source, &job.adjustments, &job.film);
            manager.render_image(slot, &request)
        });
        if let Err(err) = &result {
            warn!(%slot, index, error = %err, "export item failed");
        }
        outcomes.push(ExportOutcome {
            index,
            slot,
            result,
            lut_error,
        });
    }
    outcomes
}
