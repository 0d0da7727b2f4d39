//! GPU integration tests. Requires a wgpu adapter; each test logs and
//! returns early when none is available.
//!
//! Run with: `cargo test -p filmlab-gpu`

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};

use filmlab_core::{AdjustmentSet, FilmProfile, HaldLut, LutError, SourceImage};
use filmlab_gpu::{
    AbortSignal, ExportJob, GpuContext, GpuError, GpuLutTexture, LutKey, LutLoader, PipelineOrchestrator,
    PlanStart, RenderConfig, RenderManager, RenderOptions, RenderRequest, SlotId, StageKind, run_export_batch,
};
use image::{Rgba, RgbaImage};
use tokio::sync::Notify;

fn gpu_test_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn test_context() -> Option<GpuContext> {
    match GpuContext::new(&RenderConfig::default(), "filmlab_test") {
        Ok(context) => Some(context),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

/// Horizontal red ramp, vertical green ramp, constant blue.
fn gradient(width: u32, height: u32) -> SourceImage {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 255 / (width - 1)) as u8,
            (y * 255 / (height - 1)) as u8,
            128,
            255,
        ])
    });
    SourceImage::new(image)
}

fn assert_pixels_close(actual: &RgbaImage, expected: &RgbaImage, tolerance: u8) {
    assert_eq!(actual.dimensions(), expected.dimensions());
    for (x, y, a) in actual.enumerate_pixels() {
        let e = expected.get_pixel(x, y);
        for c in 0..4 {
            assert!(
                a[c].abs_diff(e[c]) <= tolerance,
                "pixel ({x}, {y}) channel {c}: got {}, expected {}",
                a[c],
                e[c]
            );
        }
    }
}

fn mean_luma(image: &RgbaImage) -> f32 {
    let sum: f32 = image
        .pixels()
        .map(|p| 0.2126 * f32::from(p[0]) + 0.7152 * f32::from(p[1]) + 0.0722 * f32::from(p[2]))
        .sum();
    sum / (image.width() * image.height()) as f32
}

#[test]
fn test_identity_render_returns_source() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = test_context() else { return };
    let mut orchestrator = PipelineOrchestrator::new(&context);

    let source = gradient(16, 8);
    let adjustments = AdjustmentSet::default();
    let film = FilmProfile::default();
    let info = orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), None)
        .unwrap();

    assert!(info.mask.is_empty());
    assert_eq!((info.width, info.height), (16, 8));
    // Only the passthrough copy into Output.
    assert_eq!(info.passes, 1);
    let pixels = orchestrator.read_pixels().unwrap();
    assert_pixels_close(&pixels, source.pixels(), 1);
}

#[test]
fn test_unchanged_frame_reuses_bind_groups() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = test_context() else { return };
    let mut orchestrator = PipelineOrchestrator::new(&context);

    let source = gradient(16, 8);
    let mut adjustments = AdjustmentSet::default();
    adjustments.contrast = 20.0;
    let film = FilmProfile::default();
    let request = RenderRequest::new(&source, &adjustments, &film);

    assert!(orchestrator.render(&request, None).unwrap().rebuilt);
    assert!(!orchestrator.render(&request, None).unwrap().rebuilt);
}

#[test]
fn test_skip_flag_limits_uploads_to_active_stages() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = test_context() else { return };
    let mut orchestrator = PipelineOrchestrator::new(&context);

    let source = gradient(16, 8);
    let mut adjustments = AdjustmentSet::default();
    adjustments.exposure = 10.0;
    let film = FilmProfile::default();
    let skip = RenderOptions {
        skip_inactive_uniforms: true,
    };

    let dragging = orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film).with_options(skip), None)
        .unwrap();
    assert_eq!(dragging.mask.iter().collect::<Vec<_>>(), vec![StageKind::Master]);
    assert_eq!(dragging.uploads, 1);

    // Without the flag the skipped stages catch up.
    let settled = orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), None)
        .unwrap();
    assert_eq!(settled.uploads, StageKind::ALL.len() - 1);

    let unchanged = orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), None)
        .unwrap();
    assert_eq!(unchanged.uploads, 0);
}

#[test]
fn test_film_only_edit_resumes_from_prefilm_cache() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = test_context() else { return };
    let mut orchestrator = PipelineOrchestrator::new(&context);

    let source = gradient(32, 16);
    let mut adjustments = AdjustmentSet::default();
    adjustments.exposure = 10.0;
    let mut film = FilmProfile::default();
    film.vignette.enabled = true;
    film.vignette.amount = -0.5;

    let first = orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), None)
        .unwrap();
    assert_eq!(first.start, PlanStart::Source);
    assert!(first.mask.contains(StageKind::Master));
    assert!(first.mask.contains(StageKind::Film));

    film.vignette.amount = -0.8;
    let second = orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), None)
        .unwrap();
    assert_eq!(second.start, PlanStart::PreFilm);

    adjustments.exposure = 20.0;
    let third = orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), None)
        .unwrap();
    assert_eq!(third.start, PlanStart::Source);
}

#[test]
fn test_positive_exposure_brightens() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = test_context() else { return };
    let mut orchestrator = PipelineOrchestrator::new(&context);

    let source = gradient(16, 16);
    let mut adjustments = AdjustmentSet::default();
    adjustments.exposure = 20.0;
    let film = FilmProfile::default();
    orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), None)
        .unwrap();
    let brighter = orchestrator.read_pixels().unwrap();
    assert!(mean_luma(&brighter) > mean_luma(source.pixels()) + 5.0);
}

#[test]
fn test_quarter_turn_swaps_output_size() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = test_context() else { return };
    let mut orchestrator = PipelineOrchestrator::new(&context);

    let source = gradient(40, 20);
    let mut adjustments = AdjustmentSet::default();
    adjustments.crop.quarter_turns = 1;
    let film = FilmProfile::default();
    let info = orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), None)
        .unwrap();
    assert_eq!((info.width, info.height), (20, 40));
    assert!(info.mask.contains(StageKind::Geometry));

    let pixels = orchestrator.read_pixels().unwrap();
    let top_left = pixels.get_pixel(0, 0);
    let bottom_left = source.pixels().get_pixel(0, 19);
    for c in 0..3 {
        assert!(top_left[c].abs_diff(bottom_left[c]) <= 1, "{top_left:?} vs {bottom_left:?}");
    }
}

#[test]
fn test_identity_lut_preserves_colors() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = test_context() else { return };
    let mut orchestrator = PipelineOrchestrator::new(&context);

    let lut = HaldLut::identity(4).unwrap();
    let texture = GpuLutTexture::upload(context.device(), context.queue(), lut.size(), lut.data(), "identity");

    let source = gradient(16, 8);
    let adjustments = AdjustmentSet::default();
    let mut film = FilmProfile::default();
    film.lut.enabled = true;
    film.lut.path = Some("identity.png".to_string());
    film.lut.level = 4;
    film.lut.intensity = 1.0;

    let info = orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), Some(&texture))
        .unwrap();
    assert!(info.mask.contains(StageKind::Film));
    let pixels = orchestrator.read_pixels().unwrap();
    assert_pixels_close(&pixels, source.pixels(), 3);
}

#[test]
fn test_halation_runs_threshold_blurs_and_composite() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = test_context() else { return };
    let mut orchestrator = PipelineOrchestrator::new(&context);

    let source = gradient(32, 32);
    let adjustments = AdjustmentSet::default();
    let mut film = FilmProfile::default();
    film.halation.enabled = true;
    film.halation.bloom_amount = 0.6;
    film.halation.radius = 8.0;

    let info = orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), None)
        .unwrap();
    // Threshold, two blur pairs, composite.
    assert_eq!(info.passes, 6);
    let pixels = orchestrator.read_pixels().unwrap();
    assert!(mean_luma(&pixels) >= mean_luma(source.pixels()));
}

#[test]
fn test_bloom_adds_glow_to_source() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = test_context() else { return };
    let mut orchestrator = PipelineOrchestrator::new(&context);

    // A flat field blurs to itself, so the glow equals the source.
    let source = SourceImage::new(RgbaImage::from_pixel(16, 16, Rgba([102, 102, 102, 255])));
    let adjustments = AdjustmentSet::default();
    let mut film = FilmProfile::default();
    film.halation.enabled = true;
    film.halation.halation_amount = 0.0;
    film.halation.bloom_amount = 0.25;
    film.halation.threshold = 0.0;
    film.halation.radius = 8.0;

    orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), None)
        .unwrap();
    let pixels = orchestrator.read_pixels().unwrap();
    // 0.4 + 0.25 * 0.4 = 0.5
    let expected = RgbaImage::from_pixel(16, 16, Rgba([128, 128, 128, 255]));
    assert_pixels_close(&pixels, &expected, 3);
}

#[test]
fn test_dispose_forces_full_rebuild() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = test_context() else { return };
    let mut orchestrator = PipelineOrchestrator::new(&context);

    let source = gradient(16, 8);
    let adjustments = AdjustmentSet::default();
    let film = FilmProfile::default();
    let request = RenderRequest::new(&source, &adjustments, &film);
    orchestrator.render(&request, None).unwrap();
    orchestrator.dispose();
    assert_eq!(orchestrator.read_pixels().unwrap().dimensions(), (0, 0));
    assert!(orchestrator.render(&request, None).unwrap().rebuilt);
}

#[test]
fn test_lost_context_drops_frames() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = test_context() else { return };
    let mut orchestrator = PipelineOrchestrator::new(&context);
    context.mark_lost();

    let source = gradient(16, 8);
    let adjustments = AdjustmentSet::default();
    let film = FilmProfile::default();
    let info = orchestrator
        .render(&RenderRequest::new(&source, &adjustments, &film), None)
        .unwrap();
    assert!(info.dropped);
    assert_eq!(orchestrator.read_pixels().unwrap().dimensions(), (0, 0));
}

#[test]
fn test_manager_recreates_slot_after_loss() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    if test_context().is_none() {
        return;
    }
    let manager = RenderManager::with_file_loader(RenderConfig::default());
    let source = gradient(16, 8);
    let adjustments = AdjustmentSet::default();
    let film = FilmProfile::default();
    let request = RenderRequest::new(&source, &adjustments, &film);

    let image = manager.render_image(SlotId::Preview, &request).unwrap();
    assert_eq!(image.dimensions(), (16, 8));

    manager.notify_context_lost(SlotId::Preview).unwrap();
    let dropped = manager.render(SlotId::Preview, &request).unwrap();
    assert!(dropped.dropped);
    assert!(!manager.is_live(SlotId::Preview));

    let recovered = manager.render(SlotId::Preview, &request).unwrap();
    assert!(!recovered.dropped);
    assert!(manager.is_live(SlotId::Preview));
    manager.dispose_all();
}

#[test]
fn test_missing_lut_is_negatively_cached() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    if test_context().is_none() {
        return;
    }
    let manager = RenderManager::with_file_loader(RenderConfig::default());
    let key = LutKey::new("/nonexistent/filmlab/missing.png", 8);

    let first = pollster::block_on(manager.ensure_lut(SlotId::Preview, &key));
    assert!(matches!(first, Err(GpuError::Lut(LutError::Fetch { .. }))));
    let second = pollster::block_on(manager.ensure_lut(SlotId::Preview, &key));
    assert!(matches!(
        second,
        Err(GpuError::Lut(LutError::RecentlyFailed { .. }))
    ));
    manager.dispose_all();
}

/// Identity LUTs; loads of `slow.png` wait until `release` is notified.
#[derive(Default)]
struct GatedLoader {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl LutLoader for GatedLoader {
    fn load(&self, key: &LutKey, _abort: &AbortSignal) -> impl Future<Output = Result<HaldLut, LutError>> + Send {
        let gated = key.path == "slow.png";
        let level = key.level;
        let started = Arc::clone(&self.started);
        let release = Arc::clone(&self.release);
        async move {
            if gated {
                started.notify_one();
                release.notified().await;
            }
            HaldLut::identity(level)
        }
    }
}

#[tokio::test]
async fn test_newer_lut_request_discards_older_result() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    if test_context().is_none() {
        return;
    }
    let loader = Arc::new(GatedLoader::default());
    let manager = RenderManager::new(RenderConfig::default(), Arc::clone(&loader));
    let slow = LutKey::new("slow.png", 2);
    let fast = LutKey::new("fast.png", 2);

    let older = manager.ensure_lut(SlotId::Preview, &slow);
    let newer = async {
        loader.started.notified().await;
        let result = manager.ensure_lut(SlotId::Preview, &fast).await;
        loader.release.notify_one();
        result
    };
    let (older, newer) = tokio::join!(older, newer);

    assert!(newer.is_ok(), "{newer:?}");
    assert!(
        matches!(older, Err(GpuError::Lut(LutError::Superseded { ref path })) if path == "slow.png"),
        "{older:?}"
    );
    assert_eq!(manager.cached_luts(SlotId::Preview).unwrap(), vec![fast]);
    manager.dispose_all();
}

#[test]
fn test_export_batch_keeps_job_order_and_survives_lut_failure() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    if test_context().is_none() {
        return;
    }
    let manager = RenderManager::with_file_loader(RenderConfig {
        export_workers: 2,
        ..RenderConfig::default()
    });

    let mut broken_film = FilmProfile::default();
    broken_film.lut.enabled = true;
    broken_film.lut.path = Some("/nonexistent/filmlab/look.png".to_string());

    let jobs = vec![
        ExportJob {
            source: gradient(16, 8),
            adjustments: AdjustmentSet::default(),
            film: FilmProfile::default(),
        },
        ExportJob {
            source: gradient(8, 8),
            adjustments: AdjustmentSet::default(),
            film: broken_film,
        },
        ExportJob {
            source: gradient(12, 6),
            adjustments: AdjustmentSet::default(),
            film: FilmProfile::default(),
        },
    ];

    let outcomes = run_export_batch(&manager, &jobs, 2);
    assert_eq!(outcomes.len(), 3);
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.index, i);
        let image = outcome.result.as_ref().unwrap();
        assert_eq!(image.dimensions(), jobs[i].source.pixels().dimensions());
    }
    assert!(outcomes[1].lut_error.is_some());
    assert!(outcomes[0].lut_error.is_none());
    manager.dispose_all();
}
