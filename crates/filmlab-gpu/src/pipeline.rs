//! Per-slot render orchestration.
//!
//! A [`PipelineOrchestrator`] owns the stage set and render targets of one
//! slot. Each frame it resolves uniforms, uploads the changed ones, decides
//! how much of the chain can be skipped by reusing the cached geometry or
//! pre-film result, rebuilds bind groups only when the plan key changes and
//! dispatches the passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use filmlab_core::{AdjustmentSet, FilmProfile, SourceImage};
use image::RgbaImage;
use tracing::{debug, warn};

use crate::context::{GpuContext, GpuLutTexture, linear_clamp_sampler};
use crate::error::GpuError;
use crate::plan::{PlanStart, StageKind, StageMask, StagePlan, StepOp, TargetId, plan_steps};
use crate::readback::read_texture_rgba8;
use crate::stages::halation::HalationTargets;
use crate::stages::{CompiledPass, PassKind, StageSet, workgroups};
use crate::targets::RenderTargets;
use crate::uniforms::{FrameUniforms, content_key};

/// Per-call switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Leave uniforms of inactive stages untouched. Bounds CPU cost while
    /// a slider is being dragged.
    pub skip_inactive_uniforms: bool,
}

/// One frame's inputs. The snapshot is read, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub source: &'a SourceImage,
    pub adjustments: &'a AdjustmentSet,
    pub film: &'a FilmProfile,
    pub options: RenderOptions,
}

impl<'a> RenderRequest<'a> {
    pub fn new(source: &'a SourceImage, adjustments: &'a AdjustmentSet, film: &'a FilmProfile) -> Self {
        Self {
            source,
            adjustments,
            film,
            options: RenderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }
}

/// What a render call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub mask: StageMask,
    pub start: PlanStart,
    /// Dispatches recorded, including halation sub-passes and copies.
    pub passes: usize,
    /// Stage parameter blocks written to the GPU this frame.
    pub uploads: usize,
    /// Bind groups were rebuilt for this frame.
    pub rebuilt: bool,
    /// Nothing was drawn because the context is lost.
    pub dropped: bool,
}

impl FrameInfo {
    /// A frame skipped without touching the GPU.
    pub fn dropped() -> Self {
        Self {
            width: 0,
            height: 0,
            mask: StageMask::EMPTY,
            start: PlanStart::Source,
            passes: 0,
            uploads: 0,
            rebuilt: false,
            dropped: true,
        }
    }
}

/// Everything compiled bind groups depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlanKey {
    mask: StageMask,
    start: PlanStart,
    generation: u64,
    lut_id: Option<u64>,
    halation_iterations: u32,
}

struct CompiledPlan {
    key: PlanKey,
    plan: StagePlan,
    passes: Vec<CompiledPass>,
}

/// Pick where the chain resumes given which cached intermediates are still
/// valid for this frame.
pub(crate) fn choose_start(mask: StageMask, geometry_valid: bool, prefilm_valid: bool) -> PlanStart {
    if prefilm_valid && mask.has_post_film() && !mask.pre_film().is_empty() {
        PlanStart::PreFilm
    } else if geometry_valid && mask.contains(StageKind::Geometry) {
        PlanStart::Geometry
    } else {
        PlanStart::Source
    }
}

/// Key of the cached geometry result.
fn geometry_key(source_id: u64, frame: &FrameUniforms) -> u64 {
    let (width, height) = frame.output_size;
    content_key(&[
        &source_id.to_le_bytes(),
        frame.bytes(StageKind::Geometry),
        &width.to_le_bytes(),
        &height.to_le_bytes(),
        &[u8::from(frame.mask.contains(StageKind::Geometry))],
    ])
}

/// Key of the cached pre-film result: geometry plus every active pre stage.
fn prefilm_key(geometry_key: u64, frame: &FrameUniforms) -> u64 {
    let pre = frame.mask.pre_film();
    let mut parts: Vec<&[u8]> = Vec::with_capacity(6);
    let geometry = geometry_key.to_le_bytes();
    let bits = [pre.bits()];
    parts.push(&geometry);
    parts.push(&bits);
    for kind in pre.iter() {
        parts.push(frame.bytes(kind));
    }
    content_key(&parts)
}

/// Render chain of one slot.
pub struct PipelineOrchestrator {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    lost: Arc<AtomicBool>,
    sampler: wgpu::Sampler,
    stages: StageSet,
    targets: Option<RenderTargets>,
    compiled: Option<CompiledPlan>,
    uploaded_source: Option<u64>,
    geometry_key: Option<u64>,
    prefilm_key: Option<u64>,
    next_generation: u64,
    has_frame: bool,
}

impl PipelineOrchestrator {
    pub fn new(context: &GpuContext) -> Self {
        let device = Arc::clone(context.device());
        let queue = Arc::clone(context.queue());
        let stages = StageSet::new(&device, &queue);
        let sampler = linear_clamp_sampler(&device, "filmlab_stage_sampler");
        Self {
            device,
            queue,
            lost: context.loss_flag(),
            sampler,
            stages,
            targets: None,
            compiled: None,
            uploaded_source: None,
            geometry_key: None,
            prefilm_key: None,
            next_generation: 1,
            has_frame: false,
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Size of the last rendered frame.
    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.targets.as_ref().map(RenderTargets::output_size)
    }

    /// Render one frame into the slot's output target.
    ///
    /// Against a lost context nothing is drawn and a dropped [`FrameInfo`]
    /// is returned.
    pub fn render(&mut self, request: &RenderRequest<'_>, lut: Option<&GpuLutTexture>) -> Result<FrameInfo, GpuError> {
        if self.is_lost() {
            warn!("frame dropped: GPU context lost");
            return Ok(FrameInfo::dropped());
        }

        let source = request.source;
        let source_size = (source.width(), source.height());
        if source_size.0 == 0 || source_size.1 == 0 {
            debug!("empty source, nothing to render");
            return Ok(FrameInfo::dropped());
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if source_size.0 > max || source_size.1 > max {
            return Err(GpuError::ImageTooLarge {
                width: source_size.0,
                height: source_size.1,
                max,
            });
        }

        let frame = FrameUniforms::resolve(request.adjustments, request.film, source_size, lut.map(|l| l.size));
        let output_size = frame.output_size;
        if output_size.0 > max || output_size.1 > max {
            return Err(GpuError::ImageTooLarge {
                width: output_size.0,
                height: output_size.1,
                max,
            });
        }

        self.ensure_targets(source_size, output_size);
        let Some(targets) = self.targets.as_ref() else {
            return Ok(FrameInfo::dropped());
        };
        if self.uploaded_source != Some(source.id()) {
            targets.upload_source(&self.queue, source.pixels());
            self.uploaded_source = Some(source.id());
        }

        let uploads = self
            .stages
            .upload(&self.queue, &frame, request.options.skip_inactive_uniforms);

        let geometry = geometry_key(source.id(), &frame);
        let prefilm = prefilm_key(geometry, &frame);
        let start = choose_start(
            frame.mask,
            self.geometry_key == Some(geometry),
            self.prefilm_key == Some(prefilm),
        );
        if start != PlanStart::Source {
            debug!(?start, "reusing cached intermediate");
        }

        let key = PlanKey {
            mask: frame.mask,
            start,
            generation: targets.generation(),
            lut_id: lut.map(GpuLutTexture::id),
            halation_iterations: frame.halation_iterations,
        };
        let rebuilt = self.compiled.as_ref().is_none_or(|compiled| compiled.key != key);
        if rebuilt {
            let plan = plan_steps(frame.mask, start);
            let passes = self.compile(targets, &plan, &frame, lut);
            debug!(
                mask = ?frame.mask,
                ?start,
                steps = plan.steps.len(),
                passes = passes.len(),
                "rebuilt stage plan"
            );
            self.compiled = Some(CompiledPlan { key, plan, passes });
        }
        let Some(compiled) = self.compiled.as_ref() else {
            return Ok(FrameInfo::dropped());
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("filmlab_frame"),
            });
        for pass in &compiled.passes {
            pass.encode(&mut encoder, &self.stages);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if compiled.plan.geometry_written {
            self.geometry_key = Some(geometry);
        }
        if compiled.plan.prefilm_written {
            self.prefilm_key = Some(prefilm);
        }
        self.has_frame = true;

        Ok(FrameInfo {
            width: output_size.0,
            height: output_size.1,
            mask: frame.mask,
            start,
            passes: compiled.passes.len(),
            uploads,
            rebuilt,
            dropped: false,
        })
    }

    /// Read the last rendered frame back as 8-bit RGBA.
    ///
    /// Returns an empty 0×0 image when the context is lost or nothing has
    /// been rendered yet.
    pub fn read_pixels(&self) -> Result<RgbaImage, GpuError> {
        if self.is_lost() || !self.has_frame {
            return Ok(RgbaImage::new(0, 0));
        }
        let Some(targets) = self.targets.as_ref() else {
            return Ok(RgbaImage::new(0, 0));
        };
        let size = targets.output_size();
        let encode = self.stages.copy.encode_pass(
            &self.device,
            &self.stages.layouts,
            targets.view(TargetId::Output),
            targets.readback_view(),
            size,
        );
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("filmlab_readback"),
            });
        encode.encode(&mut encoder, &self.stages);

        match read_texture_rgba8(&self.device, &self.queue, encoder, targets.readback_texture(), size) {
            Err(_) if self.is_lost() => Ok(RgbaImage::new(0, 0)),
            result => result,
        }
    }

    /// Release targets and compiled bind groups and forget every cache key.
    /// The next render recomputes from scratch.
    pub fn dispose(&mut self) {
        if let Some(targets) = self.targets.take() {
            targets.destroy();
        }
        self.compiled = None;
        self.reset_keys();
        self.stages.invalidate();
        self.has_frame = false;
    }

    fn reset_keys(&mut self) {
        self.uploaded_source = None;
        self.geometry_key = None;
        self.prefilm_key = None;
    }

    fn ensure_targets(&mut self, source_size: (u32, u32), output_size: (u32, u32)) {
        if self
            .targets
            .as_ref()
            .is_some_and(|targets| targets.matches(source_size, output_size))
        {
            return;
        }
        if let Some(old) = self.targets.take() {
            old.destroy();
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        debug!(?source_size, ?output_size, generation, "allocating render targets");
        self.targets = Some(RenderTargets::new(&self.device, source_size, output_size, generation));
        self.compiled = None;
        self.reset_keys();
    }

    fn compile(
        &self,
        targets: &RenderTargets,
        plan: &StagePlan,
        frame: &FrameUniforms,
        lut: Option<&GpuLutTexture>,
    ) -> Vec<CompiledPass> {
        let device = &self.device;
        let stages = &self.stages;
        let layouts = &stages.layouts;
        let sampler = &self.sampler;
        let mut passes = Vec::with_capacity(plan.steps.len() + 2 * frame.halation_iterations as usize);

        for step in &plan.steps {
            let input = targets.view(step.input);
            let output = targets.view(step.output);
            let size = targets.size(step.output);
            let single = |kind: PassKind, label: &'static str, bind_groups: Vec<wgpu::BindGroup>| CompiledPass {
                kind,
                label,
                bind_groups,
                workgroups: workgroups(size),
            };

            match step.op {
                StepOp::Stage(StageKind::Geometry) => passes.push(single(
                    PassKind::Geometry,
                    stages.geometry.label(),
                    vec![stages.geometry.bind_group(device, &layouts.standard, input, sampler, output)],
                )),
                StepOp::Stage(StageKind::Master) => passes.push(single(
                    PassKind::Master,
                    stages.master.label(),
                    vec![stages.master.bind_group(device, &layouts.standard, input, sampler, output)],
                )),
                StepOp::Stage(StageKind::Hsl) => passes.push(single(
                    PassKind::Hsl,
                    stages.hsl.label(),
                    vec![stages.hsl.bind_group(device, &layouts.standard, input, sampler, output)],
                )),
                StepOp::Stage(StageKind::Curve) => passes.push(single(
                    PassKind::Curve,
                    "filmlab_curve",
                    vec![stages.curve.bind_group(device, layouts, input, sampler, output)],
                )),
                StepOp::Stage(StageKind::Detail) => passes.push(single(
                    PassKind::Detail,
                    stages.detail.label(),
                    vec![stages.detail.bind_group(device, &layouts.standard, input, sampler, output)],
                )),
                StepOp::Stage(StageKind::Film) => passes.push(single(
                    PassKind::Film,
                    "filmlab_film",
                    stages.film.bind_groups(device, layouts, input, sampler, output, lut),
                )),
                StepOp::Stage(StageKind::Halation) => {
                    let halation_targets = HalationTargets {
                        input,
                        output,
                        half_a: targets.view(TargetId::HalfA),
                        half_b: targets.view(TargetId::HalfB),
                        full_size: size,
                        half_size: targets.size(TargetId::HalfA),
                    };
                    passes.extend(stages.halation.passes(
                        device,
                        layouts,
                        sampler,
                        &halation_targets,
                        frame.halation_iterations,
                    ));
                }
                StepOp::Passthrough => {
                    passes.push(stages.copy.passthrough_pass(device, layouts, input, output, size));
                }
            }
        }
        passes
    }
}

impl Drop for PipelineOrchestrator {
    fn drop(&mut self) {
        if let Some(targets) = self.targets.take() {
            targets.destroy();
        }
    }
}
