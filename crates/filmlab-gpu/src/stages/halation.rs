//! Halation and bloom post-process.
//!
//! Runs at half resolution: threshold-extract the highlights into `HalfA`,
//! blur them with a separable kernel (`HalfA → HalfB → HalfA`, repeated 2–3
//! times by radius), then composite the glow additively over the
//! full-resolution input.

use tracing::trace;

use super::{
    CompiledPass, PassKind, StageLayouts, compute_pipeline, shader_module, standard_bind_group, workgroups,
};
use crate::uniforms::{HalationUniforms, content_key};

/// Views and sizes one halation step reads and writes.
pub(crate) struct HalationTargets<'a> {
    pub input: &'a wgpu::TextureView,
    pub output: &'a wgpu::TextureView,
    pub half_a: &'a wgpu::TextureView,
    pub half_b: &'a wgpu::TextureView,
    pub full_size: (u32, u32),
    pub half_size: (u32, u32),
}

pub struct HalationStage {
    threshold: wgpu::ComputePipeline,
    blur: wgpu::ComputePipeline,
    composite: wgpu::ComputePipeline,
    /// Main, horizontal-blur and vertical-blur parameter blocks.
    uniforms: [wgpu::Buffer; 3],
    uniform_key: Option<u64>,
}

impl HalationStage {
    pub(crate) fn new(device: &wgpu::Device, layouts: &StageLayouts) -> Self {
        let shader = shader_module(device, "filmlab_halation", include_str!("../../shaders/halation.wgsl"));
        let uniforms = ["filmlab_halation_main", "filmlab_halation_blur_h", "filmlab_halation_blur_v"].map(|label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size_of::<HalationUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        Self {
            threshold: compute_pipeline(
                device,
                "filmlab_halation_threshold",
                &shader,
                "threshold",
                &[&layouts.standard],
            ),
            blur: compute_pipeline(device, "filmlab_halation_blur", &shader, "blur", &[&layouts.standard]),
            composite: compute_pipeline(
                device,
                "filmlab_halation_composite",
                &shader,
                "composite",
                &[&layouts.composite],
            ),
            uniforms,
            uniform_key: None,
        }
    }

    pub(crate) fn threshold_pipeline(&self) -> &wgpu::ComputePipeline {
        &self.threshold
    }

    pub(crate) fn blur_pipeline(&self) -> &wgpu::ComputePipeline {
        &self.blur
    }

    pub(crate) fn composite_pipeline(&self) -> &wgpu::ComputePipeline {
        &self.composite
    }

    pub(crate) fn write_uniforms(&mut self, queue: &wgpu::Queue, blocks: &[HalationUniforms; 3]) -> bool {
        let key = content_key(&[bytemuck::cast_slice(blocks)]);
        if self.uniform_key == Some(key) {
            trace!(stage = "filmlab_halation", "uniforms unchanged");
            return false;
        }
        for (buffer, block) in self.uniforms.iter().zip(blocks) {
            queue.write_buffer(buffer, 0, bytemuck::bytes_of(block));
        }
        self.uniform_key = Some(key);
        true
    }

    pub(crate) fn invalidate(&mut self) {
        self.uniform_key = None;
    }

    /// Threshold, `iterations` blur pairs, composite.
    pub(crate) fn passes(
        &self,
        device: &wgpu::Device,
        layouts: &StageLayouts,
        sampler: &wgpu::Sampler,
        targets: &HalationTargets<'_>,
        iterations: u32,
    ) -> Vec<CompiledPass> {
        let [main, horizontal, vertical] = &self.uniforms;
        let half_groups = workgroups(targets.half_size);
        let mut passes = Vec::with_capacity(2 + 2 * iterations as usize);

        passes.push(CompiledPass {
            kind: PassKind::HalationThreshold,
            label: "filmlab_halation_threshold",
            bind_groups: vec![standard_bind_group(
                device,
                "filmlab_halation_threshold",
                &layouts.standard,
                targets.input,
                sampler,
                targets.half_a,
                main,
            )],
            workgroups: half_groups,
        });

        for _ in 0..iterations {
            for (label, input, output, uniform) in [
                ("filmlab_halation_blur_h", targets.half_a, targets.half_b, horizontal),
                ("filmlab_halation_blur_v", targets.half_b, targets.half_a, vertical),
            ] {
                passes.push(CompiledPass {
                    kind: PassKind::HalationBlur,
                    label,
                    bind_groups: vec![standard_bind_group(
                        device,
                        label,
                        &layouts.standard,
                        input,
                        sampler,
                        output,
                        uniform,
                    )],
                    workgroups: half_groups,
                });
            }
        }

        let composite = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("filmlab_halation_composite"),
            layout: &layouts.composite,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(targets.input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(targets.output),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: main.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(targets.half_a),
                },
            ],
        });
        passes.push(CompiledPass {
            kind: PassKind::HalationComposite,
            label: "filmlab_halation_composite",
            bind_groups: vec![composite],
            workgroups: workgroups(targets.full_size),
        });

        passes
    }
}
