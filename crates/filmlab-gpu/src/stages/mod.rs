//! Compute stages: shader pipelines, bind group layouts and per-stage
//! uniform buffers.
//!
//! Every stage reads a filterable `texture_2d<f32>` through a linear
//! sampler and writes an `rgba16float` storage texture. Single-pass stages
//! share the standard layout:
//!
//! | binding | resource |
//! |---|---|
//! | 0 | input `texture_2d<f32>` |
//! | 1 | filtering sampler |
//! | 2 | output `texture_storage_2d<rgba16float, write>` |
//! | 3 | stage uniform |
//!
//! The curve stage swaps the uniform for its table texture at binding 4,
//! halation's composite adds the glow texture at binding 4, and the film
//! stage takes its 3D LUT in a separate group 1.

pub mod copy;
pub mod curve;
pub mod film;
pub mod halation;

use std::num::NonZeroU64;

use tracing::trace;

use crate::WORKGROUP_SIZE;
use crate::plan::StageKind;
use crate::targets::INTERMEDIATE_FORMAT;
use crate::uniforms::{
    DetailUniforms, FrameUniforms, GeometryUniforms, HslUniforms, MasterUniforms, content_key,
};

pub use copy::CopyStage;
pub use curve::CurveStage;
pub use film::FilmStage;
pub use halation::HalationStage;

/// Every distinct compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassKind {
    Geometry,
    Master,
    Hsl,
    Curve,
    Detail,
    Film,
    HalationThreshold,
    HalationBlur,
    HalationComposite,
    Passthrough,
    Encode,
}

/// One recorded dispatch: pipeline, bind groups (group 0 first) and grid.
pub(crate) struct CompiledPass {
    pub kind: PassKind,
    pub label: &'static str,
    pub bind_groups: Vec<wgpu::BindGroup>,
    pub workgroups: (u32, u32),
}

impl CompiledPass {
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, stages: &StageSet) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(self.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(stages.pipeline(self.kind));
        for (index, group) in self.bind_groups.iter().enumerate() {
            pass.set_bind_group(index as u32, group, &[]);
        }
        pass.dispatch_workgroups(self.workgroups.0, self.workgroups.1, 1);
    }
}

/// Workgroup grid covering `size` pixels.
pub(crate) fn workgroups((width, height): (u32, u32)) -> (u32, u32) {
    (width.div_ceil(WORKGROUP_SIZE), height.div_ceil(WORKGROUP_SIZE))
}

/// Bind group layouts shared across stages.
pub(crate) struct StageLayouts {
    pub standard: wgpu::BindGroupLayout,
    pub curve: wgpu::BindGroupLayout,
    pub composite: wgpu::BindGroupLayout,
    pub lut: wgpu::BindGroupLayout,
    pub copy: wgpu::BindGroupLayout,
    pub encode: wgpu::BindGroupLayout,
}

impl StageLayouts {
    fn new(device: &wgpu::Device) -> Self {
        let layout = |label: &str, entries: &[wgpu::BindGroupLayoutEntry]| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            })
        };
        Self {
            standard: layout(
                "filmlab_stage_layout",
                &[
                    texture_entry(0, wgpu::TextureViewDimension::D2),
                    sampler_entry(1),
                    storage_entry(2, INTERMEDIATE_FORMAT),
                    uniform_entry(3),
                ],
            ),
            curve: layout(
                "filmlab_curve_layout",
                &[
                    texture_entry(0, wgpu::TextureViewDimension::D2),
                    sampler_entry(1),
                    storage_entry(2, INTERMEDIATE_FORMAT),
                    texture_entry(4, wgpu::TextureViewDimension::D2),
                ],
            ),
            composite: layout(
                "filmlab_halation_composite_layout",
                &[
                    texture_entry(0, wgpu::TextureViewDimension::D2),
                    sampler_entry(1),
                    storage_entry(2, INTERMEDIATE_FORMAT),
                    uniform_entry(3),
                    texture_entry(4, wgpu::TextureViewDimension::D2),
                ],
            ),
            lut: layout(
                "filmlab_lut_layout",
                &[texture_entry(0, wgpu::TextureViewDimension::D3), sampler_entry(1)],
            ),
            copy: layout(
                "filmlab_copy_layout",
                &[
                    texture_entry(0, wgpu::TextureViewDimension::D2),
                    storage_entry(2, INTERMEDIATE_FORMAT),
                ],
            ),
            encode: layout(
                "filmlab_encode_layout",
                &[
                    texture_entry(0, wgpu::TextureViewDimension::D2),
                    storage_entry(2, wgpu::TextureFormat::Rgba8Unorm),
                ],
            ),
        }
    }
}

/// A compute pipeline with one uniform buffer and a dirty-check key.
pub(crate) struct ComputeStage {
    label: &'static str,
    pipeline: wgpu::ComputePipeline,
    uniform: wgpu::Buffer,
    uniform_key: Option<u64>,
}

impl ComputeStage {
    fn new(
        device: &wgpu::Device,
        label: &'static str,
        source: &'static str,
        entry_point: &str,
        layouts: &[&wgpu::BindGroupLayout],
        uniform_size: u64,
    ) -> Self {
        Self {
            label,
            pipeline: create_pipeline(device, label, source, entry_point, layouts),
            uniform: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: uniform_size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            uniform_key: None,
        }
    }

    /// Upload `bytes` unless they hash to the last uploaded value.
    pub fn write_uniform(&mut self, queue: &wgpu::Queue, bytes: &[u8]) -> bool {
        let key = content_key(&[bytes]);
        if self.uniform_key == Some(key) {
            trace!(stage = self.label, "uniforms unchanged");
            return false;
        }
        queue.write_buffer(&self.uniform, 0, bytes);
        self.uniform_key = Some(key);
        true
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub fn invalidate(&mut self) {
        self.uniform_key = None;
    }

    /// Standard-layout bind group reading `input` and writing `output`.
    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        input: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        output: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        standard_bind_group(device, self.label, layout, input, sampler, output, &self.uniform)
    }
}

/// The fixed stage set of one orchestrator.
pub struct StageSet {
    pub(crate) layouts: StageLayouts,
    pub(crate) geometry: ComputeStage,
    pub(crate) master: ComputeStage,
    pub(crate) hsl: ComputeStage,
    pub(crate) curve: CurveStage,
    pub(crate) detail: ComputeStage,
    pub(crate) film: FilmStage,
    pub(crate) halation: HalationStage,
    pub(crate) copy: CopyStage,
}

impl StageSet {
    /// Compile every shader and allocate the uniform buffers.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let layouts = StageLayouts::new(device);
        let standard = [&layouts.standard];
        let geometry = ComputeStage::new(
            device,
            "filmlab_geometry",
            include_str!("../../shaders/geometry.wgsl"),
            "geometry",
            &standard,
            size_of::<GeometryUniforms>() as u64,
        );
        let master = ComputeStage::new(
            device,
            "filmlab_master",
            include_str!("../../shaders/master.wgsl"),
            "master",
            &standard,
            size_of::<MasterUniforms>() as u64,
        );
        let hsl = ComputeStage::new(
            device,
            "filmlab_hsl",
            include_str!("../../shaders/hsl.wgsl"),
            "hsl",
            &standard,
            size_of::<HslUniforms>() as u64,
        );
        let detail = ComputeStage::new(
            device,
            "filmlab_detail",
            include_str!("../../shaders/detail.wgsl"),
            "detail",
            &standard,
            size_of::<DetailUniforms>() as u64,
        );
        let curve = CurveStage::new(device, &layouts);
        let film = FilmStage::new(device, queue, &layouts);
        let halation = HalationStage::new(device, &layouts);
        let copy = CopyStage::new(device, &layouts);

        Self {
            layouts,
            geometry,
            master,
            hsl,
            curve,
            detail,
            film,
            halation,
            copy,
        }
    }

    pub(crate) fn pipeline(&self, kind: PassKind) -> &wgpu::ComputePipeline {
        match kind {
            PassKind::Geometry => self.geometry.pipeline(),
            PassKind::Master => self.master.pipeline(),
            PassKind::Hsl => self.hsl.pipeline(),
            PassKind::Curve => self.curve.pipeline(),
            PassKind::Detail => self.detail.pipeline(),
            PassKind::Film => self.film.pipeline(),
            PassKind::HalationThreshold => self.halation.threshold_pipeline(),
            PassKind::HalationBlur => self.halation.blur_pipeline(),
            PassKind::HalationComposite => self.halation.composite_pipeline(),
            PassKind::Passthrough => self.copy.passthrough_pipeline(),
            PassKind::Encode => self.copy.encode_pipeline(),
        }
    }

    /// Upload this frame's uniforms, skipping unchanged ones. With
    /// `skip_inactive`, stages outside the mask are not touched at all.
    ///
    /// Returns the number of stages whose data was uploaded.
    pub fn upload(&mut self, queue: &wgpu::Queue, frame: &FrameUniforms, skip_inactive: bool) -> usize {
        let mut uploaded = 0;
        for kind in StageKind::ALL {
            if skip_inactive && !frame.mask.contains(kind) {
                continue;
            }
            let bytes = frame.bytes(kind);
            let wrote = match kind {
                StageKind::Geometry => self.geometry.write_uniform(queue, bytes),
                StageKind::Master => self.master.write_uniform(queue, bytes),
                StageKind::Hsl => self.hsl.write_uniform(queue, bytes),
                StageKind::Curve => self.curve.write_table(queue, bytes),
                StageKind::Detail => self.detail.write_uniform(queue, bytes),
                StageKind::Film => self.film.write_uniform(queue, bytes),
                StageKind::Halation => self.halation.write_uniforms(queue, &frame.halation),
            };
            uploaded += usize::from(wrote);
        }
        uploaded
    }

    /// Forget every dirty-check key so the next frame uploads everything.
    pub fn invalidate(&mut self) {
        self.geometry.invalidate();
        self.master.invalidate();
        self.hsl.invalidate();
        self.curve.invalidate();
        self.detail.invalidate();
        self.film.invalidate();
        self.halation.invalidate();
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

pub(crate) fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
    entry_point: &str,
    layouts: &[&wgpu::BindGroupLayout],
) -> wgpu::ComputePipeline {
    let shader = shader_module(device, label, source);
    compute_pipeline(device, label, &shader, entry_point, layouts)
}

pub(crate) fn shader_module(device: &wgpu::Device, label: &str, source: &'static str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

pub(crate) fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: &wgpu::ShaderModule,
    entry_point: &str,
    layouts: &[&wgpu::BindGroupLayout],
) -> wgpu::ComputePipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: layouts,
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        module: shader,
        entry_point: Some(entry_point),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

pub(crate) fn standard_bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    input: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    output: &wgpu::TextureView,
    uniform: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(input),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(output),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: uniform.as_entire_binding(),
            },
        ],
    })
}

pub(crate) fn texture_entry(binding: u32, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

pub(crate) fn storage_entry(binding: u32, format: wgpu::TextureFormat) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

pub(crate) fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(16),
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroups_cover_partial_tiles() {
        assert_eq!(workgroups((16, 16)), (2, 2));
        assert_eq!(workgroups((17, 1)), (3, 1));
    }
}
