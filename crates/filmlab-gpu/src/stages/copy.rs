//! Trivial passes: the passthrough copy appended when a chain would end
//! outside `Output`, and the final encode into the 8-bit readback target.

use super::{CompiledPass, PassKind, StageLayouts, compute_pipeline, shader_module, workgroups};

pub struct CopyStage {
    passthrough: wgpu::ComputePipeline,
    encode: wgpu::ComputePipeline,
}

impl CopyStage {
    pub(crate) fn new(device: &wgpu::Device, layouts: &StageLayouts) -> Self {
        let passthrough = shader_module(device, "filmlab_passthrough", include_str!("../../shaders/passthrough.wgsl"));
        let encode = shader_module(device, "filmlab_encode", include_str!("../../shaders/encode_rgba8.wgsl"));
        Self {
            passthrough: compute_pipeline(device, "filmlab_passthrough", &passthrough, "passthrough", &[&layouts.copy]),
            encode: compute_pipeline(device, "filmlab_encode", &encode, "encode", &[&layouts.encode]),
        }
    }

    pub(crate) fn passthrough_pipeline(&self) -> &wgpu::ComputePipeline {
        &self.passthrough
    }

    pub(crate) fn encode_pipeline(&self) -> &wgpu::ComputePipeline {
        &self.encode
    }

    /// Copy `input` into the `rgba16float` `output`.
    pub(crate) fn passthrough_pass(
        &self,
        device: &wgpu::Device,
        layouts: &StageLayouts,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        size: (u32, u32),
    ) -> CompiledPass {
        CompiledPass {
            kind: PassKind::Passthrough,
            label: "filmlab_passthrough",
            bind_groups: vec![copy_bind_group(device, "filmlab_passthrough", &layouts.copy, input, output)],
            workgroups: workgroups(size),
        }
    }

    /// Quantize `input` into the `rgba8unorm` readback target.
    pub(crate) fn encode_pass(
        &self,
        device: &wgpu::Device,
        layouts: &StageLayouts,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        size: (u32, u32),
    ) -> CompiledPass {
        CompiledPass {
            kind: PassKind::Encode,
            label: "filmlab_encode",
            bind_groups: vec![copy_bind_group(device, "filmlab_encode", &layouts.encode, input, output)],
            workgroups: workgroups(size),
        }
    }
}

fn copy_bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    input: &wgpu::TextureView,
    output: &wgpu::TextureView,
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
                binding: 2,
                resource: wgpu::BindingResource::TextureView(output),
            },
        ],
    })
}
