//! Film-simulation stage.
//!
//! The 3D LUT lives in its own bind group (group 1) that no other stage
//! declares, so a 3D view never shares a binding slot with the 2D inputs of
//! the surrounding stages. Without a loaded LUT a 2×2×2 identity placeholder
//! is bound and the LUT intensity uniform is zero.

use super::{ComputeStage, StageLayouts};
use crate::context::{GpuLutTexture, linear_clamp_sampler};
use crate::uniforms::FilmUniforms;

pub struct FilmStage {
    stage: ComputeStage,
    placeholder: GpuLutTexture,
    lut_sampler: wgpu::Sampler,
}

impl FilmStage {
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue, layouts: &StageLayouts) -> Self {
        Self {
            stage: ComputeStage::new(
                device,
                "filmlab_film",
                include_str!("../../shaders/film.wgsl"),
                "film",
                &[&layouts.standard, &layouts.lut],
                size_of::<FilmUniforms>() as u64,
            ),
            placeholder: GpuLutTexture::placeholder(device, queue),
            lut_sampler: linear_clamp_sampler(device, "filmlab_lut_sampler"),
        }
    }

    pub(crate) fn pipeline(&self) -> &wgpu::ComputePipeline {
        self.stage.pipeline()
    }

    pub(crate) fn write_uniform(&mut self, queue: &wgpu::Queue, bytes: &[u8]) -> bool {
        self.stage.write_uniform(queue, bytes)
    }

    pub(crate) fn invalidate(&mut self) {
        self.stage.invalidate();
    }

    /// Group 0 and group 1 for one film pass. `lut` falls back to the
    /// identity placeholder.
    pub(crate) fn bind_groups(
        &self,
        device: &wgpu::Device,
        layouts: &StageLayouts,
        input: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        output: &wgpu::TextureView,
        lut: Option<&GpuLutTexture>,
    ) -> Vec<wgpu::BindGroup> {
        let lut = lut.unwrap_or(&self.placeholder);
        let lut_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("filmlab_film_lut"),
            layout: &layouts.lut,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&lut.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.lut_sampler),
                },
            ],
        });
        vec![
            self.stage.bind_group(device, &layouts.standard, input, sampler, output),
            lut_group,
        ]
    }
}
