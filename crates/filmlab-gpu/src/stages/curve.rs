//! Point-curve stage: a 256×1 RGBA8 table sampled per channel.

use tracing::trace;

use super::{StageLayouts, create_pipeline};
use crate::uniforms::content_key;

const CURVE_WIDTH: u32 = 256;

/// Curve pipeline plus its `[red, green, blue, master]` table texture.
pub struct CurveStage {
    pipeline: wgpu::ComputePipeline,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    table_key: Option<u64>,
}

impl CurveStage {
    pub(crate) fn new(device: &wgpu::Device, layouts: &StageLayouts) -> Self {
        let pipeline = create_pipeline(
            device,
            "filmlab_curve",
            include_str!("../../shaders/curve.wgsl"),
            "curve",
            &[&layouts.curve],
        );
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("filmlab_curve_table"),
            size: wgpu::Extent3d {
                width: CURVE_WIDTH,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            pipeline,
            texture,
            view,
            table_key: None,
        }
    }

    pub(crate) fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    /// Upload 256 interleaved RGBA8 texels unless unchanged.
    pub(crate) fn write_table(&mut self, queue: &wgpu::Queue, texels: &[u8]) -> bool {
        let key = content_key(&[texels]);
        if self.table_key == Some(key) {
            trace!(stage = "filmlab_curve", "curve table unchanged");
            return false;
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(CURVE_WIDTH * 4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: CURVE_WIDTH,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.table_key = Some(key);
        true
    }

    pub(crate) fn invalidate(&mut self) {
        self.table_key = None;
    }

    pub(crate) fn bind_group(
        &self,
        device: &wgpu::Device,
        layouts: &StageLayouts,
        input: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        output: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("filmlab_curve"),
            layout: &layouts.curve,
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
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&self.view),
                },
            ],
        })
    }
}
