//! Render-target textures for one slot.
//!
//! All intermediates are `rgba16float` storage + sampled textures holding
//! sRGB-encoded values. The source is an `rgba8unorm` upload and the readback
//! target an `rgba8unorm` storage texture the encode pass writes into.

use image::RgbaImage;

use crate::plan::TargetId;

/// Format of every intermediate target.
pub const INTERMEDIATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Format of the uploaded source and the readback target.
pub const SOURCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Size of the half-resolution halation buffers.
pub fn half_size((width, height): (u32, u32)) -> (u32, u32) {
    (width.div_ceil(2).max(1), height.div_ceil(2).max(1))
}

pub(crate) struct Target {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

impl Target {
    fn new(
        device: &wgpu::Device,
        label: &str,
        (width, height): (u32, u32),
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size: (width, height),
        }
    }
}

/// Every texture a slot renders through, sized for one source/output pair.
///
/// Recreated when either size changes; each recreation gets a new
/// generation so compiled bind groups and cached intermediates are
/// invalidated.
pub struct RenderTargets {
    generation: u64,
    source: Target,
    output: Target,
    scratch: Target,
    geometry: Target,
    prefilm: Target,
    half_a: Target,
    half_b: Target,
    readback: Target,
}

impl RenderTargets {
    pub fn new(device: &wgpu::Device, source_size: (u32, u32), output_size: (u32, u32), generation: u64) -> Self {
        let intermediate = |label: &str, size| {
            Target::new(
                device,
                label,
                size,
                INTERMEDIATE_FORMAT,
                wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            )
        };
        let half = half_size(output_size);

        Self {
            generation,
            source: Target::new(
                device,
                "filmlab_source",
                source_size,
                SOURCE_FORMAT,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            ),
            output: intermediate("filmlab_output", output_size),
            scratch: intermediate("filmlab_scratch", output_size),
            geometry: intermediate("filmlab_geometry_cache", output_size),
            prefilm: intermediate("filmlab_prefilm_cache", output_size),
            half_a: intermediate("filmlab_half_a", half),
            half_b: intermediate("filmlab_half_b", half),
            readback: Target::new(
                device,
                "filmlab_readback",
                output_size,
                SOURCE_FORMAT,
                wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
            ),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source_size(&self) -> (u32, u32) {
        self.source.size
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output.size
    }

    pub fn matches(&self, source_size: (u32, u32), output_size: (u32, u32)) -> bool {
        self.source.size == source_size && self.output.size == output_size
    }

    fn target(&self, id: TargetId) -> &Target {
        match id {
            TargetId::Source => &self.source,
            TargetId::Output => &self.output,
            TargetId::Scratch => &self.scratch,
            TargetId::Geometry => &self.geometry,
            TargetId::PreFilm => &self.prefilm,
            TargetId::HalfA => &self.half_a,
            TargetId::HalfB => &self.half_b,
        }
    }

    pub fn view(&self, id: TargetId) -> &wgpu::TextureView {
        &self.target(id).view
    }

    pub fn size(&self, id: TargetId) -> (u32, u32) {
        self.target(id).size
    }

    pub(crate) fn readback_view(&self) -> &wgpu::TextureView {
        &self.readback.view
    }

    pub(crate) fn readback_texture(&self) -> &wgpu::Texture {
        &self.readback.texture
    }

    /// Write 8-bit RGBA pixels into the source texture.
    pub fn upload_source(&self, queue: &wgpu::Queue, image: &RgbaImage) {
        let (width, height) = self.source.size;
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Free the GPU memory now instead of on drop.
    pub fn destroy(&self) {
        for target in [
            &self.source,
            &self.output,
            &self.scratch,
            &self.geometry,
            &self.prefilm,
            &self.half_a,
            &self.half_b,
            &self.readback,
        ] {
            target.texture.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_size_rounds_up_and_never_hits_zero() {
        assert_eq!(half_size((101, 50)), (51, 25));
        assert_eq!(half_size((1, 1)), (1, 1));
        assert_eq!(half_size((0, 3)), (1, 2));
    }
}
