//! GPU device ownership and context-loss detection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use filmlab_core::{HaldLut, LutError};
use tracing::{info, warn};
use wgpu::util::DeviceExt;

use crate::config::RenderConfig;
use crate::error::GpuError;
use crate::lut_cache::{LutContext, LutKey};

static NEXT_LUT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// One device + queue pair, owned by exactly one render slot.
///
/// Loss is detected through the device-lost callback and latched in a flag
/// that render calls check before touching the device.
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    lost: Arc<AtomicBool>,
    adapter_name: String,
}

impl GpuContext {
    /// Request an adapter and device, blocking the calling thread.
    pub fn new(config: &RenderConfig, label: &str) -> Result<Self, GpuError> {
        pollster::block_on(Self::request(config, label))
    }

    /// Request an adapter and device.
    pub async fn request(config: &RenderConfig, label: &str) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference.into(),
                force_fallback_adapter: config.force_fallback_adapter,
                compatible_surface: None,
            })
            .await
            .map_err(|_| GpuError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: crate::required_features(),
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await
            .map_err(|e| GpuError::RequestDevice(e.to_string()))?;

        let info = adapter.get_info();
        info!(
            slot = label,
            adapter = %info.name,
            backend = ?info.backend,
            "created GPU context"
        );

        let mut context = Self::from_device(Arc::new(device), Arc::new(queue));
        context.adapter_name = info.name;
        Ok(context)
    }

    /// Wrap an existing device, installing the loss callback.
    pub fn from_device(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            flag.store(true, Ordering::Release);
            warn!(?reason, %message, "GPU device lost");
        });
        Self {
            device,
            queue,
            lost,
            adapter_name: String::new(),
        }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Latch the lost flag (used for externally reported loss).
    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::Release);
    }

    /// Shared loss flag for components that outlive a borrow of the context.
    pub fn loss_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.lost)
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

impl LutContext for GpuContext {
    type Handle = Arc<GpuLutTexture>;

    fn create(&self, key: &LutKey, lut: &HaldLut) -> Result<Self::Handle, LutError> {
        if self.is_lost() {
            return Err(LutError::Upload {
                path: key.path.clone(),
                message: "GPU context lost".to_string(),
            });
        }
        let max = self.device.limits().max_texture_dimension_3d;
        if lut.size() > max {
            return Err(LutError::Upload {
                path: key.path.clone(),
                message: format!("LUT size {} exceeds 3D texture limit {max}", lut.size()),
            });
        }
        Ok(Arc::new(GpuLutTexture::upload(
            &self.device,
            &self.queue,
            lut.size(),
            lut.data(),
            &key.path,
        )))
    }

    fn release(&self, handle: Self::Handle) {
        handle.texture.destroy();
    }
}

/// A 3D LUT resident on the GPU, sampled with trilinear filtering and
/// edge clamping on all three axes.
pub struct GpuLutTexture {
    id: u64,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: u32,
}

impl GpuLutTexture {
    /// Upload `size³` RGBA8 texels (red fastest).
    pub fn upload(device: &wgpu::Device, queue: &wgpu::Queue, size: u32, texels: &[u8], label: &str) -> Self {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(&format!("filmlab_lut_3d:{label}")),
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: size,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D3,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            texels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("filmlab_lut_3d_view"),
            dimension: Some(wgpu::TextureViewDimension::D3),
            ..Default::default()
        });
        Self {
            id: NEXT_LUT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            texture,
            view,
            size,
        }
    }

    /// 2×2×2 identity table bound when no LUT is loaded.
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let mut texels = Vec::with_capacity(8 * 4);
        for b in 0..2u8 {
            for g in 0..2u8 {
                for r in 0..2u8 {
                    texels.extend_from_slice(&[r * 255, g * 255, b * 255, 255]);
                }
            }
        }
        Self::upload(device, queue, 2, &texels, "placeholder")
    }

    /// Process-unique id; part of the stage plan key.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Linear, edge-clamped sampler shared by all stages.
pub(crate) fn linear_clamp_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}
