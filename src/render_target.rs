//! Offscreen colour + depth targets.

use crate::gpu::GpuContext;

/// Depth format shared by every pass in the crate.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// A depth texture sized to the surface.
///
/// Bindable as a texture so compute kernels can read scene depth.
pub struct DepthBuffer {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    size: (u32, u32),
}

impl DepthBuffer {
    pub fn new(gpu: &GpuContext, label: &str) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: gpu.width(),
                height: gpu.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size: (gpu.width(), gpu.height()),
        }
    }

    /// Recreate the texture if the surface size changed. Returns true when it did.
    pub fn ensure_size(&mut self, gpu: &GpuContext, label: &str) -> bool {
        if self.size != (gpu.width(), gpu.height()) {
            *self = Self::new(gpu, label);
            return true;
        }
        false
    }

    /// Attachment that clears to the far plane.
    pub fn clear_attachment(&self) -> wgpu::RenderPassDepthStencilAttachment<'_> {
        wgpu::RenderPassDepthStencilAttachment {
            view: &self.view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }
    }
}

/// An offscreen render target: a colour texture in the surface format plus
/// its own depth buffer.
///
/// The colour texture is both a render attachment and a sampled texture, so
/// one pass can draw the scene into it and a later pass can read it back
/// (the refraction demo samples the scene behind its mesh this way).
pub struct RenderTarget {
    label: &'static str,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub depth: DepthBuffer,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// Creates a new render target matching the current surface dimensions.
    pub fn new(gpu: &GpuContext, label: &'static str) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: gpu.width(),
                height: gpu.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: gpu.format(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            label,
            texture,
            view,
            depth: DepthBuffer::new(gpu, label),
            width: gpu.width(),
            height: gpu.height(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Checks if the target dimensions match the surface and recreates if needed.
    ///
    /// Returns true when the textures were replaced, in which case any bind
    /// group referencing the old views must be rebuilt.
    pub fn ensure_size(&mut self, gpu: &GpuContext) -> bool {
        if self.width != gpu.width() || self.height != gpu.height() {
            *self = Self::new(gpu, self.label);
            return true;
        }
        false
    }
}
