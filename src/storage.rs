//! GPU-resident per-instance buffers and storage images.

use glam::Vec3;

use crate::error::ReadbackError;
use crate::gpu::GpuContext;

/// Largest instance count a demo may request.
///
/// At 16 bytes per element this stays under wgpu's default
/// `max_storage_buffer_binding_size` and keeps a 1D dispatch of 64-wide
/// workgroups under the 65535 workgroup limit.
pub const MAX_INSTANCES: u32 = 4_000_000;

/// A fixed-length array of 3-vectors living on the GPU.
///
/// Elements are stored as `vec4<f32>` (the `w` lane is unused) so the WGSL
/// side can declare `array<vec4<f32>>` without alignment surprises. The
/// buffer starts zeroed, is written in place by compute kernels and is never
/// resized: a different count means a new buffer in a new kernel bundle.
pub struct InstanceBuffer {
    buffer: wgpu::Buffer,
    count: u32,
}

impl InstanceBuffer {
    /// Bytes per element.
    pub const STRIDE: u64 = 16;

    pub fn new(gpu: &GpuContext, label: &'static str, count: u32) -> Self {
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: Self::size_for(count),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self { buffer, count }
    }

    /// Buffer size in bytes for `count` elements.
    pub fn size_for(count: u32) -> u64 {
        count.max(1) as u64 * Self::STRIDE
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    /// Copy the buffer into a staging buffer and wait for it on the CPU.
    ///
    /// Blocks until every submission queued before the call has retired.
    /// Meant for tests and diagnostics, never for the frame loop.
    pub fn read_back(&self, gpu: &GpuContext) -> Result<Vec<Vec3>, ReadbackError> {
        let size = Self::size_for(self.count);
        let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Readback Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Instance Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, size);
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        gpu.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;

        receiver.recv().map_err(|_| ReadbackError::Disconnected)??;

        let data = slice.get_mapped_range();
        let elements: &[[f32; 4]] = bytemuck::cast_slice(&data);
        let positions = elements
            .iter()
            .take(self.count as usize)
            .map(|&[x, y, z, _]| Vec3::new(x, y, z))
            .collect();
        drop(data);
        staging.unmap();

        Ok(positions)
    }
}

/// A single-channel float image written by compute kernels and read by
/// fullscreen passes. Sized to the surface in physical pixels.
pub struct StorageImage {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl StorageImage {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

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
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width: gpu.width(),
            height: gpu.height(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_holds_a_vec4() {
        assert_eq!(InstanceBuffer::STRIDE, std::mem::size_of::<[f32; 4]>() as u64);
        assert_eq!(InstanceBuffer::size_for(10_000), 160_000);
    }

    #[test]
    fn empty_buffer_still_has_one_slot() {
        assert_eq!(InstanceBuffer::size_for(0), InstanceBuffer::STRIDE);
    }

    #[test]
    fn max_instances_fit_default_limits() {
        let limits = wgpu::Limits::default();
        assert!(InstanceBuffer::size_for(MAX_INSTANCES) <= limits.max_storage_buffer_binding_size as u64);
        assert!(MAX_INSTANCES.div_ceil(64) <= limits.max_compute_workgroups_per_dimension);
    }

    #[test]
    fn zeroed_buffer_reads_back_as_origin() {
        let Ok(gpu) = GpuContext::headless(4, 4) else {
            eprintln!("skipping: no GPU adapter available");
            return;
        };
        let buffer = InstanceBuffer::new(&gpu, "Zeroed", 8);
        let values = buffer.read_back(&gpu).expect("readback");
        assert_eq!(values.len(), 8);
        assert!(values.iter().all(|v| *v == Vec3::ZERO));
    }
}
