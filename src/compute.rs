//! Compute kernels: a compiled pipeline plus the bindings it reads and writes.
//!
//! A [`ComputeKernel`] is built once per kernel bundle and dispatched either
//! awaited (one-time initialization) or fire-and-forget (per-frame updates).
//! Its workgroup count is fixed at construction from the element count it
//! was built for.

use crate::error::DispatchError;
use crate::gpu::GpuContext;

/// Threads per workgroup for 1D kernels. Matches `@workgroup_size(64)`.
pub const WORKGROUP_SIZE: u32 = 64;

/// Tile edge for 2D image kernels. Matches `@workgroup_size(8, 8)`.
pub const TILE_SIZE: u32 = 8;

/// One binding slot of a kernel, numbered by its position in the list.
pub enum KernelBinding<'a> {
    Uniform(wgpu::BindingResource<'a>),
    Storage {
        resource: wgpu::BindingResource<'a>,
        read_only: bool,
    },
    /// Sampled texture read with `textureLoad`.
    Texture {
        view: &'a wgpu::TextureView,
        sample_type: wgpu::TextureSampleType,
    },
    /// Write-only storage texture.
    StorageTexture {
        view: &'a wgpu::TextureView,
        format: wgpu::TextureFormat,
    },
}

impl KernelBinding<'_> {
    fn layout_entry(&self, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let ty = match self {
            Self::Uniform(_) => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            Self::Storage { read_only, .. } => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage {
                    read_only: *read_only,
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            Self::Texture { sample_type, .. } => wgpu::BindingType::Texture {
                sample_type: *sample_type,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            Self::StorageTexture { format, .. } => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: *format,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
        };

        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        }
    }

    fn resource(&self) -> wgpu::BindingResource<'_> {
        match self {
            Self::Uniform(resource) | Self::Storage { resource, .. } => resource.clone(),
            Self::Texture { view, .. } | Self::StorageTexture { view, .. } => {
                wgpu::BindingResource::TextureView(view)
            }
        }
    }
}

/// Everything needed to build a [`ComputeKernel`].
pub struct KernelDescriptor<'a> {
    pub label: &'static str,
    pub shader: &'a wgpu::ShaderModule,
    pub entry_point: &'a str,
    pub bindings: &'a [KernelBinding<'a>],
    pub workgroups: [u32; 3],
}

/// A compiled compute pipeline bound to its resources.
pub struct ComputeKernel {
    label: &'static str,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    workgroups: [u32; 3],
}

impl ComputeKernel {
    pub fn new(gpu: &GpuContext, desc: &KernelDescriptor) -> Self {
        let device = &gpu.device;

        let layout_entries: Vec<_> = desc
            .bindings
            .iter()
            .zip(0..)
            .map(|(binding, index)| binding.layout_entry(index))
            .collect();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.label),
            entries: &layout_entries,
        });

        let entries: Vec<_> = desc
            .bindings
            .iter()
            .zip(0..)
            .map(|(binding, index)| wgpu::BindGroupEntry {
                binding: index,
                resource: binding.resource(),
            })
            .collect();

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(desc.label),
            layout: &bind_group_layout,
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&pipeline_layout),
            module: desc.shader,
            entry_point: Some(desc.entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            label: desc.label,
            pipeline,
            bind_group,
            workgroups: desc.workgroups,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn workgroups(&self) -> [u32; 3] {
        self.workgroups
    }

    /// Record this kernel into an existing encoder.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(self.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        let [x, y, z] = self.workgroups;
        pass.dispatch_workgroups(x, y, z);
    }

    /// Submit the kernel and return without waiting.
    ///
    /// This is the per-frame path. Nothing polls the device or checks for
    /// completion: the queue executes submissions in order, so any draw
    /// submitted afterwards observes the kernel's writes, but the CPU may run
    /// ahead by several frames and dispatches from consecutive frames can
    /// overlap. That relaxed consistency is accepted for animation kernels
    /// whose output only needs to be eventually visible.
    pub fn dispatch(&self, gpu: &GpuContext) -> wgpu::SubmissionIndex {
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(self.label),
            });
        self.encode(&mut encoder);
        gpu.queue.submit(std::iter::once(encoder.finish()))
    }

    /// Submit the kernel and block until it has finished.
    ///
    /// Validation and out-of-memory errors raised by the submission are
    /// captured with error scopes and returned instead of reaching the
    /// uncaptured-error handler.
    pub fn dispatch_awaited(&self, gpu: &GpuContext) -> Result<(), DispatchError> {
        gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        self.dispatch(gpu);

        let validation = pollster::block_on(gpu.device.pop_error_scope());
        let out_of_memory = pollster::block_on(gpu.device.pop_error_scope());
        if let Some(source) = validation.or(out_of_memory) {
            return Err(DispatchError::Rejected {
                kernel: self.label,
                source,
            });
        }

        gpu.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|source| DispatchError::Poll {
                kernel: self.label,
                source,
            })?;

        Ok(())
    }
}

/// Compile a standalone compute shader.
pub fn shader(gpu: &GpuContext, label: &str, source: &str) -> wgpu::ShaderModule {
    gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

/// Workgroup counts covering `count` elements with 1D workgroups.
pub fn linear_workgroups(count: u32) -> [u32; 3] {
    [count.div_ceil(WORKGROUP_SIZE).max(1), 1, 1]
}

/// Workgroup counts covering a `width` x `height` image with square tiles.
pub fn tiled_workgroups(width: u32, height: u32) -> [u32; 3] {
    [
        width.div_ceil(TILE_SIZE).max(1),
        height.div_ceil(TILE_SIZE).max(1),
        1,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_workgroups_cover_every_element() {
        assert_eq!(linear_workgroups(1), [1, 1, 1]);
        assert_eq!(linear_workgroups(64), [1, 1, 1]);
        assert_eq!(linear_workgroups(65), [2, 1, 1]);
        assert_eq!(linear_workgroups(300_000), [4688, 1, 1]);
    }

    #[test]
    fn tiles_cover_odd_sizes() {
        assert_eq!(tiled_workgroups(800, 600), [100, 75, 1]);
        assert_eq!(tiled_workgroups(801, 1), [101, 1, 1]);
    }

    #[test]
    fn awaited_dispatch_writes_buffer() {
        let Ok(gpu) = GpuContext::headless(4, 4) else {
            eprintln!("skipping: no GPU adapter available");
            return;
        };
        let buffer = crate::storage::InstanceBuffer::new(&gpu, "Fill Test", 100);
        let shader = shader(
            &gpu,
            "Fill Test",
            r#"
                @group(0) @binding(0) var<storage, read_write> values: array<vec4<f32>>;

                @compute @workgroup_size(64)
                fn main(@builtin(global_invocation_id) id: vec3<u32>) {
                    if (id.x >= arrayLength(&values)) {
                        return;
                    }
                    values[id.x] = vec4<f32>(f32(id.x), 1.0, 2.0, 0.0);
                }
            "#,
        );
        let kernel = ComputeKernel::new(
            &gpu,
            &KernelDescriptor {
                label: "Fill Test",
                shader: &shader,
                entry_point: "main",
                bindings: &[KernelBinding::Storage {
                    resource: buffer.binding(),
                    read_only: false,
                }],
                workgroups: linear_workgroups(buffer.count()),
            },
        );

        kernel.dispatch_awaited(&gpu).expect("dispatch");
        let values = buffer.read_back(&gpu).expect("readback");
        assert_eq!(values[99], glam::Vec3::new(99.0, 1.0, 2.0));
    }
}
