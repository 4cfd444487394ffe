//! Mutable uniform cells shared between the frame driver and GPU kernels.
//!
//! A kernel bundle is immutable once built, but the values it reads each frame
//! (elapsed time, distortion amount, light direction) are not. Each such value
//! lives in a [`Uniform`]: the frame driver is its only writer, any number of
//! kernels bind its buffer and read it.
//!
//! Writes are last-write-wins with no history. [`Uniform::set`] stages the
//! new value on the queue, so it becomes visible to the next submitted
//! dispatch or draw, never to one that was already submitted.

use std::cell::Cell;

use bytemuck::Pod;
use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;

/// CPU shadow of a uniform value.
///
/// Kept separate from the GPU buffer so the write semantics can be checked
/// without a device.
#[derive(Debug)]
pub struct UniformCell<T: Copy> {
    value: Cell<T>,
}

impl<T: Copy> UniformCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Cell::new(value),
        }
    }

    /// Replace the current value.
    pub fn set(&self, value: T) {
        self.value.set(value);
    }

    pub fn get(&self) -> T {
        self.value.get()
    }
}

/// A named uniform value backed by a GPU uniform buffer.
pub struct Uniform<T: Pod> {
    label: &'static str,
    cell: UniformCell<T>,
    buffer: wgpu::Buffer,
}

impl<T: Pod> Uniform<T> {
    /// Allocate the uniform buffer and upload the initial value.
    pub fn new(gpu: &GpuContext, label: &'static str, initial: T) -> Self {
        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(&initial),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        Self {
            label,
            cell: UniformCell::new(initial),
            buffer,
        }
    }

    /// Write a new value; visible to the next submitted dispatch or draw.
    pub fn set(&self, queue: &wgpu::Queue, value: T) {
        log::trace!("uniform '{}' written", self.label);
        self.cell.set(value);
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&value));
    }

    /// Read-modify-write helper for updating one field of a uniform struct.
    pub fn update(&self, queue: &wgpu::Queue, f: impl FnOnce(&mut T)) {
        let mut value = self.cell.get();
        f(&mut value);
        self.set(queue, value);
    }

    /// The last value written from the CPU.
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Binding resource for bind group entries.
    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

/// Bind group layout entry for a uniform buffer visible to the given stages.
pub fn uniform_layout_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let cell = UniformCell::new(0.0f32);
        cell.set(1.0);
        cell.set(2.5);
        assert_eq!(cell.get(), 2.5);
    }

    #[test]
    fn initial_value_is_readable_before_any_write() {
        let cell = UniformCell::new([1.0f32, 2.0, 3.0, 0.0]);
        assert_eq!(cell.get(), [1.0, 2.0, 3.0, 0.0]);
    }
}
