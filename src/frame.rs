//! Per-frame orchestration shared by every demo.
//!
//! The host loop builds a [`FrameContext`] once per redraw and hands it to
//! the active [`Demo`]. Through it the demo dispatches compute kernels,
//! switches render targets and submits its render passes. Every such action
//! is also recorded as a [`FrameEvent`], which is what the orchestration
//! tests inspect on a headless device.

use std::time::Instant;

use crate::camera::Camera;
use crate::compute::ComputeKernel;
use crate::gpu::GpuContext;
use crate::input::Input;
use crate::orbit_camera::OrbitCamera;

/// Where render passes currently draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetSlot {
    /// The surface texture (or the headless stand-in).
    Screen,
    /// A named offscreen render target owned by the demo.
    Offscreen(&'static str),
}

/// How a dispatch was synchronized with the CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchWait {
    Awaited,
    FireAndForget,
}

/// One GPU-facing action taken during a frame, in submission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameEvent {
    Dispatch {
        kernel: &'static str,
        wait: DispatchWait,
    },
    SetRenderTarget(TargetSlot),
    Render {
        label: &'static str,
        target: TargetSlot,
    },
}

/// Elapsed time since start and since the previous frame, in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    pub elapsed: f32,
    pub dt: f32,
}

/// Wall clock driving [`FrameTime`].
pub struct FrameClock {
    start: Instant,
    last: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
        }
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let time = FrameTime {
            elapsed: now.saturating_duration_since(self.start).as_secs_f32(),
            dt: now.saturating_duration_since(self.last).as_secs_f32(),
        };
        self.last = now;
        time
    }
}

/// Everything a demo needs for one frame.
pub struct FrameContext<'a> {
    pub gpu: &'a GpuContext,
    pub camera: &'a Camera,
    /// Seconds since the host loop started.
    pub time: f32,
    /// Seconds since the previous frame.
    pub dt: f32,
    screen: &'a wgpu::TextureView,
    target: TargetSlot,
    events: Vec<FrameEvent>,
}

impl<'a> FrameContext<'a> {
    pub fn new(
        gpu: &'a GpuContext,
        camera: &'a Camera,
        screen: &'a wgpu::TextureView,
        time: FrameTime,
    ) -> Self {
        Self {
            gpu,
            camera,
            time: time.elapsed,
            dt: time.dt,
            screen,
            target: TargetSlot::Screen,
            events: Vec::new(),
        }
    }

    /// Fire-and-forget dispatch. See [`ComputeKernel::dispatch`].
    pub fn dispatch(&mut self, kernel: &ComputeKernel) {
        kernel.dispatch(self.gpu);
        self.record(FrameEvent::Dispatch {
            kernel: kernel.label(),
            wait: DispatchWait::FireAndForget,
        });
    }

    /// Dispatch and block until the kernel has run.
    ///
    /// A rejected dispatch is logged and otherwise ignored; the buffers it
    /// would have written keep their previous contents. Returns whether the
    /// kernel completed.
    pub fn dispatch_awaited(&mut self, kernel: &ComputeKernel) -> bool {
        let result = kernel.dispatch_awaited(self.gpu);
        self.record(FrameEvent::Dispatch {
            kernel: kernel.label(),
            wait: DispatchWait::Awaited,
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("{e}");
                false
            }
        }
    }

    pub fn set_render_target(&mut self, slot: TargetSlot) {
        self.target = slot;
        self.record(FrameEvent::SetRenderTarget(slot));
    }

    pub fn render_target(&self) -> TargetSlot {
        self.target
    }

    /// View of the frame's presentation texture.
    pub fn screen(&self) -> &'a wgpu::TextureView {
        self.screen
    }

    pub fn create_encoder(&self, label: &'static str) -> wgpu::CommandEncoder {
        self.gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Submit a render encoder drawn into the current render target.
    pub fn submit(&mut self, label: &'static str, encoder: wgpu::CommandEncoder) {
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.record(FrameEvent::Render {
            label,
            target: self.target,
        });
    }

    pub fn events(&self) -> &[FrameEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<FrameEvent> {
        self.events
    }

    fn record(&mut self, event: FrameEvent) {
        log::trace!("{event:?}");
        self.events.push(event);
    }
}

/// A demo driven by the host loop.
pub trait Demo {
    fn name(&self) -> &'static str;

    /// Camera placement the demo opens with.
    fn framing(&self) -> OrbitCamera;

    /// React to this frame's input before [`Demo::frame`] runs.
    fn handle_input(&mut self, _input: &Input) {}

    /// Write uniforms, dispatch kernels and render one frame.
    fn frame(&mut self, ctx: &mut FrameContext);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Headless device for orchestration tests, or `None` (logged) when the
    /// machine has no adapter.
    pub(crate) fn headless_gpu() -> Option<GpuContext> {
        match GpuContext::headless(64, 48) {
            Ok(gpu) => Some(gpu),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    /// Run one frame of `demo` into an offscreen screen texture.
    pub(crate) fn run_frame(gpu: &GpuContext, demo: &mut dyn Demo, elapsed: f32) -> Vec<FrameEvent> {
        let screen = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Test Screen"),
            size: wgpu::Extent3d {
                width: gpu.width(),
                height: gpu.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: gpu.format(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = screen.create_view(&wgpu::TextureViewDescriptor::default());
        let camera = demo.framing().camera();

        let mut ctx = FrameContext::new(
            gpu,
            &camera,
            &view,
            FrameTime {
                elapsed,
                dt: 1.0 / 60.0,
            },
        );
        demo.frame(&mut ctx);
        ctx.into_events()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn clock_reports_elapsed_and_delta() {
        let mut clock = FrameClock::new();
        let start = clock.start;

        let first = clock.tick_at(start + Duration::from_millis(100));
        let second = clock.tick_at(start + Duration::from_millis(150));

        assert!((first.elapsed - 0.1).abs() < 1e-6);
        assert!((second.elapsed - 0.15).abs() < 1e-6);
        assert!((second.dt - 0.05).abs() < 1e-6);
    }

    #[test]
    fn rejected_init_dispatch_is_logged_and_leaves_buffers_zeroed() {
        use crate::compute::{self, KernelBinding, KernelDescriptor};
        use crate::storage::InstanceBuffer;

        let Some(gpu) = testing::headless_gpu() else { return };
        let buffer = InstanceBuffer::new(&gpu, "Oversized Fill", 16);
        let shader = compute::shader(
            &gpu,
            "Oversized Fill",
            r#"
                @group(0) @binding(0) var<storage, read_write> values: array<vec4<f32>>;

                @compute @workgroup_size(64)
                fn main(@builtin(global_invocation_id) id: vec3<u32>) {
                    if (id.x < arrayLength(&values)) {
                        values[id.x] = vec4<f32>(1.0);
                    }
                }
            "#,
        );
        let kernel = ComputeKernel::new(
            &gpu,
            &KernelDescriptor {
                label: "oversized_fill",
                shader: &shader,
                entry_point: "main",
                bindings: &[KernelBinding::Storage {
                    resource: buffer.binding(),
                    read_only: false,
                }],
                workgroups: [1_000_000, 1, 1],
            },
        );

        let screen = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Test Screen"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: gpu.format(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = screen.create_view(&wgpu::TextureViewDescriptor::default());
        let camera = Camera::default();
        let mut ctx = FrameContext::new(&gpu, &camera, &view, FrameTime::default());

        assert!(!ctx.dispatch_awaited(&kernel));
        assert_eq!(
            ctx.events(),
            [FrameEvent::Dispatch {
                kernel: "oversized_fill",
                wait: DispatchWait::Awaited,
            }]
        );

        let values = buffer.read_back(&gpu).expect("readback");
        assert!(values.iter().all(|v| *v == glam::Vec3::ZERO));
    }
}
