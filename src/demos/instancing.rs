//! A grid of icosahedra riding two crossing sine waves.
//!
//! The init kernel lays instances out on a centred grid once per instance
//! count. The wave itself is evaluated in the vertex shader from the time
//! uniform, so there is no per-frame compute.

use std::rc::Rc;

use glam::Vec3;
use winit::keyboard::KeyCode;

use crate::compute::{self, ComputeKernel, KernelBinding, KernelDescriptor};
use crate::config::{InstancingConfig, clamp_count};
use crate::frame::{Demo, FrameContext};
use crate::geometry::RawGeometry;
use crate::gpu::GpuContext;
use crate::input::Input;
use crate::mesh::Mesh;
use crate::node_graph::GraphCache;
use crate::orbit_camera::OrbitCamera;
use crate::render_target::DepthBuffer;
use crate::scene_pass::{self, PipelineOptions, ScenePass, Side};
use crate::storage::InstanceBuffer;
use crate::uniform::{Uniform, uniform_layout_entry};

/// Placement of `count` instances on a centred square-ish grid in the XZ plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLayout {
    pub count: u32,
    pub width: u32,
    pub height: u32,
}

impl GridLayout {
    pub const SPACING: f32 = 0.6;

    pub fn for_count(count: u32) -> Self {
        let count = count.max(1);
        let width = ((count as f32).sqrt() as u32).max(1);
        Self {
            count,
            width,
            height: count.div_ceil(width),
        }
    }

    /// Rest position of instance `index`. Mirrors the init kernel.
    pub fn position(&self, index: u32) -> Vec3 {
        let x = (index % self.width) as f32;
        let z = (index / self.width) as f32;
        Vec3::new(
            x * Self::SPACING - (self.width - 1) as f32 * Self::SPACING * 0.5,
            0.0,
            z * Self::SPACING - (self.height - 1) as f32 * Self::SPACING * 0.5,
        )
    }

    /// Axis-aligned corners enclosing every rest position.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let half = Vec3::new(
            (self.width - 1) as f32 * Self::SPACING * 0.5,
            0.0,
            (self.height - 1) as f32 * Self::SPACING * 0.5,
        );
        (-half, half)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstancingParams {
    pub time: f32,
    pub count: u32,
    pub grid_width: u32,
    pub grid_height: u32,
}

/// Kernel bundle for one instance count.
pub struct InstancingGraph {
    pub positions: InstanceBuffer,
    pub params: Uniform<InstancingParams>,
    pub init: ComputeKernel,
    layout: GridLayout,
    mesh: Mesh,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
}

impl InstancingGraph {
    pub fn new(gpu: &GpuContext, scene: &ScenePass, config: &InstancingConfig) -> Self {
        let layout = GridLayout::for_count(config.count);
        let positions = InstanceBuffer::new(gpu, "Instancing Positions", layout.count);
        let params = Uniform::new(
            gpu,
            "Instancing Params",
            InstancingParams {
                time: 0.0,
                count: layout.count,
                grid_width: layout.width,
                grid_height: layout.height,
            },
        );

        let init_shader = compute::shader(gpu, "Instancing Init", include_str!("../shaders/instancing_init.wgsl"));
        let init = ComputeKernel::new(
            gpu,
            &KernelDescriptor {
                label: "instancing_init",
                shader: &init_shader,
                entry_point: "init",
                bindings: &[
                    KernelBinding::Storage {
                        resource: positions.binding(),
                        read_only: false,
                    },
                    KernelBinding::Uniform(params.binding()),
                ],
                workgroups: compute::linear_workgroups(layout.count),
            },
        );

        let bind_group_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Instancing Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    uniform_layout_entry(1, wgpu::ShaderStages::VERTEX),
                ],
            });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Instancing Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: positions.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params.binding(),
                },
            ],
        });

        let shader = ScenePass::shader(gpu, "Instancing Shader", include_str!("../shaders/instancing.wgsl"));
        let pipeline = scene.pipeline(
            gpu,
            &PipelineOptions {
                label: "Instancing Pipeline",
                shader: &shader,
                vertex_entry: "vs",
                fragment_entry: "fs",
                side: Side::Front,
                targets: &[scene_pass::color_target(gpu.format())],
                depth_write: true,
                extra_layouts: &[&bind_group_layout],
            },
        );

        let mesh = RawGeometry::icosahedron(0.3, 4).upload(gpu, "Instancing Icosahedron");

        Self {
            positions,
            params,
            init,
            layout,
            mesh,
            pipeline,
            bind_group,
        }
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }
}

pub struct InstancingDemo {
    config: InstancingConfig,
    scene: ScenePass,
    depth: DepthBuffer,
    cache: GraphCache<InstancingConfig, InstancingGraph>,
}

impl InstancingDemo {
    pub fn new(gpu: &GpuContext, config: InstancingConfig) -> Self {
        Self {
            config,
            scene: ScenePass::new(gpu),
            depth: DepthBuffer::new(gpu, "Instancing Depth"),
            cache: GraphCache::new(),
        }
    }

    pub fn config(&self) -> &InstancingConfig {
        &self.config
    }

    pub fn graph(&self) -> Option<&Rc<InstancingGraph>> {
        self.cache.current()
    }

    pub fn builds(&self) -> u64 {
        self.cache.builds()
    }
}

impl Demo for InstancingDemo {
    fn name(&self) -> &'static str {
        "instancing"
    }

    fn framing(&self) -> OrbitCamera {
        OrbitCamera::new()
    }

    fn handle_input(&mut self, input: &Input) {
        let count = self.config.count;
        if input.key_pressed(KeyCode::ArrowUp) {
            self.config.count = clamp_count(count.saturating_mul(2));
        }
        if input.key_pressed(KeyCode::ArrowDown) {
            self.config.count = clamp_count(count / 2);
        }
        if self.config.count != count {
            log::info!("instancing count {count} -> {}", self.config.count);
        }
    }

    fn frame(&mut self, ctx: &mut FrameContext) {
        let gpu = ctx.gpu;
        let scene = &self.scene;
        let lookup = self
            .cache
            .get_or_build(&self.config, |config| InstancingGraph::new(gpu, scene, config));
        let fresh = lookup.is_fresh();
        let graph = lookup.into_graph();

        if fresh {
            log::info!("built instancing graph for {} instances", graph.layout.count);
            ctx.dispatch_awaited(&graph.init);
        }

        graph.params.update(&gpu.queue, |params| params.time = ctx.time);
        self.scene.update(gpu, ctx.camera, ctx.time);
        self.depth.ensure_size(gpu, "Instancing Depth");

        let mut encoder = ctx.create_encoder("Instancing Encoder");
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Instancing Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: ctx.screen(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(scene_pass::BACKGROUND),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(self.depth.clear_attachment()),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&graph.pipeline);
            render_pass.set_bind_group(0, self.scene.bind_group(), &[]);
            render_pass.set_bind_group(1, &graph.bind_group, &[]);
            graph.mesh.draw(&mut render_pass, 0..graph.positions.count());
        }
        ctx.submit("instancing", encoder);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::frame::testing::{headless_gpu, run_frame};
    use crate::frame::{DispatchWait, FrameEvent};

    #[test]
    fn grid_is_centred() {
        let layout = GridLayout::for_count(10_000);
        assert_eq!((layout.width, layout.height), (100, 100));

        let (min, max) = layout.bounds();
        assert_eq!(layout.position(0), Vec3::new(min.x, 0.0, min.z));
        assert!((layout.position(9_999) - Vec3::new(max.x, 0.0, max.z)).length() < 1e-4);
        assert!((min + max).length() < 1e-6);
    }

    #[test]
    fn ragged_grid_rounds_rows_up() {
        let layout = GridLayout::for_count(10);
        assert_eq!((layout.width, layout.height), (3, 4));
        let (_, max) = layout.bounds();
        assert!(layout.position(9).z <= max.z);
    }

    #[test]
    fn init_fills_every_slot_with_a_distinct_grid_position() {
        let Some(gpu) = headless_gpu() else { return };
        let mut demo = InstancingDemo::new(&gpu, InstancingConfig { count: 10_000 });

        let events = run_frame(&gpu, &mut demo, 0.0);
        assert_eq!(
            events[0],
            FrameEvent::Dispatch {
                kernel: "instancing_init",
                wait: DispatchWait::Awaited,
            }
        );

        let graph = demo.graph().expect("graph built");
        let positions = graph.positions.read_back(&gpu).expect("readback");
        let (min, max) = graph.layout().bounds();
        let eps = 1e-3;

        assert_eq!(positions.len(), 10_000);
        let mut seen = HashSet::new();
        for p in &positions {
            assert!(p.is_finite());
            assert!(p.x >= min.x - eps && p.x <= max.x + eps);
            assert!(p.z >= min.z - eps && p.z <= max.z + eps);
            assert_eq!(p.y, 0.0);
            assert!(seen.insert((p.x.to_bits(), p.z.to_bits())));
        }
    }

    #[test]
    fn unchanged_count_reuses_the_graph() {
        let Some(gpu) = headless_gpu() else { return };
        let mut demo = InstancingDemo::new(&gpu, InstancingConfig { count: 100 });

        run_frame(&gpu, &mut demo, 0.0);
        let first = Rc::clone(demo.graph().expect("graph built"));
        let events = run_frame(&gpu, &mut demo, 0.5);

        assert!(Rc::ptr_eq(&first, demo.graph().expect("graph built")));
        assert!(!events.iter().any(|e| matches!(e, FrameEvent::Dispatch { .. })));
        assert_eq!(demo.builds(), 1);
        assert_eq!(first.params.get().time, 0.5);
    }

    #[test]
    fn doubling_the_count_rebuilds_and_reinitializes() {
        let Some(gpu) = headless_gpu() else { return };
        let mut demo = InstancingDemo::new(&gpu, InstancingConfig { count: 100 });
        run_frame(&gpu, &mut demo, 0.0);

        let mut input = Input::new();
        input.press(KeyCode::ArrowUp);
        demo.handle_input(&input);
        let events = run_frame(&gpu, &mut demo, 0.1);

        assert_eq!(demo.config().count, 200);
        assert_eq!(demo.builds(), 2);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, FrameEvent::Dispatch { wait: DispatchWait::Awaited, .. }))
                .count(),
            1
        );
        assert_eq!(demo.graph().expect("graph built").positions.count(), 200);
    }
}
