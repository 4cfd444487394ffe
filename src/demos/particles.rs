//! Particles scattered in a ball and advected along the Thomas attractor.
//!
//! Two buffers per particle: the spawn position written once by the init
//! kernel, and an offset advanced by the update kernel every frame. The
//! sprite shader draws each particle at spawn + offset.

use std::rc::Rc;

use glam::Vec3;
use winit::keyboard::KeyCode;

use crate::compute::{self, ComputeKernel, KernelBinding, KernelDescriptor};
use crate::config::{ParticlesConfig, clamp_count};
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

/// Thomas attractor damping.
pub const THOMAS_B: f32 = 0.19;
/// Integration step per frame.
pub const THOMAS_STEP: f32 = 0.015;

/// Deterministic pseudo-random value in `[0, 1)` for an ordinal.
pub fn hash01(index: u32) -> f32 {
    ((index as f32 * 12.9898).sin() * 43758.5453).rem_euclid(1.0)
}

/// Spawn position of particle `index`. Mirrors the init kernel.
pub fn spawn_position(index: u32) -> Vec3 {
    let distance = (hash01(index) * 4.0).sqrt();
    let theta = hash01(index.wrapping_add(1)) * std::f32::consts::TAU;
    let phi = hash01(index.wrapping_add(2)) * std::f32::consts::PI;
    Vec3::new(
        distance * phi.sin() * theta.cos(),
        distance * phi.sin() * theta.sin(),
        distance * phi.cos(),
    )
}

/// Offset increment for a particle at `p`. Mirrors the update kernel.
pub fn thomas_step(p: Vec3) -> Vec3 {
    Vec3::new(
        -THOMAS_B * p.x + p.y.sin(),
        -THOMAS_B * p.y + p.z.sin(),
        -THOMAS_B * p.z + p.x.sin(),
    ) * THOMAS_STEP
}

/// Sprite edge length, shared by every particle.
pub fn sprite_scale() -> f32 {
    hash01(3) * (0.04 - 0.01) + 0.01
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleParams {
    pub b: f32,
    pub step: f32,
    pub scale: f32,
    pub time: f32,
}

pub struct ParticlesGraph {
    pub spawn: InstanceBuffer,
    pub offsets: InstanceBuffer,
    pub params: Uniform<ParticleParams>,
    pub init: ComputeKernel,
    pub update: ComputeKernel,
    sprite: Mesh,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
}

impl ParticlesGraph {
    pub fn new(gpu: &GpuContext, scene: &ScenePass, config: &ParticlesConfig) -> Self {
        let count = config.count;
        let spawn = InstanceBuffer::new(gpu, "Particle Spawn Positions", count);
        let offsets = InstanceBuffer::new(gpu, "Particle Offsets", count);
        let params = Uniform::new(
            gpu,
            "Particle Params",
            ParticleParams {
                b: THOMAS_B,
                step: THOMAS_STEP,
                scale: sprite_scale(),
                time: 0.0,
            },
        );

        let compute_shader = compute::shader(
            gpu,
            "Particle Kernels",
            include_str!("../shaders/particles_compute.wgsl"),
        );
        let bindings = [
            KernelBinding::Storage {
                resource: spawn.binding(),
                read_only: false,
            },
            KernelBinding::Storage {
                resource: offsets.binding(),
                read_only: false,
            },
            KernelBinding::Uniform(params.binding()),
        ];
        let init = ComputeKernel::new(
            gpu,
            &KernelDescriptor {
                label: "particles_init",
                shader: &compute_shader,
                entry_point: "init",
                bindings: &bindings,
                workgroups: compute::linear_workgroups(count),
            },
        );
        let update = ComputeKernel::new(
            gpu,
            &KernelDescriptor {
                label: "particles_update",
                shader: &compute_shader,
                entry_point: "update",
                bindings: &bindings,
                workgroups: compute::linear_workgroups(count),
            },
        );

        let read_only_storage = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Particles Bind Group Layout"),
                entries: &[
                    read_only_storage(0),
                    read_only_storage(1),
                    uniform_layout_entry(2, wgpu::ShaderStages::VERTEX),
                ],
            });
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particles Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: spawn.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: offsets.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.binding(),
                },
            ],
        });

        let additive = wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::SrcAlpha,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        };
        let shader = ScenePass::shader(gpu, "Particles Shader", include_str!("../shaders/particles.wgsl"));
        let pipeline = scene.pipeline(
            gpu,
            &PipelineOptions {
                label: "Particles Pipeline",
                shader: &shader,
                vertex_entry: "vs",
                fragment_entry: "fs",
                side: Side::Double,
                targets: &[Some(wgpu::ColorTargetState {
                    format: gpu.format(),
                    blend: Some(wgpu::BlendState {
                        color: additive,
                        alpha: additive,
                    }),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                depth_write: false,
                extra_layouts: &[&bind_group_layout],
            },
        );

        Self {
            spawn,
            offsets,
            params,
            init,
            update,
            sprite: RawGeometry::quad().upload(gpu, "Particle Sprite"),
            pipeline,
            bind_group,
        }
    }
}

pub struct ParticlesDemo {
    config: ParticlesConfig,
    scene: ScenePass,
    depth: DepthBuffer,
    cache: GraphCache<ParticlesConfig, ParticlesGraph>,
}

impl ParticlesDemo {
    pub fn new(gpu: &GpuContext, config: ParticlesConfig) -> Self {
        Self {
            config,
            scene: ScenePass::new(gpu),
            depth: DepthBuffer::new(gpu, "Particles Depth"),
            cache: GraphCache::new(),
        }
    }

    pub fn config(&self) -> &ParticlesConfig {
        &self.config
    }

    pub fn graph(&self) -> Option<&Rc<ParticlesGraph>> {
        self.cache.current()
    }
}

impl Demo for ParticlesDemo {
    fn name(&self) -> &'static str {
        "particles"
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
            log::info!("particle count {count} -> {}", self.config.count);
        }
    }

    fn frame(&mut self, ctx: &mut FrameContext) {
        let gpu = ctx.gpu;
        let scene = &self.scene;
        let lookup = self
            .cache
            .get_or_build(&self.config, |config| ParticlesGraph::new(gpu, scene, config));
        let fresh = lookup.is_fresh();
        let graph = lookup.into_graph();

        if fresh {
            log::info!("built particles graph for {} particles", graph.spawn.count());
            ctx.dispatch_awaited(&graph.init);
        }

        graph.params.update(&gpu.queue, |params| params.time = ctx.time);
        ctx.dispatch(&graph.update);

        self.scene.update(gpu, ctx.camera, ctx.time);
        self.depth.ensure_size(gpu, "Particles Depth");

        let mut encoder = ctx.create_encoder("Particles Encoder");
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Particles Pass"),
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
            graph.sprite.draw(&mut render_pass, 0..graph.spawn.count());
        }
        ctx.submit("particles", encoder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::testing::{headless_gpu, run_frame};
    use crate::frame::{DispatchWait, FrameEvent};

    #[test]
    fn hash_stays_in_unit_interval() {
        for i in 0..10_000 {
            let h = hash01(i);
            assert!((0.0..=1.0).contains(&h), "hash({i}) = {h}");
        }
    }

    #[test]
    fn spawn_points_lie_inside_radius_two() {
        for i in 0..1_000 {
            assert!(spawn_position(i).length() <= 2.0 + 1e-5);
        }
    }

    #[test]
    fn sprite_scale_is_in_range() {
        let scale = sprite_scale();
        assert!((0.01..0.04).contains(&scale));
    }

    #[test]
    fn thomas_origin_is_a_fixed_point() {
        assert_eq!(thomas_step(Vec3::ZERO), Vec3::ZERO);
        let step = thomas_step(Vec3::new(1.0, 0.0, 0.0));
        assert!((step.x - -THOMAS_B * THOMAS_STEP).abs() < 1e-7);
        assert!((step.z - 1f32.sin() * THOMAS_STEP).abs() < 1e-7);
    }

    #[test]
    fn update_is_dispatched_once_per_frame_without_waiting() {
        let Some(gpu) = headless_gpu() else { return };
        let mut demo = ParticlesDemo::new(&gpu, ParticlesConfig { count: 1_000 });

        let first = run_frame(&gpu, &mut demo, 0.0);
        assert_eq!(
            first[..2],
            [
                FrameEvent::Dispatch {
                    kernel: "particles_init",
                    wait: DispatchWait::Awaited,
                },
                FrameEvent::Dispatch {
                    kernel: "particles_update",
                    wait: DispatchWait::FireAndForget,
                },
            ]
        );

        for frame in 1..4 {
            let events = run_frame(&gpu, &mut demo, frame as f32 / 60.0);
            let dispatches: Vec<_> = events
                .iter()
                .filter(|e| matches!(e, FrameEvent::Dispatch { .. }))
                .collect();
            assert_eq!(
                dispatches,
                [&FrameEvent::Dispatch {
                    kernel: "particles_update",
                    wait: DispatchWait::FireAndForget,
                }]
            );
        }
    }

    #[test]
    fn first_update_advances_offsets_along_the_attractor() {
        let Some(gpu) = headless_gpu() else { return };
        let mut demo = ParticlesDemo::new(&gpu, ParticlesConfig { count: 256 });
        run_frame(&gpu, &mut demo, 0.0);

        let graph = demo.graph().expect("graph built");
        let spawn = graph.spawn.read_back(&gpu).expect("spawn readback");
        let offsets = graph.offsets.read_back(&gpu).expect("offset readback");

        assert!(spawn.iter().all(|p| p.is_finite() && p.length() <= 2.0 + 1e-4));
        assert!(spawn.iter().any(|p| *p != Vec3::ZERO));
        for (p, offset) in spawn.iter().zip(&offsets) {
            assert!((*offset - thomas_step(*p)).length() < 1e-4);
        }
    }
}
