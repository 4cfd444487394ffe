//! A noise-displaced icosahedron refracting the scene behind it.
//!
//! Each frame renders the scene three times. The first pass draws everything
//! except the effect mesh into the back target. The second draws the mesh's
//! back faces sampling the back target, into the front target. The last
//! draws the front faces sampling the front target, to the screen. The steps
//! of the first two passes are the data table [`RefractionStep::SEQUENCE`].

use std::rc::Rc;

use winit::keyboard::KeyCode;

use crate::config::DisplacementConfig;
use crate::frame::{Demo, FrameContext, TargetSlot};
use crate::geometry::RawGeometry;
use crate::gpu::GpuContext;
use crate::input::Input;
use crate::mesh::Mesh;
use crate::node_graph::GraphCache;
use crate::orbit_camera::OrbitCamera;
use crate::render_target::{DepthBuffer, RenderTarget};
use crate::scene_pass::{self, PipelineOptions, ScenePass, Side};
use crate::uniform::{Uniform, uniform_layout_entry};

/// Radius of the displaced icosahedron.
pub const MESH_RADIUS: f32 = 1.5;
/// Step applied to `scale_distortion` by the arrow keys.
pub const DISTORTION_STEP: f32 = 0.01;

/// One of the two offscreen targets the effect mesh samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefractionBuffer {
    Back,
    Front,
}

impl RefractionBuffer {
    pub const fn slot(self) -> TargetSlot {
        match self {
            RefractionBuffer::Back => TargetSlot::Offscreen("back"),
            RefractionBuffer::Front => TargetSlot::Offscreen("front"),
        }
    }

    pub fn from_slot(slot: TargetSlot) -> Option<Self> {
        [RefractionBuffer::Back, RefractionBuffer::Front]
            .into_iter()
            .find(|buffer| buffer.slot() == slot)
    }
}

/// One step of the per-frame refraction sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefractionStep {
    HideEffect,
    /// Make the mesh visible, drawing `side` and sampling `sample`.
    ShowEffect { side: Side, sample: RefractionBuffer },
    SetTarget(TargetSlot),
    /// Render the scene into the current target.
    Render,
}

impl RefractionStep {
    /// Runs before the presentation render, which then draws the front faces
    /// sampling the front target.
    pub const SEQUENCE: [RefractionStep; 8] = [
        RefractionStep::HideEffect,
        RefractionStep::SetTarget(RefractionBuffer::Back.slot()),
        RefractionStep::Render,
        RefractionStep::ShowEffect {
            side: Side::Back,
            sample: RefractionBuffer::Back,
        },
        RefractionStep::SetTarget(RefractionBuffer::Front.slot()),
        RefractionStep::Render,
        RefractionStep::ShowEffect {
            side: Side::Front,
            sample: RefractionBuffer::Front,
        },
        RefractionStep::SetTarget(TargetSlot::Screen),
    ];
}

/// How the effect mesh is drawn in the next render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectState {
    pub visible: bool,
    pub side: Side,
    pub sample: RefractionBuffer,
}

impl Default for EffectState {
    fn default() -> Self {
        Self {
            visible: true,
            side: Side::Front,
            sample: RefractionBuffer::Front,
        }
    }
}

impl EffectState {
    /// Apply a step. Target switches and renders leave the state unchanged.
    pub fn apply(&mut self, step: RefractionStep) {
        match step {
            RefractionStep::HideEffect => self.visible = false,
            RefractionStep::ShowEffect { side, sample } => {
                *self = EffectState {
                    visible: true,
                    side,
                    sample,
                }
            }
            RefractionStep::SetTarget(_) | RefractionStep::Render => {}
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DisplacementParams {
    pub position: [f32; 3],
    pub time: f32,
    pub light_position: [f32; 3],
    pub scale_distortion: f32,
}

/// Bind groups sampling each refraction target.
struct TargetBindings {
    back: wgpu::BindGroup,
    front: wgpu::BindGroup,
}

impl TargetBindings {
    fn get(&self, buffer: RefractionBuffer) -> &wgpu::BindGroup {
        match buffer {
            RefractionBuffer::Back => &self.back,
            RefractionBuffer::Front => &self.front,
        }
    }
}

/// Mesh and pipelines for one subdivision level.
pub struct DisplacementGraph {
    pub params: Uniform<DisplacementParams>,
    mesh: Mesh,
    back_pipeline: wgpu::RenderPipeline,
    front_pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl DisplacementGraph {
    pub fn new(gpu: &GpuContext, scene: &ScenePass, detail: u32) -> Self {
        let params = Uniform::new(gpu, "Displacement Params", DisplacementParams::default());

        let layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Displacement Bind Group Layout"),
                entries: &[
                    uniform_layout_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Refraction Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let shader = ScenePass::shader(gpu, "Displacement Shader", include_str!("../shaders/displacement.wgsl"));
        let pipeline = |label, side| {
            scene.pipeline(
                gpu,
                &PipelineOptions {
                    label,
                    shader: &shader,
                    vertex_entry: "vs",
                    fragment_entry: "fs",
                    side,
                    targets: &[scene_pass::color_target(gpu.format())],
                    depth_write: true,
                    extra_layouts: &[&layout],
                },
            )
        };
        let back_pipeline = pipeline("Refraction Back Faces", Side::Back);
        let front_pipeline = pipeline("Refraction Front Faces", Side::Front);

        let mesh = RawGeometry::icosahedron(MESH_RADIUS, detail).upload(gpu, "Displaced Icosahedron");

        Self {
            params,
            mesh,
            back_pipeline,
            front_pipeline,
            layout,
            sampler,
        }
    }

    pub fn pipeline(&self, side: Side) -> &wgpu::RenderPipeline {
        match side {
            Side::Back => &self.back_pipeline,
            Side::Front | Side::Double => &self.front_pipeline,
        }
    }

    fn bind_target(&self, gpu: &GpuContext, target: &RenderTarget) -> wgpu::BindGroup {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(target.label()),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }
}

pub struct DisplacementDemo {
    config: DisplacementConfig,
    scene: ScenePass,
    depth: DepthBuffer,
    back: RenderTarget,
    front: RenderTarget,
    backdrop: Mesh,
    backdrop_pipeline: wgpu::RenderPipeline,
    cache: GraphCache<u32, DisplacementGraph>,
    bindings: Option<TargetBindings>,
}

impl DisplacementDemo {
    pub fn new(gpu: &GpuContext, config: DisplacementConfig) -> Self {
        let scene = ScenePass::new(gpu);
        let backdrop_pipeline = scene.backdrop_pipeline(gpu, Side::Double, false);
        Self {
            config,
            depth: DepthBuffer::new(gpu, "Displacement Depth"),
            back: RenderTarget::new(gpu, "Refraction Back"),
            front: RenderTarget::new(gpu, "Refraction Front"),
            backdrop: RawGeometry::uv_sphere(500.0, 16, 16).upload(gpu, "Displacement Backdrop"),
            backdrop_pipeline,
            scene,
            cache: GraphCache::new(),
            bindings: None,
        }
    }

    pub fn config(&self) -> &DisplacementConfig {
        &self.config
    }

    pub fn graph(&self) -> Option<&Rc<DisplacementGraph>> {
        self.cache.current()
    }

    pub fn builds(&self) -> u64 {
        self.cache.builds()
    }

    fn render_scene(&self, ctx: &mut FrameContext, graph: &DisplacementGraph, effect: EffectState) {
        let (view, depth) = match RefractionBuffer::from_slot(ctx.render_target()) {
            Some(RefractionBuffer::Back) => (&self.back.view, &self.back.depth),
            Some(RefractionBuffer::Front) => (&self.front.view, &self.front.depth),
            None => (ctx.screen(), &self.depth),
        };

        let mut encoder = ctx.create_encoder("Displacement Encoder");
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Displacement Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(scene_pass::BACKGROUND),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(depth.clear_attachment()),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, self.scene.bind_group(), &[]);
            render_pass.set_pipeline(&self.backdrop_pipeline);
            self.backdrop.draw(&mut render_pass, 0..1);

            if effect.visible
                && let Some(bindings) = &self.bindings
            {
                render_pass.set_pipeline(graph.pipeline(effect.side));
                render_pass.set_bind_group(1, bindings.get(effect.sample), &[]);
                graph.mesh.draw(&mut render_pass, 0..1);
            }
        }
        ctx.submit("displacement", encoder);
    }
}

impl Demo for DisplacementDemo {
    fn name(&self) -> &'static str {
        "displacement"
    }

    fn framing(&self) -> OrbitCamera {
        OrbitCamera::new()
    }

    fn handle_input(&mut self, input: &Input) {
        let before = self.config.scale_distortion;
        if input.key_pressed(KeyCode::ArrowUp) {
            self.config.scale_distortion += DISTORTION_STEP;
        }
        if input.key_pressed(KeyCode::ArrowDown) {
            self.config.scale_distortion -= DISTORTION_STEP;
        }
        if self.config.scale_distortion != before {
            log::info!("scale_distortion {before:.2} -> {:.2}", self.config.scale_distortion);
        }
    }

    fn frame(&mut self, ctx: &mut FrameContext) {
        let gpu = ctx.gpu;
        let scene = &self.scene;
        let lookup = self
            .cache
            .get_or_build(&self.config.detail, |detail| DisplacementGraph::new(gpu, scene, *detail));
        let fresh = lookup.is_fresh();
        let graph = lookup.into_graph();
        if fresh {
            log::info!("built displacement graph at detail {}", self.config.detail);
            self.bindings = None;
        }

        let back_resized = self.back.ensure_size(gpu);
        let front_resized = self.front.ensure_size(gpu);
        if back_resized || front_resized {
            log::debug!("refraction targets resized to {:?}", self.back.size());
            self.bindings = None;
        }
        self.depth.ensure_size(gpu, "Displacement Depth");
        if self.bindings.is_none() {
            self.bindings = Some(TargetBindings {
                back: graph.bind_target(gpu, &self.back),
                front: graph.bind_target(gpu, &self.front),
            });
        }

        graph.params.set(
            &gpu.queue,
            DisplacementParams {
                position: self.config.position,
                time: ctx.time,
                light_position: self.config.light_position,
                scale_distortion: self.config.scale_distortion,
            },
        );
        self.scene.update(gpu, ctx.camera, ctx.time);

        let mut effect = EffectState::default();
        for step in RefractionStep::SEQUENCE {
            effect.apply(step);
            match step {
                RefractionStep::SetTarget(slot) => ctx.set_render_target(slot),
                RefractionStep::Render => self.render_scene(ctx, &graph, effect),
                RefractionStep::HideEffect | RefractionStep::ShowEffect { .. } => {}
            }
        }
        self.render_scene(ctx, &graph, effect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameEvent;
    use crate::frame::testing::{headless_gpu, run_frame};

    fn small_config() -> DisplacementConfig {
        DisplacementConfig {
            detail: 2,
            ..DisplacementConfig::default()
        }
    }

    #[test]
    fn sequence_renders_back_then_front_then_returns_to_screen() {
        let targets: Vec<_> = RefractionStep::SEQUENCE
            .iter()
            .filter_map(|step| match step {
                RefractionStep::SetTarget(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(
            targets,
            [
                RefractionBuffer::Back.slot(),
                RefractionBuffer::Front.slot(),
                TargetSlot::Screen
            ]
        );

        let renders = RefractionStep::SEQUENCE
            .iter()
            .filter(|step| **step == RefractionStep::Render)
            .count();
        assert_eq!(renders, 2);
        assert_eq!(RefractionStep::SEQUENCE.last(), Some(&RefractionStep::SetTarget(TargetSlot::Screen)));
    }

    #[test]
    fn mesh_is_hidden_for_the_back_pass_only() {
        let mut effect = EffectState::default();
        let mut at_render = Vec::new();
        for step in RefractionStep::SEQUENCE {
            effect.apply(step);
            if step == RefractionStep::Render {
                at_render.push(effect);
            }
        }

        assert!(!at_render[0].visible);
        assert_eq!(
            at_render[1],
            EffectState {
                visible: true,
                side: Side::Back,
                sample: RefractionBuffer::Back,
            }
        );
        assert_eq!(effect, EffectState::default());
    }

    #[test]
    fn slots_map_back_to_buffers() {
        assert_eq!(
            RefractionBuffer::from_slot(TargetSlot::Offscreen("front")),
            Some(RefractionBuffer::Front)
        );
        assert_eq!(RefractionBuffer::from_slot(TargetSlot::Screen), None);
    }

    #[test]
    fn frame_renders_two_offscreen_passes_before_the_screen() {
        let Some(gpu) = headless_gpu() else { return };
        let mut demo = DisplacementDemo::new(&gpu, small_config());

        let events = run_frame(&gpu, &mut demo, 0.0);
        let back = RefractionBuffer::Back.slot();
        let front = RefractionBuffer::Front.slot();
        assert_eq!(
            events,
            [
                FrameEvent::SetRenderTarget(back),
                FrameEvent::Render {
                    label: "displacement",
                    target: back,
                },
                FrameEvent::SetRenderTarget(front),
                FrameEvent::Render {
                    label: "displacement",
                    target: front,
                },
                FrameEvent::SetRenderTarget(TargetSlot::Screen),
                FrameEvent::Render {
                    label: "displacement",
                    target: TargetSlot::Screen,
                },
            ]
        );
    }

    #[test]
    fn distortion_keys_write_the_uniform_without_rebuilding() {
        let Some(gpu) = headless_gpu() else { return };
        let mut demo = DisplacementDemo::new(&gpu, small_config());
        run_frame(&gpu, &mut demo, 0.0);
        let first = Rc::clone(demo.graph().expect("graph built"));

        let mut input = Input::new();
        input.press(KeyCode::ArrowUp);
        demo.handle_input(&input);
        run_frame(&gpu, &mut demo, 0.1);

        assert_eq!(demo.builds(), 1);
        assert!(Rc::ptr_eq(&first, demo.graph().expect("graph built")));
        let params = first.params.get();
        assert!((params.scale_distortion - 0.06).abs() < 1e-6);
        assert_eq!(params.time, 0.1);
        assert_eq!(params.light_position, [10.0, 10.0, 10.0]);
    }
}
