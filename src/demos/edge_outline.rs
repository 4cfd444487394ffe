//! Sobel outlines composited over a lit cube.
//!
//! The scene renders colour, view-space normals and depth offscreen. A
//! compute kernel runs Sobel over depth and normals into a single-channel
//! edge image, and a fullscreen pass darkens the scene colour by it.
//!
//! The kernel is dispatched before the scene pass of the same frame, so it
//! reads the depth and normals the previous frame left behind.

use std::rc::Rc;

use crate::compute::{self, ComputeKernel, KernelBinding, KernelDescriptor};
use crate::frame::{Demo, FrameContext, TargetSlot};
use crate::geometry::RawGeometry;
use crate::gpu::GpuContext;
use crate::mesh::Mesh;
use crate::node_graph::GraphCache;
use crate::orbit_camera::OrbitCamera;
use crate::post_process::EdgeComposite;
use crate::render_target::RenderTarget;
use crate::scene_pass::{self, ScenePass, Side};
use crate::storage::StorageImage;
use crate::uniform::Uniform;

/// Outline thickness in texels at a pixel ratio of 1.
pub const OUTLINE_THICKNESS: f32 = 1.675;
/// Peak jitter of the sample positions, in texels.
pub const JITTER: f32 = 1.2;

const SCENE_SLOT: TargetSlot = TargetSlot::Offscreen("edge_scene");

/// View-space depth (negative in front of the camera) remapped to `[0, 1]`
/// between the clip planes. Mirrors `linear_depth` in the scene shaders.
pub fn orthographic_depth(view_z: f32, near: f32, far: f32) -> f32 {
    (view_z + near) / (near - far)
}

/// Sobel gradient magnitude of a 3x3 neighbourhood, `samples[row][col]`
/// with row 0 at the top. Mirrors the edge kernel.
pub fn sobel(samples: [[f32; 3]; 3]) -> f32 {
    let [[a, b, c], [d, _, f], [g, h, i]] = samples;
    let gx = -a + c - 2.0 * d + 2.0 * f - g + i;
    let gy = -a - 2.0 * b - c + g + 2.0 * h + i;
    (gx * gx + gy * gy).sqrt()
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EdgeParams {
    pub thickness: f32,
    pub jitter: f32,
    pub _padding: [f32; 2],
}

/// A viewport-sized colour attachment the edge kernel reads back.
fn scene_attachment(gpu: &GpuContext, label: &str, format: wgpu::TextureFormat) -> (wgpu::Texture, wgpu::TextureView) {
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
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Viewport-sized targets and the kernel reading them.
pub struct EdgeGraph {
    pub scene: RenderTarget,
    pub normal_texture: wgpu::Texture,
    pub normals: wgpu::TextureView,
    pub depth_texture: wgpu::Texture,
    pub depth: wgpu::TextureView,
    pub edges: StorageImage,
    pub params: Uniform<EdgeParams>,
    pub detect: ComputeKernel,
    composite: wgpu::BindGroup,
}

impl EdgeGraph {
    pub fn new(gpu: &GpuContext, composite: &EdgeComposite) -> Self {
        let scene = RenderTarget::new(gpu, "Edge Scene");
        let (normal_texture, normals) = scene_attachment(gpu, "Edge Scene Normals", scene_pass::NORMAL_FORMAT);
        let (depth_texture, depth) = scene_attachment(gpu, "Edge Scene Depth", scene_pass::LINEAR_DEPTH_FORMAT);
        let edges = StorageImage::new(gpu, "Edge Magnitude");

        let params = Uniform::new(
            gpu,
            "Edge Params",
            EdgeParams {
                thickness: OUTLINE_THICKNESS * gpu.scale_factor,
                jitter: JITTER,
                _padding: [0.0; 2],
            },
        );

        let shader = compute::shader(gpu, "Edge Detect", include_str!("../shaders/edge_detect.wgsl"));
        let (width, height) = edges.size();
        let detect = ComputeKernel::new(
            gpu,
            &KernelDescriptor {
                label: "edge_detect",
                shader: &shader,
                entry_point: "main",
                bindings: &[
                    KernelBinding::Texture {
                        view: &depth,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    KernelBinding::Texture {
                        view: &normals,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    KernelBinding::Uniform(params.binding()),
                    KernelBinding::StorageTexture {
                        view: &edges.view,
                        format: StorageImage::FORMAT,
                    },
                ],
                workgroups: compute::tiled_workgroups(width, height),
            },
        );

        let composite = composite.create_bind_group(gpu, &scene.view, &edges.view);

        Self {
            scene,
            normal_texture,
            normals,
            depth_texture,
            depth,
            edges,
            params,
            detect,
            composite,
        }
    }
}

pub struct EdgeOutlineDemo {
    scene: ScenePass,
    composite: EdgeComposite,
    backdrop: Mesh,
    backdrop_pipeline: wgpu::RenderPipeline,
    cube: Mesh,
    cube_pipeline: wgpu::RenderPipeline,
    cache: GraphCache<(u32, u32), EdgeGraph>,
}

impl EdgeOutlineDemo {
    pub fn new(gpu: &GpuContext) -> Self {
        let scene = ScenePass::new(gpu);
        Self {
            composite: EdgeComposite::new(gpu),
            backdrop: RawGeometry::uv_sphere(50.0, 16, 16).upload(gpu, "Edge Backdrop"),
            backdrop_pipeline: scene.backdrop_pipeline(gpu, Side::Back, true),
            cube: RawGeometry::cube(1.0).upload(gpu, "Edge Cube"),
            cube_pipeline: scene.lit_pipeline(gpu, Side::Front, true),
            scene,
            cache: GraphCache::new(),
        }
    }

    pub fn graph(&self) -> Option<&Rc<EdgeGraph>> {
        self.cache.current()
    }

    pub fn builds(&self) -> u64 {
        self.cache.builds()
    }

    fn render_scene(&self, ctx: &mut FrameContext, graph: &EdgeGraph) {
        let mut encoder = ctx.create_encoder("Edge Scene Encoder");
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Edge Scene Pass"),
                color_attachments: &[
                    Some(wgpu::RenderPassColorAttachment {
                        view: &graph.scene.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(scene_pass::BACKGROUND),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    }),
                    Some(wgpu::RenderPassColorAttachment {
                        view: &graph.normals,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    }),
                    Some(wgpu::RenderPassColorAttachment {
                        view: &graph.depth,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    }),
                ],
                depth_stencil_attachment: Some(graph.scene.depth.clear_attachment()),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, self.scene.bind_group(), &[]);
            render_pass.set_pipeline(&self.backdrop_pipeline);
            self.backdrop.draw(&mut render_pass, 0..1);
            render_pass.set_pipeline(&self.cube_pipeline);
            self.cube.draw(&mut render_pass, 0..1);
        }
        ctx.submit("edge_scene", encoder);
    }

    fn render_composite(&self, ctx: &mut FrameContext, graph: &EdgeGraph) {
        let mut encoder = ctx.create_encoder("Edge Composite Encoder");
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Edge Composite Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: ctx.screen(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.composite.render(&mut render_pass, &graph.composite);
        }
        ctx.submit("edge_composite", encoder);
    }
}

impl Demo for EdgeOutlineDemo {
    fn name(&self) -> &'static str {
        "edges"
    }

    fn framing(&self) -> OrbitCamera {
        OrbitCamera::new()
    }

    fn frame(&mut self, ctx: &mut FrameContext) {
        let gpu = ctx.gpu;
        let composite = &self.composite;
        let lookup = self
            .cache
            .get_or_build(&(gpu.width(), gpu.height()), |_| EdgeGraph::new(gpu, composite));
        if lookup.is_fresh() {
            log::info!("built edge graph for {}x{}", gpu.width(), gpu.height());
        }
        let graph = lookup.into_graph();

        graph.params.update(&gpu.queue, |params| {
            params.thickness = OUTLINE_THICKNESS * gpu.scale_factor;
        });
        self.scene.update(gpu, ctx.camera, ctx.time);

        ctx.dispatch(&graph.detect);
        ctx.set_render_target(SCENE_SLOT);
        self.render_scene(ctx, &graph);
        ctx.set_render_target(TargetSlot::Screen);
        self.render_composite(ctx, &graph);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::testing::{headless_gpu, run_frame};
    use crate::frame::{DispatchWait, FrameEvent};

    #[test]
    fn flat_neighbourhood_has_no_edge() {
        assert!(sobel([[0.3; 3]; 3]) < 1e-6);
    }

    #[test]
    fn vertical_step_is_detected_horizontally() {
        let step = [[0.0, 0.0, 1.0], [0.0, 0.0, 1.0], [0.0, 0.0, 1.0]];
        assert_eq!(sobel(step), 4.0);

        let transposed = [[0.0; 3], [0.0; 3], [1.0; 3]];
        assert_eq!(sobel(transposed), 4.0);
    }

    #[test]
    fn orthographic_depth_spans_the_clip_planes() {
        assert!(orthographic_depth(-0.1, 0.1, 1000.0).abs() < 1e-6);
        assert!((orthographic_depth(-1000.0, 0.1, 1000.0) - 1.0).abs() < 1e-6);
        let mid = orthographic_depth(-500.05, 0.1, 1000.0);
        assert!((mid - 0.5).abs() < 1e-4);
    }

    #[test]
    fn edges_are_written_before_the_composite_reads_them() {
        let Some(gpu) = headless_gpu() else { return };
        let mut demo = EdgeOutlineDemo::new(&gpu);

        let events = run_frame(&gpu, &mut demo, 0.0);
        assert_eq!(
            events,
            [
                FrameEvent::Dispatch {
                    kernel: "edge_detect",
                    wait: DispatchWait::FireAndForget,
                },
                FrameEvent::SetRenderTarget(SCENE_SLOT),
                FrameEvent::Render {
                    label: "edge_scene",
                    target: SCENE_SLOT,
                },
                FrameEvent::SetRenderTarget(TargetSlot::Screen),
                FrameEvent::Render {
                    label: "edge_composite",
                    target: TargetSlot::Screen,
                },
            ]
        );
    }

    #[test]
    fn kernel_reads_color_targets_only() {
        let Some(gpu) = headless_gpu() else { return };
        let mut demo = EdgeOutlineDemo::new(&gpu);

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        run_frame(&gpu, &mut demo, 0.0);
        let error = pollster::block_on(gpu.device.pop_error_scope());
        assert!(error.is_none(), "edge frame raised {error:?}");

        let graph = demo.graph().expect("graph built");
        assert_eq!(graph.depth_texture.format(), scene_pass::LINEAR_DEPTH_FORMAT);
        assert_eq!(graph.normal_texture.format(), scene_pass::NORMAL_FORMAT);
    }

    #[test]
    fn graph_follows_the_viewport() {
        let Some(mut gpu) = headless_gpu() else { return };
        let mut demo = EdgeOutlineDemo::new(&gpu);

        run_frame(&gpu, &mut demo, 0.0);
        run_frame(&gpu, &mut demo, 0.1);
        assert_eq!(demo.builds(), 1);

        gpu.resize(32, 16);
        run_frame(&gpu, &mut demo, 0.2);
        assert_eq!(demo.builds(), 2);

        let graph = demo.graph().expect("graph built");
        assert_eq!(graph.edges.size(), (32, 16));
        assert_eq!(graph.scene.size(), (32, 16));
        assert_eq!(graph.detect.workgroups(), [4, 2, 1]);
    }
}
