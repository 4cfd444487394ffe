//! Shared scene rendering: camera and light uniforms, pipeline construction
//! and the two stock materials (gradient backdrop and plain lit surface).
//!
//! # Architecture
//!
//! Every mesh pipeline in the crate uses the same group 0: a single
//! [`SceneUniforms`] buffer holding the camera matrices, the directional
//! light and the clip planes. Demo-specific resources go in group 1 and up.
//!
//! Demo shaders are written against the declarations in
//! `shaders/scene_common.wgsl` (the `scene` uniform, `VertexInput`, the
//! lighting and tone mapping helpers). [`ScenePass::shader`] prepends that
//! file to a demo's WGSL before compiling it.
//!
//! # Lighting
//!
//! One ambient term (2.5) and one directional light shining from
//! (10, 10, 10) towards the origin with intensity 5. Surfaces are Lambert
//! diffuse plus a normalized Blinn-Phong highlight, tone mapped with a
//! filmic curve before output.

use glam::Vec3;

use crate::camera::Camera;
use crate::gpu::GpuContext;
use crate::mesh::Vertex3d;
use crate::render_target::DEPTH_FORMAT;
use crate::uniform::{Uniform, uniform_layout_entry};

const SCENE_COMMON: &str = include_str!("shaders/scene_common.wgsl");

/// Clear colour behind every demo (`#333333`, converted to linear).
pub const BACKGROUND: wgpu::Color = wgpu::Color {
    r: 0.033_104_76,
    g: 0.033_104_76,
    b: 0.033_104_76,
    a: 1.0,
};

/// Format of the view-space normal target written by the MRT materials.
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Format of the linear depth target written by the MRT materials.
/// Holds view depth remapped to `[0, 1]` between the clip planes.
pub const LINEAR_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

pub const AMBIENT_INTENSITY: f32 = 2.5;
pub const LIGHT_POSITION: Vec3 = Vec3::new(10.0, 10.0, 10.0);
pub const LIGHT_INTENSITY: f32 = 5.0;

/// Camera, light and timing data, uploaded once per frame.
///
/// Layout matches `struct Scene` in `scene_common.wgsl` (256 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub time: f32,
    pub light_position: [f32; 3],
    pub light_intensity: f32,
    pub resolution: [f32; 2],
    pub near: f32,
    pub far: f32,
    pub ambient: f32,
    pub pixel_ratio: f32,
    pub _padding: [f32; 2],
}

impl SceneUniforms {
    pub fn new(camera: &Camera, width: u32, height: u32, pixel_ratio: f32, time: f32) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        let view = camera.view_matrix();
        let proj = camera.projection_matrix(aspect);

        Self {
            view_proj: (proj * view).to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            camera_position: camera.position.to_array(),
            time,
            light_position: LIGHT_POSITION.to_array(),
            light_intensity: LIGHT_INTENSITY,
            resolution: [width as f32, height as f32],
            near: camera.near,
            far: camera.far,
            ambient: AMBIENT_INTENSITY,
            pixel_ratio,
            _padding: [0.0; 2],
        }
    }
}

/// Which faces a material draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
    Double,
}

impl Side {
    pub fn cull_mode(self) -> Option<wgpu::Face> {
        match self {
            Side::Front => Some(wgpu::Face::Back),
            Side::Back => Some(wgpu::Face::Front),
            Side::Double => None,
        }
    }
}

/// Parameters for [`ScenePass::pipeline`].
pub struct PipelineOptions<'a> {
    pub label: &'static str,
    pub shader: &'a wgpu::ShaderModule,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
    pub side: Side,
    pub targets: &'a [Option<wgpu::ColorTargetState>],
    pub depth_write: bool,
    /// Bind group layouts for groups 1 and up.
    pub extra_layouts: &'a [&'a wgpu::BindGroupLayout],
}

/// Colour target in the given format with standard alpha blending.
pub fn color_target(format: wgpu::TextureFormat) -> Option<wgpu::ColorTargetState> {
    Some(wgpu::ColorTargetState {
        format,
        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
        write_mask: wgpu::ColorWrites::ALL,
    })
}

/// Owner of the scene uniform buffer and the stock materials.
pub struct ScenePass {
    uniforms: Uniform<SceneUniforms>,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    stock: wgpu::ShaderModule,
}

impl ScenePass {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let uniforms = Uniform::new(
            gpu,
            "Scene Uniforms",
            SceneUniforms::new(&Camera::default(), gpu.width(), gpu.height(), gpu.scale_factor, 0.0),
        );

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &[uniform_layout_entry(
                0,
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            )],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.binding(),
            }],
        });

        let stock = Self::shader(gpu, "Scene Materials", include_str!("shaders/scene.wgsl"));

        Self {
            uniforms,
            layout,
            bind_group,
            stock,
        }
    }

    /// Compile a WGSL body with the shared scene declarations prepended.
    pub fn shader(gpu: &GpuContext, label: &str, body: &str) -> wgpu::ShaderModule {
        gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(format!("{SCENE_COMMON}\n{body}").into()),
        })
    }

    /// Upload this frame's camera and time.
    pub fn update(&self, gpu: &GpuContext, camera: &Camera, time: f32) {
        self.uniforms.set(
            &gpu.queue,
            SceneUniforms::new(camera, gpu.width(), gpu.height(), gpu.scale_factor, time),
        );
    }

    pub fn uniforms(&self) -> &Uniform<SceneUniforms> {
        &self.uniforms
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Build a mesh pipeline reading [`Vertex3d`] with the scene bind group at group 0.
    pub fn pipeline(&self, gpu: &GpuContext, options: &PipelineOptions) -> wgpu::RenderPipeline {
        let mut layouts = vec![&self.layout];
        layouts.extend_from_slice(options.extra_layouts);

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(options.label),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        gpu.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(options.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: options.shader,
                    entry_point: Some(options.vertex_entry),
                    buffers: &[Vertex3d::LAYOUT],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: options.shader,
                    entry_point: Some(options.fragment_entry),
                    targets: options.targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: options.side.cull_mode(),
                    front_face: wgpu::FrontFace::Ccw,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: options.depth_write,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }

    /// Gradient backdrop material, unlit.
    ///
    /// With `with_normals` the pipeline also writes view-space normals to a
    /// second target of [`NORMAL_FORMAT`] and linear depth to a third of
    /// [`LINEAR_DEPTH_FORMAT`].
    pub fn backdrop_pipeline(&self, gpu: &GpuContext, side: Side, with_normals: bool) -> wgpu::RenderPipeline {
        let entry = if with_normals { "fs_backdrop_mrt" } else { "fs_backdrop" };
        self.stock_pipeline(gpu, "Backdrop Pipeline", entry, side, with_normals)
    }

    /// Plain white lit material.
    pub fn lit_pipeline(&self, gpu: &GpuContext, side: Side, with_normals: bool) -> wgpu::RenderPipeline {
        let entry = if with_normals { "fs_lit_mrt" } else { "fs_lit" };
        self.stock_pipeline(gpu, "Lit Pipeline", entry, side, with_normals)
    }

    fn stock_pipeline(
        &self,
        gpu: &GpuContext,
        label: &'static str,
        fragment_entry: &'static str,
        side: Side,
        with_normals: bool,
    ) -> wgpu::RenderPipeline {
        let all_targets = [
            color_target(gpu.format()),
            Some(wgpu::ColorTargetState {
                format: NORMAL_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
            Some(wgpu::ColorTargetState {
                format: LINEAR_DEPTH_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
        ];
        let targets = if with_normals {
            &all_targets[..]
        } else {
            &all_targets[..1]
        };

        self.pipeline(
            gpu,
            &PipelineOptions {
                label,
                shader: &self.stock,
                vertex_entry: "vs_surface",
                fragment_entry,
                side,
                targets,
                depth_write: true,
                extra_layouts: &[],
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<SceneUniforms>(), 256);
        assert_eq!(std::mem::offset_of!(SceneUniforms, camera_position), 192);
        assert_eq!(std::mem::offset_of!(SceneUniforms, resolution), 224);
    }

    #[test]
    fn uniforms_carry_camera_clip_planes() {
        let camera = Camera::default();
        let uniforms = SceneUniforms::new(&camera, 800, 600, 2.0, 1.5);
        assert_eq!(uniforms.near, 0.1);
        assert_eq!(uniforms.far, 1000.0);
        assert_eq!(uniforms.pixel_ratio, 2.0);
        assert_eq!(uniforms.resolution, [800.0, 600.0]);
    }

    #[test]
    fn back_side_culls_front_faces() {
        assert_eq!(Side::Back.cull_mode(), Some(wgpu::Face::Front));
        assert_eq!(Side::Double.cull_mode(), None);
    }
}
