//! # Sketchbook
//!
//! **GPU compute and render sketches on wgpu.**
//!
//! Four small demos share one frame driver:
//!
//! - `instancing`: a grid of icosahedra laid out by a compute kernel and
//!   animated by a sine wave in the vertex shader.
//! - `particles`: hundreds of thousands of sprites advected along the Thomas
//!   attractor by a per-frame compute kernel.
//! - `displacement`: a noise-displaced icosahedron refracting the scene
//!   behind it through two offscreen render targets.
//! - `edges`: Sobel outlines from depth and normals, computed into a storage
//!   image and composited over the scene.
//!
//! Each demo memoizes its kernels, buffers and pipelines in a
//! [`GraphCache`] keyed on its configuration. A fresh bundle runs its
//! initialization kernel once, awaited; per-frame kernels are submitted
//! without waiting.
//!
//! ```no_run
//! use sketchbook::{CliArgs, run};
//!
//! let args = CliArgs::parse(["particles".to_string()]).expect("valid arguments");
//! run(args).expect("demo ran");
//! ```

mod app;
mod camera;
mod compute;
mod config;
pub mod demos;
mod error;
mod frame;
mod geometry;
mod gpu;
mod input;
mod mesh;
mod node_graph;
mod orbit_camera;
mod post_process;
mod render_target;
mod scene_pass;
mod storage;
mod uniform;

pub use app::run;
pub use camera::Camera;
pub use compute::{ComputeKernel, KernelBinding, KernelDescriptor};
pub use config::{
    AppConfig, CliArgs, ConfigError, DemoConfig, DemoKind, DisplacementConfig, InstancingConfig,
    ParticlesConfig, Settings,
};
pub use error::{AppError, DispatchError, GpuError, ReadbackError};
pub use frame::{Demo, DispatchWait, FrameClock, FrameContext, FrameEvent, FrameTime, TargetSlot};
pub use geometry::RawGeometry;
pub use gpu::GpuContext;
pub use input::Input;
pub use mesh::{Mesh, Vertex3d};
pub use node_graph::{GraphCache, Lookup};
pub use orbit_camera::OrbitCamera;
pub use post_process::EdgeComposite;
pub use render_target::{DepthBuffer, RenderTarget};
pub use scene_pass::{ScenePass, SceneUniforms, Side};
pub use storage::{InstanceBuffer, StorageImage};
pub use uniform::{Uniform, UniformCell};

// Re-export glam math types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};

// Re-export commonly used winit types for convenience
pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;
