//! The four demos and the registry the host picks them from.

pub mod displacement;
pub mod edge_outline;
pub mod instancing;
pub mod particles;

pub use displacement::DisplacementDemo;
pub use edge_outline::EdgeOutlineDemo;
pub use instancing::InstancingDemo;
pub use particles::ParticlesDemo;

use crate::config::DemoConfig;
use crate::frame::Demo;
use crate::gpu::GpuContext;

/// Construct the demo described by `config`.
///
/// Kernel bundles are built lazily on the demo's first frame, so this only
/// allocates the scene uniforms and size-dependent targets.
pub fn create(gpu: &GpuContext, config: &DemoConfig) -> Box<dyn Demo> {
    match config.clone() {
        DemoConfig::Instancing(c) => Box::new(InstancingDemo::new(gpu, c)),
        DemoConfig::Particles(c) => Box::new(ParticlesDemo::new(gpu, c)),
        DemoConfig::Displacement(c) => Box::new(DisplacementDemo::new(gpu, c)),
        DemoConfig::EdgeOutline => Box::new(EdgeOutlineDemo::new(gpu)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DemoKind, Settings};
    use crate::frame::testing::headless_gpu;

    #[test]
    fn every_kind_creates_the_matching_demo() {
        let Some(gpu) = headless_gpu() else { return };
        let settings = Settings::default();
        for kind in DemoKind::ALL {
            let demo = create(&gpu, &settings.demo(kind));
            assert_eq!(demo.name(), kind.name());
        }
    }
}
