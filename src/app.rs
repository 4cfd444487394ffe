use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::{CliArgs, DemoKind, Settings};
use crate::demos;
use crate::error::AppError;
use crate::frame::{Demo, FrameClock, FrameContext};
use crate::gpu::GpuContext;
use crate::input::Input;
use crate::orbit_camera::OrbitCamera;

/// Number keys selecting each entry of [`DemoKind::ALL`].
const DEMO_KEYS: [KeyCode; 4] = [KeyCode::Digit1, KeyCode::Digit2, KeyCode::Digit3, KeyCode::Digit4];

/// Open a window and run the demo named on the command line until it closes.
///
/// Keys `1` to `4` switch between demos at runtime.
pub fn run(args: CliArgs) -> Result<(), AppError> {
    let settings = args.settings()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = SketchbookApp::Pending {
        settings,
        kind: args.demo,
    };
    event_loop.run_app(&mut app)?;

    match app {
        SketchbookApp::Failed(e) => Err(e),
        _ => Ok(()),
    }
}

enum SketchbookApp {
    Pending {
        settings: Settings,
        kind: DemoKind,
    },
    Running {
        window: Arc<Window>,
        gpu: GpuContext,
        settings: Settings,
        input: Input,
        orbit: OrbitCamera,
        clock: FrameClock,
        kind: DemoKind,
        demo: Box<dyn Demo>,
    },
    Failed(AppError),
}

impl SketchbookApp {
    fn start(event_loop: &ActiveEventLoop, settings: &Settings, kind: DemoKind) -> Result<Self, AppError> {
        let window_attrs = WindowAttributes::default()
            .with_title(&settings.window.title)
            .with_inner_size(winit::dpi::LogicalSize::new(
                settings.window.width,
                settings.window.height,
            ));

        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let gpu = GpuContext::new(window.clone())?;
        log::info!(
            "surface {}x{} {:?} at scale {}",
            gpu.width(),
            gpu.height(),
            gpu.format(),
            gpu.scale_factor
        );

        let demo = demos::create(&gpu, &settings.demo(kind));
        log::info!("running demo '{}'", demo.name());

        Ok(SketchbookApp::Running {
            window,
            orbit: demo.framing(),
            gpu,
            settings: settings.clone(),
            input: Input::new(),
            clock: FrameClock::new(),
            kind,
            demo,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: AppError) {
        log::error!("{error}");
        event_loop.exit();
        *self = SketchbookApp::Failed(error);
    }
}

impl ApplicationHandler for SketchbookApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let SketchbookApp::Pending { settings, kind } = self {
            match Self::start(event_loop, settings, *kind) {
                Ok(running) => *self = running,
                Err(e) => self.fail(event_loop, e),
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let SketchbookApp::Running {
            window,
            gpu,
            settings,
            input,
            orbit,
            clock,
            kind,
            demo,
        } = self
        else {
            return;
        };

        input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                gpu.resize(size.width, size.height);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                gpu.scale_factor = scale_factor as f32;
            }
            WindowEvent::RedrawRequested => {
                // A skipped frame leaves this frame's input for the next one.
                let frame = match acquire_frame(gpu) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        window.request_redraw();
                        return;
                    }
                    Err(e) => {
                        self.fail(event_loop, e.into());
                        return;
                    }
                };

                if let Some(next) = requested_demo(input, *kind) {
                    *demo = demos::create(gpu, &settings.demo(next));
                    *orbit = demo.framing();
                    *kind = next;
                    log::info!("switched to demo '{}'", demo.name());
                }
                consume_input(input, orbit, &mut **demo);
                let time = clock.tick();

                let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
                let camera = orbit.camera();

                let mut ctx = FrameContext::new(gpu, &camera, &view, time);
                demo.frame(&mut ctx);
                log::trace!("frame issued {} GPU actions", ctx.events().len());

                window.pre_present_notify();
                frame.present();
                window.request_redraw();
            }
            _ => {}
        }
    }
}

/// The demo selected by a number key this frame, if it differs from `current`.
fn requested_demo(input: &Input, current: DemoKind) -> Option<DemoKind> {
    DEMO_KEYS
        .iter()
        .zip(DemoKind::ALL)
        .find(|(key, kind)| input.key_pressed(**key) && *kind != current)
        .map(|(_, kind)| kind)
}

/// Hand this frame's input to the camera and the demo, then clear the
/// per-frame edges so each press is seen once.
fn consume_input(input: &mut Input, orbit: &mut OrbitCamera, demo: &mut dyn Demo) {
    orbit.update(input);
    demo.handle_input(input);
    input.begin_frame();
}

/// Next surface texture, or `None` when this frame should be skipped.
///
/// A lost or outdated surface is reconfigured and the frame skipped.
fn acquire_frame(gpu: &GpuContext) -> Result<Option<wgpu::SurfaceTexture>, wgpu::SurfaceError> {
    let Some(surface) = &gpu.surface else {
        return Ok(None);
    };
    match surface.get_current_texture() {
        Ok(frame) => Ok(Some(frame)),
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            log::debug!("surface lost or outdated, reconfiguring");
            surface.configure(&gpu.device, &gpu.config);
            Ok(None)
        }
        Err(wgpu::SurfaceError::Timeout) => {
            log::debug!("surface timeout, skipping frame");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_keys_pick_other_demos() {
        let mut input = Input::new();
        input.press(KeyCode::Digit3);
        assert_eq!(
            requested_demo(&input, DemoKind::Instancing),
            Some(DemoKind::Displacement)
        );
        assert_eq!(requested_demo(&input, DemoKind::Displacement), None);
        assert_eq!(requested_demo(&Input::new(), DemoKind::Particles), None);
    }

    #[test]
    fn each_press_reaches_the_demo_once() {
        use crate::config::InstancingConfig;
        use crate::demos::InstancingDemo;
        use crate::frame::testing::headless_gpu;

        let Some(gpu) = headless_gpu() else { return };
        assert!(matches!(acquire_frame(&gpu), Ok(None)));

        let mut demo = InstancingDemo::new(&gpu, InstancingConfig { count: 100 });
        let mut orbit = demo.framing();
        let mut input = Input::new();
        input.press(KeyCode::ArrowUp);

        consume_input(&mut input, &mut orbit, &mut demo);
        consume_input(&mut input, &mut orbit, &mut demo);
        assert_eq!(demo.config().count, 200);
    }
}
