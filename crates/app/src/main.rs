//! Engine demo - main entry point.
//!
//! Opens a window, builds the engine with the demo scene and runs a fly
//! camera over it. WASD moves, Space and Shift move up and down, dragging
//! with the right mouse button looks around and Escape quits.

use anyhow::{Context, Result};
use glam::Vec2;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use engine_core::{EngineConfig, FixedTimestep, Timer};
use engine_platform::{InputState, MouseButton, Window};
use engine_renderer::Engine;
use engine_scene::PlayerCamera;

const CONFIG_PATH: &str = "engine.toml";

struct App {
    config: EngineConfig,
    // Engine before window: the surface must go before the window it wraps.
    engine: Option<Engine>,
    window: Option<Window>,
    input: InputState,
    camera: PlayerCamera,
    timer: Timer,
    fixed: FixedTimestep,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            fixed: FixedTimestep::new(config.fixed_update_hz),
            config,
            engine: None,
            window: None,
            input: InputState::new(),
            camera: PlayerCamera::default(),
            timer: Timer::new(),
        }
    }

    /// Runs the fixed ticks due since the last redraw, then draws once if
    /// any ran.
    fn tick(&mut self, event_loop: &ActiveEventLoop) {
        let ticks = self.fixed.advance(self.timer.tick());
        if ticks == 0 {
            return;
        }

        let dt = self.fixed.step().as_secs_f32();
        let viewport_height = self
            .window
            .as_ref()
            .map_or(1.0, |window| window.extent().height as f32);
        let look = self.input.is_mouse_pressed(MouseButton::Right);
        let pointer = self.input.take_pointer_delta();

        for tick in 0..ticks {
            // the pointer delta belongs to the first tick only
            let delta = if look && tick == 0 { pointer } else { Vec2::ZERO };
            self.camera
                .apply_input(self.input.movement_intent(), delta, viewport_height, dt);
        }
        self.input.begin_frame();

        if let Some(engine) = self.engine.as_mut()
            && let Err(e) = engine.draw(&self.camera)
        {
            error!("Draw failed, exiting: {}", e);
            event_loop.exit();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Engine::new(&window, self.config.clone()) {
            Ok(engine) => {
                info!("Initialization complete, entering main loop");
                self.engine = Some(engine);
                self.window = Some(window);
                self.timer.reset();
            }
            Err(e) => {
                error!("Failed to create engine: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.resize(size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::RedrawRequested => self.tick(event_loop),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        if key == KeyCode::Escape {
                            event_loop.exit();
                        }
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = MouseButton::from(button);
                if state.is_pressed() {
                    self.input.on_mouse_pressed(button);
                } else {
                    self.input.on_mouse_released(button);
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.input.on_pointer_motion(dx as f32, dy as f32);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // The engine waits for the GPU on drop; do it while the window lives.
        self.engine = None;
    }
}

fn main() -> Result<()> {
    let config = EngineConfig::load_or_default(CONFIG_PATH)
        .with_context(|| format!("Failed to read {}", CONFIG_PATH))?;

    match config.log_filter.as_deref() {
        Some(filter) => engine_core::init_logging_with_filter(filter),
        None => engine_core::init_logging(),
    }
    config.validate().context("Invalid engine configuration")?;
    info!("Starting engine demo");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
