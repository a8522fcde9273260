mod camera;
mod panel;
mod ui_bridge;
mod windows;

use anyhow::{Context as _, Result};
use camera::FlyCamera;
use clap::Parser;
use egui::Context as EguiContext;
use glam::{UVec2, Vec3};
use panel::FrameInfo;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use swarm_assets::{SceneDesc, SceneHandles};
use swarm_render::{
    AppWindow, RendererBackend, RendererConfig, WindowDesc, WorldKey, SHADOW_RESOLUTION,
};
use swarm_render_wgpu::WgpuDevice;
use tracing_subscriber::EnvFilter;
use windows::WinitWindows;
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "swarm-viewer", about = "Swarm scene viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Window width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Window height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Scene description (JSON); the demo scene when omitted
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Shadow map resolution per light
    #[arg(long, default_value_t = SHADOW_RESOLUTION)]
    shadow_resolution: u32,

    /// Disable the egui overlay
    #[arg(long)]
    no_ui: bool,
}

/// Everything that exists once the renderer is up.
struct Viewer {
    backend: RendererBackend<WgpuDevice>,
    world: WorldKey,
    handles: SceneHandles,
    window: Arc<Window>,
    egui_ctx: EguiContext,
    egui_state: egui_winit::State,
    camera: FlyCamera,
    show_panel: bool,
    keys_held: HashSet<KeyCode>,
    mouse_captured: bool,
    last_frame: Instant,
    frame: FrameInfo,
}

impl Viewer {
    fn start(event_loop: &ActiveEventLoop, cli: &Cli) -> Result<Self> {
        let config = RendererConfig {
            main_window: WindowDesc {
                size: UVec2::new(cli.width, cli.height),
                ..WindowDesc::default()
            },
            shadow_resolution: cli.shadow_resolution,
            enable_ui: !cli.no_ui,
            ..RendererConfig::default()
        };
        let mut windows = WinitWindows::new(event_loop);
        let mut backend = RendererBackend::setup(WgpuDevice::new, &mut windows, config)?;
        let window = windows
            .into_opened()
            .into_iter()
            .next()
            .context("renderer opened no main window")?;

        let main = backend.main_window();
        let inner = window.inner_size();
        backend.resize_window(main, UVec2::new(inner.width, inner.height))?;
        let size = backend
            .window(main)
            .map(AppWindow::size)
            .unwrap_or(UVec2::new(cli.width, cli.height));

        let world = backend.create_world_with_viewport(size)?;
        let viewport = backend.worlds.get(world).and_then(|w| w.viewport);
        backend.bind_viewport(main, viewport)?;

        let scene = match &cli.scene {
            Some(path) => SceneDesc::load(path)
                .with_context(|| format!("failed to load scene {}", path.display()))?,
            None => SceneDesc::demo(),
        };
        let handles = scene.instantiate(&mut backend, world)?;
        tracing::info!(
            visuals = handles.visuals.len(),
            lights = handles.lights.len(),
            "scene ready"
        );

        let mut camera = FlyCamera::looking_at(scene.camera.position, scene.camera.target);
        camera.fov = scene.camera.fov_degrees.to_radians();
        camera.near = scene.camera.near;
        camera.far = scene.camera.far;

        let egui_ctx = EguiContext::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        Ok(Self {
            backend,
            world,
            handles,
            window,
            egui_ctx,
            egui_state,
            camera,
            show_panel: true,
            keys_held: HashSet::new(),
            mouse_captured: false,
            last_frame: Instant::now(),
            frame: FrameInfo::default(),
        })
    }

    fn update(&mut self, dt: f32) {
        let held = |key: KeyCode| self.keys_held.contains(&key);
        let axis = |pos: KeyCode, neg: KeyCode| {
            f32::from(u8::from(held(pos))) - f32::from(u8::from(held(neg)))
        };
        let axes = Vec3::new(
            axis(KeyCode::KeyD, KeyCode::KeyA),
            axis(KeyCode::Space, KeyCode::ControlLeft),
            axis(KeyCode::KeyW, KeyCode::KeyS),
        );
        let boost = if held(KeyCode::ShiftLeft) { 3.0 } else { 1.0 };
        self.camera.step(axes, dt * boost);
    }

    fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.keys_held.insert(key);
        } else {
            self.keys_held.remove(&key);
            return;
        }

        match key {
            KeyCode::F1 => self.show_panel = !self.show_panel,
            KeyCode::F2 => {
                let dump = self.backend.debug_world(self.world);
                tracing::info!("world state:\n{dump}");
            }
            KeyCode::Escape if self.mouse_captured => self.set_mouse_captured(false),
            _ => {}
        }
    }

    fn set_mouse_captured(&mut self, captured: bool) {
        self.mouse_captured = captured;
        self.window.set_cursor_visible(!captured);
    }

    fn redraw(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32().min(0.1);
        self.last_frame = now;
        self.update(dt);

        let main = self.backend.main_window();
        let size = self
            .backend
            .window(main)
            .map(AppWindow::size)
            .unwrap_or(UVec2::ONE);
        if let Some(camera) = self.backend.cameras.get_mut(self.handles.camera) {
            self.camera.apply(camera, size);
        }

        if self.backend.has_ui() {
            let raw_input = self.egui_state.take_egui_input(&self.window);
            let full_output = self.egui_ctx.run(raw_input, |ctx| {
                if self.show_panel {
                    panel::draw(
                        ctx,
                        &mut self.backend,
                        self.world,
                        &self.handles,
                        &mut self.camera,
                        self.frame,
                    );
                }
            });
            self.egui_state
                .handle_platform_output(&self.window, full_output.platform_output);
            let primitives = self
                .egui_ctx
                .tessellate(full_output.shapes, full_output.pixels_per_point);
            let data = ui_bridge::draw_data(
                &full_output.textures_delta,
                &primitives,
                full_output.pixels_per_point,
                size,
            );
            if let Some(world) = self.backend.worlds.get_mut(self.world) {
                world.ui_draw_data = Some(data);
            }
        }

        let stats = self.backend.render();
        self.frame = FrameInfo { dt, stats };
    }
}

struct App {
    cli: Cli,
    viewer: Option<Viewer>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        match Viewer::start(event_loop, &self.cli) {
            Ok(viewer) => self.viewer = Some(viewer),
            Err(e) => {
                tracing::error!("failed to start renderer: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };

        let response = viewer.egui_state.on_window_event(&viewer.window, &event);
        if response.consumed {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                let main = viewer.backend.main_window();
                viewer.backend.request_close(main);
                if viewer.backend.should_close() {
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                let main = viewer.backend.main_window();
                if let Err(e) = viewer
                    .backend
                    .resize_window(main, UVec2::new(size.width, size.height))
                {
                    tracing::error!("resize failed: {e}");
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => {
                viewer.handle_key(key, state == ElementState::Pressed);
            }
            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state,
                ..
            } => {
                viewer.set_mouse_captured(state == ElementState::Pressed);
            }
            WindowEvent::RedrawRequested => {
                viewer.redraw();
                viewer.window.request_redraw();
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        if let DeviceEvent::MouseMotion { delta } = event {
            if viewer.mouse_captured {
                viewer.camera.rotate(delta.0 as f32, delta.1 as f32);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = &self.viewer {
            viewer.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("swarm viewer starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = App { cli, viewer: None };
    event_loop.run_app(&mut app)?;

    tracing::info!("swarm viewer exited");
    Ok(())
}
