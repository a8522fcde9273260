use crate::builtin::ShaderSource;
use crate::device::{
    DeviceError, GpuDevice, RequiredCapabilities, TextureFilter, TextureFormat, TextureKind,
    TextureWrap,
};
use crate::framebuffer::{FrameBuffer, RenderBuffer};
use crate::keys::{
    CameraKey, EnvironmentKey, FrameBufferKey, LightKey, MaterialKey, MeshKey, ModelKey,
    RenderBufferKey, ShaderKey, TextureKey, ViewportKey, VisualKey, WindowKey, WorldKey,
};
use crate::material::Material;
use crate::mesh::{Mesh, Model, Vertex};
use crate::scene::{Camera, Light, Visual};
use crate::shader::{Shader, ShaderError};
use crate::texture::{Texture, TextureError};
use crate::ui::{UiCompositor, UiTextureId};
use crate::window::{AppWindow, WindowDesc, WindowSystem};
use crate::world::{RenderEnvironment, RenderWorld, Viewport};
use crate::{MAX_SHADOW_CASTERS, MAX_TEXTURE_SLOTS, SHADOW_RESOLUTION};
use glam::{UVec2, Vec4};
use std::fmt::Write as _;
use swarm_pool::Pool;

/// Startup parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub main_window: WindowDesc,
    /// Edge length of every shadow map layer.
    pub shadow_resolution: u32,
    pub enable_ui: bool,
    /// Program the shadow pass draws with. Setup fails if it does not build.
    pub depth_shader: ShaderSource,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            main_window: WindowDesc::default(),
            shadow_resolution: SHADOW_RESOLUTION,
            enable_ui: false,
            depth_shader: ShaderSource::depth(),
        }
    }
}

/// Fatal startup failures. Setup stops at the first one.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to create graphics context: {0}")]
    Context(#[source] DeviceError),
    #[error("failed to open main window: {0}")]
    Window(#[source] DeviceError),
    #[error("failed to load device extensions: {0}")]
    Extensions(#[source] DeviceError),
    #[error("required shader failed to build: {0}")]
    RequiredShader(#[source] ShaderError),
    #[error("failed to allocate shadow maps: {0}")]
    ShadowMaps(#[source] TextureError),
    #[error("UI backend already initialized")]
    UiAlreadyInitialized,
}

/// Resources shared by every light's shadow pass.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ShadowResources {
    pub framebuffer: FrameBufferKey,
    /// `D2Array` depth texture, one layer per shadow-casting light.
    pub texture: TextureKey,
    pub shader: ShaderKey,
    /// Override material the shadow pass draws every visual with.
    pub material: MaterialKey,
}

/// Owns the device, every resource pool and every window.
///
/// Scene pools (worlds, environments, cameras, lights, materials, visuals,
/// models) are public: scene code edits them directly. Pools of GPU-backed
/// objects are reached through methods so that destroying an object also
/// releases its device id.
pub struct RendererBackend<D: GpuDevice> {
    pub(crate) device: D,
    pub(crate) config: RendererConfig,
    pub worlds: Pool<WorldKey, RenderWorld>,
    pub environments: Pool<EnvironmentKey, RenderEnvironment>,
    pub cameras: Pool<CameraKey, Camera>,
    pub lights: Pool<LightKey, Light>,
    pub materials: Pool<MaterialKey, Material>,
    pub visuals: Pool<VisualKey, Visual>,
    pub models: Pool<ModelKey, Model>,
    pub(crate) windows: Pool<WindowKey, AppWindow>,
    pub(crate) viewports: Pool<ViewportKey, Viewport>,
    pub(crate) shaders: Pool<ShaderKey, Shader>,
    pub(crate) meshes: Pool<MeshKey, Mesh>,
    pub(crate) textures: Pool<TextureKey, Texture>,
    pub(crate) render_buffers: Pool<RenderBufferKey, RenderBuffer>,
    pub(crate) frame_buffers: Pool<FrameBufferKey, FrameBuffer>,
    pub(crate) main_window: WindowKey,
    pub(crate) shadows: ShadowResources,
    pub(crate) ui: Option<UiCompositor>,
}

impl<D: GpuDevice> RendererBackend<D> {
    /// Bring the renderer up: context, main window, extensions, depth
    /// shader, shadow maps, then the UI compositor when enabled.
    pub fn setup<W: WindowSystem<D>>(
        connect: impl FnOnce() -> Result<D, DeviceError>,
        windows: &mut W,
        config: RendererConfig,
    ) -> Result<Self, SetupError> {
        let device = connect().map_err(SetupError::Context)?;
        let info = device.info();
        tracing::info!(renderer = %info.renderer, version = %info.version, "graphics context created");

        let mut backend = Self {
            device,
            config,
            worlds: Pool::new(),
            environments: Pool::new(),
            cameras: Pool::new(),
            lights: Pool::new(),
            materials: Pool::new(),
            visuals: Pool::new(),
            models: Pool::new(),
            windows: Pool::new(),
            viewports: Pool::new(),
            shaders: Pool::new(),
            meshes: Pool::new(),
            textures: Pool::new(),
            render_buffers: Pool::new(),
            frame_buffers: Pool::new(),
            main_window: WindowKey::default(),
            shadows: ShadowResources::default(),
            ui: None,
        };

        let desc = backend.config.main_window.clone();
        backend.main_window = backend
            .create_window(windows, desc.size, &desc.title)
            .map_err(SetupError::Window)?;
        if let Some(window) = backend.windows.get(backend.main_window) {
            backend.device.make_current(window.surface());
        }

        let required = RequiredCapabilities {
            texture_array_layers: MAX_SHADOW_CASTERS,
            texture_units: MAX_TEXTURE_SLOTS as u32,
            texture_size: backend.config.shadow_resolution,
        };
        backend
            .device
            .load_extensions(&required)
            .map_err(SetupError::Extensions)?;

        let depth = backend.config.depth_shader.clone();
        let shader = backend
            .load_shader(&depth.vertex, &depth.fragment)
            .map_err(SetupError::RequiredShader)?;
        backend.setup_shadow_maps(shader)?;

        if backend.config.enable_ui {
            backend.setup_ui()?;
        }
        tracing::info!("renderer ready");
        Ok(backend)
    }

    fn setup_shadow_maps(&mut self, shader: ShaderKey) -> Result<(), SetupError> {
        let res = self.config.shadow_resolution;
        let mut texture = Texture::new(&mut self.device, TextureKind::D2Array);
        texture
            .set_as_depth(&mut self.device, UVec2::splat(res), MAX_SHADOW_CASTERS)
            .map_err(SetupError::ShadowMaps)?;
        texture.set_filter(&mut self.device, TextureFilter::Linear);
        texture.set_wrap(&mut self.device, TextureWrap::ClampBorder);
        texture.set_border_color(&mut self.device, Vec4::ONE);

        let framebuffer = FrameBuffer::new(&mut self.device);
        self.shadows = ShadowResources {
            framebuffer: self.frame_buffers.create_with(framebuffer),
            texture: self.textures.create_with(texture),
            shader,
            material: self.materials.create_with(Material::new(shader)),
        };
        tracing::debug!(
            resolution = res,
            layers = MAX_SHADOW_CASTERS,
            "shadow maps allocated"
        );
        Ok(())
    }

    /// Install the UI compositor. Fails when one is already installed.
    pub fn setup_ui(&mut self) -> Result<(), SetupError> {
        if self.ui.is_some() {
            return Err(SetupError::UiAlreadyInitialized);
        }
        let ui = UiCompositor::new(&mut self.device).map_err(SetupError::RequiredShader)?;
        self.ui = Some(ui);
        Ok(())
    }

    pub fn has_ui(&self) -> bool {
        self.ui.is_some()
    }

    /// Expose a renderer texture to the UI layer, e.g. a viewport's color
    /// output shown inside a panel.
    pub fn register_ui_texture(&mut self, texture: TextureKey) -> Option<UiTextureId> {
        self.ui.as_mut().map(|ui| ui.register_ui_texture(texture))
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn shadow_map(&self) -> TextureKey {
        self.shadows.texture
    }

    // Shaders

    /// Compile and link a program into the shader pool.
    ///
    /// On failure the error (with driver diagnostics) is returned and
    /// nothing stays in the pool.
    pub fn load_shader(&mut self, vertex: &str, fragment: &str) -> Result<ShaderKey, ShaderError> {
        let mut shader = Shader::default();
        shader.compile(&mut self.device, vertex, fragment)?;
        Ok(self.shaders.create_with(shader))
    }

    /// Recompile in place. Materials keep referring to the same key. On
    /// failure the shader is left unusable.
    pub fn reload_shader(
        &mut self,
        key: ShaderKey,
        vertex: &str,
        fragment: &str,
    ) -> Result<(), ShaderError> {
        let shader = self.shaders.get_mut(key).ok_or(ShaderError::Unusable)?;
        shader.compile(&mut self.device, vertex, fragment)
    }

    pub fn shader(&self, key: ShaderKey) -> Option<&Shader> {
        self.shaders.get(key)
    }

    pub fn destroy_shader(&mut self, key: ShaderKey) {
        if let Some(shader) = self.shaders.destroy(key) {
            shader.release(&mut self.device);
        }
    }

    // Meshes and models

    pub fn create_mesh(&mut self) -> MeshKey {
        let mesh = Mesh::new(&mut self.device);
        self.meshes.create_with(mesh)
    }

    pub fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> MeshKey {
        let key = self.create_mesh();
        self.update_mesh(key, vertices, indices);
        key
    }

    /// Replace a mesh's buffers. Returns false for unknown keys.
    pub fn update_mesh(&mut self, key: MeshKey, vertices: &[Vertex], indices: &[u32]) -> bool {
        let Some(mesh) = self.meshes.get_mut(key) else {
            return false;
        };
        mesh.set_vertices(&mut self.device, vertices);
        mesh.set_triangles(&mut self.device, indices);
        true
    }

    pub fn mesh(&self, key: MeshKey) -> Option<&Mesh> {
        self.meshes.get(key)
    }

    pub fn destroy_mesh(&mut self, key: MeshKey) {
        if let Some(mesh) = self.meshes.destroy(key) {
            mesh.release(&mut self.device);
        }
    }

    pub fn create_model(&mut self, meshes: Vec<MeshKey>) -> ModelKey {
        self.models.create_with(Model::new(meshes))
    }

    pub fn destroy_model(&mut self, key: ModelKey) {
        self.models.destroy(key);
    }

    // Textures

    pub fn create_texture(&mut self, kind: TextureKind) -> TextureKey {
        let texture = Texture::new(&mut self.device, kind);
        self.textures.create_with(texture)
    }

    pub fn upload_texture_2d(
        &mut self,
        size: UVec2,
        pixels: &[u8],
        format: TextureFormat,
    ) -> Result<TextureKey, TextureError> {
        let mut texture = Texture::new(&mut self.device, TextureKind::D2);
        if let Err(e) = texture.set_format(&mut self.device, format, size, 1, Some(pixels)) {
            texture.release(&mut self.device);
            return Err(e);
        }
        Ok(self.textures.create_with(texture))
    }

    /// Faces in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn upload_cubemap(
        &mut self,
        size: UVec2,
        faces: [&[u8]; 6],
        format: TextureFormat,
    ) -> Result<TextureKey, TextureError> {
        let mut texture = Texture::new(&mut self.device, TextureKind::Cube);
        if let Err(e) = texture.set_faces(&mut self.device, format, size, faces) {
            texture.release(&mut self.device);
            return Err(e);
        }
        texture.set_wrap(&mut self.device, TextureWrap::ClampEdge);
        Ok(self.textures.create_with(texture))
    }

    pub fn texture(&self, key: TextureKey) -> Option<&Texture> {
        self.textures.get(key)
    }

    /// Run `f` against a pooled texture and the device.
    pub fn with_texture<R>(
        &mut self,
        key: TextureKey,
        f: impl FnOnce(&mut Texture, &mut dyn GpuDevice) -> R,
    ) -> Option<R> {
        let texture = self.textures.get_mut(key)?;
        Some(f(texture, &mut self.device))
    }

    pub fn destroy_texture(&mut self, key: TextureKey) {
        if let Some(texture) = self.textures.destroy(key) {
            texture.release(&mut self.device);
        }
    }

    // Render buffers and framebuffers

    pub fn create_render_buffer(&mut self) -> RenderBufferKey {
        let buffer = RenderBuffer::new(&mut self.device);
        self.render_buffers.create_with(buffer)
    }

    pub fn with_render_buffer<R>(
        &mut self,
        key: RenderBufferKey,
        f: impl FnOnce(&mut RenderBuffer, &mut dyn GpuDevice) -> R,
    ) -> Option<R> {
        let buffer = self.render_buffers.get_mut(key)?;
        Some(f(buffer, &mut self.device))
    }

    pub fn destroy_render_buffer(&mut self, key: RenderBufferKey) {
        if let Some(buffer) = self.render_buffers.destroy(key) {
            buffer.release(&mut self.device);
        }
    }

    pub fn create_frame_buffer(&mut self) -> FrameBufferKey {
        let framebuffer = FrameBuffer::new(&mut self.device);
        self.frame_buffers.create_with(framebuffer)
    }

    pub fn frame_buffer(&self, key: FrameBufferKey) -> Option<&FrameBuffer> {
        self.frame_buffers.get(key)
    }

    pub fn with_frame_buffer<R>(
        &mut self,
        key: FrameBufferKey,
        f: impl FnOnce(&FrameBuffer, &mut dyn GpuDevice) -> R,
    ) -> Option<R> {
        let framebuffer = self.frame_buffers.get(key)?;
        Some(f(framebuffer, &mut self.device))
    }

    pub fn destroy_frame_buffer(&mut self, key: FrameBufferKey) {
        if let Some(framebuffer) = self.frame_buffers.destroy(key) {
            framebuffer.release(&mut self.device);
        }
    }

    // Scene entities

    pub fn create_camera(&mut self, camera: Camera) -> CameraKey {
        self.cameras.create_with(camera)
    }

    pub fn destroy_camera(&mut self, key: CameraKey) {
        self.cameras.destroy(key);
    }

    pub fn create_light(&mut self, light: Light) -> LightKey {
        self.lights.create_with(light)
    }

    pub fn destroy_light(&mut self, key: LightKey) {
        self.lights.destroy(key);
    }

    pub fn create_material(&mut self, material: impl Into<Material>) -> MaterialKey {
        self.materials.create_with(material)
    }

    pub fn destroy_material(&mut self, key: MaterialKey) {
        self.materials.destroy(key);
    }

    pub fn create_visual(&mut self, visual: Visual) -> VisualKey {
        self.visuals.create_with(visual)
    }

    pub fn destroy_visual(&mut self, key: VisualKey) {
        self.visuals.destroy(key);
    }

    pub fn create_environment(&mut self) -> EnvironmentKey {
        self.environments.create()
    }

    pub fn destroy_environment(&mut self, key: EnvironmentKey) {
        self.environments.destroy(key);
    }

    // Worlds and viewports

    /// A world with a fresh environment and no viewport (not ready yet).
    pub fn create_world(&mut self) -> WorldKey {
        let environment = self.environments.create();
        self.worlds.create_with(RenderWorld {
            environment: Some(environment),
            ..RenderWorld::default()
        })
    }

    /// A world with a fresh environment and its own viewport of `size`.
    pub fn create_world_with_viewport(&mut self, size: UVec2) -> Result<WorldKey, TextureError> {
        let viewport = self.create_viewport(size)?;
        let world = self.create_world();
        if let Some(w) = self.worlds.get_mut(world) {
            w.viewport = Some(viewport);
        }
        Ok(world)
    }

    /// Removes the world only. Its entities, environment and viewport stay
    /// in their pools.
    pub fn destroy_world(&mut self, key: WorldKey) {
        self.worlds.destroy(key);
    }

    /// Framebuffer with an Rgba8 color and a depth-stencil attachment.
    pub fn create_viewport(&mut self, size: UVec2) -> Result<ViewportKey, TextureError> {
        let mut color = Texture::new(&mut self.device, TextureKind::D2);
        let mut depth = Texture::new(&mut self.device, TextureKind::D2);
        let allocated = color
            .set_as_rgba8(&mut self.device, size, None)
            .and_then(|_| depth.set_as_depth_stencil(&mut self.device, size));
        if let Err(e) = allocated {
            color.release(&mut self.device);
            depth.release(&mut self.device);
            return Err(e);
        }
        color.set_wrap(&mut self.device, TextureWrap::ClampEdge);

        let framebuffer = FrameBuffer::new(&mut self.device);
        framebuffer.set_output_color(&mut self.device, 0, Some(color.target(None)));
        framebuffer.set_output_depth_stencil(&mut self.device, Some(depth.target(None)));

        let viewport = Viewport::new(
            size,
            self.frame_buffers.create_with(framebuffer),
            self.textures.create_with(color),
            self.textures.create_with(depth),
        );
        Ok(self.viewports.create_with(viewport))
    }

    pub fn viewport(&self, key: ViewportKey) -> Option<&Viewport> {
        self.viewports.get(key)
    }

    /// Reallocate both attachments at `size`. Texture keys and device ids
    /// stay the same.
    pub fn set_viewport_size(&mut self, key: ViewportKey, size: UVec2) -> Result<(), TextureError> {
        let Some(viewport) = self.viewports.get_mut(key) else {
            return Ok(());
        };
        if let Some(color) = self.textures.get_mut(viewport.color_output()) {
            color.set_as_rgba8(&mut self.device, size, None)?;
        }
        if let Some(depth) = self.textures.get_mut(viewport.depth_output()) {
            depth.set_as_depth_stencil(&mut self.device, size)?;
        }
        viewport.set_size(size);
        Ok(())
    }

    pub fn destroy_viewport(&mut self, key: ViewportKey) {
        let Some(viewport) = self.viewports.destroy(key) else {
            return;
        };
        self.destroy_frame_buffer(viewport.framebuffer());
        self.destroy_texture(viewport.color_output());
        self.destroy_texture(viewport.depth_output());
        for (_, window) in self.windows.iter_mut() {
            if window.viewport == Some(key) {
                window.viewport = None;
            }
        }
    }

    // Windows

    pub fn create_window<W: WindowSystem<D>>(
        &mut self,
        windows: &mut W,
        size: UVec2,
        title: &str,
    ) -> Result<WindowKey, DeviceError> {
        let surface = windows.open_window(&mut self.device, size, title)?;
        tracing::debug!(%surface, title, "window opened");
        Ok(self.windows.create_with(AppWindow::new(surface, size, title)))
    }

    pub fn main_window(&self) -> WindowKey {
        self.main_window
    }

    pub fn window(&self, key: WindowKey) -> Option<&AppWindow> {
        self.windows.get(key)
    }

    pub fn windows(&self) -> impl Iterator<Item = (WindowKey, &AppWindow)> {
        self.windows.iter()
    }

    /// Show `viewport` in `window`. The viewport is resized to the window.
    pub fn bind_viewport(
        &mut self,
        window: WindowKey,
        viewport: Option<ViewportKey>,
    ) -> Result<(), TextureError> {
        let Some(w) = self.windows.get_mut(window) else {
            return Ok(());
        };
        w.viewport = viewport;
        let size = w.size();
        match viewport {
            Some(vp) if self.viewports.get(vp).is_some_and(|v| v.size() != size) => {
                self.set_viewport_size(vp, size)
            }
            _ => Ok(()),
        }
    }

    /// Resize the surface and the bound viewport together.
    pub fn resize_window(&mut self, window: WindowKey, size: UVec2) -> Result<(), TextureError> {
        let Some(w) = self.windows.get_mut(window) else {
            return Ok(());
        };
        if size.x == 0 || size.y == 0 {
            // Minimized; keep the last non-empty size.
            return Ok(());
        }
        w.set_size(size);
        let surface = w.surface();
        let viewport = w.viewport;
        self.device.resize_surface(surface, size);
        match viewport {
            Some(vp) => self.set_viewport_size(vp, size),
            None => Ok(()),
        }
    }

    pub fn request_close(&mut self, window: WindowKey) {
        if let Some(w) = self.windows.get_mut(window) {
            w.request_close();
        }
    }

    /// The main window asked to close.
    pub fn should_close(&self) -> bool {
        self.windows
            .get(self.main_window)
            .is_none_or(AppWindow::should_close)
    }

    pub fn destroy_window(&mut self, key: WindowKey) {
        if let Some(window) = self.windows.destroy(key) {
            self.device.destroy_surface(window.surface());
        }
    }

    /// Human-readable dump of one world, for logs and the CLI.
    pub fn debug_world(&self, key: WorldKey) -> String {
        let mut out = String::new();
        let Some(world) = self.worlds.get(key) else {
            let _ = writeln!(out, "=== World {key:?} (destroyed) ===");
            return out;
        };
        let _ = writeln!(out, "=== World {key:?} (ready={}) ===", world.is_ready());
        if let Some(vp) = world.viewport.and_then(|k| self.viewports.get(k)) {
            let _ = writeln!(out, "Viewport: {}x{}", vp.size().x, vp.size().y);
        }
        if let Some(env) = world.environment.and_then(|k| self.environments.get(k)) {
            let a = env.ambient_color;
            let _ = writeln!(
                out,
                "Ambient: ({:.2}, {:.2}, {:.2}) x {:.2} skybox={}",
                a.x,
                a.y,
                a.z,
                env.ambient_intensity,
                env.skybox.is_some()
            );
        }
        match world
            .active_camera(&self.cameras)
            .and_then(|k| self.cameras.get(k))
        {
            Some(cam) => {
                let p = cam.position();
                let _ = writeln!(
                    out,
                    "Camera: eye=({:.1}, {:.1}, {:.1}) priority={} of {}",
                    p.x,
                    p.y,
                    p.z,
                    cam.priority,
                    world.cameras.len()
                );
            }
            None => {
                let _ = writeln!(out, "Camera: none");
            }
        }
        let _ = writeln!(out, "Lights: {}", world.lights.len());
        for (i, light) in world
            .lights
            .iter()
            .filter_map(|k| self.lights.get(*k))
            .enumerate()
        {
            let _ = writeln!(
                out,
                "  [{i}] {:?} intensity={:.2} shadows={}",
                light.kind,
                light.intensity,
                light.cast_shadows()
            );
        }
        let _ = writeln!(out, "Materials: {}", world.materials.len());
        let _ = writeln!(out, "Visuals: {}", world.visuals.len());
        for visual in world.visuals.iter().filter_map(|k| self.visuals.get(*k)) {
            let p = visual.transform.w_axis;
            let meshes = visual
                .model
                .and_then(|m| self.models.get(m))
                .map_or(0, |m| m.meshes.len());
            let _ = writeln!(
                out,
                "  pos=({:.2}, {:.2}, {:.2}) meshes={meshes}",
                p.x, p.y, p.z
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AttachmentPoint, AttachmentTarget};
    use crate::headless::{Command, HeadlessDevice, HeadlessWindows};

    fn backend() -> RendererBackend<HeadlessDevice> {
        RendererBackend::setup(
            || Ok(HeadlessDevice::new()),
            &mut HeadlessWindows::default(),
            RendererConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn setup_opens_main_window_and_shadow_maps() {
        let backend = backend();
        let window = backend.window(backend.main_window()).unwrap();
        assert_eq!(window.size(), UVec2::new(1280, 720));
        assert_eq!(window.title(), "Swarm Window");

        let shadow = backend.texture(backend.shadow_map()).unwrap();
        let desc = shadow.desc().unwrap();
        assert_eq!(desc.layers, MAX_SHADOW_CASTERS);
        assert_eq!(desc.size, UVec2::splat(SHADOW_RESOLUTION));
        assert_eq!(desc.format, TextureFormat::Depth32);
        assert_eq!(shadow.sampling().wrap, TextureWrap::ClampBorder);
        assert_eq!(shadow.sampling().border_color, Vec4::ONE);
        assert!(!backend.has_ui());
    }

    #[test]
    fn context_failure_aborts_setup() {
        let mut windows = HeadlessWindows::default();
        let result = RendererBackend::<HeadlessDevice>::setup(
            || Err(DeviceError::Context("no adapter".into())),
            &mut windows,
            RendererConfig::default(),
        );
        assert!(matches!(result, Err(SetupError::Context(_))));
        assert!(windows.opened.is_empty());
    }

    #[test]
    fn window_failure_aborts_setup() {
        let mut windows = HeadlessWindows {
            fail_next: true,
            ..HeadlessWindows::default()
        };
        let result = RendererBackend::setup(
            || Ok(HeadlessDevice::new()),
            &mut windows,
            RendererConfig::default(),
        );
        assert!(matches!(result, Err(SetupError::Window(_))));
    }

    #[test]
    fn missing_extension_aborts_setup() {
        let result = RendererBackend::setup(
            || {
                Ok(HeadlessDevice::with_limits(RequiredCapabilities {
                    texture_array_layers: 4,
                    texture_units: 16,
                    texture_size: 8192,
                }))
            },
            &mut HeadlessWindows::default(),
            RendererConfig::default(),
        );
        assert!(matches!(result, Err(SetupError::Extensions(_))));
    }

    #[test]
    fn broken_depth_shader_is_required_shader_error() {
        let config = RendererConfig {
            depth_shader: ShaderSource::new("@vertex fn v() {}", "#error broken"),
            ..RendererConfig::default()
        };
        let result = RendererBackend::setup(
            || Ok(HeadlessDevice::new()),
            &mut HeadlessWindows::default(),
            config,
        );
        assert!(matches!(
            result,
            Err(SetupError::RequiredShader(ShaderError::Compile { .. }))
        ));
    }

    #[test]
    fn second_ui_setup_fails() {
        let config = RendererConfig {
            enable_ui: true,
            ..RendererConfig::default()
        };
        let mut backend = RendererBackend::setup(
            || Ok(HeadlessDevice::new()),
            &mut HeadlessWindows::default(),
            config,
        )
        .unwrap();
        assert!(backend.has_ui());
        assert!(matches!(
            backend.setup_ui(),
            Err(SetupError::UiAlreadyInitialized)
        ));
    }

    #[test]
    fn failed_shader_is_not_pooled() {
        let mut backend = backend();
        let before = backend.shaders.len();
        let err = backend.load_shader("@vertex fn v() {}", "").unwrap_err();
        assert!(matches!(err, ShaderError::Compile { .. }));
        assert_eq!(backend.shaders.len(), before);
    }

    #[test]
    fn viewport_resize_round_trip() {
        let mut backend = backend();
        let vp = backend.create_viewport(UVec2::new(320, 240)).unwrap();
        let color_id = backend
            .texture(backend.viewport(vp).unwrap().color_output())
            .unwrap()
            .id();

        backend.set_viewport_size(vp, UVec2::new(800, 600)).unwrap();

        let viewport = *backend.viewport(vp).unwrap();
        assert_eq!(viewport.size(), UVec2::new(800, 600));
        let color = backend.texture(viewport.color_output()).unwrap();
        let depth = backend.texture(viewport.depth_output()).unwrap();
        assert_eq!(color.size(), Some(UVec2::new(800, 600)));
        assert_eq!(depth.size(), Some(UVec2::new(800, 600)));
        assert_eq!(color.id(), color_id);
        assert!(
            backend
                .frame_buffer(viewport.framebuffer())
                .unwrap()
                .is_complete(backend.device())
        );
    }

    #[test]
    fn window_resize_propagates_to_viewport() {
        let mut backend = backend();
        let main = backend.main_window();
        let vp = backend.create_viewport(UVec2::new(64, 64)).unwrap();
        backend.bind_viewport(main, Some(vp)).unwrap();
        assert_eq!(backend.viewport(vp).unwrap().size(), UVec2::new(1280, 720));

        backend.resize_window(main, UVec2::new(1024, 768)).unwrap();
        let surface = backend.window(main).unwrap().surface();
        assert_eq!(
            backend.device().surface_size(surface),
            Some(UVec2::new(1024, 768))
        );
        assert_eq!(backend.viewport(vp).unwrap().size(), UVec2::new(1024, 768));
    }

    #[test]
    fn destroying_texture_releases_device_object() {
        let mut backend = backend();
        let key = backend
            .upload_texture_2d(UVec2::new(1, 1), &[1, 2, 3, 4], TextureFormat::Rgba8)
            .unwrap();
        let id = backend.texture(key).unwrap().id();
        backend.destroy_texture(key);
        backend.destroy_texture(key);
        assert!(!backend.device().texture_exists(id));
        assert!(backend.texture(key).is_none());
    }

    #[test]
    fn bad_upload_leaves_nothing_behind() {
        let mut backend = backend();
        let before = backend.textures.len();
        let err = backend
            .upload_texture_2d(UVec2::new(2, 2), &[0; 3], TextureFormat::Rgb8)
            .unwrap_err();
        assert!(matches!(err, TextureError::DataSize { .. }));
        assert_eq!(backend.textures.len(), before);
    }

    #[test]
    fn destroying_viewport_unbinds_windows() {
        let mut backend = backend();
        let main = backend.main_window();
        let vp = backend.create_viewport(UVec2::new(8, 8)).unwrap();
        backend.bind_viewport(main, Some(vp)).unwrap();
        backend.destroy_viewport(vp);
        assert_eq!(backend.window(main).unwrap().viewport, None);
    }

    #[test]
    fn viewport_attachments_are_recorded() {
        let mut backend = backend();
        backend.device_mut().take_commands();
        backend.create_viewport(UVec2::new(16, 16)).unwrap();
        let attaches = backend
            .device()
            .commands()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Command::Attach {
                        point: AttachmentPoint::Color(0) | AttachmentPoint::DepthStencil,
                        target: Some(AttachmentTarget::Texture { .. }),
                        ..
                    }
                )
            })
            .count();
        assert_eq!(attaches, 2);
    }

    #[test]
    fn close_request_on_main_window() {
        let mut backend = backend();
        assert!(!backend.should_close());
        backend.request_close(backend.main_window());
        assert!(backend.should_close());
    }

    #[test]
    fn debug_dump_lists_world_contents() {
        let mut backend = backend();
        let world = backend.create_world_with_viewport(UVec2::new(64, 32)).unwrap();
        let light = backend.create_light(Light::default());
        backend.worlds.get_mut(world).unwrap().lights.push(light);

        let dump = backend.debug_world(world);
        assert!(dump.contains("ready=true"));
        assert!(dump.contains("Viewport: 64x32"));
        assert!(dump.contains("Lights: 1"));
        assert!(dump.contains("Camera: none"));
    }
}
