//! The per-frame pipeline.
//!
//! For every ready world: shadow maps, global material uniforms, target
//! clear, pre-render hooks, skybox, opaque visuals, UI-pass hooks and the
//! UI composite, post-render hooks. Then every window is presented.
//!
//! Missing pieces (camera, environment, skybox, stale keys) skip the pass
//! that needs them. Nothing here fails a frame.

use crate::backend::RendererBackend;
use crate::device::{CullMode, FramebufferStatus, GpuDevice, RasterState};
use crate::framebuffer::FrameBuffer;
use crate::keys::{MeshKey, TextureKey, WorldKey};
use crate::material::{Material, SamplerSlot};
use crate::mesh::{Mesh, Model};
use crate::scene::Camera;
use crate::shader::Shader;
use crate::texture::Texture;
use crate::world::{HookContext, HookStage, RenderEnvironment, RenderWorld};
use crate::MAX_LIGHTS;
use glam::{UVec2, Vec4};
use std::ops::AddAssign;
use swarm_pool::Pool;

/// Counters for one rendered world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub shadow_passes: u32,
    pub skipped_shadow_lights: u32,
    pub shadow_draw_calls: u32,
    pub skybox_draw_calls: u32,
    pub draw_calls: u32,
    pub indices_drawn: u64,
    pub ui_draw_calls: u32,
}

impl AddAssign for RenderStats {
    fn add_assign(&mut self, rhs: Self) {
        self.shadow_passes += rhs.shadow_passes;
        self.skipped_shadow_lights += rhs.skipped_shadow_lights;
        self.shadow_draw_calls += rhs.shadow_draw_calls;
        self.skybox_draw_calls += rhs.skybox_draw_calls;
        self.draw_calls += rhs.draw_calls;
        self.indices_drawn += rhs.indices_drawn;
        self.ui_draw_calls += rhs.ui_draw_calls;
    }
}

/// Counters for one call of [`RendererBackend::render_worlds`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub worlds_rendered: u32,
    pub worlds_skipped: u32,
    pub totals: RenderStats,
}

impl<D: GpuDevice> RendererBackend<D> {
    /// Render every world, then present every window.
    pub fn render(&mut self) -> FrameStats {
        let stats = self.render_worlds();
        self.present_windows();
        stats
    }

    /// Render every ready world. Worlds without a viewport or environment
    /// are skipped for this frame.
    pub fn render_worlds(&mut self) -> FrameStats {
        let mut frame = FrameStats::default();
        let keys: Vec<WorldKey> = self.worlds.keys().collect();
        for key in keys {
            if !self.worlds.get(key).is_some_and(RenderWorld::is_ready) {
                tracing::debug!(world = ?key, "world not ready, skipped");
                frame.worlds_skipped += 1;
                continue;
            }
            frame.totals += self.render_world(key);
            frame.worlds_rendered += 1;
        }
        frame
    }

    pub fn render_world(&mut self, key: WorldKey) -> RenderStats {
        let mut stats = RenderStats::default();
        let Some(world) = self.worlds.get(key) else {
            return stats;
        };
        let camera = world
            .active_camera(&self.cameras)
            .and_then(|k| self.cameras.get(k))
            .copied();
        let environment = world
            .environment
            .and_then(|k| self.environments.get(k))
            .copied();
        let viewport = world.viewport.and_then(|k| self.viewports.get(k)).copied();

        let shadowed = self.render_shadowmaps(key, &mut stats);
        self.update_material_globals(key, &shadowed);

        let device: &mut dyn GpuDevice = &mut self.device;
        if let Some(vp) = viewport {
            if let Some(fb) = self.frame_buffers.get(vp.framebuffer()) {
                fb.bind(device);
            }
            device.set_viewport(UVec2::ZERO, vp.size());
        }
        let clear = environment.map_or(Vec4::ZERO, |e| e.clear_color);
        device.clear(Some(clear), true);

        let viewport_size = viewport.map(|vp| vp.size());
        self.run_hooks(key, HookStage::PreRender, viewport_size, camera);

        match camera {
            Some(camera) => {
                if let Some(env) = environment {
                    stats.skybox_draw_calls += self.render_skybox(&camera, &env);
                }
                self.render_visuals(key, &camera, &mut stats);
            }
            None => tracing::trace!(world = ?key, "no active camera, skybox and main pass skipped"),
        }

        self.run_hooks(key, HookStage::UiPass, viewport_size, camera);
        stats.ui_draw_calls += self.composite_ui(key, viewport_size);
        self.run_hooks(key, HookStage::PostRender, viewport_size, camera);

        FrameBuffer::unbind(&mut self.device);
        stats
    }

    /// Render a depth map for every shadow-casting light into layer `i` of
    /// the shared shadow array, `i` being the light's index in the world.
    ///
    /// Returns, per world light, whether its layer was rendered.
    pub fn render_shadowmaps(&mut self, key: WorldKey, stats: &mut RenderStats) -> Vec<bool> {
        let Some(world) = self.worlds.get(key) else {
            return Vec::new();
        };
        let mut shadowed = vec![false; world.lights.len()];

        let framebuffer = self.frame_buffers.get(self.shadows.framebuffer);
        let texture = self.textures.get(self.shadows.texture);
        let shader = self
            .materials
            .get(self.shadows.material)
            .and_then(Material::shader)
            .and_then(|k| self.shaders.get(k))
            .filter(|s| s.is_usable());
        let (Some(framebuffer), Some(texture), Some(shader)) = (framebuffer, texture, shader)
        else {
            tracing::warn!("shadow resources missing, shadow pass skipped");
            return shadowed;
        };

        let device: &mut dyn GpuDevice = &mut self.device;
        let resolution = UVec2::splat(self.config.shadow_resolution);
        let mut bound = false;
        for (i, light_key) in world.lights.iter().enumerate() {
            let Some(light) = self.lights.get(*light_key) else {
                continue;
            };
            if !light.cast_shadows() {
                continue;
            }
            let Some(light_space) = light.light_space() else {
                tracing::debug!(light = i, kind = ?light.kind, "light kind has no shadow projection");
                stats.skipped_shadow_lights += 1;
                continue;
            };

            framebuffer.set_output_depth(device, Some(texture.target(Some(i as u32))));
            let status = framebuffer.status(device);
            if status != FramebufferStatus::Complete {
                tracing::error!(light = i, ?status, "shadow framebuffer incomplete, light skipped");
                stats.skipped_shadow_lights += 1;
                continue;
            }

            framebuffer.bind(device);
            bound = true;
            device.set_viewport(UVec2::ZERO, resolution);
            device.clear(None, true);
            shader.use_shader(device);
            for visual in world.visuals.iter().filter_map(|k| self.visuals.get(*k)) {
                let Some(model) = visual.model.and_then(|m| self.models.get(m)) else {
                    continue;
                };
                shader.set_mat4(device, "model", visual.transform);
                shader.set_mat4(device, "mvp", light_space * visual.transform);
                let (draws, _) = draw_model(device, &self.meshes, model);
                stats.shadow_draw_calls += draws;
            }
            shadowed[i] = true;
            stats.shadow_passes += 1;
        }

        if bound {
            FrameBuffer::unbind(device);
        }
        shadowed
    }

    /// Push camera, ambient and light uniforms into every material of the
    /// world. `shadowed` comes from [`Self::render_shadowmaps`].
    pub fn update_material_globals(&mut self, key: WorldKey, shadowed: &[bool]) {
        let Some(world) = self.worlds.get(key) else {
            return;
        };
        let eye = world
            .active_camera(&self.cameras)
            .and_then(|k| self.cameras.get(k))
            .map(Camera::position);
        let environment = world.environment.and_then(|k| self.environments.get(k));

        if world.lights.len() > MAX_LIGHTS {
            tracing::debug!(
                lights = world.lights.len(),
                max = MAX_LIGHTS,
                "extra lights ignored"
            );
        }
        let light_count = world.lights.len().min(MAX_LIGHTS);
        let any_shadowed = shadowed.iter().any(|s| *s);
        let device: &mut dyn GpuDevice = &mut self.device;

        for material_key in &world.materials {
            let Some(material) = self.materials.get_mut(*material_key) else {
                continue;
            };
            let Some(shader) = material
                .shader()
                .and_then(|k| self.shaders.get(k))
                .filter(|s| s.is_usable())
            else {
                continue;
            };

            material.kind.update_internals(shader, device);
            if let Some(eye) = eye {
                shader.set_vec3(device, "view_pos", eye);
            }
            if let Some(env) = environment {
                shader.set_vec3(device, "ambient_color", env.ambient_color);
                shader.set_float(device, "ambient_intensity", env.ambient_intensity);
            }
            shader.set_int(device, "light_count", light_count as i32);

            for (i, light_key) in world.lights.iter().take(MAX_LIGHTS).enumerate() {
                let Some(light) = self.lights.get(*light_key) else {
                    shader.set_bool(device, &format!("lights[{i}].enabled"), false);
                    continue;
                };
                let is_shadowed = shadowed.get(i).copied().unwrap_or(false);
                shader.set_bool(device, &format!("lights[{i}].enabled"), true);
                shader.set_int(device, &format!("lights[{i}].kind"), light.kind as i32);
                shader.set_vec3(device, &format!("lights[{i}].position"), light.position);
                shader.set_vec3(device, &format!("lights[{i}].direction"), light.direction);
                shader.set_vec3(device, &format!("lights[{i}].color"), light.color);
                shader.set_float(device, &format!("lights[{i}].intensity"), light.intensity);
                shader.set_bool(device, &format!("lights[{i}].shadowed"), is_shadowed);
                if is_shadowed {
                    if let Some(light_space) = light.light_space() {
                        shader.set_mat4(device, &format!("light_space[{i}]"), light_space);
                    }
                }
            }

            if any_shadowed {
                material.set_texture(SamplerSlot::Shadows, Some(self.shadows.texture));
            }
        }
    }

    /// Copy each window's viewport onto its surface, then swap.
    pub fn present_windows(&mut self) {
        for (_, window) in self.windows.iter() {
            let surface = window.surface();
            self.device.make_current(surface);
            let source = window
                .viewport
                .and_then(|k| self.viewports.get(k))
                .and_then(|vp| Some((self.textures.get(vp.color_output())?, vp.size())));
            if let Some((texture, size)) = source {
                self.device.blit_to_surface(surface, texture.id(), size);
            }
            self.device.present(surface);
        }
    }

    fn render_skybox(&mut self, camera: &Camera, env: &RenderEnvironment) -> u32 {
        let Some(visual) = env.skybox.and_then(|k| self.visuals.get(k)) else {
            return 0;
        };
        let material = visual.material.and_then(|k| self.materials.get(k));
        let model = visual.model.and_then(|k| self.models.get(k));
        let (Some(material), Some(model)) = (material, model) else {
            return 0;
        };
        let Some(shader) = material
            .shader()
            .and_then(|k| self.shaders.get(k))
            .filter(|s| s.is_usable())
        else {
            tracing::debug!("skybox shader unusable, skybox skipped");
            return 0;
        };

        let device: &mut dyn GpuDevice = &mut self.device;
        shader.set_mat4(device, "projection", camera.projection());
        shader.set_mat4(device, "view", camera.rotation_only_view());
        bind_material(device, material, shader, &self.textures);

        device.set_raster_state(RasterState {
            cull: CullMode::Front,
            depth_write: false,
            ..RasterState::default()
        });
        let (draws, _) = draw_model(device, &self.meshes, model);
        device.set_raster_state(RasterState::default());
        draws
    }

    fn render_visuals(&mut self, key: WorldKey, camera: &Camera, stats: &mut RenderStats) {
        let Some(world) = self.worlds.get(key) else {
            return;
        };
        let view_proj = camera.projection() * camera.view();
        let device: &mut dyn GpuDevice = &mut self.device;

        for visual in world.visuals.iter().filter_map(|k| self.visuals.get(*k)) {
            let material = visual.material.and_then(|k| self.materials.get(k));
            let model = visual.model.and_then(|k| self.models.get(k));
            let (Some(material), Some(model)) = (material, model) else {
                continue;
            };
            let Some(shader) = material
                .shader()
                .and_then(|k| self.shaders.get(k))
                .filter(|s| s.is_usable())
            else {
                tracing::trace!("visual with unusable shader skipped");
                continue;
            };

            shader.set_mat4(device, "model", visual.transform);
            shader.set_mat4(device, "mvp", view_proj * visual.transform);
            bind_material(device, material, shader, &self.textures);
            let (draws, indices) = draw_model(device, &self.meshes, model);
            stats.draw_calls += draws;
            stats.indices_drawn += indices;
        }
    }

    fn run_hooks(
        &mut self,
        key: WorldKey,
        stage: HookStage,
        viewport_size: Option<UVec2>,
        camera: Option<Camera>,
    ) {
        let Some(world) = self.worlds.get_mut(key) else {
            return;
        };
        let RenderWorld {
            hooks,
            ui_draw_data,
            ..
        } = world;
        let mut ctx = HookContext {
            device: &mut self.device,
            world: key,
            viewport_size,
            camera: camera.map(|c| (c.view(), c.projection())),
            ui_draw_data,
        };
        hooks.run(stage, &mut ctx);
    }

    fn composite_ui(&mut self, key: WorldKey, viewport_size: Option<UVec2>) -> u32 {
        let Some(world) = self.worlds.get_mut(key) else {
            return 0;
        };
        let Some(data) = world.ui_draw_data.take() else {
            return 0;
        };
        let Some(ui) = self.ui.as_mut() else {
            return 0;
        };
        let target = viewport_size.unwrap_or_else(|| data.screen_size.as_uvec2());
        ui.composite(&mut self.device, &self.textures, &data, target)
    }
}

/// Activate every texture slot (clearing empty ones), then the program.
/// The material's own uniforms are pushed first so that materials sharing
/// a program each draw with their own values.
fn bind_material(
    device: &mut dyn GpuDevice,
    material: &Material,
    shader: &Shader,
    textures: &Pool<TextureKey, Texture>,
) {
    material.kind.update_internals(shader, device);
    for (unit, slot) in material.textures().iter().enumerate() {
        let texture = slot.and_then(|k| textures.get(k)).map(Texture::id);
        device.activate_texture(unit as u32, texture);
    }
    shader.use_shader(device);
}

/// Draw every mesh of a model. Returns `(draw_calls, indices)`.
fn draw_model(
    device: &mut dyn GpuDevice,
    meshes: &Pool<MeshKey, Mesh>,
    model: &Model,
) -> (u32, u64) {
    let mut draws = 0;
    let mut indices = 0;
    for mesh in model.meshes.iter().filter_map(|k| meshes.get(*k)) {
        if mesh.index_count() == 0 {
            continue;
        }
        mesh.bind(device);
        device.draw_indexed(0, mesh.index_count(), 0);
        draws += 1;
        indices += u64::from(mesh.index_count());
    }
    (draws, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RendererConfig;
    use crate::device::{BlendMode, UniformValue};
    use crate::headless::{Command, HeadlessDevice, HeadlessWindows};
    use crate::keys::{ShaderKey, VisualKey};
    use crate::material::{PbrMaterial, PbrParams};
    use crate::mesh::Vertex;
    use crate::scene::{Light, Visual};
    use crate::ui::{UiDrawData, UiPrimitive, UiVertex};
    use glam::{Mat4, Vec2, Vec3};
    use std::cell::RefCell;
    use std::rc::Rc;

    const VS: &str = "@vertex fn vs_main() {}";
    const FS: &str = "@fragment fn fs_main() {}";

    fn backend() -> RendererBackend<HeadlessDevice> {
        backend_with(RendererConfig::default())
    }

    fn backend_with(config: RendererConfig) -> RendererBackend<HeadlessDevice> {
        RendererBackend::setup(
            || Ok(HeadlessDevice::new()),
            &mut HeadlessWindows::default(),
            config,
        )
        .unwrap()
    }

    fn quad_vertices() -> [Vertex; 4] {
        [
            Vertex::new([-1.0, 0.0, -1.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex::new([1.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0]),
            Vertex::new([1.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 1.0]),
            Vertex::new([-1.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 1.0]),
        ]
    }

    struct Scene {
        world: WorldKey,
        shader: ShaderKey,
        visual: VisualKey,
    }

    /// One directional shadow caster, one camera, one textured quad.
    fn quad_scene(backend: &mut RendererBackend<HeadlessDevice>) -> Scene {
        let world = backend
            .create_world_with_viewport(UVec2::new(320, 240))
            .unwrap();
        let shader = backend.load_shader(VS, FS).unwrap();
        let material = backend.create_material(PbrMaterial {
            shader,
            params: PbrParams::default(),
        });
        let mesh = backend.upload_mesh(&quad_vertices(), &[0, 1, 2, 2, 3, 0]);
        let model = backend.create_model(vec![mesh]);
        let visual = backend.create_visual(Visual::new(Mat4::IDENTITY, material, model));

        let mut light = Light::directional(Vec3::new(-1.0, -1.0, -0.5), Vec3::ONE, 2.0);
        light.set_cast_shadows(true);
        let light = backend.create_light(light);

        let mut camera = Camera::default();
        camera.look_at(Vec3::new(0.0, 3.0, 5.0), Vec3::ZERO, Vec3::Y);
        camera.perspective_fov(1.0, Vec2::new(320.0, 240.0), Vec2::new(0.1, 100.0));
        let camera = backend.create_camera(camera);

        let w = backend.worlds.get_mut(world).unwrap();
        w.materials.push(material);
        w.visuals.push(visual);
        w.lights.push(light);
        w.cameras.push(camera);
        Scene {
            world,
            shader,
            visual,
        }
    }

    fn program(backend: &RendererBackend<HeadlessDevice>, shader: ShaderKey) -> crate::ProgramId {
        backend.shader(shader).unwrap().program().unwrap()
    }

    #[test]
    fn quad_scene_renders_one_shadow_pass_and_one_draw() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        backend.device_mut().take_commands();

        let stats = backend.render_world(scene.world);
        assert_eq!(stats.shadow_passes, 1);
        assert_eq!(stats.skipped_shadow_lights, 0);
        assert_eq!(stats.shadow_draw_calls, 1);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.indices_drawn, 6);

        let program = program(&backend, scene.shader);
        let main: Vec<_> = backend
            .device()
            .draw_calls()
            .filter(|d| d.program == Some(program))
            .cloned()
            .collect();
        assert_eq!(main.len(), 1);
        assert_eq!(main[0].count, 6);
        assert_eq!(
            backend.device().uniform(program, "lights[0].shadowed"),
            Some(UniformValue::Bool(true))
        );
    }

    #[test]
    fn shadow_map_is_bound_to_material_slot() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        backend.render_world(scene.world);

        let shadow_id = backend.texture(backend.shadow_map()).unwrap().id();
        let program = program(&backend, scene.shader);
        let draw = backend
            .device()
            .draw_calls()
            .find(|d| d.program == Some(program))
            .cloned()
            .unwrap();
        assert!(draw.textures.contains(&(SamplerSlot::Shadows as u32, shadow_id)));
    }

    #[test]
    fn zero_cameras_only_clears() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        backend.worlds.get_mut(scene.world).unwrap().cameras.clear();
        backend.device_mut().take_commands();

        let stats = backend.render_world(scene.world);
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(stats.skybox_draw_calls, 0);

        let viewport_fb = {
            let w = backend.worlds.get(scene.world).unwrap();
            let vp = backend.viewport(w.viewport.unwrap()).unwrap();
            backend.frame_buffer(vp.framebuffer()).unwrap().id()
        };
        let clears: Vec<_> = backend
            .device()
            .commands()
            .iter()
            .filter(|c| {
                matches!(c, Command::Clear { framebuffer: Some(fb), color: Some(_), .. } if *fb == viewport_fb)
            })
            .collect();
        assert_eq!(clears.len(), 1);
        // Only the shadow pass draws.
        assert_eq!(backend.device().draw_calls().count() as u32, stats.shadow_draw_calls);
    }

    #[test]
    fn non_casting_light_never_touches_shadow_framebuffer() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        let light = backend.worlds.get(scene.world).unwrap().lights[0];
        backend.lights.get_mut(light).unwrap().set_cast_shadows(false);
        backend.device_mut().take_commands();

        let stats = backend.render_world(scene.world);
        assert_eq!(stats.shadow_passes, 0);

        let shadow_fb = backend
            .frame_buffer(backend.shadows.framebuffer)
            .unwrap()
            .id();
        assert!(!backend.device().commands().iter().any(|c| matches!(
            c,
            Command::BindFramebuffer(Some(fb)) | Command::Attach { framebuffer: fb, .. }
                if *fb == shadow_fb
        )));
    }

    #[test]
    fn seventeenth_caster_is_skipped_and_rest_render() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        for _ in 0..16 {
            let mut light = Light::directional(Vec3::NEG_Y, Vec3::ONE, 1.0);
            light.set_cast_shadows(true);
            let key = backend.create_light(light);
            backend.worlds.get_mut(scene.world).unwrap().lights.push(key);
        }

        let stats = backend.render_world(scene.world);
        assert_eq!(stats.shadow_passes, 16);
        assert_eq!(stats.skipped_shadow_lights, 1);
        assert_eq!(stats.draw_calls, 1);
    }

    #[test]
    fn point_light_shadows_are_skipped() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        let mut point = Light::point(Vec3::new(0.0, 2.0, 0.0), Vec3::ONE, 5.0);
        point.set_cast_shadows(true);
        let key = backend.create_light(point);
        backend.worlds.get_mut(scene.world).unwrap().lights.push(key);

        let stats = backend.render_world(scene.world);
        assert_eq!(stats.shadow_passes, 1);
        assert_eq!(stats.skipped_shadow_lights, 1);
        let program = program(&backend, scene.shader);
        assert_eq!(
            backend.device().uniform(program, "lights[1].shadowed"),
            Some(UniformValue::Bool(false))
        );
    }

    #[test]
    fn materials_sharing_a_shader_get_indexed_light_uniforms() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        let second = backend.create_material(Material::new(scene.shader));
        let extra = backend.create_light(Light::point(Vec3::ONE, Vec3::X, 1.0));
        {
            let w = backend.worlds.get_mut(scene.world).unwrap();
            w.materials.push(second);
            w.lights.push(extra);
        }
        backend.device_mut().take_commands();
        backend.update_material_globals(scene.world, &[false, false]);

        let program = program(&backend, scene.shader);
        let names: Vec<String> = backend
            .device()
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetUniform { program: p, name, .. } if *p == program => {
                    Some(name.clone())
                }
                _ => None,
            })
            .collect();

        for field in ["enabled", "kind", "position", "direction", "color", "intensity"] {
            for i in 0..2 {
                let name = format!("lights[{i}].{field}");
                // Pushed once per material.
                assert_eq!(names.iter().filter(|n| **n == name).count(), 2, "{name}");
            }
        }
        assert!(!names.iter().any(|n| n.starts_with("lights[2]")));
        assert_eq!(
            backend.device().uniform(program, "light_count"),
            Some(UniformValue::Int(2))
        );
        assert_eq!(
            backend.device().uniform(program, "lights[1].color"),
            Some(UniformValue::Vec3(Vec3::X))
        );
    }

    #[test]
    fn each_material_draws_with_its_own_parameters() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        let rough = backend.create_material(PbrMaterial {
            shader: scene.shader,
            params: PbrParams {
                roughness: 0.9,
                ..PbrParams::default()
            },
        });
        let model = backend.visuals.get(scene.visual).unwrap().model.unwrap();
        let second = backend.create_visual(Visual::new(Mat4::IDENTITY, rough, model));
        {
            let w = backend.worlds.get_mut(scene.world).unwrap();
            w.materials.push(rough);
            w.visuals.push(second);
        }
        backend.device_mut().take_commands();
        backend.render_world(scene.world);

        // The last roughness pushed before each main draw belongs to that
        // draw's material.
        let program = program(&backend, scene.shader);
        let mut roughness = None;
        let mut seen = Vec::new();
        for c in backend.device().commands() {
            match c {
                Command::SetUniform {
                    program: p,
                    name,
                    value,
                } if *p == program && name == "roughness" => roughness = Some(*value),
                Command::DrawIndexed(d) if d.program == Some(program) => seen.push(roughness),
                _ => {}
            }
        }
        assert_eq!(
            seen,
            vec![
                Some(UniformValue::Float(0.1)),
                Some(UniformValue::Float(0.9))
            ]
        );
    }

    #[test]
    fn empty_slots_are_unbound_between_materials() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        let albedo = backend
            .upload_texture_2d(UVec2::new(1, 1), &[255, 0, 0, 255], crate::TextureFormat::Rgba8)
            .unwrap();
        let first_material = backend.visuals.get(scene.visual).unwrap().material.unwrap();
        backend
            .materials
            .get_mut(first_material)
            .unwrap()
            .set_texture(SamplerSlot::Albedo, Some(albedo));

        let plain = backend.create_material(Material::new(scene.shader));
        let model = backend.visuals.get(scene.visual).unwrap().model.unwrap();
        let second = backend.create_visual(Visual::new(Mat4::IDENTITY, plain, model));
        backend.worlds.get_mut(scene.world).unwrap().visuals.push(second);
        backend.device_mut().take_commands();
        backend.render_world(scene.world);

        let program = program(&backend, scene.shader);
        let draws: Vec<_> = backend
            .device()
            .draw_calls()
            .filter(|d| d.program == Some(program))
            .cloned()
            .collect();
        assert!(draws[0].textures.iter().any(|(unit, _)| *unit == 0));
        assert!(!draws[1].textures.iter().any(|(unit, _)| *unit == 0));
    }

    #[test]
    fn skybox_draws_with_front_culling_and_restores_state() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        let sky_shader = backend.load_shader(VS, FS).unwrap();
        let sky_material = backend.create_material(Material::new(sky_shader));
        let mesh = backend.upload_mesh(&quad_vertices(), &[0, 1, 2, 2, 3, 0, 0, 2, 1]);
        let model = backend.create_model(vec![mesh]);
        let sky = backend.create_visual(Visual::new(Mat4::IDENTITY, sky_material, model));
        let env = backend.worlds.get(scene.world).unwrap().environment.unwrap();
        backend.environments.get_mut(env).unwrap().skybox = Some(sky);
        backend.device_mut().take_commands();

        let stats = backend.render_world(scene.world);
        assert_eq!(stats.skybox_draw_calls, 1);

        let sky_program = program(&backend, sky_shader);
        let sky_draw = backend
            .device()
            .draw_calls()
            .find(|d| d.program == Some(sky_program))
            .cloned()
            .unwrap();
        assert_eq!(sky_draw.count, 9);
        assert_eq!(sky_draw.raster.cull, CullMode::Front);
        assert!(!sky_draw.raster.depth_write);

        let main_program = program(&backend, scene.shader);
        let main_draw = backend
            .device()
            .draw_calls()
            .find(|d| d.program == Some(main_program))
            .cloned()
            .unwrap();
        assert_eq!(main_draw.raster, RasterState::default());

        // View pushed to the skybox has no translation.
        match backend.device().uniform(sky_program, "view") {
            Some(UniformValue::Mat4(view)) => assert_eq!(view.w_axis, Vec4::W),
            other => panic!("unexpected view uniform {other:?}"),
        }
    }

    #[test]
    fn broken_skybox_shader_is_not_drawn() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        let sky_shader = backend.load_shader(VS, FS).unwrap();
        let sky_material = backend.create_material(Material::new(sky_shader));
        let mesh = backend.upload_mesh(&quad_vertices(), &[0, 1, 2]);
        let model = backend.create_model(vec![mesh]);
        let sky = backend.create_visual(Visual::new(Mat4::IDENTITY, sky_material, model));
        let env = backend.worlds.get(scene.world).unwrap().environment.unwrap();
        backend.environments.get_mut(env).unwrap().skybox = Some(sky);

        assert!(backend.reload_shader(sky_shader, VS, "#error broken").is_err());
        assert!(!backend.shader(sky_shader).unwrap().is_usable());
        backend.device_mut().take_commands();

        let stats = backend.render_world(scene.world);
        assert_eq!(stats.skybox_draw_calls, 0);
        assert_eq!(stats.draw_calls, 1);
        assert!(
            backend
                .device()
                .draw_calls()
                .all(|d| d.raster.cull != CullMode::Front),
            "nothing drawn with skybox raster state"
        );
    }

    #[test]
    fn unready_worlds_are_skipped() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        let bare = backend.create_world();
        let stats = backend.render_worlds();
        assert_eq!(stats.worlds_rendered, 1);
        assert_eq!(stats.worlds_skipped, 1);
        assert_eq!(stats.totals.draw_calls, 1);
        assert!(backend.worlds.get(bare).is_some());
        assert!(backend.worlds.get(scene.world).is_some());
    }

    #[test]
    fn hooks_run_in_frame_order() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        let log = Rc::new(RefCell::new(Vec::new()));
        let world = backend.worlds.get_mut(scene.world).unwrap();

        let l = log.clone();
        world.add_post_render(move |_| l.borrow_mut().push("post"));
        let l = log.clone();
        world.add_ui_pass(move |_| l.borrow_mut().push("ui"));
        let l = log.clone();
        let removed = world.add_pre_render(move |_| l.borrow_mut().push("removed"));
        let l = log.clone();
        world.add_pre_render(move |ctx| {
            assert!(ctx.camera.is_some());
            assert_eq!(ctx.viewport_size, Some(UVec2::new(320, 240)));
            l.borrow_mut().push("pre");
        });
        assert!(world.remove_hook(removed));

        backend.render_world(scene.world);
        assert_eq!(*log.borrow(), vec!["pre", "ui", "post"]);
    }

    #[test]
    fn ui_pass_hook_data_is_composited() {
        let mut backend = backend_with(RendererConfig {
            enable_ui: true,
            ..RendererConfig::default()
        });
        let scene = quad_scene(&mut backend);
        let color = {
            let w = backend.worlds.get(scene.world).unwrap();
            backend.viewport(w.viewport.unwrap()).unwrap().color_output()
        };
        let panel = backend.register_ui_texture(color).unwrap();
        backend
            .worlds
            .get_mut(scene.world)
            .unwrap()
            .add_ui_pass(move |ctx| {
                *ctx.ui_draw_data = Some(UiDrawData {
                    screen_size: Vec2::new(320.0, 240.0),
                    primitives: vec![UiPrimitive {
                        clip_rect: [0.0, 0.0, 100.0, 100.0],
                        texture: panel,
                        vertices: vec![UiVertex::default(); 3],
                        indices: vec![0, 1, 2],
                    }],
                    ..UiDrawData::default()
                });
            });

        let stats = backend.render_world(scene.world);
        assert_eq!(stats.ui_draw_calls, 1);
        let last_draw = backend.device().draw_calls().last().cloned().unwrap();
        assert_eq!(last_draw.raster.blend, BlendMode::PremultipliedAlpha);
        // Draw data is per frame.
        assert!(backend.worlds.get(scene.world).unwrap().ui_draw_data.is_none());
    }

    #[test]
    fn present_blits_viewport_to_window() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        let vp = backend.worlds.get(scene.world).unwrap().viewport.unwrap();
        let main = backend.main_window();
        backend.bind_viewport(main, Some(vp)).unwrap();
        backend.device_mut().take_commands();

        backend.render();
        let surface = backend.window(main).unwrap().surface();
        let color_id = backend
            .texture(backend.viewport(vp).unwrap().color_output())
            .unwrap()
            .id();
        let tail: Vec<_> = backend.device().commands().iter().rev().take(2).cloned().collect();
        assert_eq!(tail[0], Command::Present(surface));
        assert_eq!(
            tail[1],
            Command::BlitToSurface {
                surface,
                source: color_id,
                size: UVec2::new(1280, 720)
            }
        );
    }

    #[test]
    fn stale_keys_are_skipped() {
        let mut backend = backend();
        let scene = quad_scene(&mut backend);
        backend.destroy_visual(scene.visual);
        let stats = backend.render_world(scene.world);
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(stats.shadow_passes, 1);
    }
}
