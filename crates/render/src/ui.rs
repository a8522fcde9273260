//! Immediate-mode UI compositing.
//!
//! A UI library tessellates its frame into [`UiDrawData`]: clipped triangle
//! lists in screen pixels plus texture updates. The compositor draws that
//! data over the 3D output of a world.

use crate::builtin;
use crate::device::{
    BlendMode, CullMode, GpuDevice, RasterState, ScissorRect, TextureKind, VertexLayout,
};
use crate::keys::TextureKey;
use crate::mesh::Mesh;
use crate::shader::{Shader, ShaderError};
use crate::texture::{Texture, TextureError};
use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2};
use std::collections::HashMap;
use swarm_pool::Pool;

/// Screen-space UI vertex. Color is premultiplied sRGBA8.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, Pod, Zeroable)]
pub struct UiVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    pub color: [u8; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiTextureId {
    /// Owned by the compositor, created through [`UiTextureUpdate`]s.
    Managed(u64),
    /// A renderer texture exposed with [`UiCompositor::register_ui_texture`].
    User(u64),
}

/// Create or patch a managed texture. Pixels are premultiplied RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct UiTextureUpdate {
    pub id: u64,
    /// `None` replaces the whole texture.
    pub pos: Option<UVec2>,
    pub size: UVec2,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UiPrimitive {
    /// `[min_x, min_y, max_x, max_y]` in pixels.
    pub clip_rect: [f32; 4],
    pub texture: UiTextureId,
    pub vertices: Vec<UiVertex>,
    pub indices: Vec<u32>,
}

/// One frame of UI output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiDrawData {
    pub screen_size: Vec2,
    pub textures_set: Vec<UiTextureUpdate>,
    pub textures_free: Vec<u64>,
    pub primitives: Vec<UiPrimitive>,
}

const UI_RASTER: RasterState = RasterState {
    cull: CullMode::None,
    depth_test: false,
    depth_write: false,
    blend: BlendMode::PremultipliedAlpha,
};

pub struct UiCompositor {
    shader: Shader,
    mesh: Mesh,
    managed: HashMap<u64, Texture>,
    user: HashMap<u64, TextureKey>,
    next_user: u64,
}

impl UiCompositor {
    pub fn new(device: &mut dyn GpuDevice) -> Result<Self, ShaderError> {
        let mut shader = Shader::default();
        shader.compile(device, builtin::UI_VS, builtin::UI_FS)?;
        Ok(Self {
            shader,
            mesh: Mesh::new(device),
            managed: HashMap::new(),
            user: HashMap::new(),
            next_user: 0,
        })
    }

    /// Make a renderer texture drawable by the UI.
    pub fn register_ui_texture(&mut self, texture: TextureKey) -> UiTextureId {
        self.next_user += 1;
        self.user.insert(self.next_user, texture);
        UiTextureId::User(self.next_user)
    }

    pub fn unregister_ui_texture(&mut self, id: UiTextureId) {
        if let UiTextureId::User(n) = id {
            self.user.remove(&n);
        }
    }

    pub fn managed_texture_count(&self) -> usize {
        self.managed.len()
    }

    /// Draw `data` into the bound target of size `target`. Returns the
    /// number of draw calls issued.
    pub fn composite(
        &mut self,
        device: &mut dyn GpuDevice,
        textures: &Pool<TextureKey, Texture>,
        data: &UiDrawData,
        target: UVec2,
    ) -> u32 {
        for update in &data.textures_set {
            if let Err(e) = self.apply_update(device, update) {
                tracing::warn!(texture = update.id, "UI texture update failed: {e}");
            }
        }

        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut ranges = Vec::with_capacity(data.primitives.len());
        for prim in &data.primitives {
            ranges.push((indices.len() as u32, vertices.len() as i32));
            vertices.extend_from_slice(&prim.vertices);
            indices.extend_from_slice(&prim.indices);
        }

        let mut draws = 0;
        if !indices.is_empty() && self.shader.is_usable() {
            self.mesh
                .set_raw_vertices(device, VertexLayout::Ui, bytemuck::cast_slice(&vertices));
            self.mesh.set_triangles(device, &indices);

            device.set_raster_state(UI_RASTER);
            self.shader.use_shader(device);
            self.shader.set_vec2(device, "screen_size", data.screen_size);
            self.mesh.bind(device);

            for (prim, (first_index, base_vertex)) in data.primitives.iter().zip(ranges) {
                let Some(scissor) = clip_to_scissor(prim.clip_rect, target) else {
                    continue;
                };
                let texture = match prim.texture {
                    UiTextureId::Managed(n) => self.managed.get(&n).map(Texture::id),
                    UiTextureId::User(n) => self
                        .user
                        .get(&n)
                        .and_then(|k| textures.get(*k))
                        .map(Texture::id),
                };
                if texture.is_none() {
                    tracing::trace!(texture = ?prim.texture, "UI primitive with unknown texture");
                }
                device.set_scissor(Some(scissor));
                device.activate_texture(0, texture);
                device.draw_indexed(first_index, prim.indices.len() as u32, base_vertex);
                draws += 1;
            }

            device.set_scissor(None);
            device.activate_texture(0, None);
            device.set_raster_state(RasterState::default());
        }

        for id in &data.textures_free {
            if let Some(tex) = self.managed.remove(id) {
                tex.release(device);
            }
        }
        draws
    }

    pub fn release(self, device: &mut dyn GpuDevice) {
        self.shader.release(device);
        self.mesh.release(device);
        for (_, tex) in self.managed {
            tex.release(device);
        }
    }

    fn apply_update(
        &mut self,
        device: &mut dyn GpuDevice,
        update: &UiTextureUpdate,
    ) -> Result<(), TextureError> {
        match update.pos {
            None => {
                let tex = self
                    .managed
                    .entry(update.id)
                    .or_insert_with(|| Texture::new(device, TextureKind::D2));
                tex.set_as_rgba8(device, update.size, Some(&update.pixels))
            }
            Some(pos) => {
                let tex = self
                    .managed
                    .get_mut(&update.id)
                    .ok_or(TextureError::NotAllocated)?;
                tex.write_region(device, pos, update.size, &update.pixels)
            }
        }
    }
}

/// Pixel clip rectangle clamped to the target, or `None` when empty.
fn clip_to_scissor(clip: [f32; 4], target: UVec2) -> Option<ScissorRect> {
    let min_x = clip[0].max(0.0).round() as u32;
    let min_y = clip[1].max(0.0).round() as u32;
    let max_x = (clip[2].round().max(0.0) as u32).min(target.x);
    let max_y = (clip[3].round().max(0.0) as u32).min(target.y);
    if max_x <= min_x || max_y <= min_y {
        return None;
    }
    Some(ScissorRect {
        origin: UVec2::new(min_x, min_y),
        size: UVec2::new(max_x - min_x, max_y - min_y),
    })
}
