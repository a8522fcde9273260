//! egui output to renderer UI draw data.

use egui::epaint::{ClippedPrimitive, ImageData, Primitive};
use egui::TexturesDelta;
use glam::{UVec2, Vec2};
use swarm_render::{UiDrawData, UiPrimitive, UiTextureId, UiTextureUpdate, UiVertex};

fn texture_id(id: egui::TextureId) -> UiTextureId {
    match id {
        egui::TextureId::Managed(n) => UiTextureId::Managed(n),
        egui::TextureId::User(n) => UiTextureId::User(n),
    }
}

/// Premultiplied RGBA8 pixels of an egui image.
fn image_pixels(image: &ImageData) -> (UVec2, Vec<u8>) {
    let [w, h] = image.size();
    let pixels: Vec<u8> = match image {
        ImageData::Color(color) => color.pixels.iter().flat_map(|c| c.to_array()).collect(),
        ImageData::Font(font) => font.srgba_pixels(None).flat_map(|c| c.to_array()).collect(),
    };
    (UVec2::new(w as u32, h as u32), pixels)
}

/// Convert one tessellated egui frame. Geometry is scaled from points to
/// pixels; paint callbacks are dropped.
pub fn draw_data(
    textures: &TexturesDelta,
    primitives: &[ClippedPrimitive],
    pixels_per_point: f32,
    screen_size: UVec2,
) -> UiDrawData {
    let textures_set = textures
        .set
        .iter()
        .filter_map(|(id, delta)| {
            let egui::TextureId::Managed(id) = *id else {
                return None;
            };
            let (size, pixels) = image_pixels(&delta.image);
            Some(UiTextureUpdate {
                id,
                pos: delta.pos.map(|[x, y]| UVec2::new(x as u32, y as u32)),
                size,
                pixels,
            })
        })
        .collect();
    let textures_free = textures
        .free
        .iter()
        .filter_map(|id| match id {
            egui::TextureId::Managed(n) => Some(*n),
            egui::TextureId::User(_) => None,
        })
        .collect();

    let scale = pixels_per_point;
    let primitives = primitives
        .iter()
        .filter_map(|clipped| {
            let Primitive::Mesh(mesh) = &clipped.primitive else {
                return None;
            };
            let clip = clipped.clip_rect;
            Some(UiPrimitive {
                clip_rect: [
                    clip.min.x * scale,
                    clip.min.y * scale,
                    clip.max.x * scale,
                    clip.max.y * scale,
                ],
                texture: texture_id(mesh.texture_id),
                vertices: mesh
                    .vertices
                    .iter()
                    .map(|v| UiVertex {
                        pos: [v.pos.x * scale, v.pos.y * scale],
                        uv: [v.uv.x, v.uv.y],
                        color: v.color.to_array(),
                    })
                    .collect(),
                indices: mesh.indices.clone(),
            })
        })
        .collect();

    UiDrawData {
        screen_size: Vec2::new(screen_size.x as f32, screen_size.y as f32),
        textures_set,
        textures_free,
        primitives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::epaint::{ColorImage, ImageDelta, Mesh, Vertex};
    use egui::{Color32, Pos2, Rect, TextureOptions};

    fn triangle() -> ClippedPrimitive {
        let mut mesh = Mesh::with_texture(egui::TextureId::Managed(0));
        for (x, y) in [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)] {
            mesh.vertices.push(Vertex {
                pos: Pos2::new(x, y),
                uv: Pos2::ZERO,
                color: Color32::from_rgba_premultiplied(10, 20, 30, 40),
            });
        }
        mesh.indices = vec![0, 1, 2];
        ClippedPrimitive {
            clip_rect: Rect::from_min_max(Pos2::new(1.0, 2.0), Pos2::new(50.0, 60.0)),
            primitive: Primitive::Mesh(mesh),
        }
    }

    #[test]
    fn geometry_is_scaled_to_pixels() {
        let data = draw_data(
            &TexturesDelta::default(),
            &[triangle()],
            2.0,
            UVec2::new(200, 100),
        );
        assert_eq!(data.screen_size, Vec2::new(200.0, 100.0));
        let prim = &data.primitives[0];
        assert_eq!(prim.clip_rect, [2.0, 4.0, 100.0, 120.0]);
        assert_eq!(prim.vertices[1].pos, [20.0, 0.0]);
        assert_eq!(prim.vertices[0].color, [10, 20, 30, 40]);
        assert_eq!(prim.texture, UiTextureId::Managed(0));
        assert_eq!(prim.indices, vec![0, 1, 2]);
    }

    #[test]
    fn managed_textures_are_forwarded() {
        let image = ColorImage::new([2, 1], Color32::WHITE);
        let mut delta = TexturesDelta::default();
        delta.set.push((
            egui::TextureId::Managed(7),
            ImageDelta::full(image, TextureOptions::LINEAR),
        ));
        delta.free.push(egui::TextureId::Managed(3));
        delta.free.push(egui::TextureId::User(1));

        let data = draw_data(&delta, &[], 1.0, UVec2::new(10, 10));
        assert_eq!(data.textures_set.len(), 1);
        let update = &data.textures_set[0];
        assert_eq!(update.id, 7);
        assert_eq!(update.pos, None);
        assert_eq!(update.size, UVec2::new(2, 1));
        assert_eq!(update.pixels, vec![255; 8]);
        assert_eq!(data.textures_free, vec![3]);
    }
}
