//! Procedural images.

use glam::{UVec2, Vec2, Vec3};
use swarm_render::{GpuDevice, RendererBackend, TextureError, TextureFormat, TextureKey};

/// Decoded pixels, rows bottom to top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub size: UVec2,
    pub format: TextureFormat,
    pub pixels: Vec<u8>,
}

impl Image {
    pub fn upload<D: GpuDevice>(
        &self,
        backend: &mut RendererBackend<D>,
    ) -> Result<TextureKey, TextureError> {
        backend.upload_texture_2d(self.size, &self.pixels, self.format)
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_texel();
        let start = (y * self.size.x + x) as usize * bpp;
        &self.pixels[start..start + bpp]
    }
}

/// Six RGB8 faces in +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubemapImage {
    pub size: u32,
    pub faces: [Vec<u8>; 6],
}

impl CubemapImage {
    pub fn upload<D: GpuDevice>(
        &self,
        backend: &mut RendererBackend<D>,
    ) -> Result<TextureKey, TextureError> {
        let faces = [0, 1, 2, 3, 4, 5].map(|i| self.faces[i].as_slice());
        backend.upload_cubemap(UVec2::splat(self.size), faces, TextureFormat::Rgb8)
    }
}

/// Square cells alternating between `a` and `b`, starting with `a`.
pub fn checkerboard(size: UVec2, cell: u32, a: [u8; 4], b: [u8; 4]) -> Image {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity((size.x * size.y * 4) as usize);
    for y in 0..size.y {
        for x in 0..size.x {
            let even = (x / cell + y / cell) % 2 == 0;
            pixels.extend_from_slice(if even { &a } else { &b });
        }
    }
    Image {
        size,
        format: TextureFormat::Rgba8,
        pixels,
    }
}

pub fn solid(size: UVec2, color: [u8; 4]) -> Image {
    Image {
        size,
        format: TextureFormat::Rgba8,
        pixels: color.repeat((size.x * size.y) as usize),
    }
}

/// Direction through texel coordinate `st` (in -1..1) of a cube face.
fn face_direction(face: usize, st: Vec2) -> Vec3 {
    let (s, t) = (st.x, st.y);
    match face {
        0 => Vec3::new(1.0, -t, -s),
        1 => Vec3::new(-1.0, -t, s),
        2 => Vec3::new(s, 1.0, t),
        3 => Vec3::new(s, -1.0, -t),
        4 => Vec3::new(s, -t, 1.0),
        _ => Vec3::new(-s, -t, -1.0),
    }
}

/// Sky gradient blending `bottom` (looking down) to `top` (looking up).
pub fn gradient_cubemap(size: u32, top: Vec3, bottom: Vec3) -> CubemapImage {
    let size = size.max(1);
    let faces = std::array::from_fn(|face| {
        let mut pixels = Vec::with_capacity((size * size * 3) as usize);
        for y in 0..size {
            for x in 0..size {
                let st = (Vec2::new(x as f32, y as f32) + 0.5) / size as f32 * 2.0 - Vec2::ONE;
                let up = face_direction(face, st).normalize().y * 0.5 + 0.5;
                let color = bottom.lerp(top, up).clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
                pixels.extend(color.round().to_array().map(|c| c as u8));
            }
        }
        pixels
    });
    CubemapImage { size, faces }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 4] = [255; 4];
    const BLACK: [u8; 4] = [0, 0, 0, 255];

    #[test]
    fn checker_alternates_per_cell() {
        let image = checkerboard(UVec2::new(4, 4), 2, WHITE, BLACK);
        assert_eq!(image.pixels.len(), 64);
        assert_eq!(image.pixel(0, 0), WHITE);
        assert_eq!(image.pixel(1, 1), WHITE);
        assert_eq!(image.pixel(2, 0), BLACK);
        assert_eq!(image.pixel(3, 3), WHITE);
    }

    #[test]
    fn solid_fills_every_texel() {
        let image = solid(UVec2::new(3, 2), [1, 2, 3, 4]);
        assert_eq!(image.pixels.len(), 24);
        assert!(image.pixels.chunks(4).all(|p| p == [1, 2, 3, 4]));
    }

    #[test]
    fn gradient_is_top_color_overhead() {
        let top = Vec3::new(0.2, 0.4, 1.0);
        let sky = gradient_cubemap(8, top, Vec3::ZERO);
        assert!(sky.faces.iter().all(|f| f.len() == 8 * 8 * 3));

        let center = ((4 * 8 + 4) * 3) as usize;
        let up = &sky.faces[2][center..center + 3];
        let down = &sky.faces[3][center..center + 3];
        assert!(up[2] > 240, "{up:?}");
        assert!(down.iter().all(|c| *c < 16), "{down:?}");
        // Horizon faces sit in between.
        let side = &sky.faces[0][center..center + 3];
        assert!(side[2] > down[2] && side[2] < up[2]);
    }
}
