//! Procedural meshes.
//!
//! Every generator winds front faces counter-clockwise seen from outside,
//! with normals and tangents filled in and uv (0, 0) at the bottom left.

use glam::{Vec2, Vec3};
use swarm_render::{GpuDevice, MeshKey, ModelKey, RendererBackend, Vertex};

/// Decoded vertex and index data, ready for upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn upload<D: GpuDevice>(&self, backend: &mut RendererBackend<D>) -> MeshKey {
        backend.upload_mesh(&self.vertices, &self.indices)
    }

    /// Upload as a single-mesh model.
    pub fn upload_model<D: GpuDevice>(&self, backend: &mut RendererBackend<D>) -> ModelKey {
        let mesh = self.upload(backend);
        backend.create_model(vec![mesh])
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Append a `segments` x `segments` grid spanning `tangent` and
    /// `bitangent` around `center`, facing `normal`.
    fn push_face(&mut self, center: Vec3, normal: Vec3, tangent: Vec3, half: Vec2, segments: u32) {
        let bitangent = normal.cross(tangent);
        let base = self.vertices.len() as u32;
        let row = segments + 1;
        for j in 0..=segments {
            for i in 0..=segments {
                let uv = Vec2::new(i as f32, j as f32) / segments as f32;
                let offset = (uv * 2.0 - Vec2::ONE) * half;
                let position = center + tangent * offset.x + bitangent * offset.y;
                self.vertices.push(Vertex {
                    position: position.to_array(),
                    normal: normal.to_array(),
                    tangent: tangent.to_array(),
                    uv: uv.to_array(),
                    ..Vertex::default()
                });
            }
        }
        for j in 0..segments {
            for i in 0..segments {
                let a = base + j * row + i;
                let b = a + 1;
                let c = b + row;
                let d = a + row;
                self.indices.extend_from_slice(&[a, b, c, c, d, a]);
            }
        }
    }
}

/// `(normal, tangent)` of each cube face.
const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_X, Vec3::Z),
    (Vec3::Y, Vec3::X),
    (Vec3::NEG_Y, Vec3::X),
    (Vec3::Z, Vec3::X),
    (Vec3::NEG_Z, Vec3::NEG_X),
];

/// Rectangle in the XY plane facing +Z.
pub fn quad(size: Vec2) -> MeshData {
    let mut mesh = MeshData::default();
    mesh.push_face(Vec3::ZERO, Vec3::Z, Vec3::X, size * 0.5, 1);
    mesh
}

/// Square in the XZ plane facing +Y, split into `subdivisions` cells per side.
pub fn plane(size: f32, subdivisions: u32) -> MeshData {
    let mut mesh = MeshData::default();
    mesh.push_face(
        Vec3::ZERO,
        Vec3::Y,
        Vec3::X,
        Vec2::splat(size * 0.5),
        subdivisions.max(1),
    );
    mesh
}

/// Axis-aligned cube with four vertices per face.
pub fn cube(size: f32) -> MeshData {
    let half = size * 0.5;
    let mut mesh = MeshData::default();
    for (normal, tangent) in CUBE_FACES {
        mesh.push_face(normal * half, normal, tangent, Vec2::splat(half), 1);
    }
    mesh
}

/// Eight shared corners at +-1, for drawing a cubemap around the camera.
///
/// Wound like [`cube`]; the skybox pass culls front faces to see the inside.
pub fn skybox_cube() -> MeshData {
    let vertices = (0..8u32)
        .map(|i| {
            let corner = |bit: u32| if i & bit == 0 { -1.0 } else { 1.0 };
            Vertex::new([corner(1), corner(2), corner(4)], [0.0; 3], [0.0; 2])
        })
        .collect();
    #[rustfmt::skip]
    let indices = vec![
        1, 3, 7, 7, 5, 1, // +X
        4, 6, 2, 2, 0, 4, // -X
        6, 7, 3, 3, 2, 6, // +Y
        0, 1, 5, 5, 4, 0, // -Y
        4, 5, 7, 7, 6, 4, // +Z
        1, 0, 2, 2, 3, 1, // -Z
    ];
    MeshData { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(mesh: &MeshData, index: u32) -> Vec3 {
        Vec3::from_array(mesh.vertices[index as usize].position)
    }

    /// Every triangle's winding normal points away from the origin.
    fn assert_outward(mesh: &MeshData) {
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| position(mesh, i));
            let winding = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(winding.dot(centroid) > 0.0, "inward triangle {tri:?}");
        }
    }

    #[test]
    fn cube_faces_point_outward() {
        let mesh = cube(1.0);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert_outward(&mesh);
        for tri in mesh.indices.chunks_exact(3) {
            let a = position(&mesh, tri[0]);
            let b = position(&mesh, tri[1]);
            let c = position(&mesh, tri[2]);
            let stored = Vec3::from_array(mesh.vertices[tri[0] as usize].normal);
            assert!((b - a).cross(c - a).normalize().abs_diff_eq(stored, 1e-5));
        }
    }

    #[test]
    fn cube_has_half_extent_corners() {
        let mesh = cube(2.0);
        for v in &mesh.vertices {
            assert!(v.position.iter().all(|c| (c.abs() - 1.0).abs() < 1e-6));
        }
    }

    #[test]
    fn skybox_shares_corners() {
        let mesh = skybox_cube();
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        assert_outward(&mesh);
    }

    #[test]
    fn plane_subdivides_and_faces_up() {
        let mesh = plane(4.0, 3);
        assert_eq!(mesh.vertices.len(), 16);
        assert_eq!(mesh.triangle_count(), 18);
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| position(&mesh, i));
            assert!((b - a).cross(c - a).y > 0.0);
        }
        let max_x = mesh
            .vertices
            .iter()
            .map(|v| v.position[0])
            .fold(f32::MIN, f32::max);
        assert_eq!(max_x, 2.0);
    }

    #[test]
    fn quad_uvs_start_bottom_left() {
        let mesh = quad(Vec2::new(2.0, 1.0));
        assert_eq!(mesh.indices, vec![0, 1, 3, 3, 2, 0]);
        assert_eq!(mesh.vertices[0].position, [-1.0, -0.5, 0.0]);
        assert_eq!(mesh.vertices[0].uv, [0.0, 0.0]);
        assert_eq!(mesh.vertices[3].uv, [1.0, 1.0]);
    }
}
