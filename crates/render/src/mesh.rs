use crate::device::{GpuDevice, MeshId, VertexLayout};
use crate::keys::MeshKey;
use bytemuck::{Pod, Zeroable};

/// Interleaved vertex: position, normal, tangent, color, uv.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0; 3],
            tangent: [0.0; 3],
            color: [1.0; 3],
            uv: [0.0; 2],
        }
    }
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            ..Self::default()
        }
    }
}

/// Vertex + index buffers. Uploads replace the whole buffer.
#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    vertex_count: u32,
    index_count: u32,
}

impl Mesh {
    pub fn new(device: &mut dyn GpuDevice) -> Self {
        Self {
            id: device.create_mesh(),
            vertex_count: 0,
            index_count: 0,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices (elements) drawn by this mesh.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn set_vertices(&mut self, device: &mut dyn GpuDevice, vertices: &[Vertex]) {
        device.upload_vertices(self.id, VertexLayout::Standard, bytemuck::cast_slice(vertices));
        self.vertex_count = vertices.len() as u32;
    }

    /// Upload vertices in a non-standard layout (UI geometry).
    pub fn set_raw_vertices(
        &mut self,
        device: &mut dyn GpuDevice,
        layout: VertexLayout,
        data: &[u8],
    ) {
        device.upload_vertices(self.id, layout, data);
        self.vertex_count = (data.len() / layout.stride()) as u32;
    }

    pub fn set_triangles(&mut self, device: &mut dyn GpuDevice, indices: &[u32]) {
        device.upload_indices(self.id, indices);
        self.index_count = indices.len() as u32;
    }

    pub fn bind(&self, device: &mut dyn GpuDevice) {
        device.bind_mesh(self.id);
    }

    pub fn release(self, device: &mut dyn GpuDevice) {
        device.delete_mesh(self.id);
    }
}

/// An ordered set of meshes imported as one asset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub meshes: Vec<MeshKey>,
}

impl Model {
    pub fn new(meshes: Vec<MeshKey>) -> Self {
        Self { meshes }
    }
}
