use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};
use std::fmt;

macro_rules! device_ids {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}#{}", stringify!($name), self.0)
                }
            }
        )*
    };
}

device_ids! {
    /// A compiled but unlinked shader stage.
    StageId;
    /// A linked shader program.
    ProgramId;
    /// Vertex + index buffer pair.
    MeshId;
    TextureId;
    RenderBufferId;
    FramebufferId;
    /// A window surface (the default framebuffer of one window).
    SurfaceId;
}

/// Errors reported by a [`GpuDevice`].
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("graphics context unavailable: {0}")]
    Context(String),
    #[error("surface error: {0}")]
    Surface(String),
    #[error("missing capability {name}: need {required}, device has {available}")]
    MissingCapability {
        name: &'static str,
        required: u32,
        available: u32,
    },
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
    #[error("unknown {0}")]
    UnknownResource(String),
}

/// Adapter/driver description, logged at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub renderer: String,
    pub version: String,
}

/// Device limits the renderer refuses to start without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredCapabilities {
    pub texture_array_layers: u32,
    pub texture_units: u32,
    pub texture_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Value pushed into a named program uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

/// Interleaving of a mesh's vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// [`crate::Vertex`]: position, normal, tangent, color, uv (14 floats).
    Standard,
    /// [`crate::UiVertex`]: screen position, uv, premultiplied rgba8 color.
    Ui,
}

impl VertexLayout {
    pub fn stride(self) -> usize {
        match self {
            VertexLayout::Standard => std::mem::size_of::<crate::Vertex>(),
            VertexLayout::Ui => std::mem::size_of::<crate::UiVertex>(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    D2Array,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgb8,
    Rgba8,
    Depth32,
    Depth24Stencil8,
}

impl TextureFormat {
    /// Bytes per texel of the upload data.
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::Rgb8 => 3,
            TextureFormat::Rgba8 | TextureFormat::Depth32 | TextureFormat::Depth24Stencil8 => 4,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32 | TextureFormat::Depth24Stencil8)
    }

    pub fn has_stencil(self) -> bool {
        self == TextureFormat::Depth24Stencil8
    }
}

/// Storage specification of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub format: TextureFormat,
    pub size: UVec2,
    pub layers: u32,
}

impl TextureDesc {
    /// Expected upload length in bytes for all layers.
    pub fn data_len(&self) -> usize {
        self.size.x as usize * self.size.y as usize * self.layers as usize
            * self.format.bytes_per_texel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    #[default]
    Repeat,
    Mirrored,
    ClampEdge,
    ClampBorder,
}

/// Sampling parameters attached to a texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
    pub border_color: Vec4,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            filter: TextureFilter::Linear,
            wrap: TextureWrap::Repeat,
            border_color: Vec4::ZERO,
        }
    }
}

/// Where a framebuffer attachment is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentPoint {
    Color(u32),
    Depth,
    DepthStencil,
}

/// What a framebuffer attachment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentTarget {
    /// A texture, optionally a single layer of an array or cube texture.
    Texture {
        texture: TextureId,
        layer: Option<u32>,
    },
    RenderBuffer(RenderBufferId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    MissingAttachment,
    IncompleteAttachment,
    DimensionMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    PremultipliedAlpha,
}

/// Fixed-function state applied to subsequent draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub cull: CullMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull: CullMode::Back,
            depth_test: true,
            depth_write: true,
            blend: BlendMode::Opaque,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub origin: UVec2,
    pub size: UVec2,
}

/// Immediate-mode graphics device.
///
/// The renderer drives every GPU object through this trait. Objects are
/// named by small integer ids, state is set before the draw that uses it,
/// and program uniforms are addressed by name the way a shader declares
/// them (`lights[2].color`). Setting a name the program does not declare is
/// a silent no-op.
///
/// All calls are synchronous from the caller's point of view and happen on
/// the thread that owns the device.
pub trait GpuDevice {
    fn info(&self) -> DeviceInfo;

    /// Check the device against the renderer's required capabilities.
    fn load_extensions(&mut self, required: &RequiredCapabilities) -> Result<(), DeviceError>;

    // Shaders

    /// Compile one stage. The error string is the compiler's diagnostic log.
    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageId, String>;
    /// Link a vertex and a fragment stage into a program.
    fn link_program(&mut self, vertex: StageId, fragment: StageId) -> Result<ProgramId, String>;
    fn delete_stage(&mut self, stage: StageId);
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: ProgramId);
    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue);
    /// Route a named texture declared by the program to a texture unit.
    fn set_sampler_slot(&mut self, program: ProgramId, name: &str, unit: u32);

    // Meshes

    fn create_mesh(&mut self) -> MeshId;
    fn delete_mesh(&mut self, mesh: MeshId);
    /// Replace the vertex buffer. `data` is tightly packed in `layout`.
    fn upload_vertices(&mut self, mesh: MeshId, layout: VertexLayout, data: &[u8]);
    fn upload_indices(&mut self, mesh: MeshId, indices: &[u32]);
    fn bind_mesh(&mut self, mesh: MeshId);

    // Textures

    fn create_texture(&mut self, kind: TextureKind) -> TextureId;
    fn delete_texture(&mut self, texture: TextureId);
    /// (Re)specify storage, optionally filling every layer from `data`.
    fn upload_texture(
        &mut self,
        texture: TextureId,
        desc: &TextureDesc,
        data: Option<&[u8]>,
    ) -> Result<(), DeviceError>;
    /// Overwrite a rectangle of layer 0 of an allocated color texture.
    fn write_texture_region(
        &mut self,
        texture: TextureId,
        origin: UVec2,
        size: UVec2,
        data: &[u8],
    ) -> Result<(), DeviceError>;
    fn set_sampling(&mut self, texture: TextureId, sampling: &Sampling);
    /// Bind `texture` to a texture unit, or clear the unit with `None`.
    fn activate_texture(&mut self, unit: u32, texture: Option<TextureId>);

    // Render buffers and framebuffers

    fn create_render_buffer(&mut self) -> RenderBufferId;
    fn delete_render_buffer(&mut self, buffer: RenderBufferId);
    fn allocate_render_buffer(&mut self, buffer: RenderBufferId, format: TextureFormat, size: UVec2);
    fn create_framebuffer(&mut self) -> FramebufferId;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    /// Attach or detach (`None`) a target at an attachment point.
    fn attach(
        &mut self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        target: Option<AttachmentTarget>,
    );
    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;
    /// Render into `framebuffer`, or into the current surface with `None`.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    // State and drawing

    fn set_viewport(&mut self, origin: UVec2, size: UVec2);
    fn set_scissor(&mut self, rect: Option<ScissorRect>);
    fn set_raster_state(&mut self, state: RasterState);
    /// Clear the bound target's color (when given) and depth.
    fn clear(&mut self, color: Option<Vec4>, depth: bool);
    /// Draw `count` indices of the bound mesh with the bound program.
    fn draw_indexed(&mut self, first_index: u32, count: u32, base_vertex: i32);

    // Surfaces

    fn make_current(&mut self, surface: SurfaceId);
    fn resize_surface(&mut self, surface: SurfaceId, size: UVec2);
    fn surface_size(&self, surface: SurfaceId) -> Option<UVec2>;
    fn destroy_surface(&mut self, surface: SurfaceId);
    /// Copy a color texture onto the surface's default framebuffer.
    fn blit_to_surface(&mut self, surface: SurfaceId, source: TextureId, size: UVec2);
    /// Swap buffers.
    fn present(&mut self, surface: SurfaceId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_desc_data_len() {
        let desc = TextureDesc {
            format: TextureFormat::Rgb8,
            size: UVec2::new(4, 2),
            layers: 6,
        };
        assert_eq!(desc.data_len(), 4 * 2 * 6 * 3);
    }

    #[test]
    fn vertex_layout_strides() {
        assert_eq!(VertexLayout::Standard.stride(), 14 * 4);
        assert_eq!(VertexLayout::Ui.stride(), 20);
    }

    #[test]
    fn uniform_value_conversions() {
        assert_eq!(UniformValue::from(2.5f32), UniformValue::Float(2.5));
        assert_eq!(UniformValue::from(true), UniformValue::Bool(true));
        assert_eq!(UniformValue::from(Vec3::X), UniformValue::Vec3(Vec3::X));
    }

    #[test]
    fn ids_display() {
        assert_eq!(TextureId(3).to_string(), "TextureId#3");
    }
}
