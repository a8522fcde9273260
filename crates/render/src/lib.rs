//! Swarm renderer core.
//!
//! Owns GPU resources through generation-checked pools, groups scene
//! content into render worlds and runs the frame pipeline: shadow maps,
//! skybox, forward-lit opaque pass, UI composite, presentation.
//!
//! Every GPU call goes through the [`GpuDevice`] trait. [`HeadlessDevice`]
//! implements it without a GPU and records what a frame did.
//!
//! # Invariants
//! - Each resource wrapper holds exactly one device id for its lifetime.
//!   Re-uploads replace contents under the same id.
//! - The backend owns every pooled object; destroying a key releases its
//!   device id, destroying a stale key does nothing.
//! - A frame never fails. Missing cameras, environments, skyboxes and
//!   incomplete shadow framebuffers skip the pass or light that needs them.
//! - Shadow-casting light `i` of a world renders into layer `i` of the
//!   shared shadow array, valid until the next frame overwrites it.
//! - Single-threaded: the backend and its device live on one thread.

pub mod backend;
pub mod builtin;
pub mod device;
pub mod framebuffer;
pub mod headless;
pub mod keys;
pub mod material;
pub mod mesh;
pub mod pipeline;
pub mod scene;
pub mod shader;
pub mod texture;
pub mod ui;
pub mod window;
pub mod world;

pub use backend::{RendererBackend, RendererConfig, SetupError};
pub use builtin::ShaderSource;
pub use device::{
    AttachmentPoint, AttachmentTarget, BlendMode, CullMode, DeviceError, DeviceInfo,
    FramebufferId, FramebufferStatus, GpuDevice, MeshId, ProgramId, RasterState, RenderBufferId,
    RequiredCapabilities, Sampling, ScissorRect, ShaderStage, StageId, SurfaceId, TextureDesc,
    TextureFilter, TextureFormat, TextureId, TextureKind, TextureWrap, UniformValue, VertexLayout,
};
pub use framebuffer::{check_completeness, AttachmentInfo, FrameBuffer, RenderBuffer};
pub use headless::{Command, DrawCall, HeadlessDevice, HeadlessWindows};
pub use keys::*;
pub use material::{
    Material, MaterialError, MaterialKind, PbrMaterial, PbrParams, SamplerSlot, TextureSlot,
};
pub use mesh::{Mesh, Model, Vertex};
pub use pipeline::{FrameStats, RenderStats};
pub use scene::{Camera, Light, LightKind, Visual};
pub use shader::{Shader, ShaderError};
pub use texture::{Texture, TextureError};
pub use ui::{UiCompositor, UiDrawData, UiPrimitive, UiTextureId, UiTextureUpdate, UiVertex};
pub use window::{AppWindow, WindowDesc, WindowSystem};
pub use world::{
    Hook, HookContext, HookId, HookStage, RenderEnvironment, RenderHooks, RenderWorld, Viewport,
};

/// Edge length of each shadow map layer.
pub const SHADOW_RESOLUTION: u32 = 1024;
/// Shadow array layers, so the most lights that can cast shadows at once.
pub const MAX_SHADOW_CASTERS: u32 = 16;
/// Texture slots per material.
pub const MAX_TEXTURE_SLOTS: usize = 16;
/// Size of the light array in the lit shaders.
pub const MAX_LIGHTS: usize = 16;
pub const MAX_COLOR_ATTACHMENTS: u32 = 4;

pub fn crate_info() -> &'static str {
    "swarm-render v0.1.0"
}
