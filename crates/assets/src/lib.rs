//! Asset loading for the Swarm renderer.
//!
//! Turns files and procedural descriptions into the decoded data the
//! renderer consumes: shader sources, cube face paths, meshes, images and
//! whole scenes. Image and model file decoding are not handled here.
//!
//! # Layout
//! - A shader asset at `path` is the pair `<path>.vert` / `<path>.frag`.
//! - A cubemap asset is a path template whose `#` is replaced by the face
//!   index 0..=5 in +X, -X, +Y, -Y, +Z, -Z order.
//! - Relative paths resolve against the loader's asset folder.

pub mod images;
pub mod loader;
pub mod primitives;
pub mod scene;

use std::path::PathBuf;
use swarm_render::{ShaderError, TextureError};

pub use images::{checkerboard, gradient_cubemap, solid, CubemapImage, Image};
pub use loader::{cubemap_face_paths, import_shader, load_shader_source, AssetLoader};
pub use primitives::{cube, plane, quad, skybox_cube, MeshData};
pub use scene::{SceneDesc, SceneHandles};

/// Errors from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid scene: {0}")]
    Scene(String),
    #[error("shader {name} failed to build: {source}")]
    Shader {
        name: String,
        #[source]
        source: ShaderError,
    },
    #[error("texture upload failed: {0}")]
    Texture(#[from] TextureError),
}

pub fn crate_info() -> &'static str {
    "swarm-assets v0.1.0"
}
