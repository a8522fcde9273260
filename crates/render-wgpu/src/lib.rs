//! wgpu implementation of the Swarm [`GpuDevice`](swarm_render::GpuDevice).
//!
//! Shaders are WGSL. Each stage is parsed and validated with naga when it
//! is compiled; the reflected uniform block and texture bindings are what
//! make name-based `set_uniform` and sampler slots work on top of wgpu's
//! bind groups.
//!
//! # Invariants
//! - Group 0 binding 0 holds the uniform struct; group 1 holds textures and
//!   their `<name>_sampler` samplers. Programs declaring anything else fail
//!   to compile.
//! - Uniform values live in a per-program staging buffer and are uploaded
//!   with every draw, so a draw sees exactly the values set before it.
//! - A texture binding with nothing compatible on its unit samples a 1x1
//!   fallback (white, or depth 1.0) instead of failing the draw.
//! - Uploads submit pending work first; commands keep their call order.

mod gpu;
mod pipelines;
pub mod reflect;
mod resources;
mod shaders;

pub use gpu::WgpuDevice;
pub use reflect::{
    reflect_stage, ReflectError, StageReflection, TextureBinding, UniformKind, UniformLayout,
};

pub fn crate_info() -> &'static str {
    "swarm-render-wgpu v0.1.0"
}
