use crate::device::{GpuDevice, ProgramId, ShaderStage, UniformValue};
use crate::material::{SamplerSlot, TextureSlot};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Shader compilation failures. The shader stays in place but unusable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("shader program failed to link:\n{log}")]
    Link { log: String },
    #[error("shader has no linked program")]
    Unusable,
}

/// A linked vertex + fragment program.
///
/// Compilation never panics. On failure the error is logged, kept on the
/// shader, and every setter becomes a no-op. Check [`Shader::is_usable`]
/// before relying on it.
#[derive(Debug, Default)]
pub struct Shader {
    program: Option<ProgramId>,
    error: Option<ShaderError>,
}

impl Shader {
    /// Compile both stages and link them, replacing any previous program.
    pub fn compile(
        &mut self,
        device: &mut dyn GpuDevice,
        vertex: &str,
        fragment: &str,
    ) -> Result<(), ShaderError> {
        if let Some(old) = self.program.take() {
            device.delete_program(old);
        }
        self.error = None;

        match link(device, vertex, fragment) {
            Ok(program) => {
                self.program = Some(program);
                self.bind_standard_samplers(device);
                Ok(())
            }
            Err(e) => {
                tracing::error!("{e}");
                self.error = Some(e.clone());
                Err(e)
            }
        }
    }

    pub fn is_usable(&self) -> bool {
        self.program.is_some()
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    /// The linked program, or [`ShaderError::Unusable`].
    pub fn require_program(&self) -> Result<ProgramId, ShaderError> {
        self.program.ok_or(ShaderError::Unusable)
    }

    pub fn error(&self) -> Option<&ShaderError> {
        self.error.as_ref()
    }

    pub fn use_shader(&self, device: &mut dyn GpuDevice) {
        if let Some(program) = self.program {
            device.use_program(program);
        }
    }

    pub fn set_uniform(&self, device: &mut dyn GpuDevice, name: &str, value: UniformValue) {
        if let Some(program) = self.program {
            device.set_uniform(program, name, value);
        }
    }

    pub fn set_bool(&self, device: &mut dyn GpuDevice, name: &str, value: bool) {
        self.set_uniform(device, name, UniformValue::Bool(value));
    }

    pub fn set_int(&self, device: &mut dyn GpuDevice, name: &str, value: i32) {
        self.set_uniform(device, name, UniformValue::Int(value));
    }

    pub fn set_float(&self, device: &mut dyn GpuDevice, name: &str, value: f32) {
        self.set_uniform(device, name, UniformValue::Float(value));
    }

    pub fn set_vec2(&self, device: &mut dyn GpuDevice, name: &str, value: Vec2) {
        self.set_uniform(device, name, UniformValue::Vec2(value));
    }

    pub fn set_vec3(&self, device: &mut dyn GpuDevice, name: &str, value: Vec3) {
        self.set_uniform(device, name, UniformValue::Vec3(value));
    }

    pub fn set_vec4(&self, device: &mut dyn GpuDevice, name: &str, value: Vec4) {
        self.set_uniform(device, name, UniformValue::Vec4(value));
    }

    pub fn set_mat4(&self, device: &mut dyn GpuDevice, name: &str, value: Mat4) {
        self.set_uniform(device, name, UniformValue::Mat4(value));
    }

    /// Route a texture declared by the shader to a material slot.
    pub fn set_sampler_slot(
        &self,
        device: &mut dyn GpuDevice,
        name: &str,
        slot: impl Into<TextureSlot>,
    ) {
        if let Some(program) = self.program {
            device.set_sampler_slot(program, name, slot.into().index() as u32);
        }
    }

    pub fn release(self, device: &mut dyn GpuDevice) {
        if let Some(program) = self.program {
            device.delete_program(program);
        }
    }

    fn bind_standard_samplers(&self, device: &mut dyn GpuDevice) {
        for slot in SamplerSlot::ALL {
            self.set_sampler_slot(device, slot.uniform_name(), slot);
        }
    }
}

fn link(device: &mut dyn GpuDevice, vertex: &str, fragment: &str) -> Result<ProgramId, ShaderError> {
    let vs = device
        .compile_stage(ShaderStage::Vertex, vertex)
        .map_err(|log| ShaderError::Compile {
            stage: ShaderStage::Vertex,
            log,
        })?;
    let fs = match device.compile_stage(ShaderStage::Fragment, fragment) {
        Ok(fs) => fs,
        Err(log) => {
            device.delete_stage(vs);
            return Err(ShaderError::Compile {
                stage: ShaderStage::Fragment,
                log,
            });
        }
    };

    let linked = device.link_program(vs, fs);
    device.delete_stage(vs);
    device.delete_stage(fs);
    linked.map_err(|log| ShaderError::Link { log })
}
