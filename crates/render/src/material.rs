use crate::device::GpuDevice;
use crate::keys::{ShaderKey, TextureKey};
use crate::shader::Shader;
use crate::MAX_TEXTURE_SLOTS;
use glam::Vec4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MaterialError {
    #[error("texture slot {0} out of range")]
    SlotOutOfRange(u32),
}

/// Named texture slots understood by the built-in shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SamplerSlot {
    Albedo = 0,
    Normal,
    MetallicRoughnessAo,
    Emissive,
    Shadows,
    Skybox,
}

impl SamplerSlot {
    pub const ALL: [SamplerSlot; 6] = [
        SamplerSlot::Albedo,
        SamplerSlot::Normal,
        SamplerSlot::MetallicRoughnessAo,
        SamplerSlot::Emissive,
        SamplerSlot::Shadows,
        SamplerSlot::Skybox,
    ];

    /// Texture name a shader declares for this slot.
    pub fn uniform_name(self) -> &'static str {
        match self {
            SamplerSlot::Albedo => "albedo_map",
            SamplerSlot::Normal => "normal_map",
            SamplerSlot::MetallicRoughnessAo => "mra_map",
            SamplerSlot::Emissive => "emissive_map",
            SamplerSlot::Shadows => "shadow_maps",
            SamplerSlot::Skybox => "skybox_map",
        }
    }
}

/// Index into a material's texture slots, always below [`MAX_TEXTURE_SLOTS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSlot(u8);

impl TextureSlot {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<SamplerSlot> for TextureSlot {
    fn from(slot: SamplerSlot) -> Self {
        TextureSlot(slot as u8)
    }
}

impl TryFrom<u32> for TextureSlot {
    type Error = MaterialError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        if (index as usize) < MAX_TEXTURE_SLOTS {
            Ok(TextureSlot(index as u8))
        } else {
            Err(MaterialError::SlotOutOfRange(index))
        }
    }
}

/// Scalar inputs of the PBR shading model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PbrParams {
    pub albedo: Vec4,
    pub emissive: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub ambient_occlusion: f32,
}

impl Default for PbrParams {
    fn default() -> Self {
        Self {
            albedo: Vec4::ONE,
            emissive: Vec4::ZERO,
            metallic: 0.3,
            roughness: 0.1,
            ambient_occlusion: 1.0,
        }
    }
}

/// Per-material extra uniforms.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MaterialKind {
    #[default]
    Basic,
    Pbr(PbrParams),
}

impl MaterialKind {
    /// Push this kind's own uniforms into its shader.
    pub fn update_internals(&self, shader: &Shader, device: &mut dyn GpuDevice) {
        match self {
            MaterialKind::Basic => {}
            MaterialKind::Pbr(p) => {
                shader.set_vec4(device, "albedo_color", p.albedo);
                shader.set_vec4(device, "emissive_color", p.emissive);
                shader.set_float(device, "metallic", p.metallic);
                shader.set_float(device, "roughness", p.roughness);
                shader.set_float(device, "ao", p.ambient_occlusion);
            }
        }
    }
}

/// A shader plus the textures and values it draws with.
///
/// The shader is referenced, not owned: several materials may share one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Material {
    shader: Option<ShaderKey>,
    textures: [Option<TextureKey>; MAX_TEXTURE_SLOTS],
    pub kind: MaterialKind,
}

impl Material {
    pub fn new(shader: ShaderKey) -> Self {
        Self {
            shader: Some(shader),
            ..Self::default()
        }
    }

    pub fn shader(&self) -> Option<ShaderKey> {
        self.shader
    }

    pub fn set_shader(&mut self, shader: Option<ShaderKey>) {
        self.shader = shader;
    }

    pub fn set_texture(&mut self, slot: impl Into<TextureSlot>, texture: Option<TextureKey>) {
        self.textures[slot.into().index()] = texture;
    }

    pub fn texture(&self, slot: impl Into<TextureSlot>) -> Option<TextureKey> {
        self.textures[slot.into().index()]
    }

    pub fn textures(&self) -> &[Option<TextureKey>; MAX_TEXTURE_SLOTS] {
        &self.textures
    }

    pub fn pbr(&self) -> Option<&PbrParams> {
        match &self.kind {
            MaterialKind::Pbr(p) => Some(p),
            MaterialKind::Basic => None,
        }
    }

    pub fn pbr_mut(&mut self) -> Option<&mut PbrParams> {
        match &mut self.kind {
            MaterialKind::Pbr(p) => Some(p),
            MaterialKind::Basic => None,
        }
    }
}

/// Construction helper for PBR materials stored in the material pool.
#[derive(Debug, Clone, Copy)]
pub struct PbrMaterial {
    pub shader: ShaderKey,
    pub params: PbrParams,
}

impl From<PbrMaterial> for Material {
    fn from(m: PbrMaterial) -> Self {
        Material {
            kind: MaterialKind::Pbr(m.params),
            ..Material::new(m.shader)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use crate::device::UniformValue;
    use swarm_pool::Pool;

    #[test]
    fn enum_and_integer_slots_alias() {
        let mut textures: Pool<TextureKey, ()> = Pool::new();
        let a = textures.create();
        let b = textures.create();

        let mut mat = Material::default();
        mat.set_texture(SamplerSlot::Skybox, Some(a));
        assert_eq!(mat.texture(TextureSlot::try_from(5).unwrap()), Some(a));

        mat.set_texture(TextureSlot::try_from(5).unwrap(), Some(b));
        assert_eq!(mat.texture(SamplerSlot::Skybox), Some(b));
    }

    #[test]
    fn slot_index_bounds() {
        assert_eq!(TextureSlot::from(SamplerSlot::Shadows).index(), 4);
        assert!(TextureSlot::try_from(15).is_ok());
        assert_eq!(
            TextureSlot::try_from(16),
            Err(MaterialError::SlotOutOfRange(16))
        );
    }

    #[test]
    fn pbr_defaults() {
        let p = PbrParams::default();
        assert_eq!(p.albedo, Vec4::ONE);
        assert_eq!(p.metallic, 0.3);
        assert_eq!(p.roughness, 0.1);
        assert_eq!(p.ambient_occlusion, 1.0);
    }

    #[test]
    fn pbr_internals_push_uniforms() {
        let mut device = HeadlessDevice::new();
        let mut shader = Shader::default();
        shader
            .compile(&mut device, "@vertex fn v() {}", "@fragment fn f() {}")
            .unwrap();
        let program = shader.program().unwrap();

        let kind = MaterialKind::Pbr(PbrParams {
            roughness: 0.75,
            ..PbrParams::default()
        });
        kind.update_internals(&shader, &mut device);

        assert_eq!(
            device.uniform(program, "roughness"),
            Some(UniformValue::Float(0.75))
        );
        assert_eq!(
            device.uniform(program, "albedo_color"),
            Some(UniformValue::Vec4(Vec4::ONE))
        );
    }

    #[test]
    fn pbr_material_conversion() {
        let mut shaders: Pool<ShaderKey, ()> = Pool::new();
        let s = shaders.create();
        let mat: Material = PbrMaterial {
            shader: s,
            params: PbrParams::default(),
        }
        .into();
        assert_eq!(mat.shader(), Some(s));
        assert!(mat.pbr().is_some());
    }
}
