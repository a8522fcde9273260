//! WGSL stage reflection on top of naga.
//!
//! A stage is parsed, validated, and reduced to what the device needs to
//! bind it: the entry point, the uniform struct at `@group(0) @binding(0)`
//! flattened into named fields, and the textures and samplers of
//! `@group(1)`. None of this touches a GPU, so tools can run it offline.

use std::collections::BTreeMap;
use std::fmt;
use swarm_render::ShaderStage;

pub const UNIFORM_GROUP: u32 = 0;
pub const TEXTURE_GROUP: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReflectError {
    #[error("{0}")]
    Parse(String),
    #[error("validation failed: {0}")]
    Validate(String),
    #[error("no @{0} entry point")]
    MissingEntryPoint(ShaderStage),
    #[error("resource `{name}` at group {group} binding {binding} is not supported")]
    UnsupportedBinding {
        name: String,
        group: u32,
        binding: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Float,
    Sint,
    Uint,
}

/// Type of one flattened uniform field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Scalar(ScalarKind),
    Vector { size: u8, scalar: ScalarKind },
    Matrix { columns: u8, rows: u8 },
}

impl UniformKind {
    /// Bytes occupied by the value itself, without trailing padding.
    pub fn size(self) -> u32 {
        match self {
            UniformKind::Scalar(_) => 4,
            UniformKind::Vector { size, .. } => 4 * size as u32,
            // Columns of a uniform matrix are vec4-aligned unless they are vec2.
            UniformKind::Matrix { columns, rows } => {
                let column = if rows == 2 { 8 } else { 16 };
                column * columns as u32
            }
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn scalar(kind: ScalarKind) -> &'static str {
            match kind {
                ScalarKind::Float => "f32",
                ScalarKind::Sint => "i32",
                ScalarKind::Uint => "u32",
            }
        }
        match self {
            UniformKind::Scalar(kind) => f.write_str(scalar(*kind)),
            UniformKind::Vector { size, scalar: kind } => {
                write!(f, "vec{size}<{}>", scalar(*kind))
            }
            UniformKind::Matrix { columns, rows } => write!(f, "mat{columns}x{rows}<f32>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformField {
    pub offset: u32,
    pub kind: UniformKind,
}

/// The uniform struct of a program, flattened to GL-style paths.
///
/// Struct members become `a.b`, array elements `a[3]`, and an array of
/// non-struct elements is also reachable by its bare name (element 0).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformLayout {
    pub size: u32,
    pub fields: BTreeMap<String, UniformField>,
}

impl UniformLayout {
    pub fn get(&self, path: &str) -> Option<UniformField> {
        self.fields.get(path).copied()
    }

    /// Union of two stages' layouts. A path both stages declare must have
    /// the same offset and type.
    pub fn merge(&self, other: &UniformLayout) -> Result<UniformLayout, String> {
        let mut merged = self.clone();
        for (path, field) in &other.fields {
            match merged.fields.get(path) {
                Some(existing) if existing != field => {
                    return Err(format!(
                        "uniform `{path}` is {} at offset {} in one stage and {} at offset {} in the other",
                        existing.kind, existing.offset, field.kind, field.offset
                    ));
                }
                Some(_) => {}
                None => {
                    merged.fields.insert(path.clone(), *field);
                }
            }
        }
        merged.size = self.size.max(other.size);
        Ok(merged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDim {
    D2,
    D2Array,
    Cube,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: String,
    pub binding: u32,
    pub dim: TextureDim,
    /// `texture_depth_*` rather than a float texture.
    pub depth: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerBinding {
    pub name: String,
    pub binding: u32,
    pub comparison: bool,
}

/// Everything the device needs to know about one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReflection {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub uniforms: Option<UniformLayout>,
    pub textures: Vec<TextureBinding>,
    pub samplers: Vec<SamplerBinding>,
    /// `@location`s consumed by a vertex stage or written by a fragment stage.
    pub locations: Vec<u32>,
}

/// Parse, validate and reflect one WGSL stage.
pub fn reflect_stage(stage: ShaderStage, source: &str) -> Result<StageReflection, ReflectError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| ReflectError::Parse(e.emit_to_string(source)))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| ReflectError::Validate(e.as_inner().to_string()))?;

    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga_stage)
        .ok_or(ReflectError::MissingEntryPoint(stage))?;

    let mut reflection = StageReflection {
        stage,
        entry_point: entry.name.clone(),
        uniforms: None,
        textures: Vec::new(),
        samplers: Vec::new(),
        locations: Vec::new(),
    };

    for (_, global) in module.global_variables.iter() {
        let Some(binding) = &global.binding else {
            continue;
        };
        let name = global.name.clone().unwrap_or_default();
        let unsupported = || ReflectError::UnsupportedBinding {
            name: global.name.clone().unwrap_or_default(),
            group: binding.group,
            binding: binding.binding,
        };
        let inner = &module.types[global.ty].inner;

        match (binding.group, global.space) {
            (UNIFORM_GROUP, naga::AddressSpace::Uniform) if binding.binding == 0 => {
                let mut layout = UniformLayout {
                    size: inner.size(module.to_ctx()),
                    fields: BTreeMap::new(),
                };
                flatten(&module, global.ty, "", 0, &mut layout.fields);
                reflection.uniforms = Some(layout);
            }
            (TEXTURE_GROUP, naga::AddressSpace::Handle) => match *inner {
                naga::TypeInner::Image {
                    dim,
                    arrayed,
                    class,
                } => {
                    let dim = match (dim, arrayed) {
                        (naga::ImageDimension::D2, false) => TextureDim::D2,
                        (naga::ImageDimension::D2, true) => TextureDim::D2Array,
                        (naga::ImageDimension::Cube, false) => TextureDim::Cube,
                        _ => return Err(unsupported()),
                    };
                    let depth = match class {
                        naga::ImageClass::Sampled { multi: false, .. } => false,
                        naga::ImageClass::Depth { multi: false } => true,
                        _ => return Err(unsupported()),
                    };
                    reflection.textures.push(TextureBinding {
                        name,
                        binding: binding.binding,
                        dim,
                        depth,
                    });
                }
                naga::TypeInner::Sampler { comparison } => {
                    reflection.samplers.push(SamplerBinding {
                        name,
                        binding: binding.binding,
                        comparison,
                    });
                }
                _ => return Err(unsupported()),
            },
            _ => return Err(unsupported()),
        }
    }

    let function = &entry.function;
    match stage {
        ShaderStage::Vertex => {
            for arg in &function.arguments {
                collect_locations(&module, arg.ty, arg.binding.as_ref(), &mut reflection.locations);
            }
        }
        ShaderStage::Fragment => {
            if let Some(result) = &function.result {
                collect_locations(
                    &module,
                    result.ty,
                    result.binding.as_ref(),
                    &mut reflection.locations,
                );
            }
        }
    }
    reflection.locations.sort_unstable();
    Ok(reflection)
}

fn scalar_kind(kind: naga::ScalarKind) -> Option<ScalarKind> {
    match kind {
        naga::ScalarKind::Float => Some(ScalarKind::Float),
        naga::ScalarKind::Sint => Some(ScalarKind::Sint),
        naga::ScalarKind::Uint => Some(ScalarKind::Uint),
        _ => None,
    }
}

fn flatten(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    path: &str,
    offset: u32,
    out: &mut BTreeMap<String, UniformField>,
) {
    let leaf = match module.types[ty].inner {
        naga::TypeInner::Scalar(scalar) => scalar_kind(scalar.kind).map(UniformKind::Scalar),
        naga::TypeInner::Vector { size, scalar } => {
            scalar_kind(scalar.kind).map(|kind| UniformKind::Vector {
                size: size as u8,
                scalar: kind,
            })
        }
        naga::TypeInner::Matrix { columns, rows, .. } => Some(UniformKind::Matrix {
            columns: columns as u8,
            rows: rows as u8,
        }),
        _ => None,
    };
    if let Some(kind) = leaf {
        out.insert(path.to_string(), UniformField { offset, kind });
        return;
    }

    match module.types[ty].inner {
        naga::TypeInner::Array {
            base,
            size: naga::ArraySize::Constant(len),
            stride,
        } => {
            let is_struct = matches!(module.types[base].inner, naga::TypeInner::Struct { .. });
            for i in 0..len.get() {
                flatten(module, base, &format!("{path}[{i}]"), offset + i * stride, out);
            }
            if !is_struct {
                if let Some(first) = out.get(&format!("{path}[0]")).copied() {
                    out.insert(path.to_string(), first);
                }
            }
        }
        naga::TypeInner::Struct { ref members, .. } => {
            for member in members {
                let Some(name) = &member.name else {
                    continue;
                };
                let child = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}.{name}")
                };
                flatten(module, member.ty, &child, offset + member.offset, out);
            }
        }
        _ => {}
    }
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => out.push(*location),
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_render::builtin;

    #[test]
    fn pbr_light_array_is_flattened() {
        let fs = reflect_stage(ShaderStage::Fragment, builtin::PBR_FS).unwrap();
        let layout = fs.uniforms.unwrap();

        let base = layout.get("lights[0].position").unwrap().offset;
        let stride = layout.get("lights[1].position").unwrap().offset - base;
        let color_offset = layout.get("lights[0].color").unwrap().offset - base;
        let color = layout.get("lights[2].color").unwrap();
        assert_eq!(color.offset, base + 2 * stride + color_offset);
        assert_eq!(
            color.kind,
            UniformKind::Vector {
                size: 3,
                scalar: ScalarKind::Float
            }
        );
        assert_eq!(
            layout.get("lights[3].shadowed").unwrap().kind,
            UniformKind::Scalar(ScalarKind::Sint)
        );
    }

    #[test]
    fn matrix_array_has_bare_alias() {
        let fs = reflect_stage(ShaderStage::Fragment, builtin::PBR_FS).unwrap();
        let layout = fs.uniforms.unwrap();
        assert_eq!(layout.get("light_space"), layout.get("light_space[0]"));
        let first = layout.get("light_space[0]").unwrap();
        let second = layout.get("light_space[1]").unwrap();
        assert_eq!(second.offset - first.offset, 64);
        assert_eq!(first.kind.size(), 64);
    }

    #[test]
    fn pbr_textures_are_reflected() {
        let fs = reflect_stage(ShaderStage::Fragment, builtin::PBR_FS).unwrap();
        let shadows = fs
            .textures
            .iter()
            .find(|t| t.name == "shadow_maps")
            .unwrap();
        assert_eq!(shadows.dim, TextureDim::D2Array);
        assert!(shadows.depth);
        let sampler = fs
            .samplers
            .iter()
            .find(|s| s.name == "shadow_maps_sampler")
            .unwrap();
        assert!(sampler.comparison);
        assert_eq!(fs.locations, vec![0]);
    }

    #[test]
    fn vertex_locations_are_collected() {
        let vs = reflect_stage(ShaderStage::Vertex, builtin::PBR_VS).unwrap();
        assert_eq!(vs.entry_point, "vs_main");
        assert_eq!(vs.locations, vec![0, 1, 2, 3, 4]);
        let ui = reflect_stage(ShaderStage::Vertex, builtin::UI_VS).unwrap();
        assert_eq!(ui.locations, vec![0, 1, 2]);
    }

    #[test]
    fn every_builtin_reflects() {
        for (name, vs, fs) in builtin::ALL {
            let v = reflect_stage(ShaderStage::Vertex, vs);
            let f = reflect_stage(ShaderStage::Fragment, fs);
            assert!(v.is_ok(), "{name} vertex: {v:?}");
            assert!(f.is_ok(), "{name} fragment: {f:?}");
        }
    }

    #[test]
    fn parse_errors_carry_diagnostics() {
        let err = reflect_stage(ShaderStage::Vertex, "@vertex fn vs_main( {").unwrap_err();
        assert!(matches!(err, ReflectError::Parse(ref log) if !log.is_empty()));
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let err = reflect_stage(ShaderStage::Fragment, builtin::DEPTH_VS).unwrap_err();
        assert_eq!(err, ReflectError::MissingEntryPoint(ShaderStage::Fragment));
    }

    #[test]
    fn merge_rejects_conflicting_layouts() {
        let a = reflect_stage(
            ShaderStage::Vertex,
            r#"
            struct U { mvp: mat4x4<f32>, tint: vec4<f32> }
            @group(0) @binding(0) var<uniform> u: U;
            @vertex fn vs_main() -> @builtin(position) vec4<f32> { return u.mvp * u.tint; }
            "#,
        )
        .unwrap();
        let b = reflect_stage(
            ShaderStage::Fragment,
            r#"
            struct U { tint: vec4<f32> }
            @group(0) @binding(0) var<uniform> u: U;
            @fragment fn fs_main() -> @location(0) vec4<f32> { return u.tint; }
            "#,
        )
        .unwrap();
        let err = a
            .uniforms
            .as_ref()
            .unwrap()
            .merge(b.uniforms.as_ref().unwrap())
            .unwrap_err();
        assert!(err.contains("tint"));
    }

    #[test]
    fn merge_accepts_prefix_layouts() {
        let vs = reflect_stage(ShaderStage::Vertex, builtin::PBR_VS).unwrap();
        let fs = reflect_stage(ShaderStage::Fragment, builtin::PBR_FS).unwrap();
        let merged = vs
            .uniforms
            .unwrap()
            .merge(fs.uniforms.as_ref().unwrap())
            .unwrap();
        assert!(merged.get("lights[15].intensity").is_some());
        assert_eq!(merged.size, fs.uniforms.unwrap().size);
    }
}
