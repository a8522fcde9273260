//! WGSL sources of the renderer's own shaders.
//!
//! Conventions shared by every shader here and expected from user shaders:
//! - `@group(0) @binding(0)` is one uniform struct. Its member paths are
//!   the uniform names (`mvp`, `lights[2].color`).
//! - `@group(1)` holds textures. A texture `x` is sampled with `x_sampler`.
//! - Standard vertices feed locations 0..=4: position, normal, tangent,
//!   color, uv. UI vertices feed position, uv, color.

/// Vertex and fragment source of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSource {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    pub fn depth() -> Self {
        Self::new(DEPTH_VS, DEPTH_FS)
    }

    pub fn pbr() -> Self {
        Self::new(PBR_VS, PBR_FS)
    }

    pub fn skybox() -> Self {
        Self::new(SKYBOX_VS, SKYBOX_FS)
    }

    pub fn unlit() -> Self {
        Self::new(UNLIT_VS, UNLIT_FS)
    }
}

/// Every built-in program as `(name, vertex, fragment)`.
pub const ALL: [(&str, &str, &str); 5] = [
    ("depth", DEPTH_VS, DEPTH_FS),
    ("pbr", PBR_VS, PBR_FS),
    ("skybox", SKYBOX_VS, SKYBOX_FS),
    ("unlit", UNLIT_VS, UNLIT_FS),
    ("ui", UI_VS, UI_FS),
];

pub const DEPTH_VS: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    mvp: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return u.mvp * vec4<f32>(position, 1.0);
}
"#;

pub const DEPTH_FS: &str = r#"
@fragment
fn fs_main() {}
"#;

pub const PBR_VS: &str = r#"
struct Light {
    position: vec3<f32>,
    enabled: i32,
    direction: vec3<f32>,
    kind: i32,
    color: vec3<f32>,
    intensity: f32,
    shadowed: i32,
}

struct Uniforms {
    model: mat4x4<f32>,
    mvp: mat4x4<f32>,
    light_space: array<mat4x4<f32>, 16>,
    view_pos: vec3<f32>,
    light_count: i32,
    ambient_color: vec3<f32>,
    ambient_intensity: f32,
    albedo_color: vec4<f32>,
    emissive_color: vec4<f32>,
    metallic: f32,
    roughness: f32,
    ao: f32,
    lights: array<Light, 16>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec3<f32>,
    @location(3) uv: vec2<f32>,
}

@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tangent: vec3<f32>,
    @location(3) color: vec3<f32>,
    @location(4) uv: vec2<f32>,
) -> VertexOut {
    var out: VertexOut;
    let world = u.model * vec4<f32>(position, 1.0);
    out.clip = u.mvp * vec4<f32>(position, 1.0);
    out.world_pos = world.xyz;
    out.normal = normalize((u.model * vec4<f32>(normal, 0.0)).xyz);
    out.color = color;
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}
"#;

pub const PBR_FS: &str = r#"
const MAX_LIGHTS: u32 = 16u;
const PI: f32 = 3.14159265;

struct Light {
    position: vec3<f32>,
    enabled: i32,
    direction: vec3<f32>,
    kind: i32,
    color: vec3<f32>,
    intensity: f32,
    shadowed: i32,
}

struct Uniforms {
    model: mat4x4<f32>,
    mvp: mat4x4<f32>,
    light_space: array<mat4x4<f32>, 16>,
    view_pos: vec3<f32>,
    light_count: i32,
    ambient_color: vec3<f32>,
    ambient_intensity: f32,
    albedo_color: vec4<f32>,
    emissive_color: vec4<f32>,
    metallic: f32,
    roughness: f32,
    ao: f32,
    lights: array<Light, 16>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

@group(1) @binding(0) var albedo_map: texture_2d<f32>;
@group(1) @binding(1) var albedo_map_sampler: sampler;
@group(1) @binding(2) var mra_map: texture_2d<f32>;
@group(1) @binding(3) var mra_map_sampler: sampler;
@group(1) @binding(4) var emissive_map: texture_2d<f32>;
@group(1) @binding(5) var emissive_map_sampler: sampler;
@group(1) @binding(6) var shadow_maps: texture_depth_2d_array;
@group(1) @binding(7) var shadow_maps_sampler: sampler_comparison;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec3<f32>,
    @location(3) uv: vec2<f32>,
}

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / max(PI * d * d, 1e-5);
}

fn geometry_schlick(n_dot_x: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = r * r / 8.0;
    return n_dot_x / (n_dot_x * (1.0 - k) + k);
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (vec3<f32>(1.0) - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}

// 3x3 PCF over layer `index` of the shadow array.
fn shadow_factor(index: u32, world_pos: vec3<f32>, n_dot_l: f32) -> f32 {
    let clip = u.light_space[index] * vec4<f32>(world_pos, 1.0);
    let ndc = clip.xyz / clip.w;
    if (ndc.z > 1.0) {
        return 1.0;
    }
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    let bias = max(0.005 * (1.0 - n_dot_l), 0.0005);
    let texel = 1.0 / vec2<f32>(textureDimensions(shadow_maps));
    var lit = 0.0;
    for (var x = -1; x <= 1; x += 1) {
        for (var y = -1; y <= 1; y += 1) {
            let offset = vec2<f32>(f32(x), f32(y)) * texel;
            lit += textureSampleCompareLevel(
                shadow_maps,
                shadow_maps_sampler,
                uv + offset,
                i32(index),
                ndc.z - bias,
            );
        }
    }
    return lit / 9.0;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let albedo_sample = textureSample(albedo_map, albedo_map_sampler, in.uv);
    let mra = textureSample(mra_map, mra_map_sampler, in.uv).rgb;
    let emissive = textureSample(emissive_map, emissive_map_sampler, in.uv).rgb * u.emissive_color.rgb;

    let albedo = albedo_sample.rgb * u.albedo_color.rgb * in.color;
    let metallic = clamp(u.metallic * mra.r, 0.0, 1.0);
    let roughness = clamp(u.roughness * mra.g, 0.04, 1.0);
    let ao = u.ao * mra.b;

    let n = normalize(in.normal);
    let v = normalize(u.view_pos - in.world_pos);
    let f0 = mix(vec3<f32>(0.04), albedo, metallic);

    var lo = vec3<f32>(0.0);
    let count = min(u32(max(u.light_count, 0)), MAX_LIGHTS);
    for (var i = 0u; i < count; i += 1u) {
        let light = u.lights[i];
        if (light.enabled == 0) {
            continue;
        }
        var l: vec3<f32>;
        var radiance: vec3<f32>;
        if (light.kind == 1) {
            l = normalize(-light.direction);
            radiance = light.color * light.intensity;
        } else {
            let to_light = light.position - in.world_pos;
            let dist = length(to_light);
            l = to_light / max(dist, 1e-4);
            radiance = light.color * light.intensity / max(dist * dist, 1e-4);
        }

        let h = normalize(v + l);
        let n_dot_l = max(dot(n, l), 0.0);
        let n_dot_v = max(dot(n, v), 1e-4);
        let n_dot_h = max(dot(n, h), 0.0);

        let f = fresnel_schlick(max(dot(h, v), 0.0), f0);
        let d = distribution_ggx(n_dot_h, roughness);
        let g = geometry_schlick(n_dot_v, roughness) * geometry_schlick(n_dot_l, roughness);
        let specular = d * g * f / max(4.0 * n_dot_v * n_dot_l, 1e-4);
        let kd = (vec3<f32>(1.0) - f) * (1.0 - metallic);

        var shadow = 1.0;
        if (light.shadowed != 0) {
            shadow = shadow_factor(i, in.world_pos, n_dot_l);
        }
        lo += (kd * albedo / PI + specular) * radiance * n_dot_l * shadow;
    }

    let ambient = u.ambient_color * u.ambient_intensity * albedo * ao;
    let color = ambient + lo + emissive;
    let mapped = color / (color + vec3<f32>(1.0));
    return vec4<f32>(pow(mapped, vec3<f32>(1.0 / 2.2)), albedo_sample.a * u.albedo_color.a);
}
"#;

pub const SKYBOX_VS: &str = r#"
struct Uniforms {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) dir: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOut {
    var out: VertexOut;
    let clip = u.projection * u.view * vec4<f32>(position, 1.0);
    // Depth 1.0: behind everything drawn afterwards.
    out.clip = clip.xyww;
    out.dir = position;
    return out;
}
"#;

pub const SKYBOX_FS: &str = r#"
@group(1) @binding(0) var skybox_map: texture_cube<f32>;
@group(1) @binding(1) var skybox_map_sampler: sampler;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) dir: vec3<f32>,
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    return textureSample(skybox_map, skybox_map_sampler, normalize(in.dir));
}
"#;

pub const UNLIT_VS: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    mvp: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec3<f32>,
    @location(1) uv: vec2<f32>,
}

@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(3) color: vec3<f32>,
    @location(4) uv: vec2<f32>,
) -> VertexOut {
    var out: VertexOut;
    out.clip = u.mvp * vec4<f32>(position, 1.0);
    out.color = color;
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}
"#;

pub const UNLIT_FS: &str = r#"
@group(1) @binding(0) var albedo_map: texture_2d<f32>;
@group(1) @binding(1) var albedo_map_sampler: sampler;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec3<f32>,
    @location(1) uv: vec2<f32>,
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let tex = textureSample(albedo_map, albedo_map_sampler, in.uv);
    return vec4<f32>(tex.rgb * in.color, tex.a);
}
"#;

pub const UI_VS: &str = r#"
struct Uniforms {
    screen_size: vec2<f32>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec4<f32>,
}

@vertex
fn vs_main(
    @location(0) pos: vec2<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) color: vec4<f32>,
) -> VertexOut {
    var out: VertexOut;
    out.clip = vec4<f32>(
        2.0 * pos.x / u.screen_size.x - 1.0,
        1.0 - 2.0 * pos.y / u.screen_size.y,
        0.0,
        1.0,
    );
    out.uv = uv;
    out.color = color;
    return out;
}
"#;

pub const UI_FS: &str = r#"
@group(1) @binding(0) var albedo_map: texture_2d<f32>;
@group(1) @binding(1) var albedo_map_sampler: sampler;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec4<f32>,
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    return in.color * textureSample(albedo_map, albedo_map_sampler, in.uv);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_has_both_entry_points() {
        for (name, vs, fs) in ALL {
            assert!(vs.contains("@vertex"), "{name} vertex");
            assert!(fs.contains("@fragment"), "{name} fragment");
        }
    }

    #[test]
    fn lit_shader_declares_global_uniforms() {
        for field in ["view_pos", "light_count", "ambient_color", "light_space", "lights"] {
            assert!(PBR_FS.contains(field), "{field}");
        }
    }
}
