//! JSON scene descriptions.
//!
//! A [`SceneDesc`] names everything a render world needs: environment,
//! camera, lights, materials and objects. Objects refer to materials by
//! name. [`SceneDesc::instantiate`] creates the resources in a backend
//! and attaches them to an existing world.

use crate::images::{checkerboard, gradient_cubemap};
use crate::loader::{import_shader, read_text};
use crate::primitives::{self, MeshData};
use crate::ImportError;
use glam::{EulerRot, Mat4, Quat, UVec2, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use swarm_render::{
    Camera, CameraKey, GpuDevice, Light, LightKey, Material, MaterialKey, ModelKey, PbrMaterial,
    PbrParams, RendererBackend, SamplerSlot, ShaderKey, ShaderSource, TextureKey, Visual, VisualKey,
    WorldKey,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDesc {
    pub environment: EnvironmentDesc,
    pub camera: CameraDesc,
    pub lights: Vec<LightDesc>,
    pub materials: BTreeMap<String, MaterialDesc>,
    pub objects: Vec<ObjectDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentDesc {
    pub ambient_color: Vec3,
    pub ambient_intensity: f32,
    pub clear_color: Vec4,
    /// Draw a gradient skybox from `sky_bottom` to `sky_top`.
    pub skybox: bool,
    pub sky_top: Vec3,
    pub sky_bottom: Vec3,
}

impl Default for EnvironmentDesc {
    fn default() -> Self {
        Self {
            ambient_color: Vec3::ONE,
            ambient_intensity: 0.1,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            skybox: false,
            sky_top: Vec3::new(0.25, 0.45, 0.85),
            sky_bottom: Vec3::new(0.85, 0.85, 0.8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDesc {
    pub position: Vec3,
    pub target: Vec3,
    /// Vertical field of view.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 4.0, 8.0),
            target: Vec3::ZERO,
            fov_degrees: 60.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LightDesc {
    Directional {
        direction: Vec3,
        #[serde(default = "white")]
        color: Vec3,
        #[serde(default = "one")]
        intensity: f32,
        #[serde(default)]
        cast_shadows: bool,
    },
    Point {
        position: Vec3,
        #[serde(default = "white")]
        color: Vec3,
        #[serde(default = "one")]
        intensity: f32,
        #[serde(default)]
        cast_shadows: bool,
    },
}

fn white() -> Vec3 {
    Vec3::ONE
}

fn one() -> f32 {
    1.0
}

impl LightDesc {
    fn build(&self) -> Light {
        let (mut light, cast_shadows) = match *self {
            LightDesc::Directional {
                direction,
                color,
                intensity,
                cast_shadows,
            } => (Light::directional(direction, color, intensity), cast_shadows),
            LightDesc::Point {
                position,
                color,
                intensity,
                cast_shadows,
            } => (Light::point(position, color, intensity), cast_shadows),
        };
        light.set_cast_shadows(cast_shadows);
        light
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDesc {
    pub albedo: Vec4,
    pub emissive: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub ambient_occlusion: f32,
    /// Checker albedo texture.
    pub checker: Option<CheckerDesc>,
    /// Shader pair `<path>.vert` / `<path>.frag`, relative to the scene
    /// file. The built-in PBR shader when absent.
    pub shader: Option<PathBuf>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        let p = PbrParams::default();
        Self {
            albedo: p.albedo,
            emissive: p.emissive,
            metallic: p.metallic,
            roughness: p.roughness,
            ambient_occlusion: p.ambient_occlusion,
            checker: None,
            shader: None,
        }
    }
}

impl MaterialDesc {
    fn params(&self) -> PbrParams {
        PbrParams {
            albedo: self.albedo,
            emissive: self.emissive,
            metallic: self.metallic,
            roughness: self.roughness,
            ambient_occlusion: self.ambient_occlusion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerDesc {
    pub size: u32,
    pub cell: u32,
    pub light: [u8; 4],
    pub dark: [u8; 4],
}

impl Default for CheckerDesc {
    fn default() -> Self {
        Self {
            size: 64,
            cell: 8,
            light: [230, 230, 230, 255],
            dark: [40, 40, 40, 255],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Quad,
    Plane,
    Cube,
}

impl Primitive {
    fn mesh(self) -> MeshData {
        match self {
            Primitive::Quad => primitives::quad(Vec2::ONE),
            Primitive::Plane => primitives::plane(1.0, 1),
            Primitive::Cube => primitives::cube(1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDesc {
    pub mesh: Primitive,
    pub material: String,
    #[serde(default)]
    pub position: Vec3,
    /// XYZ Euler angles.
    #[serde(default)]
    pub rotation_degrees: Vec3,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl ObjectDesc {
    pub fn transform(&self) -> Mat4 {
        let r = self.rotation_degrees * (std::f32::consts::PI / 180.0);
        Mat4::from_scale_rotation_translation(
            self.scale,
            Quat::from_euler(EulerRot::XYZ, r.x, r.y, r.z),
            self.position,
        )
    }
}

impl Default for SceneDesc {
    fn default() -> Self {
        Self {
            environment: EnvironmentDesc::default(),
            camera: CameraDesc::default(),
            lights: Vec::new(),
            materials: BTreeMap::new(),
            objects: Vec::new(),
        }
    }
}

/// What [`SceneDesc::instantiate`] created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneHandles {
    pub camera: CameraKey,
    pub lights: Vec<LightKey>,
    pub materials: BTreeMap<String, MaterialKey>,
    pub visuals: Vec<VisualKey>,
    pub skybox: Option<VisualKey>,
}

impl SceneDesc {
    pub fn from_json(json: &str) -> Result<Self, ImportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ImportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a scene file. Relative material shader paths are rebased onto
    /// the file's folder.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let mut scene = Self::from_json(&read_text(path)?)?;
        if let Some(dir) = path.parent() {
            for material in scene.materials.values_mut() {
                if let Some(shader) = material.shader.as_mut() {
                    *shader = dir.join(&*shader);
                }
            }
        }
        Ok(scene)
    }

    /// Ground plane, three cubes, a shadow-casting sun, a point light and
    /// a gradient sky.
    pub fn demo() -> Self {
        let mut materials = BTreeMap::new();
        materials.insert(
            "ground".to_owned(),
            MaterialDesc {
                albedo: Vec4::new(0.6, 0.6, 0.6, 1.0),
                roughness: 0.9,
                metallic: 0.0,
                checker: Some(CheckerDesc::default()),
                ..MaterialDesc::default()
            },
        );
        materials.insert(
            "red".to_owned(),
            MaterialDesc {
                albedo: Vec4::new(0.8, 0.15, 0.1, 1.0),
                roughness: 0.4,
                ..MaterialDesc::default()
            },
        );
        materials.insert(
            "metal".to_owned(),
            MaterialDesc {
                albedo: Vec4::new(0.9, 0.85, 0.7, 1.0),
                metallic: 1.0,
                roughness: 0.25,
                ..MaterialDesc::default()
            },
        );

        let object = |mesh, material: &str, position, scale| ObjectDesc {
            mesh,
            material: material.to_owned(),
            position,
            rotation_degrees: Vec3::ZERO,
            scale,
        };
        Self {
            environment: EnvironmentDesc {
                ambient_intensity: 0.15,
                clear_color: Vec4::new(0.05, 0.05, 0.08, 1.0),
                skybox: true,
                ..EnvironmentDesc::default()
            },
            camera: CameraDesc::default(),
            lights: vec![
                LightDesc::Directional {
                    direction: Vec3::new(-0.5, -1.0, -0.3),
                    color: Vec3::new(1.0, 0.95, 0.9),
                    intensity: 3.0,
                    cast_shadows: true,
                },
                LightDesc::Point {
                    position: Vec3::new(2.0, 2.0, 2.0),
                    color: Vec3::new(0.4, 0.6, 1.0),
                    intensity: 8.0,
                    cast_shadows: false,
                },
            ],
            materials,
            objects: vec![
                object(Primitive::Plane, "ground", Vec3::ZERO, Vec3::splat(12.0)),
                object(Primitive::Cube, "red", Vec3::new(-1.5, 0.5, 0.0), Vec3::ONE),
                object(Primitive::Cube, "metal", Vec3::new(1.5, 0.75, -0.5), Vec3::splat(1.5)),
                ObjectDesc {
                    rotation_degrees: Vec3::new(0.0, 45.0, 0.0),
                    ..object(Primitive::Cube, "red", Vec3::new(0.0, 0.3, 1.5), Vec3::splat(0.6))
                },
            ],
        }
    }

    /// Names every object's material resolves, or the first that does not.
    pub fn validate(&self) -> Result<(), ImportError> {
        for (i, object) in self.objects.iter().enumerate() {
            if !self.materials.contains_key(&object.material) {
                return Err(ImportError::Scene(format!(
                    "object {i} uses unknown material `{}`",
                    object.material
                )));
            }
        }
        Ok(())
    }

    /// Create every resource in `backend` and attach it to `world`.
    ///
    /// The camera's aspect ratio comes from the world's viewport, 16:9 when
    /// it has none. When any step fails, the resources created so far are
    /// destroyed again and nothing is attached.
    pub fn instantiate<D: GpuDevice>(
        &self,
        backend: &mut RendererBackend<D>,
        world: WorldKey,
    ) -> Result<SceneHandles, ImportError> {
        self.validate()?;
        let Some(w) = backend.worlds.get(world) else {
            return Err(ImportError::Scene(format!("world {world:?} does not exist")));
        };
        let environment = w.environment;
        let screen = w
            .viewport
            .and_then(|vp| backend.viewport(vp))
            .map(|vp| vp.size())
            .unwrap_or(UVec2::new(16, 9));

        let mut created = Created::default();
        let handles = match self.create_resources(backend, screen, &mut created) {
            Ok(handles) => handles,
            Err(e) => {
                tracing::warn!(?world, "scene import failed, releasing partial resources: {e}");
                created.release(backend);
                return Err(e);
            }
        };

        if let Some(env) = environment.and_then(|k| backend.environments.get_mut(k)) {
            env.ambient_color = self.environment.ambient_color;
            env.ambient_intensity = self.environment.ambient_intensity;
            env.clear_color = self.environment.clear_color;
            if handles.skybox.is_some() {
                env.skybox = handles.skybox;
            }
        }

        if let Some(w) = backend.worlds.get_mut(world) {
            w.materials.extend(handles.materials.values().copied());
            w.visuals.extend(handles.visuals.iter().copied());
            w.lights.extend(handles.lights.iter().copied());
            w.cameras.push(handles.camera);
        }
        tracing::debug!(
            ?world,
            visuals = handles.visuals.len(),
            lights = handles.lights.len(),
            "scene instantiated"
        );
        Ok(handles)
    }

    fn create_resources<D: GpuDevice>(
        &self,
        backend: &mut RendererBackend<D>,
        screen: UVec2,
        created: &mut Created,
    ) -> Result<SceneHandles, ImportError> {
        let mut shaders: HashMap<Option<&Path>, ShaderKey> = HashMap::new();
        let mut handles = SceneHandles::default();
        for (name, desc) in &self.materials {
            let shader_path = desc.shader.as_deref();
            let shader = match shaders.get(&shader_path) {
                Some(key) => *key,
                None => {
                    let key = match shader_path {
                        Some(path) => import_shader(backend, path)?,
                        None => build_builtin(backend, "pbr", ShaderSource::pbr())?,
                    };
                    created.shaders.push(key);
                    shaders.insert(shader_path, key);
                    key
                }
            };
            let mut material: Material = PbrMaterial {
                shader,
                params: desc.params(),
            }
            .into();
            if let Some(checker) = &desc.checker {
                let image = checkerboard(
                    UVec2::splat(checker.size),
                    checker.cell,
                    checker.light,
                    checker.dark,
                );
                let texture = image.upload(backend)?;
                created.textures.push(texture);
                material.set_texture(SamplerSlot::Albedo, Some(texture));
            }
            let key = backend.create_material(material);
            created.materials.push(key);
            handles.materials.insert(name.clone(), key);
        }

        let mut models: HashMap<Primitive, ModelKey> = HashMap::new();
        for object in &self.objects {
            let model = *models.entry(object.mesh).or_insert_with(|| {
                let model = object.mesh.mesh().upload_model(backend);
                created.models.push(model);
                model
            });
            let material = handles.materials[&object.material];
            let visual = backend.create_visual(Visual::new(object.transform(), material, model));
            created.visuals.push(visual);
            handles.visuals.push(visual);
        }

        for light in &self.lights {
            let light = backend.create_light(light.build());
            created.lights.push(light);
            handles.lights.push(light);
        }

        let mut camera = Camera::default();
        camera.look_at(self.camera.position, self.camera.target, Vec3::Y);
        camera.perspective_fov(
            self.camera.fov_degrees.to_radians(),
            screen.as_vec2(),
            Vec2::new(self.camera.near, self.camera.far),
        );
        handles.camera = backend.create_camera(camera);
        created.camera = Some(handles.camera);

        if self.environment.skybox {
            handles.skybox = Some(self.create_skybox(backend, created)?);
        }
        Ok(handles)
    }

    fn create_skybox<D: GpuDevice>(
        &self,
        backend: &mut RendererBackend<D>,
        created: &mut Created,
    ) -> Result<VisualKey, ImportError> {
        let shader = build_builtin(backend, "skybox", ShaderSource::skybox())?;
        created.shaders.push(shader);
        let sky = gradient_cubemap(
            64,
            self.environment.sky_top,
            self.environment.sky_bottom,
        );
        let texture = sky.upload(backend)?;
        created.textures.push(texture);
        let mut material = Material::new(shader);
        material.set_texture(SamplerSlot::Skybox, Some(texture));
        let material = backend.create_material(material);
        created.materials.push(material);
        let model = primitives::skybox_cube().upload_model(backend);
        created.models.push(model);
        let visual = backend.create_visual(Visual::new(Mat4::IDENTITY, material, model));
        created.visuals.push(visual);
        Ok(visual)
    }
}

/// Keys made by an import in progress, destroyed again if a later step fails.
#[derive(Default)]
struct Created {
    shaders: Vec<ShaderKey>,
    textures: Vec<TextureKey>,
    materials: Vec<MaterialKey>,
    models: Vec<ModelKey>,
    visuals: Vec<VisualKey>,
    lights: Vec<LightKey>,
    camera: Option<CameraKey>,
}

impl Created {
    /// Dependents go first: visuals, then materials, then what they point at.
    fn release<D: GpuDevice>(self, backend: &mut RendererBackend<D>) {
        for key in self.visuals {
            backend.destroy_visual(key);
        }
        for key in self.materials {
            backend.destroy_material(key);
        }
        for key in self.models {
            let meshes = backend
                .models
                .get(key)
                .map(|model| model.meshes.clone())
                .unwrap_or_default();
            backend.destroy_model(key);
            for mesh in meshes {
                backend.destroy_mesh(mesh);
            }
        }
        for key in self.textures {
            backend.destroy_texture(key);
        }
        for key in self.shaders {
            backend.destroy_shader(key);
        }
        for key in self.lights {
            backend.destroy_light(key);
        }
        if let Some(key) = self.camera {
            backend.destroy_camera(key);
        }
    }
}

fn build_builtin<D: GpuDevice>(
    backend: &mut RendererBackend<D>,
    name: &str,
    source: ShaderSource,
) -> Result<ShaderKey, ImportError> {
    backend
        .load_shader(&source.vertex, &source.fragment)
        .map_err(|source| ImportError::Shader {
            name: format!("builtin:{name}"),
            source,
        })
}
