use crate::pipelines::{self, Blitter, PipelineKey, Program};
use crate::reflect::{self, ScalarKind, StageReflection, TextureDim, UniformField, UniformKind};
use crate::resources::{self, GpuMesh, GpuRenderBuffer, GpuTexture, SamplerKey, TextureStorage};
use glam::{UVec2, Vec4};
use std::collections::HashMap;
use swarm_render::{
    check_completeness, AttachmentInfo, AttachmentPoint, AttachmentTarget, DeviceError,
    DeviceInfo, FramebufferId, FramebufferStatus, GpuDevice, MeshId, ProgramId, RasterState,
    RenderBufferId, RequiredCapabilities, Sampling, ScissorRect, ShaderStage, StageId, SurfaceId,
    TextureDesc, TextureFormat, TextureId, TextureKind, UniformValue, VertexLayout,
};
use wgpu::util::DeviceExt;

struct Stage {
    source: String,
    reflection: StageReflection,
}

struct GpuSurface {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

/// The render pass draws are currently recorded into.
struct OpenPass {
    pass: wgpu::RenderPass<'static>,
    colors: Vec<Option<wgpu::TextureFormat>>,
    depth: Option<wgpu::TextureFormat>,
    size: UVec2,
}

#[derive(Default)]
struct DrawState {
    program: Option<ProgramId>,
    mesh: Option<MeshId>,
    framebuffer: Option<FramebufferId>,
    surface: Option<SurfaceId>,
    viewport: Option<(UVec2, UVec2)>,
    scissor: Option<ScissorRect>,
    raster: RasterState,
    units: HashMap<u32, TextureId>,
}

#[derive(Debug, Clone, Copy)]
enum ViewSource {
    Texture(TextureId),
    Fallback(TextureDim, bool),
}

/// [`GpuDevice`] on wgpu.
///
/// Immediate-mode calls are turned into wgpu work lazily: draws go into a
/// render pass that is opened on first use and closed when the target
/// changes or a clear starts a new one. Uploads submit everything recorded
/// so far, so a texture write never overtakes the draws issued before it.
pub struct WgpuDevice {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    clamp_to_border: bool,
    next_id: u32,

    stages: HashMap<StageId, Stage>,
    programs: HashMap<ProgramId, Program>,
    meshes: HashMap<MeshId, GpuMesh>,
    textures: HashMap<TextureId, GpuTexture>,
    render_buffers: HashMap<RenderBufferId, GpuRenderBuffer>,
    framebuffers: HashMap<FramebufferId, Vec<(AttachmentPoint, AttachmentTarget)>>,
    surfaces: HashMap<SurfaceId, GpuSurface>,
    frames: HashMap<SurfaceId, wgpu::SurfaceTexture>,

    pipelines: HashMap<PipelineKey, Option<wgpu::RenderPipeline>>,
    samplers: HashMap<SamplerKey, wgpu::Sampler>,
    fallbacks: HashMap<(TextureDim, bool), wgpu::TextureView>,
    blitter: Blitter,

    state: DrawState,
    encoder: Option<wgpu::CommandEncoder>,
    pass: Option<OpenPass>,
}

impl WgpuDevice {
    /// Open the default adapter on any backend.
    pub fn new() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        Self::with_instance(instance)
    }

    pub fn with_instance(instance: wgpu::Instance) -> Result<Self, DeviceError> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DeviceError::Context("no suitable GPU adapter".into()))?;

        let features = adapter.features() & wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("swarm_device"),
                required_features: features,
                required_limits: adapter.limits(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| DeviceError::Context(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!("wgpu: {error}");
        }));

        let blitter = Blitter::new(&device);
        tracing::info!(
            "GPU initialized with {} backend",
            adapter.get_info().backend.to_str()
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            clamp_to_border: !features.is_empty(),
            next_id: 0,
            stages: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            render_buffers: HashMap::new(),
            framebuffers: HashMap::new(),
            surfaces: HashMap::new(),
            frames: HashMap::new(),
            pipelines: HashMap::new(),
            samplers: HashMap::new(),
            fallbacks: HashMap::new(),
            blitter,
            state: DrawState::default(),
            encoder: None,
            pass: None,
        })
    }

    /// Create a presentable surface for a window.
    ///
    /// `target` is anything wgpu can present to, typically an
    /// `Arc<winit::window::Window>`.
    pub fn attach_surface(
        &mut self,
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        size: UVec2,
    ) -> Result<SurfaceId, DeviceError> {
        let surface = self
            .instance
            .create_surface(target)
            .map_err(|e| DeviceError::Surface(e.to_string()))?;
        let caps = surface.get_capabilities(&self.adapter);
        // Shaders write display-ready values, so prefer a non-sRGB format.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| DeviceError::Surface("surface unsupported by the adapter".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.x.max(1),
            height: size.y.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&self.device, &config);

        let id = SurfaceId(self.next_id());
        tracing::debug!(surface = %id, ?format, width = config.width, height = config.height, "surface attached");
        self.surfaces.insert(id, GpuSurface { surface, config });
        Ok(id)
    }

    pub fn surface_format(&self, surface: SurfaceId) -> Option<wgpu::TextureFormat> {
        self.surfaces.get(&surface).map(|s| s.config.format)
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn end_pass(&mut self) {
        self.pass = None;
    }

    /// Close the pass and submit everything recorded so far.
    fn submit(&mut self) {
        self.pass = None;
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Acquire the surface's next texture if this frame has none yet.
    fn acquire(&mut self, surface: SurfaceId) -> bool {
        if self.frames.contains_key(&surface) {
            return true;
        }
        let Some(s) = self.surfaces.get(&surface) else {
            tracing::warn!(%surface, "unknown surface");
            return false;
        };
        let frame = match s.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                s.surface.configure(&self.device, &s.config);
                match s.surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(%surface, "surface error: {e}");
                        return false;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(%surface, "surface error: {e}");
                return false;
            }
        };
        self.frames.insert(surface, frame);
        true
    }

    fn attachment_info(&self, target: &AttachmentTarget) -> Option<AttachmentInfo> {
        match target {
            AttachmentTarget::Texture { texture, .. } => {
                let tex = self.textures.get(texture)?;
                let desc = tex.storage.as_ref()?.desc;
                Some(AttachmentInfo {
                    format: desc.format,
                    size: desc.size,
                    layers: desc.layers,
                    kind: Some(tex.kind),
                })
            }
            AttachmentTarget::RenderBuffer(id) => {
                let (_, format, size) = self.render_buffers.get(id)?.storage.as_ref()?;
                Some(AttachmentInfo {
                    format: *format,
                    size: *size,
                    layers: 1,
                    kind: None,
                })
            }
        }
    }

    fn attachment_view(
        &self,
        target: &AttachmentTarget,
    ) -> Option<(wgpu::TextureView, wgpu::TextureFormat, UVec2)> {
        match target {
            AttachmentTarget::Texture { texture, layer } => {
                let storage = self.textures.get(texture)?.storage.as_ref()?;
                let view = storage.texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("swarm_attachment_view"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer.unwrap_or(0),
                    array_layer_count: Some(1),
                    ..Default::default()
                });
                Some((
                    view,
                    resources::texture_format(storage.desc.format),
                    storage.desc.size,
                ))
            }
            AttachmentTarget::RenderBuffer(id) => {
                let (texture, format, size) = self.render_buffers.get(id)?.storage.as_ref()?;
                Some((
                    texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    resources::texture_format(*format),
                    *size,
                ))
            }
        }
    }

    /// Open a pass on the bound target, clearing what is requested.
    fn begin_pass(&mut self, color: Option<Vec4>, depth: bool) -> bool {
        self.end_pass();

        let mut color_views: Vec<Option<(wgpu::TextureView, wgpu::TextureFormat)>> = Vec::new();
        let mut depth_view: Option<(wgpu::TextureView, wgpu::TextureFormat)> = None;
        let size = match self.state.framebuffer {
            Some(framebuffer) => {
                let Some(attachments) = self.framebuffers.get(&framebuffer) else {
                    tracing::warn!(%framebuffer, "unknown framebuffer");
                    return false;
                };
                let status = check_completeness(attachments, |t| self.attachment_info(t));
                if status != FramebufferStatus::Complete {
                    tracing::warn!(%framebuffer, ?status, "skipping pass on incomplete framebuffer");
                    return false;
                }
                let mut size = UVec2::ZERO;
                for (point, target) in attachments {
                    let Some((view, format, target_size)) = self.attachment_view(target) else {
                        return false;
                    };
                    size = target_size;
                    match point {
                        AttachmentPoint::Color(index) => {
                            let index = *index as usize;
                            if color_views.len() <= index {
                                color_views.resize_with(index + 1, || None);
                            }
                            color_views[index] = Some((view, format));
                        }
                        AttachmentPoint::Depth | AttachmentPoint::DepthStencil => {
                            depth_view = Some((view, format));
                        }
                    }
                }
                size
            }
            None => {
                let Some(surface) = self.state.surface else {
                    tracing::warn!("no current surface to draw into");
                    return false;
                };
                if !self.acquire(surface) {
                    return false;
                }
                let (Some(frame), Some(s)) = (self.frames.get(&surface), self.surfaces.get(&surface))
                else {
                    return false;
                };
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                color_views.push(Some((view, s.config.format)));
                UVec2::new(s.config.width, s.config.height)
            }
        };

        let color_load = match color {
            Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                r: c.x as f64,
                g: c.y as f64,
                b: c.z as f64,
                a: c.w as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
            .iter()
            .map(|slot| {
                slot.as_ref().map(|(view, _)| wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let depth_attachment =
            depth_view
                .as_ref()
                .map(|(view, format)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: if depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: format.has_stencil_aspect().then_some(wgpu::Operations {
                        load: if depth {
                            wgpu::LoadOp::Clear(0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                });

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("swarm_frame_encoder"),
                })
        });
        let pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("swarm_pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                ..Default::default()
            })
            .forget_lifetime();

        self.pass = Some(OpenPass {
            pass,
            colors: color_views
                .iter()
                .map(|slot| slot.as_ref().map(|(_, format)| *format))
                .collect(),
            depth: depth_view.map(|(_, format)| format),
            size,
        });
        true
    }

    /// Build the pipeline for `key` once; failures are logged and cached.
    fn ensure_pipeline(&mut self, key: &PipelineKey) -> bool {
        if !self.pipelines.contains_key(key) {
            let Some(program) = self.programs.get(&key.program) else {
                return false;
            };
            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = pipelines::build_pipeline(&self.device, program, key);
            let pipeline = match pollster::block_on(self.device.pop_error_scope()) {
                Some(error) => {
                    tracing::error!(program = %key.program, "pipeline creation failed: {error}");
                    None
                }
                None => Some(pipeline),
            };
            self.pipelines.insert(key.clone(), pipeline);
        }
        self.pipelines.get(key).is_some_and(Option::is_some)
    }

    /// Uniform and texture bind groups for the next draw of `program_id`.
    fn bind_groups(&mut self, program_id: ProgramId) -> Option<(wgpu::BindGroup, wgpu::BindGroup)> {
        let program = self.programs.get(&program_id)?;

        let sources: Vec<ViewSource> = program
            .textures
            .iter()
            .map(|binding| {
                let bound = program
                    .units
                    .get(&binding.name)
                    .and_then(|unit| self.state.units.get(unit))
                    .copied();
                match bound {
                    Some(id)
                        if self
                            .textures
                            .get(&id)
                            .and_then(|t| t.sampled_as(binding.dim, binding.depth))
                            .is_some() =>
                    {
                        ViewSource::Texture(id)
                    }
                    _ => ViewSource::Fallback(binding.dim, binding.depth),
                }
            })
            .collect();

        // `x_sampler` samples texture `x` with that texture's parameters.
        let sampler_keys: Vec<SamplerKey> = program
            .samplers
            .iter()
            .map(|sampler| {
                let sampling = sampler
                    .name
                    .strip_suffix("_sampler")
                    .and_then(|texture| program.textures.iter().position(|t| t.name == texture))
                    .and_then(|index| match sources[index] {
                        ViewSource::Texture(id) => self.textures.get(&id).map(|t| t.sampling),
                        ViewSource::Fallback(..) => None,
                    })
                    .unwrap_or_default();
                SamplerKey::new(&sampling, sampler.comparison, self.clamp_to_border)
            })
            .collect();

        for source in &sources {
            if let ViewSource::Fallback(dim, depth) = *source {
                self.fallbacks.entry((dim, depth)).or_insert_with(|| {
                    resources::create_fallback(&self.device, &self.queue, dim, depth)
                });
            }
        }
        for key in &sampler_keys {
            self.samplers
                .entry(*key)
                .or_insert_with(|| key.create(&self.device));
        }

        let mut entries = Vec::with_capacity(sources.len() + sampler_keys.len());
        for (binding, source) in program.textures.iter().zip(&sources) {
            let view = match source {
                ViewSource::Texture(id) => &self.textures.get(id)?.storage.as_ref()?.view,
                ViewSource::Fallback(dim, depth) => self.fallbacks.get(&(*dim, *depth))?,
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding.binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        for (sampler, key) in program.samplers.iter().zip(&sampler_keys) {
            entries.push(wgpu::BindGroupEntry {
                binding: sampler.binding,
                resource: wgpu::BindingResource::Sampler(self.samplers.get(key)?),
            });
        }
        let texture_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("swarm_texture_group"),
            layout: &program.texture_layout,
            entries: &entries,
        });

        let uniform_group = if program.has_uniforms() {
            let buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("swarm_uniforms"),
                    contents: &program.staging,
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("swarm_uniform_group"),
                layout: &program.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        } else {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("swarm_uniform_group"),
                layout: &program.uniform_layout,
                entries: &[],
            })
        };
        Some((uniform_group, texture_group))
    }

    fn validate_desc(&self, kind: TextureKind, desc: &TextureDesc) -> Result<(), DeviceError> {
        let limits = self.device.limits();
        let invalid = |msg: String| Err(DeviceError::InvalidUpload(msg));
        if desc.size.x > limits.max_texture_dimension_2d
            || desc.size.y > limits.max_texture_dimension_2d
        {
            return invalid(format!(
                "{}x{} exceeds the maximum texture size {}",
                desc.size.x, desc.size.y, limits.max_texture_dimension_2d
            ));
        }
        if desc.layers > limits.max_texture_array_layers {
            return invalid(format!(
                "{} layers exceed the maximum {}",
                desc.layers, limits.max_texture_array_layers
            ));
        }
        match kind {
            TextureKind::D2 if desc.layers != 1 => invalid("2D textures have one layer".into()),
            TextureKind::Cube if desc.format.is_depth() => {
                invalid("cube textures cannot hold depth".into())
            }
            TextureKind::Cube if desc.layers != 6 || desc.size.x != desc.size.y => {
                invalid("cube textures need six square faces".into())
            }
            _ => Ok(()),
        }
    }
}

fn check_limit(name: &'static str, required: u32, available: u32) -> Result<(), DeviceError> {
    if available < required {
        return Err(DeviceError::MissingCapability {
            name,
            required,
            available,
        });
    }
    Ok(())
}

/// Bytes of `value` as stored in a field of `kind`, or `None` on mismatch.
///
/// Booleans are not host-shareable in WGSL, so shaders declare them as
/// `i32`; floats accept bools and ints as 0.0/1.0 and plain conversions.
pub(crate) fn uniform_bytes(value: UniformValue, kind: UniformKind) -> Option<Vec<u8>> {
    use ScalarKind::{Float, Sint, Uint};
    fn floats(v: &[f32]) -> Vec<u8> {
        bytemuck::cast_slice(v).to_vec()
    }
    let bytes = match (value, kind) {
        (UniformValue::Bool(b), UniformKind::Scalar(Sint | Uint)) => {
            bytemuck::bytes_of(&(b as i32)).to_vec()
        }
        (UniformValue::Bool(b), UniformKind::Scalar(Float)) => {
            floats(&[if b { 1.0 } else { 0.0 }])
        }
        (UniformValue::Int(i), UniformKind::Scalar(Sint | Uint)) => bytemuck::bytes_of(&i).to_vec(),
        (UniformValue::Int(i), UniformKind::Scalar(Float)) => floats(&[i as f32]),
        (UniformValue::Float(f), UniformKind::Scalar(Float)) => floats(&[f]),
        (UniformValue::Vec2(v), UniformKind::Vector { size: 2, scalar: Float }) => {
            floats(&v.to_array())
        }
        (UniformValue::Vec3(v), UniformKind::Vector { size: 3, scalar: Float }) => {
            floats(&v.to_array())
        }
        (UniformValue::Vec4(v), UniformKind::Vector { size: 4, scalar: Float }) => {
            floats(&v.to_array())
        }
        (UniformValue::Mat4(m), UniformKind::Matrix { columns: 4, rows: 4 }) => {
            floats(&m.to_cols_array())
        }
        _ => return None,
    };
    Some(bytes)
}

pub(crate) fn write_uniform(staging: &mut [u8], field: UniformField, value: UniformValue) -> bool {
    let Some(bytes) = uniform_bytes(value, field.kind) else {
        return false;
    };
    let start = field.offset as usize;
    match staging.get_mut(start..start + bytes.len()) {
        Some(dst) => {
            dst.copy_from_slice(&bytes);
            true
        }
        None => false,
    }
}

impl GpuDevice for WgpuDevice {
    fn info(&self) -> DeviceInfo {
        let info = self.adapter.get_info();
        DeviceInfo {
            renderer: info.name,
            version: format!(
                "{} {} {}",
                info.backend.to_str(),
                info.driver,
                info.driver_info
            )
            .trim()
            .to_string(),
        }
    }

    fn load_extensions(&mut self, required: &RequiredCapabilities) -> Result<(), DeviceError> {
        let limits = self.device.limits();
        check_limit(
            "texture array layers",
            required.texture_array_layers,
            limits.max_texture_array_layers,
        )?;
        check_limit(
            "texture units",
            required.texture_units,
            limits.max_sampled_textures_per_shader_stage,
        )?;
        check_limit(
            "texture size",
            required.texture_size,
            limits.max_texture_dimension_2d,
        )?;
        if !self.clamp_to_border {
            tracing::debug!("clamp-to-border sampling unavailable, using clamp-to-edge");
        }
        Ok(())
    }

    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageId, String> {
        let reflection = reflect::reflect_stage(stage, source).map_err(|e| e.to_string())?;
        let id = StageId(self.next_id());
        self.stages.insert(
            id,
            Stage {
                source: source.to_owned(),
                reflection,
            },
        );
        Ok(id)
    }

    fn link_program(&mut self, vertex: StageId, fragment: StageId) -> Result<ProgramId, String> {
        let (Some(vs), Some(fs)) = (self.stages.get(&vertex), self.stages.get(&fragment)) else {
            return Err("unknown shader stage".into());
        };
        if vs.reflection.stage != ShaderStage::Vertex || fs.reflection.stage != ShaderStage::Fragment
        {
            return Err("a program needs one vertex and one fragment stage".into());
        }

        let uniforms = match (&vs.reflection.uniforms, &fs.reflection.uniforms) {
            (Some(a), Some(b)) => a.merge(b)?,
            (Some(a), None) | (None, Some(a)) => a.clone(),
            (None, None) => Default::default(),
        };

        let mut textures = vs.reflection.textures.clone();
        for texture in &fs.reflection.textures {
            match textures.iter().find(|t| t.name == texture.name) {
                Some(existing) if existing != texture => {
                    return Err(format!("texture `{}` declared differently per stage", texture.name));
                }
                Some(_) => {}
                None => textures.push(texture.clone()),
            }
        }
        let mut samplers = vs.reflection.samplers.clone();
        for sampler in &fs.reflection.samplers {
            match samplers.iter().find(|s| s.name == sampler.name) {
                Some(existing) if existing != sampler => {
                    return Err(format!("sampler `{}` declared differently per stage", sampler.name));
                }
                Some(_) => {}
                None => samplers.push(sampler.clone()),
            }
        }
        let mut bindings: Vec<u32> = textures
            .iter()
            .map(|t| t.binding)
            .chain(samplers.iter().map(|s| s.binding))
            .collect();
        bindings.sort_unstable();
        if bindings.windows(2).any(|w| w[0] == w[1]) {
            return Err("two resources share a binding in group 1".into());
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("swarm_vertex_stage"),
            source: wgpu::ShaderSource::Wgsl(vs.source.as_str().into()),
        });
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("swarm_fragment_stage"),
            source: wgpu::ShaderSource::Wgsl(fs.source.as_str().into()),
        });
        let (uniform_layout, texture_layout, pipeline_layout) =
            pipelines::program_layouts(&self.device, &uniforms, &textures, &samplers);
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(error.to_string());
        }

        let staging = vec![0u8; (uniforms.size as usize).next_multiple_of(16)];
        let program = Program {
            vertex: vertex_module,
            fragment: fragment_module,
            vertex_entry: vs.reflection.entry_point.clone(),
            fragment_entry: fs.reflection.entry_point.clone(),
            uniforms,
            staging,
            textures,
            samplers,
            fragment_outputs: fs.reflection.locations.clone(),
            units: HashMap::new(),
            uniform_layout,
            texture_layout,
            pipeline_layout,
        };
        let id = ProgramId(self.next_id());
        self.programs.insert(id, program);
        Ok(id)
    }

    fn delete_stage(&mut self, stage: StageId) {
        self.stages.remove(&stage);
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_some() {
            self.pipelines.retain(|key, _| key.program != program);
        }
        if self.state.program == Some(program) {
            self.state.program = None;
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.state.program = Some(program);
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        let Some(p) = self.programs.get_mut(&program) else {
            return;
        };
        let Some(field) = p.uniforms.get(name) else {
            return;
        };
        if !write_uniform(&mut p.staging, field, value) {
            tracing::warn!(%program, name, ?value, kind = %field.kind, "uniform type mismatch");
        }
    }

    fn set_sampler_slot(&mut self, program: ProgramId, name: &str, unit: u32) {
        if let Some(p) = self.programs.get_mut(&program) {
            if p.textures.iter().any(|t| t.name == name) {
                p.units.insert(name.to_owned(), unit);
            }
        }
    }

    fn create_mesh(&mut self) -> MeshId {
        let id = MeshId(self.next_id());
        self.meshes.insert(id, GpuMesh::default());
        id
    }

    fn delete_mesh(&mut self, mesh: MeshId) {
        self.meshes.remove(&mesh);
        if self.state.mesh == Some(mesh) {
            self.state.mesh = None;
        }
    }

    fn upload_vertices(&mut self, mesh: MeshId, layout: VertexLayout, data: &[u8]) {
        let Some(m) = self.meshes.get_mut(&mesh) else {
            return;
        };
        m.layout = Some(layout);
        m.vertices = (!data.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("swarm_vertices"),
                    contents: data,
                    usage: wgpu::BufferUsages::VERTEX,
                })
        });
    }

    fn upload_indices(&mut self, mesh: MeshId, indices: &[u32]) {
        let Some(m) = self.meshes.get_mut(&mesh) else {
            return;
        };
        m.index_count = indices.len() as u32;
        m.indices = (!indices.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("swarm_indices"),
                    contents: bytemuck::cast_slice(indices),
                    usage: wgpu::BufferUsages::INDEX,
                })
        });
    }

    fn bind_mesh(&mut self, mesh: MeshId) {
        self.state.mesh = Some(mesh);
    }

    fn create_texture(&mut self, kind: TextureKind) -> TextureId {
        let id = TextureId(self.next_id());
        self.textures.insert(id, GpuTexture::new(kind));
        id
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.state.units.retain(|_, bound| *bound != texture);
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        desc: &TextureDesc,
        data: Option<&[u8]>,
    ) -> Result<(), DeviceError> {
        let kind = self
            .textures
            .get(&texture)
            .ok_or_else(|| DeviceError::UnknownResource(texture.to_string()))?
            .kind;
        self.validate_desc(kind, desc)?;
        if let Some(data) = data {
            if data.len() != desc.data_len() {
                return Err(DeviceError::InvalidUpload(format!(
                    "{} bytes for {} expected",
                    data.len(),
                    desc.data_len()
                )));
            }
            if desc.format.is_depth() && !data.is_empty() {
                return Err(DeviceError::InvalidUpload(
                    "depth textures cannot be filled from memory".into(),
                ));
            }
        }

        self.submit();
        let extent = wgpu::Extent3d {
            width: desc.size.x.max(1),
            height: desc.size.y.max(1),
            depth_or_array_layers: desc.layers.max(1),
        };
        let mut usage =
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT;
        if !desc.format.is_depth() {
            usage |= wgpu::TextureUsages::COPY_DST;
        }
        let storage = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("swarm_texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: resources::texture_format(desc.format),
            usage,
            view_formats: &[],
        });
        if let Some(data) = data.filter(|d| !d.is_empty()) {
            let bytes = resources::device_bytes(desc.format, data);
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &storage,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &bytes,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * desc.size.x),
                    rows_per_image: Some(desc.size.y),
                },
                extent,
            );
        }
        let view = storage.create_view(&wgpu::TextureViewDescriptor {
            label: Some("swarm_texture_view"),
            dimension: Some(resources::view_dimension(kind)),
            aspect: resources::sample_aspect(desc.format),
            ..Default::default()
        });

        if let Some(tex) = self.textures.get_mut(&texture) {
            tex.storage = Some(TextureStorage {
                texture: storage,
                desc: *desc,
                view,
            });
        }
        Ok(())
    }

    fn write_texture_region(
        &mut self,
        texture: TextureId,
        origin: UVec2,
        size: UVec2,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let desc = self
            .textures
            .get(&texture)
            .ok_or_else(|| DeviceError::UnknownResource(texture.to_string()))?
            .storage
            .as_ref()
            .ok_or_else(|| DeviceError::InvalidUpload(format!("{texture} has no storage")))?
            .desc;
        if desc.format.is_depth() {
            return Err(DeviceError::InvalidUpload(
                "depth textures cannot be filled from memory".into(),
            ));
        }
        let end = origin + size;
        if end.x > desc.size.x || end.y > desc.size.y {
            return Err(DeviceError::InvalidUpload(format!(
                "region {origin}+{size} outside {}",
                desc.size
            )));
        }
        let expected = size.x as usize * size.y as usize * desc.format.bytes_per_texel();
        if data.len() != expected {
            return Err(DeviceError::InvalidUpload(format!(
                "{} bytes for {expected} expected",
                data.len()
            )));
        }
        if data.is_empty() {
            return Ok(());
        }

        self.submit();
        let Some(storage) = self.textures.get(&texture).and_then(|t| t.storage.as_ref()) else {
            return Ok(());
        };
        let bytes = resources::device_bytes(desc.format, data);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: origin.x,
                    y: origin.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.x),
                rows_per_image: Some(size.y),
            },
            wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn set_sampling(&mut self, texture: TextureId, sampling: &Sampling) {
        if let Some(tex) = self.textures.get_mut(&texture) {
            tex.sampling = *sampling;
        }
    }

    fn activate_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        match texture {
            Some(texture) => self.state.units.insert(unit, texture),
            None => self.state.units.remove(&unit),
        };
    }

    fn create_render_buffer(&mut self) -> RenderBufferId {
        let id = RenderBufferId(self.next_id());
        self.render_buffers
            .insert(id, GpuRenderBuffer { storage: None });
        id
    }

    fn delete_render_buffer(&mut self, buffer: RenderBufferId) {
        self.render_buffers.remove(&buffer);
    }

    fn allocate_render_buffer(&mut self, buffer: RenderBufferId, format: TextureFormat, size: UVec2) {
        let Some(rb) = self.render_buffers.get_mut(&buffer) else {
            return;
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("swarm_render_buffer"),
            size: wgpu::Extent3d {
                width: size.x.max(1),
                height: size.y.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: resources::texture_format(format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        rb.storage = Some((texture, format, size));
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        let id = FramebufferId(self.next_id());
        self.framebuffers.insert(id, Vec::new());
        id
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        if self.state.framebuffer == Some(framebuffer) {
            self.end_pass();
            self.state.framebuffer = None;
        }
    }

    fn attach(
        &mut self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        target: Option<AttachmentTarget>,
    ) {
        if self.state.framebuffer == Some(framebuffer) {
            self.end_pass();
        }
        let Some(attachments) = self.framebuffers.get_mut(&framebuffer) else {
            return;
        };
        attachments.retain(|(p, _)| *p != point);
        if let Some(target) = target {
            attachments.push((point, target));
        }
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        match self.framebuffers.get(&framebuffer) {
            Some(attachments) => check_completeness(attachments, |t| self.attachment_info(t)),
            None => FramebufferStatus::MissingAttachment,
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        if self.state.framebuffer != framebuffer {
            self.end_pass();
            self.state.framebuffer = framebuffer;
        }
    }

    fn set_viewport(&mut self, origin: UVec2, size: UVec2) {
        self.state.viewport = Some((origin, size));
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) {
        self.state.scissor = rect;
    }

    fn set_raster_state(&mut self, state: RasterState) {
        self.state.raster = state;
    }

    fn clear(&mut self, color: Option<Vec4>, depth: bool) {
        self.begin_pass(color, depth);
    }

    fn draw_indexed(&mut self, first_index: u32, count: u32, base_vertex: i32) {
        if count == 0 {
            return;
        }
        let (Some(program), Some(mesh_id)) = (self.state.program, self.state.mesh) else {
            tracing::warn!("draw without a bound program and mesh");
            return;
        };
        let Some(layout) = self.meshes.get(&mesh_id).and_then(|m| m.layout) else {
            return;
        };
        if self.pass.is_none() && !self.begin_pass(None, false) {
            return;
        }
        let Some(open) = &self.pass else {
            return;
        };
        let key = PipelineKey {
            program,
            colors: open.colors.clone(),
            depth: open.depth,
            raster: self.state.raster,
            layout,
        };
        let target = open.size;

        let (origin, size) = match self.state.viewport {
            Some((origin, size)) => resources::clamp_rect(origin, size, target),
            None => (UVec2::ZERO, target),
        };
        let (clip_origin, clip_size) = match self.state.scissor {
            Some(rect) => resources::clamp_rect(rect.origin, rect.size, target),
            None => (UVec2::ZERO, target),
        };
        if size.min_element() == 0 || clip_size.min_element() == 0 {
            return;
        }
        if !self.ensure_pipeline(&key) {
            return;
        }
        let Some((uniform_group, texture_group)) = self.bind_groups(program) else {
            return;
        };

        let Some(mesh) = self.meshes.get(&mesh_id) else {
            return;
        };
        let (Some(vertices), Some(indices)) = (&mesh.vertices, &mesh.indices) else {
            return;
        };
        let end = first_index.saturating_add(count);
        if end > mesh.index_count {
            tracing::warn!(mesh = %mesh_id, end, available = mesh.index_count, "index range out of bounds");
            return;
        }
        let (Some(Some(pipeline)), Some(open)) = (self.pipelines.get(&key), self.pass.as_mut())
        else {
            return;
        };

        let pass = &mut open.pass;
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &uniform_group, &[]);
        pass.set_bind_group(1, &texture_group, &[]);
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
        pass.set_viewport(
            origin.x as f32,
            origin.y as f32,
            size.x as f32,
            size.y as f32,
            0.0,
            1.0,
        );
        pass.set_scissor_rect(clip_origin.x, clip_origin.y, clip_size.x, clip_size.y);
        pass.draw_indexed(first_index..end, base_vertex, 0..1);
    }

    fn make_current(&mut self, surface: SurfaceId) {
        if self.state.surface != Some(surface) && self.state.framebuffer.is_none() {
            self.end_pass();
        }
        self.state.surface = Some(surface);
    }

    fn resize_surface(&mut self, surface: SurfaceId, size: UVec2) {
        self.submit();
        self.frames.remove(&surface);
        if let Some(s) = self.surfaces.get_mut(&surface) {
            s.config.width = size.x.max(1);
            s.config.height = size.y.max(1);
            s.surface.configure(&self.device, &s.config);
        }
    }

    fn surface_size(&self, surface: SurfaceId) -> Option<UVec2> {
        self.surfaces
            .get(&surface)
            .map(|s| UVec2::new(s.config.width, s.config.height))
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        self.submit();
        self.frames.remove(&surface);
        self.surfaces.remove(&surface);
        if self.state.surface == Some(surface) {
            self.state.surface = None;
        }
    }

    fn blit_to_surface(&mut self, surface: SurfaceId, source: TextureId, size: UVec2) {
        self.end_pass();
        if !self.acquire(surface) {
            return;
        }
        let Some(storage) = self
            .textures
            .get(&source)
            .filter(|t| t.kind == TextureKind::D2)
            .and_then(|t| t.storage.as_ref())
            .filter(|s| !s.desc.format.is_depth())
        else {
            tracing::warn!(texture = %source, "blit source is not a 2D color texture");
            return;
        };
        let (Some(frame), Some(s)) = (self.frames.get(&surface), self.surfaces.get(&surface)) else {
            return;
        };
        let bounds = UVec2::new(s.config.width, s.config.height);
        let (_, size) = resources::clamp_rect(UVec2::ZERO, size, bounds);

        let bind_group = self.blitter.bind_group(&self.device, &storage.view);
        let pipeline = self.blitter.pipeline(&self.device, s.config.format);
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("swarm_frame_encoder"),
                })
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("swarm_blit_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });
        if size.min_element() > 0 {
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_viewport(0.0, 0.0, size.x as f32, size.y as f32, 0.0, 1.0);
            pass.draw(0..3, 0..1);
        }
    }

    fn present(&mut self, surface: SurfaceId) {
        self.end_pass();
        if !self.frames.contains_key(&surface) && self.acquire(surface) {
            if let Some(frame) = self.frames.get(&surface) {
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                let encoder = self.encoder.get_or_insert_with(|| {
                    self.device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("swarm_frame_encoder"),
                        })
                });
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("swarm_empty_frame"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    ..Default::default()
                });
            }
        }
        self.submit();
        if let Some(frame) = self.frames.remove(&surface) {
            frame.present();
        }
    }
}
