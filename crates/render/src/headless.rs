//! A [`GpuDevice`] with no GPU behind it.
//!
//! Every call is validated against the same rules a real device enforces
//! and appended to a command log. Tests and the CLI's dry-run renders read
//! the log back to see what a frame did.

use crate::device::{
    AttachmentPoint, AttachmentTarget, DeviceError, DeviceInfo, FramebufferId, FramebufferStatus,
    GpuDevice, MeshId, ProgramId, RasterState, RenderBufferId, RequiredCapabilities, Sampling,
    ScissorRect, ShaderStage, StageId, SurfaceId, TextureDesc, TextureFormat, TextureId,
    TextureKind, UniformValue, VertexLayout,
};
use crate::framebuffer::{check_completeness, AttachmentInfo};
use crate::window::WindowSystem;
use glam::{UVec2, Vec4};
use std::collections::{BTreeMap, HashMap};

/// One recorded device call that changes what ends up on screen.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    UseProgram(ProgramId),
    SetUniform {
        program: ProgramId,
        name: String,
        value: UniformValue,
    },
    BindMesh(MeshId),
    UploadTexture {
        texture: TextureId,
        desc: TextureDesc,
    },
    WriteTextureRegion {
        texture: TextureId,
        origin: UVec2,
        size: UVec2,
    },
    ActivateTexture {
        unit: u32,
        texture: Option<TextureId>,
    },
    Attach {
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        target: Option<AttachmentTarget>,
    },
    BindFramebuffer(Option<FramebufferId>),
    SetViewport {
        origin: UVec2,
        size: UVec2,
    },
    SetScissor(Option<ScissorRect>),
    SetRasterState(RasterState),
    Clear {
        framebuffer: Option<FramebufferId>,
        color: Option<Vec4>,
        depth: bool,
    },
    DrawIndexed(DrawCall),
    MakeCurrent(SurfaceId),
    ResizeSurface {
        surface: SurfaceId,
        size: UVec2,
    },
    BlitToSurface {
        surface: SurfaceId,
        source: TextureId,
        size: UVec2,
    },
    Present(SurfaceId),
}

/// Snapshot of the bound state at a draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: Option<ProgramId>,
    pub mesh: Option<MeshId>,
    pub framebuffer: Option<FramebufferId>,
    pub first_index: u32,
    pub count: u32,
    pub base_vertex: i32,
    pub raster: RasterState,
    pub scissor: Option<ScissorRect>,
    /// Texture units with something bound, in unit order.
    pub textures: Vec<(u32, TextureId)>,
}

#[derive(Debug, Default)]
struct ProgramState {
    uniforms: HashMap<String, UniformValue>,
    samplers: HashMap<String, u32>,
}

#[derive(Debug)]
struct TextureState {
    kind: TextureKind,
    desc: Option<TextureDesc>,
    sampling: Sampling,
}

#[derive(Debug, Default, Clone, Copy)]
struct MeshState {
    vertex_count: u32,
    index_count: u32,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    limits: RequiredCapabilities,
    next_id: u32,
    stages: HashMap<StageId, ShaderStage>,
    programs: HashMap<ProgramId, ProgramState>,
    meshes: HashMap<MeshId, MeshState>,
    textures: HashMap<TextureId, TextureState>,
    render_buffers: HashMap<RenderBufferId, Option<(TextureFormat, UVec2)>>,
    framebuffers: HashMap<FramebufferId, Vec<(AttachmentPoint, AttachmentTarget)>>,
    surfaces: HashMap<SurfaceId, UVec2>,
    current_surface: Option<SurfaceId>,
    program: Option<ProgramId>,
    mesh: Option<MeshId>,
    framebuffer: Option<FramebufferId>,
    raster: RasterState,
    scissor: Option<ScissorRect>,
    units: BTreeMap<u32, TextureId>,
    commands: Vec<Command>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_limits(RequiredCapabilities {
            texture_array_layers: 2048,
            texture_units: 32,
            texture_size: 16384,
        })
    }

    /// A device reporting the given limits from `load_extensions`.
    pub fn with_limits(limits: RequiredCapabilities) -> Self {
        Self {
            limits,
            next_id: 1,
            stages: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            render_buffers: HashMap::new(),
            framebuffers: HashMap::new(),
            surfaces: HashMap::new(),
            current_surface: None,
            program: None,
            mesh: None,
            framebuffer: None,
            raster: RasterState::default(),
            scissor: None,
            units: BTreeMap::new(),
            commands: Vec::new(),
        }
    }

    pub fn create_surface(&mut self, size: UVec2) -> SurfaceId {
        let id = SurfaceId(self.alloc());
        self.surfaces.insert(id, size);
        id
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn draw_calls(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|c| match c {
            Command::DrawIndexed(draw) => Some(draw),
            _ => None,
        })
    }

    /// Last value set for a program uniform.
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        self.programs.get(&program)?.uniforms.get(name).copied()
    }

    pub fn sampler_slot(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs.get(&program)?.samplers.get(name).copied()
    }

    pub fn texture_desc(&self, texture: TextureId) -> Option<TextureDesc> {
        self.textures.get(&texture)?.desc
    }

    pub fn texture_sampling(&self, texture: TextureId) -> Option<Sampling> {
        self.textures.get(&texture).map(|t| t.sampling)
    }

    pub fn texture_exists(&self, texture: TextureId) -> bool {
        self.textures.contains_key(&texture)
    }

    /// `(vertex_count, index_count)` of a mesh.
    pub fn mesh_counts(&self, mesh: MeshId) -> Option<(u32, u32)> {
        self.meshes
            .get(&mesh)
            .map(|m| (m.vertex_count, m.index_count))
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn current_surface(&self) -> Option<SurfaceId> {
        self.current_surface
    }

    fn alloc(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn attachment_info(&self, target: &AttachmentTarget) -> Option<AttachmentInfo> {
        match target {
            AttachmentTarget::Texture { texture, .. } => {
                let tex = self.textures.get(texture)?;
                let desc = tex.desc?;
                Some(AttachmentInfo {
                    format: desc.format,
                    size: desc.size,
                    layers: desc.layers,
                    kind: Some(tex.kind),
                })
            }
            AttachmentTarget::RenderBuffer(id) => {
                let (format, size) = (*self.render_buffers.get(id)?)?;
                Some(AttachmentInfo {
                    format,
                    size,
                    layers: 1,
                    kind: None,
                })
            }
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

impl GpuDevice for HeadlessDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            renderer: "headless".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }

    fn load_extensions(&mut self, required: &RequiredCapabilities) -> Result<(), DeviceError> {
        check_limit(
            "texture_array_layers",
            required.texture_array_layers,
            self.limits.texture_array_layers,
        )?;
        check_limit(
            "texture_units",
            required.texture_units,
            self.limits.texture_units,
        )?;
        check_limit(
            "texture_size",
            required.texture_size,
            self.limits.texture_size,
        )
    }

    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageId, String> {
        if source.trim().is_empty() {
            return Err(format!("{stage}: empty source"));
        }
        if let Some((line, text)) = source
            .lines()
            .enumerate()
            .find(|(_, l)| l.trim_start().starts_with("#error"))
        {
            let message = text.trim_start().trim_start_matches("#error").trim();
            return Err(format!("0:{}: error: {message}", line + 1));
        }
        let id = StageId(self.alloc());
        self.stages.insert(id, stage);
        Ok(id)
    }

    fn link_program(&mut self, vertex: StageId, fragment: StageId) -> Result<ProgramId, String> {
        match (self.stages.get(&vertex), self.stages.get(&fragment)) {
            (Some(ShaderStage::Vertex), Some(ShaderStage::Fragment)) => {}
            (None, _) | (_, None) => return Err("unknown shader stage".into()),
            _ => return Err("program needs one vertex and one fragment stage".into()),
        }
        let id = ProgramId(self.alloc());
        self.programs.insert(id, ProgramState::default());
        Ok(id)
    }

    fn delete_stage(&mut self, stage: StageId) {
        self.stages.remove(&stage);
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.contains_key(&program) {
            self.program = Some(program);
            self.commands.push(Command::UseProgram(program));
        }
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        if let Some(state) = self.programs.get_mut(&program) {
            state.uniforms.insert(name.to_owned(), value);
            self.commands.push(Command::SetUniform {
                program,
                name: name.to_owned(),
                value,
            });
        }
    }

    fn set_sampler_slot(&mut self, program: ProgramId, name: &str, unit: u32) {
        if let Some(state) = self.programs.get_mut(&program) {
            state.samplers.insert(name.to_owned(), unit);
        }
    }

    fn create_mesh(&mut self) -> MeshId {
        let id = MeshId(self.alloc());
        self.meshes.insert(id, MeshState::default());
        id
    }

    fn delete_mesh(&mut self, mesh: MeshId) {
        self.meshes.remove(&mesh);
        if self.mesh == Some(mesh) {
            self.mesh = None;
        }
    }

    fn upload_vertices(&mut self, mesh: MeshId, layout: VertexLayout, data: &[u8]) {
        if let Some(state) = self.meshes.get_mut(&mesh) {
            state.vertex_count = (data.len() / layout.stride()) as u32;
        }
    }

    fn upload_indices(&mut self, mesh: MeshId, indices: &[u32]) {
        if let Some(state) = self.meshes.get_mut(&mesh) {
            state.index_count = indices.len() as u32;
        }
    }

    fn bind_mesh(&mut self, mesh: MeshId) {
        if self.meshes.contains_key(&mesh) {
            self.mesh = Some(mesh);
            self.commands.push(Command::BindMesh(mesh));
        }
    }

    fn create_texture(&mut self, kind: TextureKind) -> TextureId {
        let id = TextureId(self.alloc());
        self.textures.insert(
            id,
            TextureState {
                kind,
                desc: None,
                sampling: Sampling::default(),
            },
        );
        id
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.units.retain(|_, t| *t != texture);
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        desc: &TextureDesc,
        data: Option<&[u8]>,
    ) -> Result<(), DeviceError> {
        let state = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| DeviceError::UnknownResource(texture.to_string()))?;
        if desc.size.x > self.limits.texture_size || desc.size.y > self.limits.texture_size {
            return Err(DeviceError::InvalidUpload(format!(
                "{}x{} exceeds the maximum texture size {}",
                desc.size.x, desc.size.y, self.limits.texture_size
            )));
        }
        if let Some(data) = data {
            if data.len() != desc.data_len() {
                return Err(DeviceError::InvalidUpload(format!(
                    "{} bytes for {} expected",
                    data.len(),
                    desc.data_len()
                )));
            }
        }
        state.desc = Some(*desc);
        self.commands.push(Command::UploadTexture {
            texture,
            desc: *desc,
        });
        Ok(())
    }

    fn write_texture_region(
        &mut self,
        texture: TextureId,
        origin: UVec2,
        size: UVec2,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let state = self
            .textures
            .get(&texture)
            .ok_or_else(|| DeviceError::UnknownResource(texture.to_string()))?;
        let desc = state
            .desc
            .ok_or_else(|| DeviceError::InvalidUpload(format!("{texture} has no storage")))?;
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
        self.commands.push(Command::WriteTextureRegion {
            texture,
            origin,
            size,
        });
        Ok(())
    }

    fn set_sampling(&mut self, texture: TextureId, sampling: &Sampling) {
        if let Some(state) = self.textures.get_mut(&texture) {
            state.sampling = *sampling;
        }
    }

    fn activate_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        match texture {
            Some(t) if self.textures.contains_key(&t) => {
                self.units.insert(unit, t);
            }
            _ => {
                self.units.remove(&unit);
            }
        }
        self.commands.push(Command::ActivateTexture { unit, texture });
    }

    fn create_render_buffer(&mut self) -> RenderBufferId {
        let id = RenderBufferId(self.alloc());
        self.render_buffers.insert(id, None);
        id
    }

    fn delete_render_buffer(&mut self, buffer: RenderBufferId) {
        self.render_buffers.remove(&buffer);
    }

    fn allocate_render_buffer(&mut self, buffer: RenderBufferId, format: TextureFormat, size: UVec2) {
        if let Some(slot) = self.render_buffers.get_mut(&buffer) {
            *slot = Some((format, size));
        }
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        let id = FramebufferId(self.alloc());
        self.framebuffers.insert(id, Vec::new());
        id
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        if self.framebuffer == Some(framebuffer) {
            self.framebuffer = None;
        }
    }

    fn attach(
        &mut self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        target: Option<AttachmentTarget>,
    ) {
        let Some(attachments) = self.framebuffers.get_mut(&framebuffer) else {
            return;
        };
        attachments.retain(|(p, _)| *p != point);
        if let Some(target) = target {
            attachments.push((point, target));
        }
        self.commands.push(Command::Attach {
            framebuffer,
            point,
            target,
        });
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        match self.framebuffers.get(&framebuffer) {
            Some(attachments) => check_completeness(attachments, |t| self.attachment_info(t)),
            None => FramebufferStatus::MissingAttachment,
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.framebuffer = framebuffer;
        self.commands.push(Command::BindFramebuffer(framebuffer));
    }

    fn set_viewport(&mut self, origin: UVec2, size: UVec2) {
        self.commands.push(Command::SetViewport { origin, size });
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) {
        self.scissor = rect;
        self.commands.push(Command::SetScissor(rect));
    }

    fn set_raster_state(&mut self, state: RasterState) {
        self.raster = state;
        self.commands.push(Command::SetRasterState(state));
    }

    fn clear(&mut self, color: Option<Vec4>, depth: bool) {
        self.commands.push(Command::Clear {
            framebuffer: self.framebuffer,
            color,
            depth,
        });
    }

    fn draw_indexed(&mut self, first_index: u32, count: u32, base_vertex: i32) {
        let draw = DrawCall {
            program: self.program,
            mesh: self.mesh,
            framebuffer: self.framebuffer,
            first_index,
            count,
            base_vertex,
            raster: self.raster,
            scissor: self.scissor,
            textures: self.units.iter().map(|(u, t)| (*u, *t)).collect(),
        };
        self.commands.push(Command::DrawIndexed(draw));
    }

    fn make_current(&mut self, surface: SurfaceId) {
        if self.surfaces.contains_key(&surface) {
            self.current_surface = Some(surface);
            self.commands.push(Command::MakeCurrent(surface));
        }
    }

    fn resize_surface(&mut self, surface: SurfaceId, size: UVec2) {
        if let Some(s) = self.surfaces.get_mut(&surface) {
            *s = size;
            self.commands.push(Command::ResizeSurface { surface, size });
        }
    }

    fn surface_size(&self, surface: SurfaceId) -> Option<UVec2> {
        self.surfaces.get(&surface).copied()
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface);
        if self.current_surface == Some(surface) {
            self.current_surface = None;
        }
    }

    fn blit_to_surface(&mut self, surface: SurfaceId, source: TextureId, size: UVec2) {
        if self.surfaces.contains_key(&surface) {
            self.commands.push(Command::BlitToSurface {
                surface,
                source,
                size,
            });
        }
    }

    fn present(&mut self, surface: SurfaceId) {
        if self.surfaces.contains_key(&surface) {
            self.commands.push(Command::Present(surface));
        }
    }
}

/// Window system whose windows are bare headless surfaces.
#[derive(Debug, Default)]
pub struct HeadlessWindows {
    /// Make the next `open_window` call fail.
    pub fail_next: bool,
    pub opened: Vec<(SurfaceId, String)>,
}

impl WindowSystem<HeadlessDevice> for HeadlessWindows {
    fn open_window(
        &mut self,
        device: &mut HeadlessDevice,
        size: UVec2,
        title: &str,
    ) -> Result<SurfaceId, DeviceError> {
        if std::mem::take(&mut self.fail_next) {
            return Err(DeviceError::Surface(format!("cannot open window {title:?}")));
        }
        let surface = device.create_surface(size);
        self.opened.push((surface, title.to_owned()));
        Ok(surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_reports_line() {
        let mut device = HeadlessDevice::new();
        let err = device
            .compile_stage(ShaderStage::Fragment, "fn a() {}\n#error no output\n")
            .unwrap_err();
        assert_eq!(err, "0:2: error: no output");
        assert!(device.compile_stage(ShaderStage::Vertex, "  ").is_err());
    }

    #[test]
    fn link_checks_stage_kinds() {
        let mut device = HeadlessDevice::new();
        let a = device.compile_stage(ShaderStage::Vertex, "v").unwrap();
        let b = device.compile_stage(ShaderStage::Vertex, "v").unwrap();
        assert!(device.link_program(a, b).is_err());
    }

    #[test]
    fn uniforms_on_unknown_program_are_ignored() {
        let mut device = HeadlessDevice::new();
        device.set_uniform(ProgramId(42), "model", UniformValue::Int(1));
        assert!(device.commands().is_empty());
    }

    #[test]
    fn missing_capability_reported() {
        let mut device = HeadlessDevice::with_limits(RequiredCapabilities {
            texture_array_layers: 8,
            texture_units: 32,
            texture_size: 4096,
        });
        let err = device
            .load_extensions(&RequiredCapabilities {
                texture_array_layers: 16,
                texture_units: 16,
                texture_size: 1024,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::MissingCapability {
                name: "texture_array_layers",
                required: 16,
                available: 8
            }
        ));
    }

    #[test]
    fn deleting_attached_texture_makes_framebuffer_incomplete() {
        let mut device = HeadlessDevice::new();
        let tex = device.create_texture(TextureKind::D2);
        device
            .upload_texture(
                tex,
                &TextureDesc {
                    format: TextureFormat::Rgba8,
                    size: UVec2::new(4, 4),
                    layers: 1,
                },
                None,
            )
            .unwrap();
        let fb = device.create_framebuffer();
        device.attach(
            fb,
            AttachmentPoint::Color(0),
            Some(AttachmentTarget::Texture {
                texture: tex,
                layer: None,
            }),
        );
        assert_eq!(device.framebuffer_status(fb), FramebufferStatus::Complete);

        device.delete_texture(tex);
        assert_eq!(
            device.framebuffer_status(fb),
            FramebufferStatus::IncompleteAttachment
        );
    }

    #[test]
    fn draw_snapshots_bound_units() {
        let mut device = HeadlessDevice::new();
        let tex = device.create_texture(TextureKind::D2);
        device.activate_texture(3, Some(tex));
        device.draw_indexed(0, 6, 0);
        device.activate_texture(3, None);
        device.draw_indexed(0, 6, 0);

        let draws: Vec<_> = device.draw_calls().collect();
        assert_eq!(draws[0].textures, vec![(3, tex)]);
        assert!(draws[1].textures.is_empty());
    }

    #[test]
    fn region_write_bounds_checked() {
        let mut device = HeadlessDevice::new();
        let tex = device.create_texture(TextureKind::D2);
        let desc = TextureDesc {
            format: TextureFormat::Rgba8,
            size: UVec2::new(8, 8),
            layers: 1,
        };
        device.upload_texture(tex, &desc, None).unwrap();
        assert!(device
            .write_texture_region(tex, UVec2::new(6, 6), UVec2::new(2, 2), &[0; 16])
            .is_ok());
        assert!(device
            .write_texture_region(tex, UVec2::new(7, 7), UVec2::new(2, 2), &[0; 16])
            .is_err());
    }
}
