use crate::reflect::{SamplerBinding, TextureBinding, UniformLayout};
use crate::resources::binding_dimension;
use crate::shaders;
use std::collections::HashMap;
use swarm_render::{BlendMode, CullMode, ProgramId, RasterState, VertexLayout};

const STANDARD_ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x3,
    3 => Float32x3,
    4 => Float32x2,
];

const UI_ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x2,
    2 => Unorm8x4,
];

pub(crate) fn vertex_attributes(layout: VertexLayout) -> &'static [wgpu::VertexAttribute] {
    match layout {
        VertexLayout::Standard => &STANDARD_ATTRIBUTES,
        VertexLayout::Ui => &UI_ATTRIBUTES,
    }
}

/// A linked program: both modules plus the merged reflection.
pub(crate) struct Program {
    pub vertex: wgpu::ShaderModule,
    pub fragment: wgpu::ShaderModule,
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub uniforms: UniformLayout,
    /// CPU copy of the uniform struct, uploaded with every draw.
    pub staging: Vec<u8>,
    pub textures: Vec<TextureBinding>,
    pub samplers: Vec<SamplerBinding>,
    pub fragment_outputs: Vec<u32>,
    /// Texture name -> texture unit.
    pub units: HashMap<String, u32>,
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
}

impl Program {
    pub fn has_uniforms(&self) -> bool {
        self.uniforms.size > 0
    }
}

/// Bind group layouts for group 0 (uniforms) and group 1 (textures).
pub(crate) fn program_layouts(
    device: &wgpu::Device,
    uniforms: &UniformLayout,
    textures: &[TextureBinding],
    samplers: &[SamplerBinding],
) -> (wgpu::BindGroupLayout, wgpu::BindGroupLayout, wgpu::PipelineLayout) {
    let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;
    let uniform_entries: Vec<_> = (uniforms.size > 0)
        .then_some(wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .into_iter()
        .collect();
    let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("swarm_uniform_layout"),
        entries: &uniform_entries,
    });

    let mut texture_entries = Vec::with_capacity(textures.len() + samplers.len());
    for texture in textures {
        texture_entries.push(wgpu::BindGroupLayoutEntry {
            binding: texture.binding,
            visibility,
            ty: wgpu::BindingType::Texture {
                sample_type: if texture.depth {
                    wgpu::TextureSampleType::Depth
                } else {
                    wgpu::TextureSampleType::Float { filterable: true }
                },
                view_dimension: binding_dimension(texture.dim),
                multisampled: false,
            },
            count: None,
        });
    }
    for sampler in samplers {
        texture_entries.push(wgpu::BindGroupLayoutEntry {
            binding: sampler.binding,
            visibility,
            ty: wgpu::BindingType::Sampler(if sampler.comparison {
                wgpu::SamplerBindingType::Comparison
            } else {
                wgpu::SamplerBindingType::Filtering
            }),
            count: None,
        });
    }
    let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("swarm_texture_layout"),
        entries: &texture_entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("swarm_program_layout"),
        bind_group_layouts: &[&uniform_layout, &texture_layout],
        push_constant_ranges: &[],
    });
    (uniform_layout, texture_layout, pipeline_layout)
}

/// Everything a pipeline depends on besides the program's modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub program: ProgramId,
    pub colors: Vec<Option<wgpu::TextureFormat>>,
    pub depth: Option<wgpu::TextureFormat>,
    pub raster: RasterState,
    pub layout: VertexLayout,
}

pub(crate) fn build_pipeline(
    device: &wgpu::Device,
    program: &Program,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let buffers = [wgpu::VertexBufferLayout {
        array_stride: key.layout.stride() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: vertex_attributes(key.layout),
    }];

    let blend = match key.raster.blend {
        BlendMode::Opaque => wgpu::BlendState::REPLACE,
        BlendMode::PremultipliedAlpha => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
    };
    let targets: Vec<Option<wgpu::ColorTargetState>> = key
        .colors
        .iter()
        .enumerate()
        .map(|(location, format)| {
            format.map(|format| wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                // A target the fragment stage never writes must be masked off.
                write_mask: if program.fragment_outputs.contains(&(location as u32)) {
                    wgpu::ColorWrites::ALL
                } else {
                    wgpu::ColorWrites::empty()
                },
            })
        })
        .collect();

    let cull_mode = match key.raster.cull {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    };
    let depth_stencil = key.depth.map(|format| wgpu::DepthStencilState {
        format,
        depth_write_enabled: key.raster.depth_write,
        // LessEqual so the skybox, written at depth 1.0, passes after a clear.
        depth_compare: if key.raster.depth_test {
            wgpu::CompareFunction::LessEqual
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: Default::default(),
        bias: Default::default(),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("swarm_program_pipeline"),
        layout: Some(&program.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &program.vertex,
            entry_point: Some(&program.vertex_entry),
            compilation_options: Default::default(),
            buffers: &buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.fragment,
            entry_point: Some(&program.fragment_entry),
            compilation_options: Default::default(),
            targets: &targets,
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode,
            ..Default::default()
        },
        depth_stencil,
        multisample: Default::default(),
        multiview: None,
        cache: None,
    })
}

/// Copies viewport color outputs onto window surfaces.
pub(crate) struct Blitter {
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl Blitter {
    pub fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("swarm_blit_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::BLIT_SHADER.into()),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("swarm_blit_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("swarm_blit_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("swarm_blit_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            module,
            bind_group_layout,
            pipeline_layout,
            sampler,
            pipelines: HashMap::new(),
        }
    }

    pub fn bind_group(&self, device: &wgpu::Device, source: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("swarm_blit_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    pub fn pipeline(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> &wgpu::RenderPipeline {
        self.pipelines.entry(format).or_insert_with(|| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("swarm_blit_pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.module,
                    entry_point: Some("vs_blit"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.module,
                    entry_point: Some("fs_blit"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
        })
    }
}
