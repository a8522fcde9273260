use crate::reflect::TextureDim;
use glam::{UVec2, Vec4};
use swarm_render::{
    Sampling, TextureDesc, TextureFilter, TextureFormat, TextureKind, TextureWrap, VertexLayout,
};

/// A device texture id and, once uploaded, its storage.
pub(crate) struct GpuTexture {
    pub kind: TextureKind,
    pub sampling: Sampling,
    pub storage: Option<TextureStorage>,
}

pub(crate) struct TextureStorage {
    pub texture: wgpu::Texture,
    pub desc: TextureDesc,
    /// Whole-texture view used for sampling.
    pub view: wgpu::TextureView,
}

impl GpuTexture {
    pub fn new(kind: TextureKind) -> Self {
        Self {
            kind,
            sampling: Sampling::default(),
            storage: None,
        }
    }

    /// Storage that can back a shader binding of `dim`.
    pub fn sampled_as(&self, dim: TextureDim, depth: bool) -> Option<&TextureStorage> {
        let storage = self.storage.as_ref()?;
        let dim_ok = matches!(
            (self.kind, dim),
            (TextureKind::D2, TextureDim::D2)
                | (TextureKind::D2Array, TextureDim::D2Array)
                | (TextureKind::Cube, TextureDim::Cube)
        );
        (dim_ok && storage.desc.format.is_depth() == depth).then_some(storage)
    }
}

pub(crate) struct GpuRenderBuffer {
    pub storage: Option<(wgpu::Texture, TextureFormat, UVec2)>,
}

#[derive(Default)]
pub(crate) struct GpuMesh {
    pub layout: Option<VertexLayout>,
    pub vertices: Option<wgpu::Buffer>,
    pub indices: Option<wgpu::Buffer>,
    pub index_count: u32,
}

pub(crate) fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgb8 | TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Depth32 => wgpu::TextureFormat::Depth32Float,
        TextureFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

pub(crate) fn view_dimension(kind: TextureKind) -> wgpu::TextureViewDimension {
    match kind {
        TextureKind::D2 => wgpu::TextureViewDimension::D2,
        TextureKind::D2Array => wgpu::TextureViewDimension::D2Array,
        TextureKind::Cube => wgpu::TextureViewDimension::Cube,
    }
}

pub(crate) fn binding_dimension(dim: TextureDim) -> wgpu::TextureViewDimension {
    match dim {
        TextureDim::D2 => wgpu::TextureViewDimension::D2,
        TextureDim::D2Array => wgpu::TextureViewDimension::D2Array,
        TextureDim::Cube => wgpu::TextureViewDimension::Cube,
    }
}

/// Sampling aspect of a format: depth-stencil textures are sampled as depth.
pub(crate) fn sample_aspect(format: TextureFormat) -> wgpu::TextureAspect {
    if format.is_depth() {
        wgpu::TextureAspect::DepthOnly
    } else {
        wgpu::TextureAspect::All
    }
}

/// RGB8 has no wgpu equivalent; pad every texel with opaque alpha.
pub(crate) fn expand_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 3 * 4);
    for texel in data.chunks_exact(3) {
        out.extend_from_slice(texel);
        out.push(255);
    }
    out
}

/// Upload bytes in the device format.
pub(crate) fn device_bytes(format: TextureFormat, data: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    match format {
        TextureFormat::Rgb8 => std::borrow::Cow::Owned(expand_rgb(data)),
        _ => std::borrow::Cow::Borrowed(data),
    }
}

/// wgpu only offers fixed border colors; pick the closest one.
pub(crate) fn border_color(color: Vec4) -> wgpu::SamplerBorderColor {
    if color.w < 0.5 {
        wgpu::SamplerBorderColor::TransparentBlack
    } else if color.truncate().element_sum() / 3.0 >= 0.5 {
        wgpu::SamplerBorderColor::OpaqueWhite
    } else {
        wgpu::SamplerBorderColor::OpaqueBlack
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SamplerKey {
    filter: wgpu::FilterMode,
    address: wgpu::AddressMode,
    border: Option<wgpu::SamplerBorderColor>,
    compare: bool,
}

impl SamplerKey {
    pub fn new(sampling: &Sampling, compare: bool, clamp_to_border: bool) -> Self {
        let filter = match sampling.filter {
            TextureFilter::Nearest => wgpu::FilterMode::Nearest,
            TextureFilter::Linear => wgpu::FilterMode::Linear,
        };
        let (address, border) = match sampling.wrap {
            TextureWrap::Repeat => (wgpu::AddressMode::Repeat, None),
            TextureWrap::Mirrored => (wgpu::AddressMode::MirrorRepeat, None),
            TextureWrap::ClampEdge => (wgpu::AddressMode::ClampToEdge, None),
            TextureWrap::ClampBorder if clamp_to_border => (
                wgpu::AddressMode::ClampToBorder,
                Some(border_color(sampling.border_color)),
            ),
            TextureWrap::ClampBorder => (wgpu::AddressMode::ClampToEdge, None),
        };
        Self {
            filter,
            address,
            border,
            compare,
        }
    }

    pub fn create(&self, device: &wgpu::Device) -> wgpu::Sampler {
        device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("swarm_sampler"),
            address_mode_u: self.address,
            address_mode_v: self.address,
            address_mode_w: self.address,
            mag_filter: self.filter,
            min_filter: self.filter,
            compare: self.compare.then_some(wgpu::CompareFunction::LessEqual),
            border_color: self.border,
            ..Default::default()
        })
    }
}

/// 1x1 stand-in bound to a texture declared by a program when its unit is
/// empty or holds an incompatible texture. Color fallbacks are opaque
/// white, depth fallbacks hold 1.0 so comparisons pass.
pub(crate) fn create_fallback(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    dim: TextureDim,
    depth: bool,
) -> wgpu::TextureView {
    let layers = if dim == TextureDim::Cube { 6 } else { 1 };
    let format = if depth {
        wgpu::TextureFormat::Depth32Float
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    };
    let usage = if depth {
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT
    } else {
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
    };
    let extent = wgpu::Extent3d {
        width: 1,
        height: 1,
        depth_or_array_layers: layers,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("swarm_fallback_texture"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });

    if depth {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("swarm_fallback_clear"),
        });
        for layer in 0..layers {
            let view = texture.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: layer,
                array_layer_count: Some(1),
                ..Default::default()
            });
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("swarm_fallback_clear"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
        }
        queue.submit(std::iter::once(encoder.finish()));
    } else {
        let white = vec![255u8; 4 * layers as usize];
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &white,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            extent,
        );
    }

    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("swarm_fallback_view"),
        dimension: Some(binding_dimension(dim)),
        aspect: if depth {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        },
        ..Default::default()
    })
}

/// Clamp a rectangle to `bounds`, returning origin and (possibly empty) size.
pub(crate) fn clamp_rect(origin: UVec2, size: UVec2, bounds: UVec2) -> (UVec2, UVec2) {
    let start = origin.min(bounds);
    let end = origin.saturating_add(size).min(bounds);
    (start, end.saturating_sub(start))
}
