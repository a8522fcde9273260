use crate::device::{
    AttachmentTarget, DeviceError, GpuDevice, Sampling, TextureDesc, TextureFilter, TextureFormat,
    TextureId, TextureKind, TextureWrap,
};
use glam::{UVec2, Vec4};

/// Errors from texture uploads.
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("{kind:?} textures do not support {format:?}")]
    UnsupportedFormat {
        kind: TextureKind,
        format: TextureFormat,
    },
    #[error("{kind:?} textures need {expected} layers, got {actual}")]
    LayerCount {
        kind: TextureKind,
        expected: u32,
        actual: u32,
    },
    #[error("texture data is {actual} bytes, expected {expected}")]
    DataSize { expected: usize, actual: usize },
    #[error("texture has no storage yet")]
    NotAllocated,
    #[error("device rejected texture: {0}")]
    Device(#[from] DeviceError),
}

/// What each texture kind can hold.
struct KindCaps {
    formats: &'static [TextureFormat],
    /// `None` lets the caller pick the layer count.
    fixed_layers: Option<u32>,
}

const D2_CAPS: KindCaps = KindCaps {
    formats: &[
        TextureFormat::Rgb8,
        TextureFormat::Rgba8,
        TextureFormat::Depth32,
        TextureFormat::Depth24Stencil8,
    ],
    fixed_layers: Some(1),
};

const D2_ARRAY_CAPS: KindCaps = KindCaps {
    formats: &[
        TextureFormat::Rgb8,
        TextureFormat::Rgba8,
        TextureFormat::Depth32,
    ],
    fixed_layers: None,
};

const CUBE_CAPS: KindCaps = KindCaps {
    formats: &[TextureFormat::Rgb8, TextureFormat::Rgba8],
    fixed_layers: Some(6),
};

fn caps(kind: TextureKind) -> &'static KindCaps {
    match kind {
        TextureKind::D2 => &D2_CAPS,
        TextureKind::D2Array => &D2_ARRAY_CAPS,
        TextureKind::Cube => &CUBE_CAPS,
    }
}

/// A GPU texture: 2D, 2D array or cubemap.
///
/// The device object is created once; format changes re-specify its
/// storage in place.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    kind: TextureKind,
    desc: Option<TextureDesc>,
    sampling: Sampling,
}

impl Texture {
    pub fn new(device: &mut dyn GpuDevice, kind: TextureKind) -> Self {
        let id = device.create_texture(kind);
        let sampling = Sampling::default();
        device.set_sampling(id, &sampling);
        Self {
            id,
            kind,
            desc: None,
            sampling,
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn desc(&self) -> Option<&TextureDesc> {
        self.desc.as_ref()
    }

    pub fn size(&self) -> Option<UVec2> {
        self.desc.map(|d| d.size)
    }

    pub fn sampling(&self) -> &Sampling {
        &self.sampling
    }

    pub fn supports(&self, format: TextureFormat) -> bool {
        caps(self.kind).formats.contains(&format)
    }

    /// Specify storage and optionally upload every layer.
    pub fn set_format(
        &mut self,
        device: &mut dyn GpuDevice,
        format: TextureFormat,
        size: UVec2,
        layers: u32,
        data: Option<&[u8]>,
    ) -> Result<(), TextureError> {
        let caps = caps(self.kind);
        if !caps.formats.contains(&format) {
            return Err(TextureError::UnsupportedFormat {
                kind: self.kind,
                format,
            });
        }
        if let Some(expected) = caps.fixed_layers {
            if layers != expected {
                return Err(TextureError::LayerCount {
                    kind: self.kind,
                    expected,
                    actual: layers,
                });
            }
        } else if layers == 0 {
            return Err(TextureError::LayerCount {
                kind: self.kind,
                expected: 1,
                actual: 0,
            });
        }

        let desc = TextureDesc {
            format,
            size,
            layers,
        };
        if let Some(data) = data {
            if data.len() != desc.data_len() {
                return Err(TextureError::DataSize {
                    expected: desc.data_len(),
                    actual: data.len(),
                });
            }
        }

        device.upload_texture(self.id, &desc, data)?;
        self.desc = Some(desc);
        Ok(())
    }

    pub fn set_as_rgb8(
        &mut self,
        device: &mut dyn GpuDevice,
        size: UVec2,
        data: Option<&[u8]>,
    ) -> Result<(), TextureError> {
        let layers = self.default_layers();
        self.set_format(device, TextureFormat::Rgb8, size, layers, data)
    }

    pub fn set_as_rgba8(
        &mut self,
        device: &mut dyn GpuDevice,
        size: UVec2,
        data: Option<&[u8]>,
    ) -> Result<(), TextureError> {
        let layers = self.default_layers();
        self.set_format(device, TextureFormat::Rgba8, size, layers, data)
    }

    pub fn set_as_depth(
        &mut self,
        device: &mut dyn GpuDevice,
        size: UVec2,
        layers: u32,
    ) -> Result<(), TextureError> {
        self.set_format(device, TextureFormat::Depth32, size, layers, None)
    }

    pub fn set_as_depth_stencil(
        &mut self,
        device: &mut dyn GpuDevice,
        size: UVec2,
    ) -> Result<(), TextureError> {
        self.set_format(device, TextureFormat::Depth24Stencil8, size, 1, None)
    }

    /// Upload six equally sized faces in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn set_faces(
        &mut self,
        device: &mut dyn GpuDevice,
        format: TextureFormat,
        size: UVec2,
        faces: [&[u8]; 6],
    ) -> Result<(), TextureError> {
        let face_len = size.x as usize * size.y as usize * format.bytes_per_texel();
        let mut data = Vec::with_capacity(face_len * 6);
        for face in faces {
            if face.len() != face_len {
                return Err(TextureError::DataSize {
                    expected: face_len,
                    actual: face.len(),
                });
            }
            data.extend_from_slice(face);
        }
        self.set_format(device, format, size, 6, Some(&data))
    }

    /// Overwrite part of layer 0.
    pub fn write_region(
        &mut self,
        device: &mut dyn GpuDevice,
        origin: UVec2,
        size: UVec2,
        data: &[u8],
    ) -> Result<(), TextureError> {
        let desc = self.desc.ok_or(TextureError::NotAllocated)?;
        let expected = size.x as usize * size.y as usize * desc.format.bytes_per_texel();
        if data.len() != expected {
            return Err(TextureError::DataSize {
                expected,
                actual: data.len(),
            });
        }
        device.write_texture_region(self.id, origin, size, data)?;
        Ok(())
    }

    pub fn set_filter(&mut self, device: &mut dyn GpuDevice, filter: TextureFilter) {
        self.sampling.filter = filter;
        device.set_sampling(self.id, &self.sampling);
    }

    pub fn set_wrap(&mut self, device: &mut dyn GpuDevice, wrap: TextureWrap) {
        self.sampling.wrap = wrap;
        device.set_sampling(self.id, &self.sampling);
    }

    pub fn set_border_color(&mut self, device: &mut dyn GpuDevice, color: Vec4) {
        self.sampling.border_color = color;
        device.set_sampling(self.id, &self.sampling);
    }

    /// Bind to a texture unit for the next draws.
    pub fn activate(&self, device: &mut dyn GpuDevice, unit: u32) {
        device.activate_texture(unit, Some(self.id));
    }

    /// Framebuffer attachment for the whole texture (2D) or one layer.
    pub fn target(&self, layer: Option<u32>) -> AttachmentTarget {
        AttachmentTarget::Texture {
            texture: self.id,
            layer,
        }
    }

    pub fn release(self, device: &mut dyn GpuDevice) {
        device.delete_texture(self.id);
    }

    fn default_layers(&self) -> u32 {
        caps(self.kind).fixed_layers.unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    #[test]
    fn rgb8_upload_records_desc() {
        let mut device = HeadlessDevice::new();
        let mut tex = Texture::new(&mut device, TextureKind::D2);
        let pixels = vec![255u8; 2 * 2 * 3];
        tex.set_as_rgb8(&mut device, UVec2::new(2, 2), Some(&pixels))
            .unwrap();

        let desc = tex.desc().copied().unwrap();
        assert_eq!(desc.format, TextureFormat::Rgb8);
        assert_eq!(desc.layers, 1);
        assert_eq!(device.texture_desc(tex.id()), Some(desc));
    }

    #[test]
    fn cube_rejects_depth() {
        let mut device = HeadlessDevice::new();
        let mut cube = Texture::new(&mut device, TextureKind::Cube);
        let err = cube
            .set_as_depth(&mut device, UVec2::new(8, 8), 6)
            .unwrap_err();
        assert!(matches!(err, TextureError::UnsupportedFormat { .. }));
        assert!(cube.desc().is_none());
    }

    #[test]
    fn wrong_data_size_rejected() {
        let mut device = HeadlessDevice::new();
        let mut tex = Texture::new(&mut device, TextureKind::D2);
        let err = tex
            .set_as_rgba8(&mut device, UVec2::new(4, 4), Some(&[0u8; 10]))
            .unwrap_err();
        assert!(matches!(
            err,
            TextureError::DataSize {
                expected: 64,
                actual: 10
            }
        ));
    }

    #[test]
    fn array_takes_layer_count() {
        let mut device = HeadlessDevice::new();
        let mut array = Texture::new(&mut device, TextureKind::D2Array);
        array
            .set_as_depth(&mut device, UVec2::new(1024, 1024), 16)
            .unwrap();
        assert_eq!(array.desc().map(|d| d.layers), Some(16));
    }

    #[test]
    fn cube_faces_concatenate() {
        let mut device = HeadlessDevice::new();
        let mut cube = Texture::new(&mut device, TextureKind::Cube);
        let face: &[u8] = &[7u8; 3 * 3 * 4];
        cube.set_faces(
            &mut device,
            TextureFormat::Rgba8,
            UVec2::new(3, 3),
            [face; 6],
        )
        .unwrap();
        assert_eq!(cube.desc().map(|d| d.layers), Some(6));
    }

    #[test]
    fn sampling_state_is_pushed() {
        let mut device = HeadlessDevice::new();
        let mut tex = Texture::new(&mut device, TextureKind::D2Array);
        tex.set_filter(&mut device, TextureFilter::Nearest);
        tex.set_wrap(&mut device, TextureWrap::ClampBorder);
        tex.set_border_color(&mut device, Vec4::ONE);

        let sampling = device.texture_sampling(tex.id()).unwrap();
        assert_eq!(sampling.filter, TextureFilter::Nearest);
        assert_eq!(sampling.wrap, TextureWrap::ClampBorder);
        assert_eq!(sampling.border_color, Vec4::ONE);
    }
}
