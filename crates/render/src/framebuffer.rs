use crate::device::{
    AttachmentPoint, AttachmentTarget, FramebufferId, FramebufferStatus, GpuDevice,
    RenderBufferId, TextureFormat, TextureKind,
};
use crate::MAX_COLOR_ATTACHMENTS;
use glam::UVec2;

/// What a device knows about the object behind an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub format: TextureFormat,
    pub size: UVec2,
    pub layers: u32,
    /// `None` for render buffers.
    pub kind: Option<TextureKind>,
}

/// Completeness rules shared by every device implementation.
///
/// `lookup` resolves a target to its allocated storage, or `None` when the
/// object is unknown or has no storage yet.
pub fn check_completeness(
    attachments: &[(AttachmentPoint, AttachmentTarget)],
    lookup: impl Fn(&AttachmentTarget) -> Option<AttachmentInfo>,
) -> FramebufferStatus {
    if attachments.is_empty() {
        return FramebufferStatus::MissingAttachment;
    }

    let mut size: Option<UVec2> = None;
    for (point, target) in attachments {
        let Some(info) = lookup(target) else {
            return FramebufferStatus::IncompleteAttachment;
        };

        let format_ok = match point {
            AttachmentPoint::Color(index) => {
                *index < MAX_COLOR_ATTACHMENTS && !info.format.is_depth()
            }
            AttachmentPoint::Depth => info.format.is_depth(),
            AttachmentPoint::DepthStencil => info.format.has_stencil(),
        };
        if !format_ok {
            return FramebufferStatus::IncompleteAttachment;
        }

        let layer_ok = match (target, info.kind) {
            (AttachmentTarget::RenderBuffer(_), _) => true,
            (AttachmentTarget::Texture { layer, .. }, Some(TextureKind::D2)) => {
                matches!(layer, None | Some(0))
            }
            (AttachmentTarget::Texture { layer, .. }, Some(_)) => {
                matches!(layer, Some(l) if *l < info.layers)
            }
            (AttachmentTarget::Texture { .. }, None) => false,
        };
        if !layer_ok {
            return FramebufferStatus::IncompleteAttachment;
        }

        match size {
            None => size = Some(info.size),
            Some(s) if s != info.size => return FramebufferStatus::DimensionMismatch,
            Some(_) => {}
        }
    }

    FramebufferStatus::Complete
}

/// Off-screen render target. Draws go into its attachments while bound.
#[derive(Debug)]
pub struct FrameBuffer {
    id: FramebufferId,
}

impl FrameBuffer {
    pub fn new(device: &mut dyn GpuDevice) -> Self {
        Self {
            id: device.create_framebuffer(),
        }
    }

    pub fn id(&self) -> FramebufferId {
        self.id
    }

    pub fn set_output_color(
        &self,
        device: &mut dyn GpuDevice,
        index: u32,
        target: Option<AttachmentTarget>,
    ) {
        device.attach(self.id, AttachmentPoint::Color(index), target);
    }

    pub fn set_output_depth(&self, device: &mut dyn GpuDevice, target: Option<AttachmentTarget>) {
        device.attach(self.id, AttachmentPoint::Depth, target);
    }

    pub fn set_output_depth_stencil(
        &self,
        device: &mut dyn GpuDevice,
        target: Option<AttachmentTarget>,
    ) {
        device.attach(self.id, AttachmentPoint::DepthStencil, target);
    }

    pub fn status(&self, device: &dyn GpuDevice) -> FramebufferStatus {
        device.framebuffer_status(self.id)
    }

    pub fn is_complete(&self, device: &dyn GpuDevice) -> bool {
        self.status(device) == FramebufferStatus::Complete
    }

    pub fn bind(&self, device: &mut dyn GpuDevice) {
        device.bind_framebuffer(Some(self.id));
    }

    /// Return rendering to the current window surface.
    pub fn unbind(device: &mut dyn GpuDevice) {
        device.bind_framebuffer(None);
    }

    pub fn release(self, device: &mut dyn GpuDevice) {
        device.delete_framebuffer(self.id);
    }
}

/// Write-only attachment storage. Cheaper than a texture, never sampled.
#[derive(Debug)]
pub struct RenderBuffer {
    id: RenderBufferId,
    format: Option<TextureFormat>,
    size: UVec2,
}

impl RenderBuffer {
    pub fn new(device: &mut dyn GpuDevice) -> Self {
        Self {
            id: device.create_render_buffer(),
            format: None,
            size: UVec2::ZERO,
        }
    }

    pub fn id(&self) -> RenderBufferId {
        self.id
    }

    pub fn format(&self) -> Option<TextureFormat> {
        self.format
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn set_format(&mut self, device: &mut dyn GpuDevice, format: TextureFormat, size: UVec2) {
        device.allocate_render_buffer(self.id, format, size);
        self.format = Some(format);
        self.size = size;
    }

    pub fn target(&self) -> AttachmentTarget {
        AttachmentTarget::RenderBuffer(self.id)
    }

    pub fn release(self, device: &mut dyn GpuDevice) {
        device.delete_render_buffer(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TextureId;

    fn tex(id: u32, layer: Option<u32>) -> AttachmentTarget {
        AttachmentTarget::Texture {
            texture: TextureId(id),
            layer,
        }
    }

    fn lookup(target: &AttachmentTarget) -> Option<AttachmentInfo> {
        match target {
            AttachmentTarget::Texture { texture, .. } => match texture.0 {
                1 => Some(AttachmentInfo {
                    format: TextureFormat::Rgba8,
                    size: UVec2::new(64, 64),
                    layers: 1,
                    kind: Some(TextureKind::D2),
                }),
                2 => Some(AttachmentInfo {
                    format: TextureFormat::Depth24Stencil8,
                    size: UVec2::new(64, 64),
                    layers: 1,
                    kind: Some(TextureKind::D2),
                }),
                3 => Some(AttachmentInfo {
                    format: TextureFormat::Depth32,
                    size: UVec2::new(1024, 1024),
                    layers: 16,
                    kind: Some(TextureKind::D2Array),
                }),
                _ => None,
            },
            AttachmentTarget::RenderBuffer(_) => Some(AttachmentInfo {
                format: TextureFormat::Depth24Stencil8,
                size: UVec2::new(32, 32),
                layers: 1,
                kind: None,
            }),
        }
    }

    #[test]
    fn empty_framebuffer_is_missing_attachment() {
        assert_eq!(
            check_completeness(&[], lookup),
            FramebufferStatus::MissingAttachment
        );
    }

    #[test]
    fn color_and_depth_stencil_complete() {
        let attachments = [
            (AttachmentPoint::Color(0), tex(1, None)),
            (AttachmentPoint::DepthStencil, tex(2, None)),
        ];
        assert_eq!(
            check_completeness(&attachments, lookup),
            FramebufferStatus::Complete
        );
    }

    #[test]
    fn depth_format_on_color_point_is_incomplete() {
        let attachments = [(AttachmentPoint::Color(0), tex(2, None))];
        assert_eq!(
            check_completeness(&attachments, lookup),
            FramebufferStatus::IncompleteAttachment
        );
    }

    #[test]
    fn array_layer_must_be_in_range() {
        let ok = [(AttachmentPoint::Depth, tex(3, Some(15)))];
        let past_end = [(AttachmentPoint::Depth, tex(3, Some(16)))];
        let whole_array = [(AttachmentPoint::Depth, tex(3, None))];
        assert_eq!(check_completeness(&ok, lookup), FramebufferStatus::Complete);
        assert_eq!(
            check_completeness(&past_end, lookup),
            FramebufferStatus::IncompleteAttachment
        );
        assert_eq!(
            check_completeness(&whole_array, lookup),
            FramebufferStatus::IncompleteAttachment
        );
    }

    #[test]
    fn unallocated_texture_is_incomplete() {
        let attachments = [(AttachmentPoint::Color(0), tex(99, None))];
        assert_eq!(
            check_completeness(&attachments, lookup),
            FramebufferStatus::IncompleteAttachment
        );
    }

    #[test]
    fn mismatched_sizes() {
        let attachments = [
            (AttachmentPoint::Color(0), tex(1, None)),
            (
                AttachmentPoint::DepthStencil,
                AttachmentTarget::RenderBuffer(RenderBufferId(0)),
            ),
        ];
        assert_eq!(
            check_completeness(&attachments, lookup),
            FramebufferStatus::DimensionMismatch
        );
    }
}
