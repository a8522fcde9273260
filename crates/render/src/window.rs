use crate::device::{DeviceError, GpuDevice, SurfaceId};
use crate::keys::ViewportKey;
use glam::UVec2;

/// Parameters for opening a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDesc {
    pub size: UVec2,
    pub title: String,
}

impl Default for WindowDesc {
    fn default() -> Self {
        Self {
            size: UVec2::new(1280, 720),
            title: "Swarm Window".into(),
        }
    }
}

/// Opens native windows and hands back the surface a device draws into.
///
/// The headless device has its own implementation; the desktop viewer
/// implements it over winit.
pub trait WindowSystem<D: GpuDevice> {
    fn open_window(
        &mut self,
        device: &mut D,
        size: UVec2,
        title: &str,
    ) -> Result<SurfaceId, DeviceError>;
}

/// A window tracked by the renderer.
///
/// A window shows at most one viewport; several windows may show the same
/// one.
#[derive(Debug, Clone, PartialEq)]
pub struct AppWindow {
    surface: SurfaceId,
    size: UVec2,
    title: String,
    pub viewport: Option<ViewportKey>,
    close_requested: bool,
}

impl AppWindow {
    pub fn new(surface: SurfaceId, size: UVec2, title: impl Into<String>) -> Self {
        Self {
            surface,
            size,
            title: title.into(),
            viewport: None,
            close_requested: false,
        }
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: UVec2) {
        self.size = size;
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_desc() {
        let desc = WindowDesc::default();
        assert_eq!(desc.size, UVec2::new(1280, 720));
        assert_eq!(desc.title, "Swarm Window");
    }

    #[test]
    fn close_flag() {
        let mut w = AppWindow::new(SurfaceId(1), UVec2::new(10, 10), "w");
        assert!(!w.should_close());
        w.request_close();
        assert!(w.should_close());
    }
}
