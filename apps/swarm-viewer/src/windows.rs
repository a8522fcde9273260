use glam::UVec2;
use std::sync::Arc;
use swarm_render::{DeviceError, SurfaceId, WindowSystem};
use swarm_render_wgpu::WgpuDevice;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

/// Opens winit windows for the renderer while the event loop is active.
pub struct WinitWindows<'a> {
    event_loop: &'a ActiveEventLoop,
    opened: Vec<Arc<Window>>,
}

impl<'a> WinitWindows<'a> {
    pub fn new(event_loop: &'a ActiveEventLoop) -> Self {
        Self {
            event_loop,
            opened: Vec::new(),
        }
    }

    /// Windows in the order they were opened; the first is the main window.
    pub fn into_opened(self) -> Vec<Arc<Window>> {
        self.opened
    }
}

impl WindowSystem<WgpuDevice> for WinitWindows<'_> {
    fn open_window(
        &mut self,
        device: &mut WgpuDevice,
        size: UVec2,
        title: &str,
    ) -> Result<SurfaceId, DeviceError> {
        let attrs = Window::default_attributes()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(size.x, size.y));
        let window = Arc::new(
            self.event_loop
                .create_window(attrs)
                .map_err(|e| DeviceError::Surface(e.to_string()))?,
        );
        // The OS may not honour the requested size.
        let actual = window.inner_size();
        let surface = device.attach_surface(
            window.clone(),
            UVec2::new(actual.width.max(1), actual.height.max(1)),
        )?;
        self.opened.push(window);
        Ok(surface)
    }
}
