use crate::device::GpuDevice;
use crate::keys::{
    CameraKey, EnvironmentKey, FrameBufferKey, LightKey, MaterialKey, TextureKey, ViewportKey,
    VisualKey, WorldKey,
};
use crate::scene::Camera;
use crate::ui::UiDrawData;
use glam::{Mat4, UVec2, Vec3, Vec4};
use std::fmt;
use swarm_pool::Pool;

/// Off-screen render target: a framebuffer with color and depth-stencil
/// texture attachments of one size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    size: UVec2,
    framebuffer: FrameBufferKey,
    color: TextureKey,
    depth_stencil: TextureKey,
}

impl Viewport {
    pub(crate) fn new(
        size: UVec2,
        framebuffer: FrameBufferKey,
        color: TextureKey,
        depth_stencil: TextureKey,
    ) -> Self {
        Self {
            size,
            framebuffer,
            color,
            depth_stencil,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: UVec2) {
        self.size = size;
    }

    pub fn framebuffer(&self) -> FrameBufferKey {
        self.framebuffer
    }

    /// Rgba8 color attachment, for display inside a UI panel.
    pub fn color_output(&self) -> TextureKey {
        self.color
    }

    /// Depth-stencil attachment.
    pub fn depth_output(&self) -> TextureKey {
        self.depth_stencil
    }
}

/// Per-world lighting environment and background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderEnvironment {
    pub ambient_color: Vec3,
    pub ambient_intensity: f32,
    pub clear_color: Vec4,
    pub skybox: Option<VisualKey>,
}

impl Default for RenderEnvironment {
    fn default() -> Self {
        Self {
            ambient_color: Vec3::new(0.3, 0.3, 0.1),
            ambient_intensity: 0.3,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            skybox: None,
        }
    }
}

/// What a hook gets to work with while a world renders.
pub struct HookContext<'a> {
    pub device: &'a mut dyn GpuDevice,
    pub world: WorldKey,
    pub viewport_size: Option<UVec2>,
    /// `(view, projection)` of the active camera.
    pub camera: Option<(Mat4, Mat4)>,
    /// UI draw data composited at the end of this frame's UI pass.
    pub ui_draw_data: &'a mut Option<UiDrawData>,
}

pub type Hook = Box<dyn FnMut(&mut HookContext<'_>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    /// After the target is cleared, before the skybox.
    PreRender,
    /// After the main pass, before the UI composite.
    UiPass,
    /// After the UI composite, before unbinding.
    PostRender,
}

/// Ordered callback lists invoked at fixed points of a world's frame.
#[derive(Default)]
pub struct RenderHooks {
    next_id: u64,
    pre_render: Vec<(HookId, Hook)>,
    ui_pass: Vec<(HookId, Hook)>,
    post_render: Vec<(HookId, Hook)>,
}

impl RenderHooks {
    pub fn add(
        &mut self,
        stage: HookStage,
        hook: impl FnMut(&mut HookContext<'_>) + 'static,
    ) -> HookId {
        self.next_id += 1;
        let id = HookId(self.next_id);
        self.list_mut(stage).push((id, Box::new(hook)));
        id
    }

    /// Returns whether the hook was registered.
    pub fn remove(&mut self, id: HookId) -> bool {
        for stage in [HookStage::PreRender, HookStage::UiPass, HookStage::PostRender] {
            let list = self.list_mut(stage);
            if let Some(pos) = list.iter().position(|(h, _)| *h == id) {
                drop(list.remove(pos));
                return true;
            }
        }
        false
    }

    pub fn len(&self, stage: HookStage) -> usize {
        match stage {
            HookStage::PreRender => self.pre_render.len(),
            HookStage::UiPass => self.ui_pass.len(),
            HookStage::PostRender => self.post_render.len(),
        }
    }

    /// Invoke every hook of `stage` in registration order.
    pub fn run(&mut self, stage: HookStage, ctx: &mut HookContext<'_>) {
        for (_, hook) in self.list_mut(stage).iter_mut() {
            hook(ctx);
        }
    }

    fn list_mut(&mut self, stage: HookStage) -> &mut Vec<(HookId, Hook)> {
        match stage {
            HookStage::PreRender => &mut self.pre_render,
            HookStage::UiPass => &mut self.ui_pass,
            HookStage::PostRender => &mut self.post_render,
        }
    }
}

impl fmt::Debug for RenderHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderHooks")
            .field("pre_render", &self.pre_render.len())
            .field("ui_pass", &self.ui_pass.len())
            .field("post_render", &self.post_render.len())
            .finish()
    }
}

/// One complete renderable scene.
///
/// Entities are referenced by key; their storage belongs to the backend's
/// pools. Keys that go stale are skipped at render time.
#[derive(Debug, Default)]
pub struct RenderWorld {
    pub viewport: Option<ViewportKey>,
    pub environment: Option<EnvironmentKey>,
    pub ui_draw_data: Option<UiDrawData>,
    pub cameras: Vec<CameraKey>,
    pub lights: Vec<LightKey>,
    pub materials: Vec<MaterialKey>,
    pub visuals: Vec<VisualKey>,
    pub hooks: RenderHooks,
}

impl RenderWorld {
    /// Both a viewport and an environment are attached.
    pub fn is_ready(&self) -> bool {
        self.viewport.is_some() && self.environment.is_some()
    }

    /// Lowest `priority` wins; the first of equal priorities wins.
    pub fn active_camera(&self, cameras: &Pool<CameraKey, Camera>) -> Option<CameraKey> {
        let mut best: Option<(CameraKey, i32)> = None;
        for &key in &self.cameras {
            let Some(camera) = cameras.get(key) else {
                continue;
            };
            match best {
                Some((_, p)) if p <= camera.priority => {}
                _ => best = Some((key, camera.priority)),
            }
        }
        best.map(|(key, _)| key)
    }

    pub fn add_pre_render(&mut self, hook: impl FnMut(&mut HookContext<'_>) + 'static) -> HookId {
        self.hooks.add(HookStage::PreRender, hook)
    }

    pub fn add_ui_pass(&mut self, hook: impl FnMut(&mut HookContext<'_>) + 'static) -> HookId {
        self.hooks.add(HookStage::UiPass, hook)
    }

    pub fn add_post_render(&mut self, hook: impl FnMut(&mut HookContext<'_>) + 'static) -> HookId {
        self.hooks.add(HookStage::PostRender, hook)
    }

    pub fn remove_hook(&mut self, id: HookId) -> bool {
        self.hooks.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn camera(priority: i32) -> Camera {
        let mut camera = Camera::default();
        camera.priority = priority;
        camera
    }

    #[test]
    fn first_lowest_priority_camera_is_active() {
        let mut pool: Pool<CameraKey, Camera> = Pool::new();
        let mut world = RenderWorld::default();
        let keys: Vec<_> = [5, 2, 2, 9]
            .into_iter()
            .map(|p| pool.create_with(camera(p)))
            .collect();
        world.cameras = keys.clone();

        assert_eq!(world.active_camera(&pool), Some(keys[1]));
    }

    #[test]
    fn no_cameras_no_active() {
        let pool: Pool<CameraKey, Camera> = Pool::new();
        assert_eq!(RenderWorld::default().active_camera(&pool), None);
    }

    #[test]
    fn stale_camera_keys_are_skipped() {
        let mut pool: Pool<CameraKey, Camera> = Pool::new();
        let a = pool.create_with(camera(0));
        let b = pool.create_with(camera(3));
        pool.destroy(a);

        let world = RenderWorld {
            cameras: vec![a, b],
            ..RenderWorld::default()
        };
        assert_eq!(world.active_camera(&pool), Some(b));
    }

    #[test]
    fn readiness_needs_viewport_and_environment() {
        let mut world = RenderWorld::default();
        assert!(!world.is_ready());

        let mut envs: Pool<EnvironmentKey, RenderEnvironment> = Pool::new();
        world.environment = Some(envs.create());
        assert!(!world.is_ready());
    }

    #[test]
    fn environment_defaults() {
        let env = RenderEnvironment::default();
        assert_eq!(env.ambient_color, Vec3::new(0.3, 0.3, 0.1));
        assert_eq!(env.ambient_intensity, 0.3);
        assert_eq!(env.clear_color, Vec4::W);
        assert!(env.skybox.is_none());
    }

    #[test]
    fn hooks_run_in_order_and_can_be_removed() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut hooks = RenderHooks::default();

        let l = log.clone();
        let first = hooks.add(HookStage::PreRender, move |_| l.borrow_mut().push("a"));
        let l = log.clone();
        hooks.add(HookStage::PreRender, move |_| l.borrow_mut().push("b"));

        let mut device = HeadlessDevice::new();
        let mut ui = None;
        let mut worlds: Pool<WorldKey, ()> = Pool::new();
        let mut ctx = HookContext {
            device: &mut device,
            world: worlds.create(),
            viewport_size: None,
            camera: None,
            ui_draw_data: &mut ui,
        };

        hooks.run(HookStage::PreRender, &mut ctx);
        assert!(hooks.remove(first));
        assert!(!hooks.remove(first));
        hooks.run(HookStage::PreRender, &mut ctx);
        hooks.run(HookStage::PostRender, &mut ctx);

        assert_eq!(*log.borrow(), vec!["a", "b", "b"]);
        assert_eq!(hooks.len(HookStage::PreRender), 1);
    }
}
