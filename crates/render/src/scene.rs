use crate::keys::{MaterialKey, ModelKey};
use glam::{Mat3, Mat4, Vec2, Vec3};

/// View + projection pair. The lowest `priority` in a world is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    view: Mat4,
    projection: Mat4,
    pub priority: i32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            priority: 0,
        }
    }
}

impl Camera {
    pub fn look_at(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.view = Mat4::look_at_rh(position, target, up);
    }

    /// `fov` is the vertical field of view in radians.
    pub fn perspective_fov(&mut self, fov: f32, screen_size: Vec2, near_far: Vec2) {
        let aspect = screen_size.x / screen_size.y.max(1.0);
        self.projection = Mat4::perspective_rh(fov, aspect, near_far.x, near_far.y);
    }

    pub fn set_view(&mut self, view: Mat4) {
        self.view = view;
    }

    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// World-space eye position.
    pub fn position(&self) -> Vec3 {
        self.view.inverse().w_axis.truncate()
    }

    /// View with translation removed, for geometry at infinity.
    pub fn rotation_only_view(&self) -> Mat4 {
        Mat4::from_mat3(Mat3::from_mat4(self.view))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum LightKind {
    #[default]
    Point = 0,
    Directional = 1,
}

/// Half extent of the directional shadow box.
const SHADOW_BOX_EXTENT: f32 = 10.0;
const SHADOW_BOX_NEAR: f32 = 1.0;
const SHADOW_BOX_FAR: f32 = 20.0;
/// Distance from the origin a directional light renders its shadow from.
const SHADOW_EYE_DISTANCE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub direction: Vec3,
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    cast_shadows: bool,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            direction: Vec3::NEG_Y,
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            cast_shadows: false,
        }
    }
}

impl Light {
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            direction: direction.normalize_or_zero(),
            color,
            intensity,
            ..Self::default()
        }
    }

    pub fn point(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            color,
            intensity,
            ..Self::default()
        }
    }

    pub fn cast_shadows(&self) -> bool {
        self.cast_shadows
    }

    pub fn set_cast_shadows(&mut self, state: bool) {
        self.cast_shadows = state;
    }

    /// View matrix the shadow map is rendered with.
    pub fn shadow_view(&self) -> Mat4 {
        match self.kind {
            LightKind::Directional => {
                let eye = -self.direction * SHADOW_EYE_DISTANCE;
                Mat4::look_at_rh(eye, Vec3::ZERO, up_for(self.direction))
            }
            LightKind::Point => Mat4::look_at_rh(
                self.position,
                self.position + self.direction,
                up_for(self.direction),
            ),
        }
    }

    /// Projection for the shadow map, or `None` when this kind casts none.
    ///
    /// Directional lights use a fixed box around the origin. Point lights
    /// have no shadow projection and are skipped by the shadow pass.
    pub fn shadow_projection(&self) -> Option<Mat4> {
        match self.kind {
            LightKind::Directional => Some(Mat4::orthographic_rh(
                -SHADOW_BOX_EXTENT,
                SHADOW_BOX_EXTENT,
                -SHADOW_BOX_EXTENT,
                SHADOW_BOX_EXTENT,
                SHADOW_BOX_NEAR,
                SHADOW_BOX_FAR,
            )),
            LightKind::Point => None,
        }
    }

    /// Combined world-to-light-clip transform.
    pub fn light_space(&self) -> Option<Mat4> {
        self.shadow_projection().map(|proj| proj * self.shadow_view())
    }
}

fn up_for(direction: Vec3) -> Vec3 {
    if direction.normalize_or_zero().dot(Vec3::Y).abs() > 0.999 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// Drawable leaf: a transform, a material and a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visual {
    pub transform: Mat4,
    pub material: Option<MaterialKey>,
    pub model: Option<ModelKey>,
}

impl Default for Visual {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            material: None,
            model: None,
        }
    }
}

impl Visual {
    pub fn new(transform: Mat4, material: MaterialKey, model: ModelKey) -> Self {
        Self {
            transform,
            material: Some(material),
            model: Some(model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn directional_projection_ignores_direction() {
        let a = Light::directional(Vec3::new(-1.0, -1.0, 0.0), Vec3::ONE, 1.0);
        let b = Light::directional(Vec3::new(0.3, -0.2, 0.9), Vec3::ONE, 1.0);
        let expected = Mat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 1.0, 20.0);

        assert_eq!(a.shadow_projection(), Some(expected));
        assert_eq!(b.shadow_projection(), Some(expected));
        assert_ne!(a.shadow_view(), b.shadow_view());
    }

    #[test]
    fn directional_view_looks_at_origin() {
        let light = Light::directional(Vec3::new(0.0, -1.0, -1.0), Vec3::ONE, 1.0);
        let view = light.shadow_view();
        let origin = view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        // Origin sits on the view axis, 10 units in front of the light.
        assert!(origin.x.abs() < 1e-4);
        assert!(origin.y.abs() < 1e-4);
        assert!((origin.z + 10.0).abs() < 1e-4);
    }

    #[test]
    fn straight_down_light_has_finite_view() {
        let light = Light::directional(Vec3::NEG_Y, Vec3::ONE, 1.0);
        assert!(light.shadow_view().is_finite());
    }

    #[test]
    fn point_light_has_no_shadow_projection() {
        let mut light = Light::point(Vec3::new(0.0, 3.0, 0.0), Vec3::ONE, 2.0);
        light.set_cast_shadows(true);
        assert!(light.shadow_projection().is_none());
        assert!(light.light_space().is_none());
    }

    #[test]
    fn camera_position_from_view() {
        let mut cam = Camera::default();
        cam.look_at(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
        assert!((cam.position() - Vec3::new(0.0, 2.0, 5.0)).length() < 1e-4);
        assert_eq!(cam.rotation_only_view().w_axis, Vec4::W);
    }

    #[test]
    fn perspective_is_set() {
        let mut cam = Camera::default();
        cam.perspective_fov(
            60f32.to_radians(),
            Vec2::new(1280.0, 720.0),
            Vec2::new(0.1, 100.0),
        );
        assert_ne!(cam.projection(), Mat4::IDENTITY);
    }
}
