use glam::{UVec2, Vec2, Vec3};
use swarm_render::Camera;

/// Fly camera with position, yaw, pitch, and projection parameters.
/// Writes its matrices into a renderer [`Camera`] every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FlyCamera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub speed: f32,
    pub sensitivity: f32,
}

const PITCH_LIMIT: f32 = 89.0 * std::f32::consts::PI / 180.0;

impl Default for FlyCamera {
    fn default() -> Self {
        Self::looking_at(Vec3::new(0.0, 4.0, 8.0), Vec3::ZERO)
    }
}

impl FlyCamera {
    /// Camera at `position` facing `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let dir = (target - position).try_normalize().unwrap_or(Vec3::NEG_Z);
        Self {
            position,
            yaw: dir.z.atan2(dir.x),
            pitch: dir.y.asin().clamp(-PITCH_LIMIT, PITCH_LIMIT),
            fov: 60.0_f32.to_radians(),
            near: 0.1,
            far: 100.0,
            speed: 5.0,
            sensitivity: 0.003,
        }
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize()
    }

    /// Move along `axes` = (right, up, forward), each in -1..=1.
    pub fn step(&mut self, axes: Vec3, dt: f32) {
        let delta = self.right() * axes.x + Vec3::Y * axes.y + self.forward() * axes.z;
        self.position += delta * self.speed * dt;
    }

    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch = (self.pitch - dy * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Write view and projection for a `size` pixel target.
    pub fn apply(&self, camera: &mut Camera, size: UVec2) {
        camera.look_at(self.position, self.position + self.forward(), Vec3::Y);
        camera.perspective_fov(self.fov, size.as_vec2(), Vec2::new(self.near, self.far));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looking_at_faces_the_target() {
        let cam = FlyCamera::looking_at(Vec3::new(0.0, 3.0, 5.0), Vec3::ZERO);
        let expected = (Vec3::ZERO - cam.position).normalize();
        assert!(cam.forward().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn step_moves_along_local_axes() {
        let mut cam = FlyCamera::looking_at(Vec3::ZERO, Vec3::NEG_Z);
        cam.speed = 1.0;
        cam.step(Vec3::new(0.0, 0.0, 1.0), 2.0);
        assert!(cam.position.abs_diff_eq(Vec3::new(0.0, 0.0, -2.0), 1e-5));
        cam.step(Vec3::new(1.0, 0.0, 0.0), 1.0);
        assert!(cam.position.abs_diff_eq(Vec3::new(1.0, 0.0, -2.0), 1e-5));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = FlyCamera::default();
        cam.rotate(0.0, -1.0e6);
        assert!(cam.pitch <= PITCH_LIMIT);
        assert!(!cam.forward().is_nan());
    }

    #[test]
    fn apply_sets_the_eye() {
        let fly = FlyCamera::looking_at(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO);
        let mut camera = Camera::default();
        fly.apply(&mut camera, UVec2::new(1280, 720));
        assert!(camera.position().abs_diff_eq(fly.position, 1e-4));
    }
}
