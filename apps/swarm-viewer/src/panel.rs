//! Inspector panel drawn over the scene.

use egui::Context as EguiContext;
use glam::{Vec3, Vec4};
use swarm_assets::SceneHandles;
use swarm_render::{FrameStats, GpuDevice, LightKind, RendererBackend, WorldKey};

use crate::camera::FlyCamera;

/// Per-frame numbers shown in the panel.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInfo {
    pub dt: f32,
    pub stats: FrameStats,
}

pub fn draw<D: GpuDevice>(
    ctx: &EguiContext,
    backend: &mut RendererBackend<D>,
    world: WorldKey,
    handles: &SceneHandles,
    camera: &mut FlyCamera,
    frame: FrameInfo,
) {
    egui::SidePanel::left("inspector")
        .default_width(260.0)
        .show(ctx, |ui| {
            ui.heading("Swarm");
            ui.separator();
            let fps = if frame.dt > 0.0 { 1.0 / frame.dt } else { 0.0 };
            ui.label(format!("{fps:.0} fps ({:.2} ms)", frame.dt * 1000.0));
            let totals = frame.stats.totals;
            ui.label(format!(
                "Draw calls: {}  Indices: {}",
                totals.draw_calls, totals.indices_drawn
            ));
            ui.label(format!(
                "Shadow passes: {}  skipped: {}",
                totals.shadow_passes, totals.skipped_shadow_lights
            ));
            ui.label(format!(
                "Worlds: {} rendered, {} skipped",
                frame.stats.worlds_rendered, frame.stats.worlds_skipped
            ));

            ui.separator();
            ui.heading("Camera");
            ui.label(format!(
                "Position: ({:.1}, {:.1}, {:.1})",
                camera.position.x, camera.position.y, camera.position.z
            ));
            let mut fov = camera.fov.to_degrees();
            if ui
                .add(egui::Slider::new(&mut fov, 20.0..=120.0).text("FOV"))
                .changed()
            {
                camera.fov = fov.to_radians();
            }
            ui.add(egui::Slider::new(&mut camera.speed, 0.5..=30.0).text("Speed"));

            ui.separator();
            ui.heading("Environment");
            let env = backend
                .worlds
                .get(world)
                .and_then(|w| w.environment);
            if let Some(env) = env.and_then(|key| backend.environments.get_mut(key)) {
                ui.horizontal(|ui| {
                    ui.label("Ambient");
                    let mut color = env.ambient_color.to_array();
                    if ui.color_edit_button_rgb(&mut color).changed() {
                        env.ambient_color = Vec3::from_array(color);
                    }
                });
                ui.add(
                    egui::Slider::new(&mut env.ambient_intensity, 0.0..=2.0).text("Intensity"),
                );
                ui.horizontal(|ui| {
                    ui.label("Clear");
                    let mut color = env.clear_color.truncate().to_array();
                    if ui.color_edit_button_rgb(&mut color).changed() {
                        env.clear_color = Vec4::from((Vec3::from_array(color), env.clear_color.w));
                    }
                });
            }

            ui.separator();
            ui.heading("Lights");
            for (i, key) in handles.lights.iter().enumerate() {
                let Some(light) = backend.lights.get_mut(*key) else {
                    continue;
                };
                let kind = match light.kind {
                    LightKind::Directional => "Directional",
                    LightKind::Point => "Point",
                };
                ui.label(format!("{i}: {kind}"));
                ui.horizontal(|ui| {
                    let mut color = light.color.to_array();
                    if ui.color_edit_button_rgb(&mut color).changed() {
                        light.color = Vec3::from_array(color);
                    }
                    ui.add(
                        egui::DragValue::new(&mut light.intensity)
                            .range(0.0..=100.0)
                            .speed(0.05),
                    );
                    let mut shadows = light.cast_shadows();
                    if ui.checkbox(&mut shadows, "Shadows").changed() {
                        light.set_cast_shadows(shadows);
                    }
                });
            }
        });
}
