use std::hint::black_box;
use std::time::Instant;

use glam::{Mat4, UVec2, Vec2, Vec3};
use swarm_render::{
    Camera, HeadlessDevice, HeadlessWindows, Light, PbrMaterial, PbrParams, RendererBackend,
    RendererConfig, Vertex, Visual, WorldKey,
};

const VS: &str = "@vertex fn vs_main() {}";
const FS: &str = "@fragment fn fs_main() {}";

fn make_backend(
    visual_count: usize,
    caster_count: usize,
) -> (RendererBackend<HeadlessDevice>, WorldKey) {
    let mut backend = RendererBackend::setup(
        || Ok(HeadlessDevice::new()),
        &mut HeadlessWindows::default(),
        RendererConfig::default(),
    )
    .expect("headless setup");
    let world = backend
        .create_world_with_viewport(UVec2::new(1280, 720))
        .expect("viewport");

    let shader = backend.load_shader(VS, FS).expect("shader");
    let material = backend.create_material(PbrMaterial {
        shader,
        params: PbrParams::default(),
    });
    let vertices = [
        Vertex::new([-1.0, 0.0, -1.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
        Vertex::new([1.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0]),
        Vertex::new([1.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 1.0]),
        Vertex::new([-1.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 1.0]),
    ];
    let mesh = backend.upload_mesh(&vertices, &[0, 1, 2, 2, 3, 0]);
    let model = backend.create_model(vec![mesh]);

    let mut camera = Camera::default();
    camera.look_at(Vec3::new(0.0, 10.0, 20.0), Vec3::ZERO, Vec3::Y);
    camera.perspective_fov(1.0, Vec2::new(1280.0, 720.0), Vec2::new(0.1, 200.0));
    let camera = backend.create_camera(camera);

    let side = (visual_count as f32).sqrt().ceil() as usize;
    let mut visuals = Vec::with_capacity(visual_count);
    for i in 0..visual_count {
        let x = (i % side) as f32 * 2.5;
        let z = (i / side) as f32 * 2.5;
        let transform = Mat4::from_translation(Vec3::new(x, 0.0, z));
        visuals.push(backend.create_visual(Visual::new(transform, material, model)));
    }

    let mut lights = Vec::with_capacity(caster_count);
    for i in 0..caster_count {
        let angle = i as f32 * 0.4;
        let mut light =
            Light::directional(Vec3::new(angle.cos(), -1.0, angle.sin()), Vec3::ONE, 1.0);
        light.set_cast_shadows(true);
        lights.push(backend.create_light(light));
    }

    let w = backend.worlds.get_mut(world).expect("world");
    w.cameras.push(camera);
    w.materials.push(material);
    w.visuals = visuals;
    w.lights = lights;
    (backend, world)
}

fn bench_render_world(visual_count: usize, caster_count: usize, iterations: usize) {
    let (mut backend, world) = make_backend(visual_count, caster_count);

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(backend.render_world(black_box(world)));
        // Keep the command log from growing across iterations.
        backend.device_mut().take_commands();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  render_world ({visual_count} visuals, {caster_count} casters, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_material_globals(light_count: usize, iterations: usize) {
    let (mut backend, world) = make_backend(1, light_count);
    let shadowed = vec![true; light_count];

    let start = Instant::now();
    for _ in 0..iterations {
        backend.update_material_globals(black_box(world), black_box(&shadowed));
        backend.device_mut().take_commands();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  update_material_globals ({light_count} lights, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn main() {
    println!("=== Headless Frame Benchmarks ===\n");

    println!("Full world frame:");
    bench_render_world(10, 1, 1000);
    bench_render_world(100, 4, 100);
    bench_render_world(1000, 16, 10);

    println!("\nGlobal uniform binding:");
    bench_material_globals(1, 10000);
    bench_material_globals(16, 1000);

    println!("\n=== Done ===");
}
