use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use swarm_assets::{load_shader_source, SceneDesc};
use swarm_render::{
    builtin, AppWindow, HeadlessDevice, HeadlessWindows, RendererBackend, RendererConfig,
    ShaderSource, ShaderStage,
};
use swarm_render_wgpu::reflect_stage;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swarm-cli", about = "CLI tool for the Swarm renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print renderer version and crate info
    Info,
    /// Render frames on the headless device and print their statistics
    Render {
        /// Number of frames to render
        #[arg(short, long, default_value = "1")]
        frames: u32,
        /// Scene description (JSON); the demo scene when omitted
        #[arg(short, long)]
        scene: Option<PathBuf>,
        /// Print every device command issued per frame
        #[arg(long)]
        trace: bool,
    },
    /// Validate `<path>.vert` and `<path>.frag` and print their bindings
    Shader {
        /// Shader path without extension
        path: PathBuf,
    },
    /// Validate every built-in shader
    Builtins,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("swarm-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("pool: {}", swarm_pool::crate_info());
            println!("render: {}", swarm_render::crate_info());
            println!("render-wgpu: {}", swarm_render_wgpu::crate_info());
            println!("assets: {}", swarm_assets::crate_info());
        }
        Commands::Render {
            frames,
            scene,
            trace,
        } => {
            print!("{}", render_frames(scene.as_deref(), frames, trace)?);
        }
        Commands::Shader { path } => {
            let source = load_shader_source(&path)?;
            print!("{}", shader_report(&path.display().to_string(), &source)?);
        }
        Commands::Builtins => {
            print!("{}", builtins_report()?);
        }
    }

    Ok(())
}

/// Bring up a renderer on the headless device and render `frames` frames.
fn render_frames(scene: Option<&Path>, frames: u32, trace: bool) -> Result<String> {
    let mut windows = HeadlessWindows::default();
    let mut backend = RendererBackend::setup(
        || Ok(HeadlessDevice::new()),
        &mut windows,
        RendererConfig::default(),
    )?;

    let main = backend.main_window();
    let size = backend
        .window(main)
        .map(AppWindow::size)
        .context("main window missing after setup")?;
    let world = backend.create_world_with_viewport(size)?;
    let viewport = backend.worlds.get(world).and_then(|w| w.viewport);
    backend.bind_viewport(main, viewport)?;

    let desc = match scene {
        Some(path) => SceneDesc::load(path)
            .with_context(|| format!("failed to load scene {}", path.display()))?,
        None => SceneDesc::demo(),
    };
    desc.instantiate(&mut backend, world)?;
    tracing::debug!("{}", backend.debug_world(world));

    let setup_commands = backend.device_mut().take_commands().len();
    let mut out = String::new();
    writeln!(
        out,
        "{}x{} viewport, {setup_commands} setup commands",
        size.x, size.y
    )?;
    for frame in 0..frames {
        let stats = backend.render();
        let totals = stats.totals;
        let commands = backend.device_mut().take_commands();
        writeln!(
            out,
            "frame {frame}: worlds={} skipped={} draws={} indices={} shadow_passes={} \
             shadow_draws={} skipped_lights={} skybox={} ui={} commands={}",
            stats.worlds_rendered,
            stats.worlds_skipped,
            totals.draw_calls,
            totals.indices_drawn,
            totals.shadow_passes,
            totals.shadow_draw_calls,
            totals.skipped_shadow_lights,
            totals.skybox_draw_calls,
            totals.ui_draw_calls,
            commands.len(),
        )?;
        if trace {
            for command in &commands {
                writeln!(out, "  {command:?}")?;
            }
        }
    }
    Ok(out)
}

/// Reflect both stages of a program and check that their uniforms link.
fn shader_report(name: &str, source: &ShaderSource) -> Result<String> {
    let vertex = reflect_stage(ShaderStage::Vertex, &source.vertex)
        .map_err(|e| anyhow!("{name}: vertex stage: {e}"))?;
    let fragment = reflect_stage(ShaderStage::Fragment, &source.fragment)
        .map_err(|e| anyhow!("{name}: fragment stage: {e}"))?;
    let uniforms = match (&vertex.uniforms, &fragment.uniforms) {
        (Some(vs), Some(fs)) => Some(vs.merge(fs).map_err(|e| anyhow!("{name}: {e}"))?),
        (vs, fs) => vs.clone().or_else(|| fs.clone()),
    };

    let mut out = String::new();
    writeln!(
        out,
        "{name}: ok (vertex `{}`, fragment `{}`)",
        vertex.entry_point, fragment.entry_point
    )?;
    writeln!(out, "  vertex inputs: {:?}", vertex.locations)?;
    match &uniforms {
        Some(layout) => {
            writeln!(out, "  uniforms ({} bytes):", layout.size)?;
            for (path, field) in &layout.fields {
                writeln!(out, "    {:>5}  {path}: {}", field.offset, field.kind)?;
            }
        }
        None => writeln!(out, "  uniforms: none")?,
    }
    for texture in vertex.textures.iter().chain(&fragment.textures) {
        let depth = if texture.depth { " depth" } else { "" };
        writeln!(
            out,
            "  texture @binding({}) {}: {:?}{depth}",
            texture.binding, texture.name, texture.dim
        )?;
    }
    for sampler in vertex.samplers.iter().chain(&fragment.samplers) {
        let comparison = if sampler.comparison { " comparison" } else { "" };
        writeln!(
            out,
            "  sampler @binding({}) {}{comparison}",
            sampler.binding, sampler.name
        )?;
    }
    Ok(out)
}

fn builtins_report() -> Result<String> {
    let mut out = String::new();
    for (name, vertex, fragment) in builtin::ALL {
        let source = ShaderSource::new(vertex, fragment);
        let report = shader_report(name, &source)?;
        // First line only; `shader` prints the full layout.
        writeln!(out, "{}", report.lines().next().unwrap_or(name))?;
    }
    Ok(out)
}
