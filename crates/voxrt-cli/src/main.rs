use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voxrt::{
    camera::CameraBasis,
    geometry::{AABB, Matrix4x4, Vec3, Vec4},
    mesh::InterleavedMesh,
    transfer::TransferFunction,
};
use voxrt_optix::{
    AtlasTexture, HostDevice, HostRaster, ObjectKind, Scene, SceneSettings, ShadingMode, VolumeIntersect,
    device::BufferFormat,
};

#[derive(Debug, clap::Parser)]
struct CommandLineArguments {
    #[arg(long, default_value = "ptx", help = "Directory holding the device-program modules")]
    ptx_dir: PathBuf,

    #[arg(long, default_value_t = 640, help = "Output width in pixels")]
    width: usize,
    #[arg(long, default_value_t = 480, help = "Output height in pixels")]
    height: usize,
    #[arg(long, value_enum, default_value_t = OutputFormat::Float3, help = "Output surface format")]
    format: OutputFormat,
    #[arg(long, help = "Seed for the per-pixel RNG seed buffer")]
    seed: Option<u64>,

    #[arg(long, default_value_t = 1, help = "Frames to launch")]
    frames: u32,
    #[arg(long, default_value_t = 1, help = "Unit cubes in the demo scene")]
    meshes: usize,
    #[arg(long, default_value_t = 1, help = "Volumes in the demo scene")]
    volumes: usize,
    #[arg(long, action, help = "Trace volumes with deep (multi-scatter) intersection")]
    deep: bool,
    #[arg(long, action, help = "Trace volumes as level sets")]
    level_set: bool,

    #[arg(long, default_value = "optix_trace_surface", help = "Material module (without extension)")]
    material: String,
    #[arg(long, default_value = "trace_surface", help = "Material closest-hit symbol")]
    closest_hit: String,
    #[arg(long, default_value = "trace_shadow", help = "Material any-hit symbol")]
    any_hit: String,

    #[arg(long, action, help = "Print the run summary as JSON")]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Rgba8,
    Float3,
    Float4,
}

impl From<OutputFormat> for BufferFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Rgba8 => BufferFormat::UnsignedByte4,
            OutputFormat::Float3 => BufferFormat::Float3,
            OutputFormat::Float4 => BufferFormat::Float4,
        }
    }
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    #[command(about = "Load every fixed program and the material, then validate an empty scene")]
    Check,
}

#[derive(Debug, Serialize)]
struct Summary {
    width: usize,
    height: usize,
    meshes: usize,
    volumes: usize,
    materials: usize,
    programs: usize,
    top_children: usize,
    launches: u64,
    uploads: usize,
    live_buffers: usize,
    live_samplers: usize,
}

/// Raster texture the demo copies each frame into
const DISPLAY_TEXTURE: u32 = 1;

/// Raster texture standing in for the volume atlas
const VOLUME_ATLAS: AtlasTexture = AtlasTexture(2);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = CommandLineArguments::parse();
    if args.width == 0 || args.height == 0 {
        bail!("output surface must be at least 1x1, got {}x{}", args.width, args.height);
    }

    let settings = SceneSettings {
        output_format: args.format.into(),
        seed: args.seed,
        ..Default::default()
    };

    let device = HostDevice::new(&args.ptx_dir);
    let mut scene = Scene::initialize(device, HostRaster::new(), settings, args.width, args.height)
        .with_context(|| format!("failed to initialize scene from {}", args.ptx_dir.display()))?;
    let material = scene
        .add_material(&args.material, &args.closest_hit, &args.any_hit)
        .with_context(|| format!("failed to load material `{}`", args.material))?;

    if let Some(Command::Check) = args.command {
        scene.validate().context("empty scene failed validation")?;
        println!(
            "{}: {} programs loaded, scene validates",
            args.ptx_dir.display(),
            scene.programs_loaded()
        );
        return Ok(());
    }

    build_demo_scene(&mut scene, &args, material)?;
    scene.validate().context("demo scene failed validation")?;

    for frame in 0..args.frames {
        scene.set_sample(frame, frame);
        scene
            .launch()
            .with_context(|| format!("frame {frame} failed to launch"))?;
        scene
            .copy_to_external_texture(DISPLAY_TEXTURE)
            .with_context(|| format!("frame {frame} failed to reach the display texture"))?;
    }
    info!("launched {} frames", scene.launches());

    let summary = summarize(&scene);
    let (device, raster) = scene.teardown().context("scene teardown failed")?;
    let leaked = device.live_count(ObjectKind::Buffer) + raster.live_pixel_buffers();
    if leaked > 0 {
        warn!("{leaked} buffers survived teardown");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}x{}: {} meshes, {} volumes, {} launches, {} uploads",
            summary.width, summary.height, summary.meshes, summary.volumes, summary.launches, summary.uploads
        );
    }
    Ok(())
}

/// A row of cubes along +x and a row of volumes along -x, all sharing one material
fn build_demo_scene(scene: &mut Scene<HostDevice, HostRaster>, args: &CommandLineArguments, material: usize) -> Result<()> {
    let cube = InterleavedMesh::unit_cube();
    for i in 0..args.meshes {
        let transform = Matrix4x4::translation(Vec3(1.5 * i as f32 + 1.0, 0.0, 0.0));
        scene
            .add_mesh(&cube, material, &transform)
            .with_context(|| format!("failed to add mesh {i}"))?;
    }

    let intersect = VolumeIntersect::from_flags(args.deep, args.level_set);
    let bounds = AABB::new(Vec3(-0.5, -0.5, -0.5), Vec3(0.5, 0.5, 0.5));
    for i in 0..args.volumes {
        let transform = Matrix4x4::translation(Vec3(-1.5 * i as f32 - 1.0, 0.0, 0.0));
        scene
            .add_volume(VOLUME_ATLAS, bounds, material, &transform, intersect)
            .with_context(|| format!("failed to add volume {i}"))?;
    }

    let aspect = args.width as f32 / args.height as f32;
    scene.set_camera(&CameraBasis::look_at(
        Vec3(0.0, 2.0, 8.0),
        Vec3::zero(),
        Vec3(0.0, 1.0, 0.0),
        aspect,
    ));
    scene.set_light(Vec3(5.0, 10.0, 5.0));
    scene.set_shading(ShadingMode(0));
    scene.set_volume_params(Vec3(0.5, 16.0, 0.0), Vec3(-1.0, 1.1, 0.0), Vec3(0.005, 0.01, 0.0));
    scene.set_transfer_func(&TransferFunction::ramp(Vec4::zero(), Vec4(1.0, 1.0, 1.0, 1.0)));
    Ok(())
}

fn summarize(scene: &Scene<HostDevice, HostRaster>) -> Summary {
    let device = scene.device();
    let top_children = device
        .group(scene.graph().top())
        .map_or(0, |(_, children)| children.len());

    Summary {
        width: scene.output_surface().width(),
        height: scene.output_surface().height(),
        meshes: scene.graph().mesh_count(),
        volumes: scene.graph().volume_count(),
        materials: scene.materials().len(),
        programs: scene.programs_loaded(),
        top_children,
        launches: scene.launches(),
        uploads: scene.raster().uploads().len(),
        live_buffers: device.live_count(ObjectKind::Buffer),
        live_samplers: device.live_count(ObjectKind::Sampler),
    }
}
