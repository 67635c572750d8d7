use clap::{Parser, Subcommand};
use frameline_cache::Cache;
use frameline_common::{Bounds, MaterialId, MeshId, PipelineId, ResourceKey, Transform};
use frameline_engine::{EngineConfig, FrameReport, RenderEngine, ResourceLoader};
use frameline_render::{
    Culling, DebugTextRenderer, RenderBucket, RenderCommand, RenderCommandQueue, Renderer,
};
use frameline_sync::{Future, FutureState, LoadError};
use glam::Vec3;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "frameline-cli", about = "CLI tool for frameline operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Engine config file (TOML); defaults apply when absent
    #[arg(short, long, default_value = "frameline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate info
    Info,
    /// Stream synthetic meshes through loader, cache and engine, then draw frames
    Demo {
        /// Number of meshes to load
        #[arg(short, long, default_value = "8")]
        meshes: u64,
        /// Number of frames to run
        #[arg(short, long, default_value = "5")]
        frames: u64,
        /// Cull against a sphere of this radius around the origin
        #[arg(long)]
        cull_radius: Option<f32>,
        /// Print the last frame's draw listing
        #[arg(long)]
        listing: bool,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Decoded CPU-side mesh, shared between cache and GPU upload.
struct MeshData {
    id: MeshId,
    vertices: Vec<Vec3>,
}

#[derive(Debug, Default, Serialize)]
struct FrameSummary {
    #[serde(flatten)]
    jobs: FrameReport,
    meshes_ready: usize,
    draws: usize,
    culled: usize,
    batches: usize,
    pipeline_binds: usize,
    material_binds: usize,
}

#[derive(Debug, Serialize)]
struct DemoReport {
    config: EngineConfig,
    meshes_requested: u64,
    meshes_failed: usize,
    cache_entries: usize,
    frames: Vec<FrameSummary>,
    flushed_at_shutdown: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("frameline-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", frameline_common::crate_info());
            println!("sync: {}", frameline_sync::crate_info());
            println!("cache: {}", frameline_cache::crate_info());
            println!("render: {}", frameline_render::crate_info());
            println!("engine: {}", frameline_engine::crate_info());
        }
        Commands::Demo {
            meshes,
            frames,
            cull_radius,
            listing,
            json,
        } => {
            let config = EngineConfig::load_or_default(&cli.config)?;
            let report = run_demo(config, meshes, frames, cull_radius, listing && !json)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }

    Ok(())
}

fn mesh_position(i: u64) -> Vec3 {
    Vec3::new(i as f32 * 2.0, 0.0, -(i as f32))
}

fn decode_mesh(i: u64) -> Result<MeshData, LoadError> {
    // Synthetic decode: a fan of triangles whose size depends on the index.
    std::thread::sleep(Duration::from_millis(1 + i % 3));
    let vertices = (0..(3 * (i + 1)))
        .map(|v| Vec3::new(v as f32, (v % 3) as f32, 0.0))
        .collect();
    Ok(MeshData {
        id: MeshId(i),
        vertices,
    })
}

fn command_for(mesh: &MeshData) -> RenderCommand {
    let i = mesh.id.0;
    let position = mesh_position(i);
    let bucket = if i % 4 == 3 {
        RenderBucket::Transparent
    } else {
        RenderBucket::Deferrable
    };
    let pipeline = PipelineId((i % 3) as u32);
    let material = MaterialId((i % 2) as u32);
    let mut command = RenderCommand::new(pipeline, material, mesh.id)
        .with_transform(Transform::from_position(position))
        .with_bounds(Bounds::unit_at(position))
        .in_bucket(bucket);
    if bucket == RenderBucket::Deferrable {
        command = command.casting_shadow();
    }
    command
}

fn run_demo(
    config: EngineConfig,
    meshes: u64,
    frames: u64,
    cull_radius: Option<f32>,
    listing: bool,
) -> anyhow::Result<DemoReport> {
    let mut engine = RenderEngine::new(&config);
    let mut loader = ResourceLoader::new(&config, engine.handle())?;
    let cache: Arc<Cache<MeshData>> = Arc::new(Cache::new());
    let resident: Arc<Mutex<BTreeSet<MeshId>>> = Arc::new(Mutex::new(BTreeSet::new()));

    let mut pending: Vec<Future<Arc<MeshData>>> = Vec::new();
    for i in 0..meshes {
        let key = ResourceKey::from_path(format!("meshes/mesh{i}.obj"), b"");
        let resident = Arc::clone(&resident);
        let future = loader.load_shared(&cache, key, move |engine| {
            let mesh = decode_mesh(i)?;
            let id = mesh.id;
            let bytes = mesh.vertices.len() * std::mem::size_of::<Vec3>();
            engine
                .submit(move || {
                    tracing::debug!(mesh = id.0, bytes, "uploaded vertex buffer");
                    resident.lock().insert(id);
                })
                .map_err(|e| LoadError::msg(e.to_string()))?;
            Ok(mesh)
        })?;
        pending.push(future);
    }

    let mut queue = RenderCommandQueue::new();
    if let Some(radius) = cull_radius {
        queue.set_culling(Culling::Sphere {
            center: Vec3::ZERO,
            radius,
        });
    }

    let mut summaries = Vec::new();
    let mut ready: Vec<Arc<MeshData>> = Vec::new();
    let mut failed = 0;
    let mut last_listing = None;

    for _ in 0..frames {
        let jobs = engine.run_once()?;

        pending.retain(|f| match f.state() {
            FutureState::Pending => true,
            FutureState::Ready => {
                if let Ok(mesh) = f.get() {
                    ready.push(mesh);
                }
                false
            }
            FutureState::Failed => {
                if let Err(e) = f.get() {
                    tracing::warn!(error = %e, "mesh load failed");
                }
                failed += 1;
                false
            }
        });

        queue.clear();
        let resident_now = resident.lock().clone();
        for mesh in ready.iter().filter(|m| resident_now.contains(&m.id)) {
            queue.add_culled(command_for(mesh))?;
        }
        queue.sort();

        let changes = queue.state_changes()?;
        summaries.push(FrameSummary {
            jobs,
            meshes_ready: ready.len(),
            draws: changes.draws,
            culled: queue.culled_count(),
            batches: queue.batches()?.count(),
            pipeline_binds: changes.pipeline_binds,
            material_binds: changes.material_binds,
        });
        if listing {
            last_listing = Some(DebugTextRenderer::new().render(&queue)?);
        }

        // Stand-in for vsync.
        std::thread::sleep(Duration::from_millis(4));
    }

    loader.shutdown();
    let flushed = engine.shutdown()?;
    if let Some(text) = last_listing {
        print!("{text}");
    }

    Ok(DemoReport {
        config,
        meshes_requested: meshes,
        meshes_failed: failed,
        cache_entries: cache.len(),
        frames: summaries,
        flushed_at_shutdown: flushed,
    })
}

fn print_report(report: &DemoReport) {
    println!(
        "Demo: meshes={}, loader_threads={}, cached={}, failed={}",
        report.meshes_requested,
        report.config.loader_threads,
        report.cache_entries,
        report.meshes_failed
    );
    for f in &report.frames {
        println!(
            "frame {}: gpu_jobs={} (panicked {}), ready={}, draws={}, culled={}, batches={}, binds={}p/{}m",
            f.jobs.frame_index,
            f.jobs.executed,
            f.jobs.panicked,
            f.meshes_ready,
            f.draws,
            f.culled,
            f.batches,
            f.pipeline_binds,
            f.material_binds
        );
    }
    println!("Shutdown flushed {} GPU jobs", report.flushed_at_shutdown);
}
