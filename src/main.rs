#![forbid(unsafe_code)]

mod terrain_mesh;
mod watch;

use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use hashbrown::HashMap;
use scree_geom::Vec3;
use scree_instancing::{LayerSetConfig, Placement, load_layers_from_path};
use scree_runtime::{BlockJob, BlockOut, Layer, PlacementRuntime, dispatch_callback};

use crate::terrain_mesh::{Terrain, TerrainParams};

const DEFAULT_LAYERS: &str = include_str!("../assets/layers.toml");

#[derive(Parser, Debug)]
#[command(name = "scree", version, about = "Scatter instances over procedural terrain blocks")]
struct Args {
    /// Layer definitions (TOML). Built-in layers when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Blocks generated around the origin block in x and z.
    #[arg(long, default_value_t = 2)]
    radius: i32,
    #[arg(long, default_value_t = 16.0)]
    block_size: f32,
    /// Vertices per block edge.
    #[arg(long, default_value_t = 17, value_parser = clap::value_parser!(u32).range(2..=513))]
    resolution: u32,
    /// Terrain noise seed.
    #[arg(long, default_value_t = 1337)]
    seed: i32,
    /// Put the terrain on a planet of this radius and use radial up.
    #[arg(long)]
    sphere: Option<f32>,
    /// Octants to populate, e.g. 0xff or 0x0f.
    #[arg(long, default_value = "0xff", value_parser = parse_mask)]
    octant_mask: u8,
    /// Worker threads, 0 for one per core.
    #[arg(long, default_value_t = 0)]
    threads: usize,
    /// Regenerate whenever the config file changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

fn parse_mask(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid octant mask {s:?}: {e}"))
}

fn load_layers(args: &Args) -> Result<LayerSetConfig, Box<dyn Error>> {
    let cfg = match &args.config {
        Some(path) => load_layers_from_path(path)?,
        None => LayerSetConfig::from_toml_str(DEFAULT_LAYERS)?,
    };
    if cfg.layers.is_empty() {
        log::warn!("no layers configured, nothing will be placed");
    }
    Ok(cfg)
}

#[derive(Default)]
struct LayerSummary {
    blocks: usize,
    failed: usize,
    cached: usize,
    placements: usize,
    scale_sum: f64,
    lowest: f32,
    highest: f32,
}

fn summarize(jobs: &[BlockJob], outs: &[BlockOut]) -> HashMap<i32, LayerSummary> {
    let origins: HashMap<_, _> = jobs
        .iter()
        .map(|j| (j.grid_position, j.block_transform.origin))
        .collect();
    let mut by_layer: HashMap<i32, LayerSummary> = HashMap::new();
    for out in outs {
        let summary = by_layer.entry(out.layer_id).or_insert_with(|| LayerSummary {
            lowest: f32::INFINITY,
            highest: f32::NEG_INFINITY,
            ..Default::default()
        });
        summary.blocks += 1;
        if out.from_cache {
            summary.cached += 1;
        }
        let placements = match &out.placements {
            Ok(p) => p,
            Err(_) => {
                summary.failed += 1;
                continue;
            }
        };
        let origin = origins.get(&out.grid_position).copied().unwrap_or(Vec3::ZERO);
        let mut visit = |world: Vec3, p: &Placement| {
            summary.placements += 1;
            summary.scale_sum += f64::from(p.scale);
            summary.lowest = summary.lowest.min(world.y);
            summary.highest = summary.highest.max(world.y);
            Ok(())
        };
        if let Err(e) = dispatch_callback(&mut visit, origin, placements) {
            log::warn!("summary of block {:?} incomplete: {}", out.grid_position, e);
        }
    }
    by_layer
}

fn report(runtime: &PlacementRuntime, jobs: &[BlockJob], outs: &[BlockOut], elapsed: Duration) {
    let by_layer = summarize(jobs, outs);
    println!(
        "{:<4} {:<14} {:>6} {:>7} {:>10} {:>10} {:>18}",
        "id", "layer", "blocks", "failed", "instances", "mean scale", "world y range"
    );
    for layer in runtime.layers() {
        let Some(s) = by_layer.get(&layer.id) else {
            continue;
        };
        let mean = if s.placements > 0 {
            s.scale_sum / s.placements as f64
        } else {
            0.0
        };
        let range = if s.placements > 0 {
            format!("{:.1}..{:.1}", s.lowest, s.highest)
        } else {
            "-".to_string()
        };
        println!(
            "{:<4} {:<14} {:>6} {:>7} {:>10} {:>10.3} {:>18}",
            layer.id, layer.name, s.blocks, s.failed, s.placements, mean, range
        );
        if s.cached > 0 {
            log::debug!("layer {}: {} blocks served from cache", layer.id, s.cached);
        }
    }
    let stats = runtime.stats();
    log::info!(
        "{} block jobs in {:.1} ms ({} cache hits, {} errors, {} placements total)",
        outs.len(),
        elapsed.as_secs_f64() * 1000.0,
        stats.cache_hits,
        stats.errors,
        stats.placements_emitted
    );
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let cfg = load_layers(&args)?;
    let layers = cfg
        .layers
        .iter()
        .map(Layer::from_config)
        .collect::<Result<Vec<_>, _>>()?;
    let runtime = PlacementRuntime::new(layers, args.threads)?;

    let terrain = Terrain::new(TerrainParams {
        block_size: args.block_size,
        resolution: args.resolution,
        seed: args.seed,
        sphere_radius: args.sphere,
    });
    let jobs = terrain.jobs(args.radius.max(0), args.octant_mask);
    log::info!(
        "{} blocks of {} at resolution {}",
        jobs.len(),
        args.block_size,
        args.resolution
    );

    let t0 = Instant::now();
    let outs = runtime.run_jobs(&jobs);
    report(&runtime, &jobs, &outs, t0.elapsed());

    if !args.watch {
        return Ok(());
    }
    let Some(path) = args.config.clone() else {
        return Ok(());
    };
    let rx = watch::watch_file(path.clone());
    while watch::wait_for_change(&rx, Duration::from_millis(150)) {
        match load_layers_from_path(&path) {
            Ok(cfg) => {
                if let Err(e) = runtime.reload_layers(&cfg) {
                    log::warn!("layer reload failed: {}", e);
                    continue;
                }
            }
            Err(e) => {
                log::warn!("keeping previous layers, {:?} is invalid: {}", path, e);
                continue;
            }
        }
        let changed = runtime.drain_invalidations();
        if changed.is_empty() {
            log::info!("config saved without effective changes");
            continue;
        }
        let t0 = Instant::now();
        let outs = runtime.run_jobs(&jobs);
        report(&runtime, &jobs, &outs, t0.elapsed());
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
