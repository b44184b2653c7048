//! Parallel per-block placement generation with result caching.
#![forbid(unsafe_code)]

mod block_cache;
mod callback;
mod merge;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};
use hashbrown::HashSet;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use scree_geom::{Transform, Vec3i};
use scree_instancing::{
    ALL_OCTANTS, ConfigError, GenerateError, GenerateRequest, InstanceGenerator, LayerConfig,
    LayerSetConfig, ListenerId, MeshSurface, NoiseSettings, Placement, ScratchPool, UpMode,
};
use thiserror::Error;

pub use block_cache::{BlockCache, BlockCacheStats, BlockInputs, BlockKey, CachedBlock};
pub use callback::{CallbackError, PlacementCallback, dispatch_callback};
pub use merge::merge_octant_results;

pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no layer with id {0}")]
    UnknownLayer(i32),
    #[error("layer id {0} is registered more than once")]
    DuplicateLayer(i32),
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("worker pool: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),
}

/// A named instance layer. Generation holds the read lock for the whole
/// call, so writers wait for in-flight blocks of this layer to finish.
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: i32,
    pub name: String,
    pub generator: Arc<RwLock<InstanceGenerator>>,
    /// Noise table the current source was built from, if it came from a file.
    noise_settings: Arc<Mutex<Option<NoiseSettings>>>,
}

impl Layer {
    pub fn new(id: i32, name: impl Into<String>, generator: InstanceGenerator) -> Self {
        Self {
            id,
            name: name.into(),
            generator: Arc::new(RwLock::new(generator)),
            noise_settings: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(cfg: &LayerConfig) -> Result<Self, ConfigError> {
        let layer = Self::new(cfg.id, cfg.display_name(), cfg.build_generator()?);
        *layer.noise_settings() = cfg.noise.clone();
        Ok(layer)
    }

    fn noise_settings(&self) -> MutexGuard<'_, Option<NoiseSettings>> {
        self.noise_settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `cfg` through the setters. The noise source is rebuilt only
    /// when its table differs from the one last applied.
    pub fn apply_config(&self, cfg: &LayerConfig) -> Result<(), ConfigError> {
        let mut applied = self.noise_settings();
        let mut generator = self.write();
        if *applied == cfg.noise {
            cfg.apply_settings_to(&mut generator);
        } else {
            cfg.apply_to(&mut generator)?;
            *applied = cfg.noise.clone();
        }
        Ok(())
    }

    pub fn read(&self) -> RwLockReadGuard<'_, InstanceGenerator> {
        self.generator.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, InstanceGenerator> {
        self.generator.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One block's surface and placement context, shared by every layer.
#[derive(Clone, Debug)]
pub struct BlockJob {
    pub grid_position: Vec3i,
    pub lod_index: i32,
    pub surface: Arc<MeshSurface>,
    pub block_transform: Transform,
    pub up_mode: UpMode,
    pub octant_mask: u8,
    pub block_size: f32,
}

impl BlockJob {
    pub fn new(
        grid_position: Vec3i,
        surface: Arc<MeshSurface>,
        block_transform: Transform,
        block_size: f32,
    ) -> Self {
        Self {
            grid_position,
            lod_index: 0,
            surface,
            block_transform,
            up_mode: UpMode::ConstantUp,
            octant_mask: ALL_OCTANTS,
            block_size,
        }
    }

    pub fn key(&self, layer_id: i32) -> BlockKey {
        BlockKey {
            grid_position: self.grid_position,
            lod_index: self.lod_index,
            layer_id,
        }
    }

    pub fn inputs(&self) -> BlockInputs {
        BlockInputs {
            surface: Arc::clone(&self.surface),
            block_transform: self.block_transform,
            up_mode: self.up_mode,
            block_size: self.block_size,
        }
    }

    pub fn request(&self, layer_id: i32) -> GenerateRequest<'_> {
        GenerateRequest {
            grid_position: self.grid_position,
            lod_index: self.lod_index,
            layer_id,
            surface: self.surface.as_arrays(),
            block_transform: self.block_transform,
            up_mode: self.up_mode,
            octant_mask: self.octant_mask,
            block_size: self.block_size,
        }
    }
}

#[derive(Debug)]
pub struct BlockOut {
    pub grid_position: Vec3i,
    pub lod_index: i32,
    pub layer_id: i32,
    pub revision: u64,
    pub from_cache: bool,
    pub placements: Result<Arc<Vec<Placement>>, GenerateError>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub jobs_run: u64,
    pub cache_hits: u64,
    pub placements_emitted: u64,
    pub errors: u64,
}

#[derive(Default)]
struct Counters {
    jobs_run: AtomicU64,
    cache_hits: AtomicU64,
    placements_emitted: AtomicU64,
    errors: AtomicU64,
}

pub struct PlacementRuntime {
    layers: Vec<Layer>,
    subscriptions: Vec<(i32, ListenerId)>,
    invalidation_rx: Receiver<i32>,
    pool: ThreadPool,
    scratch: ScratchPool,
    cache: BlockCache,
    counters: Counters,
}

impl PlacementRuntime {
    /// `worker_count` of 0 picks the available parallelism.
    pub fn new(layers: Vec<Layer>, worker_count: usize) -> Result<Self, RuntimeError> {
        Self::with_cache_capacity(layers, worker_count, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(
        layers: Vec<Layer>,
        worker_count: usize,
        cache_capacity: usize,
    ) -> Result<Self, RuntimeError> {
        let mut ids = HashSet::with_capacity(layers.len());
        for layer in &layers {
            if !ids.insert(layer.id) {
                return Err(RuntimeError::DuplicateLayer(layer.id));
            }
        }

        let worker_count = if worker_count == 0 {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            worker_count
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("scree-place-{i}"))
            .build()?;

        let (invalidation_tx, invalidation_rx) = unbounded();
        let subscriptions = layers
            .iter()
            .map(|layer| (layer.id, subscribe_layer(layer, invalidation_tx.clone())))
            .collect();

        log::info!(
            "placement runtime: {} layers, {} workers",
            layers.len(),
            worker_count
        );
        Ok(Self {
            layers,
            subscriptions,
            invalidation_rx,
            pool,
            scratch: ScratchPool::new(worker_count),
            cache: BlockCache::new(cache_capacity),
            counters: Counters::default(),
        })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: i32) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Generates every (job, layer) pair on the worker pool. Full-mask results
    /// are cached per generator revision. A failing block is reported in its
    /// `BlockOut` and does not stop the others.
    pub fn run_jobs(&self, jobs: &[BlockJob]) -> Vec<BlockOut> {
        let work: Vec<(&BlockJob, &Layer)> = jobs
            .iter()
            .flat_map(|job| self.layers.iter().map(move |layer| (job, layer)))
            .collect();
        self.pool.install(|| {
            work.par_iter()
                .map(|(job, layer)| self.run_one(job, layer))
                .collect()
        })
    }

    fn run_one(&self, job: &BlockJob, layer: &Layer) -> BlockOut {
        self.counters.jobs_run.fetch_add(1, Ordering::Relaxed);
        let generator = layer.read();
        let revision = generator.revision();
        let key = job.key(layer.id);
        let full = job.octant_mask == ALL_OCTANTS;

        let out = |placements, from_cache| BlockOut {
            grid_position: job.grid_position,
            lod_index: job.lod_index,
            layer_id: layer.id,
            revision,
            from_cache,
            placements,
        };

        if full {
            if let Some(hit) = self.cache.get(&key, revision, &job.inputs()) {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .placements_emitted
                    .fetch_add(hit.len() as u64, Ordering::Relaxed);
                return out(Ok(hit), true);
            }
        }

        let mut scratch = self.scratch.acquire();
        match generator.generate(&job.request(layer.id), &mut scratch) {
            Ok(placements) => {
                log::debug!(
                    "block {:?} layer {} ({}): {} placements",
                    job.grid_position,
                    layer.id,
                    layer.name,
                    placements.len()
                );
                self.counters
                    .placements_emitted
                    .fetch_add(placements.len() as u64, Ordering::Relaxed);
                let placements = Arc::new(placements);
                if full {
                    self.cache
                        .insert(key, revision, job.inputs(), Arc::clone(&placements));
                }
                out(Ok(placements), false)
            }
            Err(err) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "block {:?} layer {} failed: {}",
                    job.grid_position,
                    layer.id,
                    err
                );
                out(Err(err), false)
            }
        }
    }

    /// Regenerates the octants in `mask` and keeps the cached placements of
    /// the others, even when those were built from an older mesh of the
    /// block. `job.octant_mask` is ignored. Without a cached result at the
    /// current revision the whole block is generated.
    pub fn regenerate_octants(
        &self,
        job: &BlockJob,
        layer_id: i32,
        mask: u8,
    ) -> Result<Arc<Vec<Placement>>, RuntimeError> {
        let layer = self
            .layer(layer_id)
            .ok_or(RuntimeError::UnknownLayer(layer_id))?;
        self.counters.jobs_run.fetch_add(1, Ordering::Relaxed);
        let generator = layer.read();
        let revision = generator.revision();
        let key = job.key(layer_id);
        let full_request = job.request(layer_id).with_octant_mask(ALL_OCTANTS);
        let mut scratch = self.scratch.acquire();

        let previous = self
            .cache
            .peek(&key)
            .filter(|cached| cached.revision == revision);
        let merged = match previous {
            Some(CachedBlock {
                placements: previous,
                ..
            }) => {
                let fresh = generator
                    .generate(&full_request.with_octant_mask(mask), &mut scratch)
                    .inspect_err(|_| {
                        self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    })?;
                log::debug!(
                    "block {:?} layer {}: regenerated octants {:#04x}, {} fresh",
                    job.grid_position,
                    layer_id,
                    mask,
                    fresh.len()
                );
                merge_octant_results(&previous, &fresh, mask)
            }
            None => generator
                .generate(&full_request, &mut scratch)
                .inspect_err(|_| {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                })?,
        };

        self.counters
            .placements_emitted
            .fetch_add(merged.len() as u64, Ordering::Relaxed);
        let merged = Arc::new(merged);
        self.cache
            .insert(key, revision, job.inputs(), Arc::clone(&merged));
        Ok(merged)
    }

    /// Forgets every layer's cached placements for one block, e.g. after a
    /// terrain edit. Returns how many entries went.
    pub fn invalidate_block(&self, grid_position: Vec3i, lod_index: i32) -> usize {
        self.layers
            .iter()
            .filter(|layer| {
                self.cache.invalidate_block(&BlockKey {
                    grid_position,
                    lod_index,
                    layer_id: layer.id,
                })
            })
            .count()
    }

    /// Drops cached blocks of every layer whose configuration changed since
    /// the last call. Returns the affected layer ids in ascending order.
    pub fn drain_invalidations(&self) -> Vec<i32> {
        let mut changed: Vec<i32> = self.invalidation_rx.try_iter().collect();
        changed.sort_unstable();
        changed.dedup();
        for &id in &changed {
            let dropped = self.cache.invalidate_layer(id);
            log::info!("layer {} changed, dropped {} cached blocks", id, dropped);
        }
        changed
    }

    /// Re-applies a layer file to the registered layers through their
    /// setters. Layers missing from the runtime are skipped with a warning.
    pub fn reload_layers(&self, cfg: &LayerSetConfig) -> Result<(), RuntimeError> {
        for layer_cfg in &cfg.layers {
            match self.layer(layer_cfg.id) {
                Some(layer) => layer.apply_config(layer_cfg)?,
                None => log::warn!(
                    "layer {} ({}) is not registered, restart to add it",
                    layer_cfg.id,
                    layer_cfg.display_name()
                ),
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            jobs_run: self.counters.jobs_run.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            placements_emitted: self.counters.placements_emitted.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }
}

impl Drop for PlacementRuntime {
    fn drop(&mut self) {
        for (id, listener) in self.subscriptions.drain(..) {
            if let Some(layer) = self.layers.iter().find(|l| l.id == id) {
                layer.write().unsubscribe(listener);
            }
        }
    }
}

fn subscribe_layer(layer: &Layer, tx: Sender<i32>) -> ListenerId {
    let id = layer.id;
    layer.write().subscribe(move |_| {
        let _ = tx.send(id);
    })
}
