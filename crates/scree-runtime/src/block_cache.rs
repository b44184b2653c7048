use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use hashbrown::HashMap;
use scree_geom::{Transform, Vec3i};
use scree_instancing::{MeshSurface, Placement, UpMode};

/// Identity of one block's placements for one layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub grid_position: Vec3i,
    pub lod_index: i32,
    pub layer_id: i32,
}

/// Geometry and placement context a cached result was generated from.
#[derive(Clone, Debug)]
pub struct BlockInputs {
    pub surface: Arc<MeshSurface>,
    pub block_transform: Transform,
    pub up_mode: UpMode,
    pub block_size: f32,
}

impl BlockInputs {
    /// Same mesh (by pointer, else by content) and same placement context.
    pub fn matches(&self, other: &BlockInputs) -> bool {
        (Arc::ptr_eq(&self.surface, &other.surface) || self.surface == other.surface)
            && self.block_transform == other.block_transform
            && self.up_mode == other.up_mode
            && self.block_size.to_bits() == other.block_size.to_bits()
    }
}

#[derive(Clone, Debug)]
pub struct CachedBlock {
    /// Generator revision the placements were built from.
    pub revision: u64,
    pub inputs: BlockInputs,
    pub placements: Arc<Vec<Placement>>,
}

impl CachedBlock {
    fn is_current(&self, revision: u64, inputs: &BlockInputs) -> bool {
        self.revision == revision && self.inputs.matches(inputs)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

struct Slot {
    block: CachedBlock,
    last_used: AtomicU64,
}

/// Full-mask placement results, evicted least-recently-used first.
///
/// Recency is a tick stored in each slot, so a hit only needs the read lock.
/// Going over capacity trims back to seven eighths of it in one pass.
pub struct BlockCache {
    slots: RwLock<HashMap<BlockKey, Slot>>,
    capacity: usize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Placements for `key` if they were built at `revision` from `inputs`.
    /// Anything else under that key is dropped.
    pub fn get(
        &self,
        key: &BlockKey,
        revision: u64,
        inputs: &BlockInputs,
    ) -> Option<Arc<Vec<Placement>>> {
        let stale = {
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            match slots.get(key) {
                Some(slot) if slot.block.is_current(revision, inputs) => {
                    slot.last_used.store(self.tick(), Ordering::Relaxed);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(Arc::clone(&slot.block.placements));
                }
                Some(_) => true,
                None => false,
            }
        };
        self.misses.fetch_add(1, Ordering::Relaxed);
        if stale {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            // Another worker may have refreshed it in between.
            if slots
                .get(key)
                .is_some_and(|slot| !slot.block.is_current(revision, inputs))
            {
                slots.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        None
    }

    /// Latest entry regardless of revision or inputs.
    pub fn peek(&self, key: &BlockKey) -> Option<CachedBlock> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|slot| slot.block.clone())
    }

    pub fn insert(
        &self,
        key: BlockKey,
        revision: u64,
        inputs: BlockInputs,
        placements: Arc<Vec<Placement>>,
    ) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.insert(
            key,
            Slot {
                block: CachedBlock {
                    revision,
                    inputs,
                    placements,
                },
                last_used: AtomicU64::new(self.tick()),
            },
        );
        if slots.len() > self.capacity {
            self.trim(&mut slots);
        }
    }

    /// Drops one block, e.g. after its terrain was edited.
    pub fn invalidate_block(&self, key: &BlockKey) -> bool {
        let removed = self
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Drops every entry of `layer_id`, returning how many went.
    pub fn invalidate_layer(&self, layer_id: i32) -> usize {
        let removed = {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            let before = slots.len();
            slots.retain(|k, _| k.layer_id != layer_id);
            before - slots.len()
        };
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear(&self) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        self.evictions.fetch_add(slots.len() as u64, Ordering::Relaxed);
        slots.clear();
    }

    pub fn stats(&self) -> BlockCacheStats {
        BlockCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.slots.read().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn trim(&self, slots: &mut HashMap<BlockKey, Slot>) {
        let keep = self.capacity - self.capacity / 8;
        let mut by_age: Vec<(u64, BlockKey)> = slots
            .iter()
            .map(|(k, slot)| (slot.last_used.load(Ordering::Relaxed), *k))
            .collect();
        by_age.sort_unstable_by_key(|(tick, _)| *tick);
        let excess = by_age.len().saturating_sub(keep);
        for (_, key) in &by_age[..excess] {
            slots.remove(key);
        }
        self.evictions.fetch_add(excess as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scree_geom::Vec3;

    fn key(x: i32, layer_id: i32) -> BlockKey {
        BlockKey {
            grid_position: Vec3i::new(x, 0, 0),
            lod_index: 0,
            layer_id,
        }
    }

    fn inputs(y: f32) -> BlockInputs {
        BlockInputs {
            surface: Arc::new(MeshSurface::new(
                vec![Vec3::new(1.0, y, 1.0)],
                vec![Vec3::UP],
                Vec::new(),
            )),
            block_transform: Transform::IDENTITY,
            up_mode: UpMode::ConstantUp,
            block_size: 16.0,
        }
    }

    #[test]
    fn stale_revision_misses_and_evicts() {
        let cache = BlockCache::new(8);
        let i = inputs(1.0);
        cache.insert(key(0, 0), 3, i.clone(), Arc::new(Vec::new()));
        assert!(cache.get(&key(0, 0), 3, &i).is_some());
        assert!(cache.get(&key(0, 0), 4, &i).is_none());
        assert!(cache.peek(&key(0, 0)).is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 1));
    }

    #[test]
    fn changed_inputs_miss() {
        let cache = BlockCache::new(8);
        let i = inputs(1.0);
        cache.insert(key(0, 0), 0, i.clone(), Arc::new(Vec::new()));

        // Equal content behind another pointer still hits.
        assert!(cache.get(&key(0, 0), 0, &inputs(1.0)).is_some());

        let mut moved = i.clone();
        moved.block_transform = Transform::from_origin(Vec3::new(16.0, 0.0, 0.0));
        assert!(cache.get(&key(0, 0), 0, &moved).is_none());

        cache.insert(key(0, 0), 0, i.clone(), Arc::new(Vec::new()));
        assert!(cache.get(&key(0, 0), 0, &inputs(9.0)).is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn lru_eviction_keeps_recent() {
        let cache = BlockCache::new(2);
        let i = inputs(1.0);
        cache.insert(key(0, 0), 0, i.clone(), Arc::new(Vec::new()));
        cache.insert(key(1, 0), 0, i.clone(), Arc::new(Vec::new()));
        assert!(cache.get(&key(0, 0), 0, &i).is_some());
        cache.insert(key(2, 0), 0, i.clone(), Arc::new(Vec::new()));
        assert!(cache.peek(&key(0, 0)).is_some());
        assert!(cache.peek(&key(1, 0)).is_none());
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn overflow_trims_oldest_eighth() {
        let cache = BlockCache::new(16);
        let i = inputs(1.0);
        for x in 0..17 {
            cache.insert(key(x, 0), 0, i.clone(), Arc::new(Vec::new()));
        }
        assert_eq!(cache.stats().entries, 14);
        assert!((0..3).all(|x| cache.peek(&key(x, 0)).is_none()));
        assert!((3..17).all(|x| cache.peek(&key(x, 0)).is_some()));
        assert_eq!(cache.stats().evictions, 3);
    }

    #[test]
    fn invalidation_by_block_and_layer() {
        let cache = BlockCache::new(16);
        let i = inputs(1.0);
        for x in 0..3 {
            cache.insert(key(x, 1), 0, i.clone(), Arc::new(Vec::new()));
            cache.insert(key(x, 2), 0, i.clone(), Arc::new(Vec::new()));
        }
        assert!(cache.invalidate_block(&key(0, 2)));
        assert!(!cache.invalidate_block(&key(0, 2)));
        assert_eq!(cache.invalidate_layer(1), 3);
        assert_eq!(cache.invalidate_layer(1), 0);
        assert_eq!(cache.stats().entries, 2);
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }
}
