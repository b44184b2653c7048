//! Seed derivation for the per-block random streams.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use scree_geom::Vec3i;

/// Odd 64-bit constant (golden ratio) spreading lod indices across the seed.
const LOD_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// Seeds for one (block, lod, layer) triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSeed {
    pub selection: u64,
    pub orientation: u64,
}

impl BlockSeed {
    pub fn new(grid_position: Vec3i, lod_index: i32, layer_id: i32) -> Self {
        let base = (u64::from(grid_position.spatial_hash())
            ^ (lod_index as u64).wrapping_mul(LOD_MIX))
        .wrapping_add(layer_id as u64);
        Self {
            selection: base,
            orientation: base.wrapping_add(1),
        }
    }

    /// Stream that picks which surface points become candidates.
    #[inline]
    pub fn selection_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.selection)
    }

    /// Orientation and scale stream of one candidate. Keyed on the candidate's
    /// ordinal so that its transform never depends on which other candidates
    /// survived filtering.
    #[inline]
    pub fn candidate_rng(&self, candidate_index: u32) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(mix64(
            self.orientation ^ u64::from(candidate_index).wrapping_mul(LOD_MIX),
        ))
    }
}

/// SplitMix64 finalizer.
#[inline]
pub fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
