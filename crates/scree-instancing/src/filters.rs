//! Rejection stages that run before any orientation work.
//! Each stage is a stable retain: survivors keep their relative order.

use scree_geom::Vec3;

use crate::noise::NoiseSource;
use crate::sampler::Candidate;
use crate::settings::NoiseDimension;

/// Octant of a block-local position: bit 0 for x, bit 1 for y, bit 2 for z,
/// set when the coordinate is at or past the block midpoint.
#[inline]
pub fn octant_index(position: Vec3, half_size: f32) -> u8 {
    let mut octant = 0u8;
    if position.x >= half_size {
        octant |= 1;
    }
    if position.y >= half_size {
        octant |= 2;
    }
    if position.z >= half_size {
        octant |= 4;
    }
    octant
}

#[inline]
pub fn octant_enabled(mask: u8, octant: u8) -> bool {
    mask & (1 << octant) != 0
}

pub fn retain_octants(candidates: &mut Vec<Candidate>, mask: u8, block_size: f32) {
    let half = block_size * 0.5;
    candidates.retain(|c| octant_enabled(mask, octant_index(c.position, half)));
}

/// Drops candidates where the noise is negative and keeps the sampled value
/// on the survivors. Positions are sampled in the parent frame.
pub fn retain_noise(
    candidates: &mut Vec<Candidate>,
    noise: &dyn NoiseSource,
    dimension: NoiseDimension,
    block_origin: Vec3,
) {
    candidates.retain_mut(|c| {
        let p = block_origin + c.position;
        let n = match dimension {
            NoiseDimension::TwoD => noise.noise_2d(p.x, p.z),
            NoiseDimension::ThreeD => noise.noise_3d(p.x, p.y, p.z),
        };
        c.noise = n;
        n >= 0.0
    });
}
