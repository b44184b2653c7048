//! Synthetic heightfield blocks to place instances on.

use std::sync::Arc;

use fastnoise_lite::{FastNoiseLite, FractalType, NoiseType};
use scree_geom::{Transform, Vec3, Vec3i};
use scree_instancing::{MeshSurface, UpMode};
use scree_runtime::BlockJob;

pub struct TerrainParams {
    pub block_size: f32,
    /// Vertices per block edge.
    pub resolution: u32,
    pub seed: i32,
    /// Planet radius; `None` for flat ground.
    pub sphere_radius: Option<f32>,
}

pub struct Terrain {
    noise: FastNoiseLite,
    params: TerrainParams,
}

impl Terrain {
    pub fn new(params: TerrainParams) -> Self {
        let mut noise = FastNoiseLite::with_seed(params.seed);
        noise.set_noise_type(Some(NoiseType::OpenSimplex2));
        noise.set_fractal_type(Some(FractalType::FBm));
        noise.set_fractal_octaves(Some(4));
        noise.set_frequency(Some(0.015));
        Self { noise, params }
    }

    /// Ground height above the block floor at a parent-frame (x, z).
    fn height(&self, x: f32, z: f32) -> f32 {
        let size = self.params.block_size;
        size * 0.5 + self.noise.get_noise_2d(x, z) * size * 0.3
    }

    fn block_origin(&self, grid: Vec3i) -> Vec3 {
        let size = self.params.block_size;
        let lift = self.params.sphere_radius.unwrap_or(0.0);
        Vec3::new(grid.x as f32 * size, grid.y as f32 * size + lift, grid.z as f32 * size)
    }

    pub fn block_mesh(&self, grid: Vec3i) -> MeshSurface {
        let n = self.params.resolution.max(2);
        let size = self.params.block_size;
        let step = size / (n - 1) as f32;
        let origin = self.block_origin(grid);
        let eps = step * 0.5;

        let mut vertices = Vec::with_capacity((n * n) as usize);
        let mut normals = Vec::with_capacity((n * n) as usize);
        for zi in 0..n {
            for xi in 0..n {
                let (lx, lz) = (xi as f32 * step, zi as f32 * step);
                let (wx, wz) = (origin.x + lx, origin.z + lz);
                vertices.push(Vec3::new(lx, self.height(wx, wz), lz));
                let dx = self.height(wx + eps, wz) - self.height(wx - eps, wz);
                let dz = self.height(wx, wz + eps) - self.height(wx, wz - eps);
                normals.push(Vec3::new(-dx, 2.0 * eps, -dz).normalized());
            }
        }

        let mut indices = Vec::with_capacity(((n - 1) * (n - 1) * 6) as usize);
        for zi in 0..n - 1 {
            for xi in 0..n - 1 {
                let i = zi * n + xi;
                indices.extend_from_slice(&[i, i + n, i + 1, i + 1, i + n, i + n + 1]);
            }
        }
        MeshSurface::new(vertices, normals, indices)
    }

    /// Jobs for the square of blocks within `radius` of the origin block.
    pub fn jobs(&self, radius: i32, octant_mask: u8) -> Vec<BlockJob> {
        let up_mode = if self.params.sphere_radius.is_some() {
            UpMode::Sphere
        } else {
            UpMode::ConstantUp
        };
        let mut jobs = Vec::new();
        for z in -radius..=radius {
            for x in -radius..=radius {
                let grid = Vec3i::new(x, 0, z);
                let mut job = BlockJob::new(
                    grid,
                    Arc::new(self.block_mesh(grid)),
                    Transform::from_origin(self.block_origin(grid)),
                    self.params.block_size,
                );
                job.up_mode = up_mode;
                job.octant_mask = octant_mask;
                jobs.push(job);
            }
        }
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terrain() -> Terrain {
        Terrain::new(TerrainParams {
            block_size: 16.0,
            resolution: 9,
            seed: 3,
            sphere_radius: None,
        })
    }

    #[test]
    fn mesh_shape() {
        let mesh = terrain().block_mesh(Vec3i::new(1, 0, -2));
        assert_eq!(mesh.vertices.len(), 81);
        assert_eq!(mesh.indices.len(), 8 * 8 * 6);
        assert!(mesh.vertices.iter().all(|v| v.y > 0.0 && v.y < 16.0));
        assert!(mesh.normals.iter().all(|n| n.y > 0.0 && (n.length() - 1.0).abs() < 1e-4));
    }

    #[test]
    fn neighbouring_blocks_share_edges() {
        let t = terrain();
        let a = t.block_mesh(Vec3i::new(0, 0, 0));
        let b = t.block_mesh(Vec3i::new(1, 0, 0));
        // Last column of `a` is the first column of `b`.
        for row in 0..9 {
            let ea = a.vertices[row * 9 + 8];
            let eb = b.vertices[row * 9];
            assert!((ea.y - eb.y).abs() < 1e-4);
        }
    }

    #[test]
    fn jobs_cover_square() {
        let jobs = terrain().jobs(1, 0xff);
        assert_eq!(jobs.len(), 9);
        assert!(jobs.iter().all(|j| j.up_mode == UpMode::ConstantUp));
    }
}
