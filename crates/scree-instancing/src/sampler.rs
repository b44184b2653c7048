//! Turns surface arrays into the initial candidate list.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use scree_geom::Vec3;

use crate::settings::EmitMode;
use crate::surface::SurfaceArrays;

/// A tentative placement point, before any filtering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Block-local position.
    pub position: Vec3,
    /// Surface normal, not necessarily unit length.
    pub normal: Vec3,
    /// Noise sampled by the noise filter, 0 when no noise is configured.
    pub noise: f32,
    /// Ordinal in the sampled list. Survives filtering unchanged.
    pub index: u32,
}

/// Fills `out` with candidates drawn from `surface`. `out` is cleared first.
pub fn sample_candidates(
    surface: &SurfaceArrays<'_>,
    mode: EmitMode,
    density: f32,
    rng: &mut ChaCha8Rng,
    out: &mut Vec<Candidate>,
) {
    out.clear();
    match mode {
        EmitMode::Vertices => sample_vertices(surface, density, rng, out),
        EmitMode::Faces => sample_faces(surface, density, rng, out),
    }
}

fn sample_vertices(
    surface: &SurfaceArrays<'_>,
    density: f32,
    rng: &mut ChaCha8Rng,
    out: &mut Vec<Candidate>,
) {
    // Compared in u64 so density 1 keeps every draw and density 0 keeps none.
    let threshold = (f64::from(density) * 4_294_967_296.0) as u64;
    for (position, normal) in surface.vertices.iter().zip(surface.normals) {
        let draw: u32 = rng.random();
        if u64::from(draw) < threshold {
            let index = out.len() as u32;
            out.push(Candidate {
                position: *position,
                normal: *normal,
                noise: 0.0,
                index,
            });
        }
    }
}

fn sample_faces(
    surface: &SurfaceArrays<'_>,
    density: f32,
    rng: &mut ChaCha8Rng,
    out: &mut Vec<Candidate>,
) {
    let tri_count = surface.triangle_count();
    if tri_count == 0 {
        return;
    }
    let count = (density * tri_count as f32) as usize;
    out.reserve(count);
    for index in 0..count {
        let tri = rng.random_range(0..tri_count) * 3;
        let ia = surface.indices[tri] as usize;
        let ib = surface.indices[tri + 1] as usize;
        let ic = surface.indices[tri + 2] as usize;
        let t0: f32 = rng.random();
        let t1: f32 = rng.random();

        let (va, vb, vc) = (surface.vertices[ia], surface.vertices[ib], surface.vertices[ic]);
        let (na, nb, nc) = (surface.normals[ia], surface.normals[ib], surface.normals[ic]);
        out.push(Candidate {
            position: va.lerp(vb, t0).lerp(vc, t1),
            normal: na.lerp(nb, t0).lerp(nc, t1),
            noise: 0.0,
            index: index as u32,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use scree_geom::Aabb;

    fn strip(n: usize) -> (Vec<Vec3>, Vec<Vec3>, Vec<u32>) {
        let mut vertices = Vec::new();
        for i in 0..n {
            vertices.push(Vec3::new(i as f32, 0.0, 0.0));
            vertices.push(Vec3::new(i as f32, 0.0, 1.0));
        }
        let normals = vec![Vec3::UP; vertices.len()];
        let mut indices = Vec::new();
        for i in 0..(n as u32 - 1) {
            let a = i * 2;
            indices.extend_from_slice(&[a, a + 1, a + 2, a + 1, a + 3, a + 2]);
        }
        (vertices, normals, indices)
    }

    #[test]
    fn full_and_zero_density_vertices() {
        let (v, n, i) = strip(20);
        let surface = SurfaceArrays { vertices: &v, normals: &n, indices: &i };
        let mut out = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        sample_candidates(&surface, EmitMode::Vertices, 1.0, &mut rng, &mut out);
        assert_eq!(out.len(), v.len());
        assert!(out.iter().enumerate().all(|(k, c)| c.index == k as u32));

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        sample_candidates(&surface, EmitMode::Vertices, 0.0, &mut rng, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn faces_count_and_containment() {
        let (v, n, i) = strip(11);
        let surface = SurfaceArrays { vertices: &v, normals: &n, indices: &i };
        let bounds = Aabb::from_points(&v).unwrap().expanded(1e-4);
        let mut out = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        sample_candidates(&surface, EmitMode::Faces, 0.5, &mut rng, &mut out);
        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|c| bounds.contains(c.position)));
    }

    #[test]
    fn faces_without_triangles_is_empty() {
        let v = vec![Vec3::ZERO; 3];
        let n = vec![Vec3::UP; 3];
        let surface = SurfaceArrays { vertices: &v, normals: &n, indices: &[] };
        let mut out = vec![Candidate {
            position: Vec3::ZERO,
            normal: Vec3::UP,
            noise: 0.0,
            index: 0,
        }];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        sample_candidates(&surface, EmitMode::Faces, 1.0, &mut rng, &mut out);
        assert!(out.is_empty());
    }
}
