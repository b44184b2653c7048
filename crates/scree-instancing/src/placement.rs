use rand::Rng;
use scree_geom::{Basis, Transform, Vec3};

use crate::filters::octant_index;
use crate::generator::GeneratorParams;
use crate::sampler::Candidate;
use crate::seed::BlockSeed;
use crate::settings::UpMode;

/// One surviving instance, in block-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub position: Vec3,
    /// Orthonormal and right-handed. `basis.y` is the alignment axis.
    pub basis: Basis,
    pub scale: f32,
    /// Octant the candidate was sampled in.
    pub octant: u8,
    pub candidate_index: u32,
}

impl Placement {
    /// Scaled transform, ready for instancing.
    #[inline]
    pub fn transform(&self) -> Transform {
        Transform::new(self.basis.scaled(self.scale), self.position)
    }
}

/// Up reference of one candidate. The sphere direction and distance are
/// computed on first use only.
struct UpFrame {
    mode: UpMode,
    world: Vec3,
    radial: Option<(Vec3, f32)>,
}

impl UpFrame {
    fn new(mode: UpMode, world: Vec3) -> Self {
        Self {
            mode,
            world,
            radial: None,
        }
    }

    // Sphere center is the parent origin.
    fn radial(&mut self) -> (Vec3, f32) {
        if let Some(r) = self.radial {
            return r;
        }
        let (dir, dist) = self.world.normalized_with_length();
        let r = if dist > 0.0 { (dir, dist) } else { (Vec3::UP, 0.0) };
        self.radial = Some(r);
        r
    }

    fn up(&mut self) -> Vec3 {
        match self.mode {
            UpMode::ConstantUp => Vec3::UP,
            UpMode::Sphere => self.radial().0,
        }
    }

    fn height(&mut self) -> f32 {
        match self.mode {
            UpMode::ConstantUp => self.world.y,
            UpMode::Sphere => self.radial().1,
        }
    }
}

/// Per-call inputs shared by every candidate of one block.
pub(crate) struct PlacementBuilder<'a> {
    pub params: &'a GeneratorParams,
    pub has_noise: bool,
    pub seed: BlockSeed,
    pub up_mode: UpMode,
    pub block_origin: Vec3,
    pub half_size: f32,
}

impl PlacementBuilder<'_> {
    /// Runs the slope and height filters and builds the transform.
    /// `None` means the candidate was rejected.
    pub fn build(&self, c: &Candidate) -> Option<Placement> {
        let p = self.params;
        let mut frame = UpFrame::new(self.up_mode, self.block_origin + c.position);
        let normal = c.normal.normalized();

        if p.min_surface_normal_y > -1.0 || p.max_surface_normal_y < 1.0 {
            let ny = match self.up_mode {
                UpMode::ConstantUp => normal.y,
                UpMode::Sphere => normal.dot(frame.up()),
            };
            if ny < p.min_surface_normal_y || ny > p.max_surface_normal_y {
                return None;
            }
        }

        if p.min_height > f32::NEG_INFINITY || p.max_height < f32::INFINITY {
            let h = frame.height();
            if h < p.min_height || h > p.max_height {
                return None;
            }
        }

        let mut axis_y = alignment_axis(normal, frame.up(), p.vertical_alignment);
        let position = c.position + axis_y * p.offset_along_normal;

        let mut rng = self.seed.candidate_rng(c.index);
        // Drawn even with flipping off so toggling it leaves yaw and scale alone.
        let flip: bool = rng.random();
        if p.random_vertical_flip && flip {
            axis_y = -axis_y;
        }

        let dir = Vec3::new(
            rng.random::<f32>() - 0.5,
            rng.random::<f32>() - 0.5,
            rng.random::<f32>() - 0.5,
        );
        let mut axis_x = axis_y.cross(dir);
        if axis_x.length_squared() < 1e-12 {
            axis_x = any_orthogonal(axis_y);
        }
        let axis_x = axis_x.normalized();
        let axis_z = axis_x.cross(axis_y);

        let range = p.max_scale - p.min_scale;
        let scale = if range > 0.0 {
            let mut r = p.scale_distribution.remap(rng.random::<f32>());
            if self.has_noise && p.noise_on_scale > 0.0 {
                let n = (2.0 * c.noise).clamp(0.0, 1.0);
                r *= 1.0 + (n - 1.0) * p.noise_on_scale;
            }
            p.min_scale + range * r
        } else {
            p.min_scale
        };

        Some(Placement {
            position,
            basis: Basis::from_axes(axis_x, axis_y, axis_z),
            scale,
            octant: octant_index(c.position, self.half_size),
            candidate_index: c.index,
        })
    }
}

/// Blend of surface normal and up reference, both unit length.
fn alignment_axis(normal: Vec3, up: Vec3, vertical_alignment: f32) -> Vec3 {
    if normal == Vec3::ZERO || vertical_alignment >= 1.0 {
        return up;
    }
    if vertical_alignment <= 0.0 {
        return normal;
    }
    let blended = normal.lerp(up, vertical_alignment);
    if blended.length_squared() < 1e-12 {
        up
    } else {
        blended.normalized()
    }
}

fn any_orthogonal(v: Vec3) -> Vec3 {
    if v.x.abs() < 0.9 {
        v.cross(Vec3::RIGHT)
    } else {
        v.cross(Vec3::UP)
    }
}
