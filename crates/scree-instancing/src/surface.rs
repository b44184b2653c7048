use scree_geom::{Aabb, Transform, Vec3, Vec3i};

use crate::error::{GenerateError, GeometryIssue};
use crate::settings::{EmitMode, UpMode};

/// Octant mask with every octant enabled.
pub const ALL_OCTANTS: u8 = 0xff;

/// Borrowed, co-indexed surface arrays of one block mesh.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceArrays<'a> {
    pub vertices: &'a [Vec3],
    pub normals: &'a [Vec3],
    pub indices: &'a [u32],
}

impl<'a> SurfaceArrays<'a> {
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices)
    }

    /// Contract checks run at call entry. Index values are only read when
    /// emitting from faces, so that is the only mode that range-checks them.
    pub fn validate(&self, emit_mode: EmitMode) -> Result<(), GeometryIssue> {
        if self.vertices.is_empty() {
            return Err(GeometryIssue::EmptyVertices);
        }
        if self.normals.len() != self.vertices.len() {
            return Err(GeometryIssue::NormalCountMismatch {
                vertices: self.vertices.len(),
                normals: self.normals.len(),
            });
        }
        if self.indices.len() % 3 != 0 {
            return Err(GeometryIssue::IndexCountNotTriangles(self.indices.len()));
        }
        if emit_mode == EmitMode::Faces {
            let vertex_count = self.vertices.len();
            if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(GeometryIssue::IndexOutOfRange {
                    index,
                    vertex_count,
                });
            }
        }
        Ok(())
    }
}

/// Owned surface arrays, for callers that keep meshes around between calls.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshSurface {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl MeshSurface {
    pub fn new(vertices: Vec<Vec3>, normals: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            normals,
            indices,
        }
    }

    #[inline]
    pub fn as_arrays(&self) -> SurfaceArrays<'_> {
        SurfaceArrays {
            vertices: &self.vertices,
            normals: &self.normals,
            indices: &self.indices,
        }
    }
}

/// Everything a single generation call needs besides the configuration.
#[derive(Clone, Copy, Debug)]
pub struct GenerateRequest<'a> {
    pub grid_position: Vec3i,
    /// Seed input only.
    pub lod_index: i32,
    /// Seed input only.
    pub layer_id: i32,
    pub surface: SurfaceArrays<'a>,
    /// Places block-local content into the parent frame. Only the origin
    /// is read today.
    pub block_transform: Transform,
    pub up_mode: UpMode,
    pub octant_mask: u8,
    pub block_size: f32,
}

impl<'a> GenerateRequest<'a> {
    /// Request with a full octant mask and constant up.
    pub fn new(
        grid_position: Vec3i,
        layer_id: i32,
        surface: SurfaceArrays<'a>,
        block_transform: Transform,
        block_size: f32,
    ) -> Self {
        Self {
            grid_position,
            lod_index: 0,
            layer_id,
            surface,
            block_transform,
            up_mode: UpMode::ConstantUp,
            octant_mask: ALL_OCTANTS,
            block_size,
        }
    }

    pub fn with_lod(mut self, lod_index: i32) -> Self {
        self.lod_index = lod_index;
        self
    }

    pub fn with_up_mode(mut self, up_mode: UpMode) -> Self {
        self.up_mode = up_mode;
        self
    }

    pub fn with_octant_mask(mut self, octant_mask: u8) -> Self {
        self.octant_mask = octant_mask;
        self
    }

    pub(crate) fn validate(&self, emit_mode: EmitMode) -> Result<(), GenerateError> {
        self.surface.validate(emit_mode)?;
        if self.octant_mask != ALL_OCTANTS
            && !(self.block_size.is_finite() && self.block_size > 0.0)
        {
            return Err(GenerateError::InvalidBlockSize(self.block_size));
        }
        Ok(())
    }
}
