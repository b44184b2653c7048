//! The instance placement generator and its configuration surface.

use std::fmt;
use std::sync::Arc;

use scree_geom::Transform;

use crate::error::GenerateError;
use crate::filters::{retain_noise, retain_octants};
use crate::noise::NoiseSource;
use crate::placement::{Placement, PlacementBuilder};
use crate::sampler::sample_candidates;
use crate::scratch::ScratchBuffers;
use crate::seed::BlockSeed;
use crate::settings::{EmitMode, NoiseDimension, ScaleDistribution};
use crate::surface::{ALL_OCTANTS, GenerateRequest};

/// Flattened configuration snapshot read by every generation call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeneratorParams {
    pub density: f32,
    pub emit_mode: EmitMode,
    pub min_scale: f32,
    pub max_scale: f32,
    pub scale_distribution: ScaleDistribution,
    pub vertical_alignment: f32,
    pub offset_along_normal: f32,
    pub min_slope_degrees: f32,
    pub max_slope_degrees: f32,
    /// Derived from `max_slope_degrees`.
    pub min_surface_normal_y: f32,
    /// Derived from `min_slope_degrees`.
    pub max_surface_normal_y: f32,
    pub min_height: f32,
    pub max_height: f32,
    pub random_vertical_flip: bool,
    pub noise_dimension: NoiseDimension,
    pub noise_on_scale: f32,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            density: 0.1,
            emit_mode: EmitMode::Vertices,
            min_scale: 1.0,
            max_scale: 1.0,
            scale_distribution: ScaleDistribution::Quadratic,
            vertical_alignment: 1.0,
            offset_along_normal: 0.0,
            min_slope_degrees: 0.0,
            max_slope_degrees: 180.0,
            min_surface_normal_y: -1.0,
            max_surface_normal_y: 1.0,
            min_height: f32::NEG_INFINITY,
            max_height: f32::INFINITY,
            random_vertical_flip: false,
            noise_dimension: NoiseDimension::ThreeD,
            noise_on_scale: 0.0,
        }
    }
}

/// Names one configurable setting in change notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Property {
    Density,
    EmitMode,
    MinScale,
    MaxScale,
    ScaleDistribution,
    VerticalAlignment,
    OffsetAlongNormal,
    MinSlopeDegrees,
    MaxSlopeDegrees,
    MinHeight,
    MaxHeight,
    RandomVerticalFlip,
    Noise,
    NoiseDimension,
    NoiseOnScale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigChange {
    pub revision: u64,
    pub property: Property,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub type ChangeListener = Box<dyn Fn(&ConfigChange) + Send + Sync>;

/// Places instances on block surfaces.
///
/// Generation only reads the configuration, so any number of calls may run
/// against one generator at once. Setters take `&mut self`; callers sharing
/// a generator across threads serialize edits behind a lock.
pub struct InstanceGenerator {
    params: GeneratorParams,
    noise: Option<Arc<dyn NoiseSource>>,
    revision: u64,
    listeners: Vec<(ListenerId, ChangeListener)>,
    next_listener: u64,
}

impl Default for InstanceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InstanceGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceGenerator")
            .field("params", &self.params)
            .field("has_noise", &self.noise.is_some())
            .field("revision", &self.revision)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl InstanceGenerator {
    pub fn new() -> Self {
        Self {
            params: GeneratorParams::default(),
            noise: None,
            revision: 0,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Starts from a snapshot pushed through every setter, so values are
    /// clamped, NaN fields keep their defaults and the normal-Y band is
    /// derived from the slope angles. The result is at revision 0.
    pub fn with_params(params: GeneratorParams) -> Self {
        let mut g = Self::new();
        g.set_density(params.density);
        g.set_emit_mode(params.emit_mode);
        g.set_min_scale(params.min_scale);
        g.set_max_scale(params.max_scale);
        g.set_scale_distribution(params.scale_distribution);
        g.set_vertical_alignment(params.vertical_alignment);
        g.set_offset_along_normal(params.offset_along_normal);
        g.set_min_slope_degrees(params.min_slope_degrees);
        g.set_max_slope_degrees(params.max_slope_degrees);
        g.set_min_height(params.min_height);
        g.set_max_height(params.max_height);
        g.set_random_vertical_flip(params.random_vertical_flip);
        g.set_noise_dimension(params.noise_dimension);
        g.set_noise_on_scale(params.noise_on_scale);
        g.revision = 0;
        g
    }

    #[inline]
    pub fn params(&self) -> &GeneratorParams {
        &self.params
    }

    /// Bumped once per effective configuration change.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&ConfigChange) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, property: Property) {
        self.revision += 1;
        let change = ConfigChange {
            revision: self.revision,
            property,
        };
        log::debug!("instance generator {:?} changed (rev {})", property, self.revision);
        for (_, listener) in &self.listeners {
            listener(&change);
        }
    }

    fn rejects_nan(property: Property, value: f32) -> bool {
        if value.is_nan() {
            log::warn!("ignoring NaN for {:?}", property);
            return true;
        }
        false
    }

    fn update<T: PartialEq + Copy>(
        &mut self,
        property: Property,
        value: T,
        field: fn(&mut GeneratorParams) -> &mut T,
    ) -> bool {
        let slot = field(&mut self.params);
        if *slot == value {
            return false;
        }
        *slot = value;
        self.notify(property);
        true
    }

    fn update_f32(
        &mut self,
        property: Property,
        value: f32,
        field: fn(&mut GeneratorParams) -> &mut f32,
    ) -> bool {
        if Self::rejects_nan(property, value) {
            return false;
        }
        self.update(property, value, field)
    }

    // --- configuration surface ---

    pub fn density(&self) -> f32 {
        self.params.density
    }

    /// Clamped to [0, 1].
    pub fn set_density(&mut self, density: f32) {
        self.update_f32(Property::Density, density.clamp(0.0, 1.0), |p| &mut p.density);
    }

    pub fn emit_mode(&self) -> EmitMode {
        self.params.emit_mode
    }

    pub fn set_emit_mode(&mut self, mode: EmitMode) {
        self.update(Property::EmitMode, mode, |p| &mut p.emit_mode);
    }

    pub fn min_scale(&self) -> f32 {
        self.params.min_scale
    }

    pub fn set_min_scale(&mut self, scale: f32) {
        self.update_f32(Property::MinScale, scale.max(0.0), |p| &mut p.min_scale);
    }

    pub fn max_scale(&self) -> f32 {
        self.params.max_scale
    }

    pub fn set_max_scale(&mut self, scale: f32) {
        self.update_f32(Property::MaxScale, scale.max(0.0), |p| &mut p.max_scale);
    }

    pub fn scale_distribution(&self) -> ScaleDistribution {
        self.params.scale_distribution
    }

    pub fn set_scale_distribution(&mut self, distribution: ScaleDistribution) {
        self.update(Property::ScaleDistribution, distribution, |p| {
            &mut p.scale_distribution
        });
    }

    pub fn vertical_alignment(&self) -> f32 {
        self.params.vertical_alignment
    }

    /// 0 follows the surface normal, 1 follows the up reference.
    pub fn set_vertical_alignment(&mut self, amount: f32) {
        self.update_f32(Property::VerticalAlignment, amount.clamp(0.0, 1.0), |p| {
            &mut p.vertical_alignment
        });
    }

    pub fn offset_along_normal(&self) -> f32 {
        self.params.offset_along_normal
    }

    pub fn set_offset_along_normal(&mut self, offset: f32) {
        self.update_f32(Property::OffsetAlongNormal, offset, |p| {
            &mut p.offset_along_normal
        });
    }

    pub fn min_slope_degrees(&self) -> f32 {
        self.params.min_slope_degrees
    }

    /// Clamped to [0, 180]. Sets the upper normal-Y bound.
    pub fn set_min_slope_degrees(&mut self, degrees: f32) {
        if Self::rejects_nan(Property::MinSlopeDegrees, degrees) {
            return;
        }
        let degrees = degrees.clamp(0.0, 180.0);
        if degrees == self.params.min_slope_degrees {
            return;
        }
        self.params.min_slope_degrees = degrees;
        self.params.max_surface_normal_y = degrees.to_radians().cos().min(1.0);
        self.warn_inverted_slopes();
        self.notify(Property::MinSlopeDegrees);
    }

    pub fn max_slope_degrees(&self) -> f32 {
        self.params.max_slope_degrees
    }

    /// Clamped to [0, 180]. Sets the lower normal-Y bound.
    pub fn set_max_slope_degrees(&mut self, degrees: f32) {
        if Self::rejects_nan(Property::MaxSlopeDegrees, degrees) {
            return;
        }
        let degrees = degrees.clamp(0.0, 180.0);
        if degrees == self.params.max_slope_degrees {
            return;
        }
        self.params.max_slope_degrees = degrees;
        self.params.min_surface_normal_y = degrees.to_radians().cos().max(-1.0);
        self.warn_inverted_slopes();
        self.notify(Property::MaxSlopeDegrees);
    }

    // Inverted bounds are kept; they accept nothing.
    fn warn_inverted_slopes(&self) {
        if self.params.min_slope_degrees > self.params.max_slope_degrees {
            log::warn!(
                "min slope {}° exceeds max slope {}°, no surface will pass the slope filter",
                self.params.min_slope_degrees,
                self.params.max_slope_degrees
            );
        }
    }

    /// Normal-Y band accepted by the slope filter, `(min, max)`.
    pub fn surface_normal_y_range(&self) -> (f32, f32) {
        (
            self.params.min_surface_normal_y,
            self.params.max_surface_normal_y,
        )
    }

    pub fn min_height(&self) -> f32 {
        self.params.min_height
    }

    pub fn set_min_height(&mut self, height: f32) {
        self.update_f32(Property::MinHeight, height, |p| &mut p.min_height);
    }

    pub fn max_height(&self) -> f32 {
        self.params.max_height
    }

    pub fn set_max_height(&mut self, height: f32) {
        self.update_f32(Property::MaxHeight, height, |p| &mut p.max_height);
    }

    /// Back to the unbounded sentinels.
    pub fn clear_height_range(&mut self) {
        self.set_min_height(f32::NEG_INFINITY);
        self.set_max_height(f32::INFINITY);
    }

    pub fn random_vertical_flip(&self) -> bool {
        self.params.random_vertical_flip
    }

    pub fn set_random_vertical_flip(&mut self, enabled: bool) {
        self.update(Property::RandomVerticalFlip, enabled, |p| {
            &mut p.random_vertical_flip
        });
    }

    pub fn noise(&self) -> Option<&Arc<dyn NoiseSource>> {
        self.noise.as_ref()
    }

    /// Replacing the source with the same `Arc` is not a change.
    pub fn set_noise(&mut self, noise: Option<Arc<dyn NoiseSource>>) {
        let same = match (&self.noise, &noise) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }
        self.noise = noise;
        self.notify(Property::Noise);
    }

    pub fn noise_dimension(&self) -> NoiseDimension {
        self.params.noise_dimension
    }

    pub fn set_noise_dimension(&mut self, dimension: NoiseDimension) {
        self.update(Property::NoiseDimension, dimension, |p| {
            &mut p.noise_dimension
        });
    }

    pub fn noise_on_scale(&self) -> f32 {
        self.params.noise_on_scale
    }

    /// Clamped to [0, 1].
    pub fn set_noise_on_scale(&mut self, amount: f32) {
        self.update_f32(Property::NoiseOnScale, amount.clamp(0.0, 1.0), |p| {
            &mut p.noise_on_scale
        });
    }

    // --- generation ---

    pub fn generate(
        &self,
        request: &GenerateRequest<'_>,
        scratch: &mut ScratchBuffers,
    ) -> Result<Vec<Placement>, GenerateError> {
        let mut out = Vec::new();
        self.generate_into(request, scratch, &mut out)?;
        Ok(out)
    }

    /// Like [`generate`](Self::generate) but reuses `out`. `out` is cleared
    /// first and stays empty on error.
    pub fn generate_into(
        &self,
        request: &GenerateRequest<'_>,
        scratch: &mut ScratchBuffers,
        out: &mut Vec<Placement>,
    ) -> Result<(), GenerateError> {
        out.clear();
        let p = &self.params;
        request.validate(p.emit_mode)?;

        let seed = BlockSeed::new(request.grid_position, request.lod_index, request.layer_id);
        let origin = request.block_transform.origin;
        let candidates = &mut scratch.candidates;

        let mut rng = seed.selection_rng();
        sample_candidates(&request.surface, p.emit_mode, p.density, &mut rng, candidates);
        let sampled = candidates.len();

        if request.octant_mask != ALL_OCTANTS {
            retain_octants(candidates, request.octant_mask, request.block_size);
        }
        if let Some(noise) = &self.noise {
            retain_noise(candidates, noise.as_ref(), p.noise_dimension, origin);
        }

        let builder = PlacementBuilder {
            params: p,
            has_noise: self.noise.is_some(),
            seed,
            up_mode: request.up_mode,
            block_origin: origin,
            half_size: request.block_size * 0.5,
        };
        out.reserve(candidates.len());
        out.extend(candidates.iter().filter_map(|c| builder.build(c)));
        candidates.clear();

        log::trace!(
            "block {:?} layer {}: {} sampled, {} placed",
            request.grid_position,
            request.layer_id,
            sampled,
            out.len()
        );
        Ok(())
    }

    /// One-off generation with its own scratch, returning scaled transforms.
    pub fn generate_transforms(
        &self,
        request: &GenerateRequest<'_>,
    ) -> Result<Vec<Transform>, GenerateError> {
        let mut scratch = ScratchBuffers::new();
        let placements = self.generate(request, &mut scratch)?;
        Ok(placements.iter().map(Placement::transform).collect())
    }
}
