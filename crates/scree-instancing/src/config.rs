//! Layer definitions loaded from TOML.
//!
//! ```toml
//! [[layers]]
//! id = 0
//! name = "pebbles"
//! density = 0.4
//! emit_mode = "faces"
//! max_slope_degrees = 35.0
//!
//! [layers.noise]
//! seed = 7
//! frequency = 0.02
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use hashbrown::HashSet;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::generator::InstanceGenerator;
use crate::noise::{NoiseSettings, NoiseSource};
use crate::settings::{EmitMode, NoiseDimension, ScaleDistribution};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LayerSetConfig {
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LayerConfig {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default = "d_density")]
    pub density: f32,
    #[serde(default)]
    pub emit_mode: EmitMode,
    #[serde(default = "d_scale")]
    pub min_scale: f32,
    #[serde(default = "d_scale")]
    pub max_scale: f32,
    #[serde(default)]
    pub scale_distribution: ScaleDistribution,
    #[serde(default = "d_vertical_alignment")]
    pub vertical_alignment: f32,
    #[serde(default)]
    pub offset_along_normal: f32,
    #[serde(default)]
    pub min_slope_degrees: f32,
    #[serde(default = "d_max_slope")]
    pub max_slope_degrees: f32,
    /// Unbounded when absent.
    #[serde(default)]
    pub min_height: Option<f32>,
    #[serde(default)]
    pub max_height: Option<f32>,
    #[serde(default)]
    pub random_vertical_flip: bool,
    #[serde(default)]
    pub noise: Option<NoiseSettings>,
    #[serde(default)]
    pub noise_dimension: NoiseDimension,
    #[serde(default)]
    pub noise_on_scale: f32,
}

fn d_density() -> f32 {
    0.1
}
fn d_scale() -> f32 {
    1.0
}
fn d_vertical_alignment() -> f32 {
    1.0
}
fn d_max_slope() -> f32 {
    180.0
}

impl LayerSetConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: LayerSetConfig = toml::from_str(s)?;
        cfg.check_unique_ids()?;
        Ok(cfg)
    }

    fn check_unique_ids(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::with_capacity(self.layers.len());
        for layer in &self.layers {
            if !seen.insert(layer.id) {
                return Err(ConfigError::DuplicateLayer(layer.id));
            }
        }
        Ok(())
    }

    pub fn layer(&self, id: i32) -> Option<&LayerConfig> {
        self.layers.iter().find(|l| l.id == id)
    }
}

pub fn load_layers_from_path(path: &Path) -> Result<LayerSetConfig, ConfigError> {
    let s = fs::read_to_string(path)?;
    LayerSetConfig::from_toml_str(&s)
}

impl LayerConfig {
    /// Display name, falling back to the id.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("layer{}", self.id)
        } else {
            self.name.clone()
        }
    }

    pub fn build_noise(&self) -> Result<Option<Arc<dyn NoiseSource>>, ConfigError> {
        match &self.noise {
            Some(settings) => {
                let noise: Arc<dyn NoiseSource> = Arc::new(settings.build()?);
                Ok(Some(noise))
            }
            None => Ok(None),
        }
    }

    pub fn build_generator(&self) -> Result<InstanceGenerator, ConfigError> {
        let mut generator = InstanceGenerator::new();
        self.apply_to(&mut generator)?;
        Ok(generator)
    }

    /// Pushes every field through the generator's setters, so only values
    /// that differ bump the revision. A configured noise table always
    /// produces a fresh source.
    pub fn apply_to(&self, g: &mut InstanceGenerator) -> Result<(), ConfigError> {
        // Built first: a bad noise table leaves the generator untouched.
        let noise = self.build_noise()?;
        self.apply_settings_to(g);
        g.set_noise(noise);
        Ok(())
    }

    /// Every field except the noise source.
    pub fn apply_settings_to(&self, g: &mut InstanceGenerator) {
        g.set_density(self.density);
        g.set_emit_mode(self.emit_mode);
        g.set_min_scale(self.min_scale);
        g.set_max_scale(self.max_scale);
        g.set_scale_distribution(self.scale_distribution);
        g.set_vertical_alignment(self.vertical_alignment);
        g.set_offset_along_normal(self.offset_along_normal);
        g.set_min_slope_degrees(self.min_slope_degrees);
        g.set_max_slope_degrees(self.max_slope_degrees);
        g.set_min_height(self.min_height.unwrap_or(f32::NEG_INFINITY));
        g.set_max_height(self.max_height.unwrap_or(f32::INFINITY));
        g.set_random_vertical_flip(self.random_vertical_flip);
        g.set_noise_dimension(self.noise_dimension);
        g.set_noise_on_scale(self.noise_on_scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[layers]]
        id = 0
        name = "grass"
        density = 0.8
        emit_mode = "faces"
        max_slope_degrees = 40.0
        min_height = 2.0

        [[layers]]
        id = 3
        scale_distribution = "cubic"
        min_scale = 0.5
        max_scale = 2.0
        noise_dimension = "2d"
        noise_on_scale = 0.5

        [layers.noise]
        seed = 11
        fractal_type = "fbm"
    "#;

    #[test]
    fn parses_with_defaults() {
        let cfg = LayerSetConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.layers.len(), 2);
        let grass = cfg.layer(0).unwrap();
        assert_eq!(grass.emit_mode, EmitMode::Faces);
        assert_eq!(grass.vertical_alignment, 1.0);
        assert_eq!(grass.max_height, None);
        assert!(grass.noise.is_none());

        let rocks = cfg.layer(3).unwrap();
        assert_eq!(rocks.display_name(), "layer3");
        assert_eq!(rocks.scale_distribution, ScaleDistribution::Cubic);
        assert_eq!(rocks.noise.as_ref().unwrap().frequency, 0.05);
    }

    #[test]
    fn builds_generator() {
        let cfg = LayerSetConfig::from_toml_str(SAMPLE).unwrap();
        let g = cfg.layer(0).unwrap().build_generator().unwrap();
        assert_eq!(g.density(), 0.8);
        assert_eq!(g.min_height(), 2.0);
        assert_eq!(g.max_height(), f32::INFINITY);
        let (lo, _) = g.surface_normal_y_range();
        assert!((lo - 40f32.to_radians().cos()).abs() < 1e-6);

        let g = cfg.layer(3).unwrap().build_generator().unwrap();
        assert!(g.noise().is_some());
        assert_eq!(g.noise_dimension(), NoiseDimension::TwoD);
    }

    #[test]
    fn reapplying_identical_layer_changes_nothing() {
        let cfg = LayerSetConfig::from_toml_str(SAMPLE).unwrap();
        let layer = cfg.layer(0).unwrap();
        let mut g = layer.build_generator().unwrap();
        let rev = g.revision();
        layer.apply_to(&mut g).unwrap();
        assert_eq!(g.revision(), rev);
    }

    #[test]
    fn settings_only_keeps_noise_source() {
        let cfg = LayerSetConfig::from_toml_str(SAMPLE).unwrap();
        let layer = cfg.layer(3).unwrap();
        let mut g = layer.build_generator().unwrap();
        let rev = g.revision();
        layer.apply_settings_to(&mut g);
        assert_eq!(g.revision(), rev);
        layer.apply_to(&mut g).unwrap();
        assert_eq!(g.revision(), rev + 1);
    }

    #[test]
    fn rejects_duplicates_and_unknown_enums() {
        let dup = "[[layers]]\nid = 1\n[[layers]]\nid = 1\n";
        assert!(matches!(
            LayerSetConfig::from_toml_str(dup),
            Err(ConfigError::DuplicateLayer(1))
        ));
        let bad = "[[layers]]\nid = 1\nemit_mode = \"edges\"\n";
        assert!(matches!(
            LayerSetConfig::from_toml_str(bad),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_layers_from_path(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
