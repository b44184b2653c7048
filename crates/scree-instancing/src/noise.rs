use fastnoise_lite::{FastNoiseLite, FractalType, NoiseType};
use serde::Deserialize;

use crate::error::ConfigError;

/// Read-only scalar field used to thin out and modulate placements.
///
/// Implementations must be pure functions of position: many generation
/// calls may sample the same source concurrently.
pub trait NoiseSource: Send + Sync {
    fn noise_2d(&self, x: f32, z: f32) -> f32;
    fn noise_3d(&self, x: f32, y: f32, z: f32) -> f32;
}

impl NoiseSource for FastNoiseLite {
    #[inline]
    fn noise_2d(&self, x: f32, z: f32) -> f32 {
        self.get_noise_2d(x, z)
    }

    #[inline]
    fn noise_3d(&self, x: f32, y: f32, z: f32) -> f32 {
        self.get_noise_3d(x, y, z)
    }
}

/// Same value everywhere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantNoise(pub f32);

impl NoiseSource for ConstantNoise {
    #[inline]
    fn noise_2d(&self, _x: f32, _z: f32) -> f32 {
        self.0
    }

    #[inline]
    fn noise_3d(&self, _x: f32, _y: f32, _z: f32) -> f32 {
        self.0
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct NoiseSettings {
    #[serde(default)]
    pub seed: i32,
    #[serde(default = "default_frequency")]
    pub frequency: f32,
    #[serde(default = "default_noise_type")]
    pub noise_type: String,
    #[serde(default = "default_fractal_type")]
    pub fractal_type: String,
    #[serde(default = "default_octaves")]
    pub octaves: i32,
}

fn default_frequency() -> f32 {
    0.05
}
fn default_noise_type() -> String {
    "open_simplex2".into()
}
fn default_fractal_type() -> String {
    "none".into()
}
fn default_octaves() -> i32 {
    3
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            frequency: default_frequency(),
            noise_type: default_noise_type(),
            fractal_type: default_fractal_type(),
            octaves: default_octaves(),
        }
    }
}

impl NoiseSettings {
    pub fn build(&self) -> Result<FastNoiseLite, ConfigError> {
        let noise_type = match self.noise_type.to_ascii_lowercase().as_str() {
            "open_simplex2" => NoiseType::OpenSimplex2,
            "open_simplex2s" => NoiseType::OpenSimplex2S,
            "cellular" => NoiseType::Cellular,
            "perlin" => NoiseType::Perlin,
            "value_cubic" => NoiseType::ValueCubic,
            "value" => NoiseType::Value,
            _ => return Err(ConfigError::UnknownNoiseType(self.noise_type.clone())),
        };
        let fractal_type = match self.fractal_type.to_ascii_lowercase().as_str() {
            "none" => FractalType::None,
            "fbm" => FractalType::FBm,
            "ridged" => FractalType::Ridged,
            "ping_pong" => FractalType::PingPong,
            _ => return Err(ConfigError::UnknownFractalType(self.fractal_type.clone())),
        };
        let layered = !matches!(fractal_type, FractalType::None);
        let mut noise = FastNoiseLite::with_seed(self.seed);
        noise.set_noise_type(Some(noise_type));
        noise.set_frequency(Some(self.frequency));
        noise.set_fractal_type(Some(fractal_type));
        if layered {
            noise.set_fractal_octaves(Some(self.octaves.max(1)));
        }
        Ok(noise)
    }
}
