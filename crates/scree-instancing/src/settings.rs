//! Closed enumerations of the generator's configuration surface.
//!
//! Raw integers (editor enum indices) and strings (config files) are
//! validated here, so the generation path only ever sees known variants.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum EmitMode {
    /// One Bernoulli trial per mesh vertex.
    #[default]
    Vertices,
    /// `density * triangle_count` points picked on random triangles.
    Faces,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum ScaleDistribution {
    Linear,
    #[default]
    Quadratic,
    Cubic,
    Quintic,
}

impl ScaleDistribution {
    /// Remaps a uniform `r` in [0, 1). Higher powers bias toward the minimum scale.
    #[inline]
    pub fn remap(self, r: f32) -> f32 {
        match self {
            ScaleDistribution::Linear => r,
            ScaleDistribution::Quadratic => r * r,
            ScaleDistribution::Cubic => r * r * r,
            ScaleDistribution::Quintic => r * r * r * r * r,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum NoiseDimension {
    /// Sampled on the horizontal (x, z) plane.
    TwoD,
    #[default]
    ThreeD,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum UpMode {
    /// World +Y.
    #[default]
    ConstantUp,
    /// Radially outward from the parent frame origin.
    Sphere,
}

macro_rules! closed_enum {
    ($ty:ident, $err:ident, [$(($idx:literal, $name:literal, $variant:ident)),+ $(,)?]) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }

            pub fn index(self) -> i32 {
                match self {
                    $($ty::$variant => $idx,)+
                }
            }
        }

        impl TryFrom<i32> for $ty {
            type Error = ConfigError;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $($idx => Ok($ty::$variant),)+
                    other => Err(ConfigError::$err(other.to_string())),
                }
            }
        }

        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(ConfigError::$err(s.to_string())),
                }
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ConfigError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

closed_enum!(EmitMode, UnknownEmitMode, [(0, "vertices", Vertices), (1, "faces", Faces)]);
closed_enum!(
    ScaleDistribution,
    UnknownScaleDistribution,
    [
        (0, "linear", Linear),
        (1, "quadratic", Quadratic),
        (2, "cubic", Cubic),
        (3, "quintic", Quintic),
    ]
);
closed_enum!(NoiseDimension, UnknownNoiseDimension, [(0, "2d", TwoD), (1, "3d", ThreeD)]);
closed_enum!(UpMode, UnknownUpMode, [(0, "constant_up", ConstantUp), (1, "sphere", Sphere)]);
