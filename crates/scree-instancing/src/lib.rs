//! Procedural instance placement over block surface meshes.
//!
//! A generator samples candidate points on a block's surface, thins them
//! with octant, noise, slope and height filters, and turns the survivors
//! into oriented, scaled placements. Output is a pure function of the block
//! identity, its surface, its transform and the configuration.
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod filters;
pub mod generator;
pub mod noise;
pub mod placement;
pub mod sampler;
pub mod scratch;
pub mod seed;
pub mod settings;
pub mod surface;

pub use config::{LayerConfig, LayerSetConfig, load_layers_from_path};
pub use error::{ConfigError, GenerateError, GeometryIssue};
pub use generator::{
    ChangeListener, ConfigChange, GeneratorParams, InstanceGenerator, ListenerId, Property,
};
pub use noise::{ConstantNoise, NoiseSettings, NoiseSource};
pub use placement::Placement;
pub use sampler::Candidate;
pub use scratch::{PooledScratch, ScratchBuffers, ScratchPool};
pub use seed::BlockSeed;
pub use settings::{EmitMode, NoiseDimension, ScaleDistribution, UpMode};
pub use surface::{ALL_OCTANTS, GenerateRequest, MeshSurface, SurfaceArrays};
