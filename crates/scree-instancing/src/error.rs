use thiserror::Error;

/// Why a surface was refused before any sampling happened.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GeometryIssue {
    #[error("vertex array is empty")]
    EmptyVertices,
    #[error("normal array has {normals} entries for {vertices} vertices")]
    NormalCountMismatch { vertices: usize, normals: usize },
    #[error("index count {0} is not a multiple of 3")]
    IndexCountNotTriangles(usize),
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum GenerateError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] GeometryIssue),
    #[error("block size must be finite and positive, got {0}")]
    InvalidBlockSize(f32),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown emit mode {0:?}")]
    UnknownEmitMode(String),
    #[error("unknown scale distribution {0:?}")]
    UnknownScaleDistribution(String),
    #[error("unknown noise dimension {0:?}")]
    UnknownNoiseDimension(String),
    #[error("unknown up mode {0:?}")]
    UnknownUpMode(String),
    #[error("unknown noise type {0:?}")]
    UnknownNoiseType(String),
    #[error("unknown fractal type {0:?}")]
    UnknownFractalType(String),
    #[error("layer id {0} is declared more than once")]
    DuplicateLayer(i32),
    #[error("config read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse failed: {0}")]
    Parse(#[from] toml::de::Error),
}
