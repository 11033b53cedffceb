use std::path::PathBuf;

use thiserror::Error;

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Preprocess error: {0}")]
    Preprocess(#[from] PreprocessError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the offline jobs that walk the dataset directories.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid split fractions: test_size={test_size}, val_size={val_size} (each must be >= 0 and their sum in (0, 1))")]
    InvalidFractions { test_size: f64, val_size: f64 },
    #[error("no class subdirectories found in {0}")]
    NoClasses(PathBuf),
    #[error("no images found in {0}")]
    Empty(PathBuf),
    #[error("class '{class}' in {dir} is not part of the label map")]
    UnknownClass { class: String, dir: PathBuf },
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
}

impl DatasetError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::Io { path: path.into(), source }
    }
}

/// Failures while reading, validating or writing model artifacts.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed safetensors data: {0}")]
    SafeTensors(String),
    #[error("tensor '{0}' is missing")]
    MissingTensor(String),
    #[error("tensor '{name}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("tensor '{name}' has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },
    #[error("invalid model metadata: {0}")]
    Metadata(String),
    #[error("invalid label map: {0}")]
    LabelMap(String),
    #[error("label map has {labels} classes but the model outputs {outputs}")]
    LabelCountMismatch { labels: usize, outputs: usize },
}

impl ModelError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ModelError::Io { path: path.into(), source }
    }
}

impl From<safetensors::SafeTensorError> for ModelError {
    fn from(err: safetensors::SafeTensorError) -> Self {
        ModelError::SafeTensors(err.to_string())
    }
}

/// Failures while turning uploaded bytes into a network input.
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("cannot identify image file: {0}")]
    Decode(String),
    #[error("image has zero width or height")]
    EmptyImage,
}
