pub mod activation;
pub mod backbone;
pub mod config;
pub mod data;
pub mod error;
pub mod layers;
pub mod logging;
pub mod loss;
pub mod math;
pub mod network;
pub mod optim;
pub mod predict;
pub mod preprocess;
pub mod train;

// Convenience re-exports
pub use backbone::MobileNetV2;
pub use config::{ServerConfig, SplitConfig, TrainingConfig};
pub use data::{split_dataset, ImageFolder};
pub use error::{DatasetError, Error, ModelError, PreprocessError, Result};
pub use math::{ImageBatch, Matrix};
pub use network::{load_model, Classifier, LabelMap};
pub use predict::{top_k, Prediction, PredictionResponse, TOP_K};
pub use preprocess::{preprocess_image, preprocess_upload};
pub use train::{evaluate, fit, FitConfig, History};
