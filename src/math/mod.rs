pub mod feature_map;
pub mod image_batch;
pub mod matrix;

pub use feature_map::FeatureMap;
pub use image_batch::ImageBatch;
pub use matrix::Matrix;
