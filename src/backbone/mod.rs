//! Frozen ImageNet-pretrained feature extractor.

pub mod conv;
pub mod mobilenet;
pub mod weights;

pub use mobilenet::MobileNetV2;
pub use weights::TensorStore;
