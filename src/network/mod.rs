pub mod artifact;
pub mod classifier;
pub mod label_map;
pub mod metadata;

pub use artifact::{load_artifact, load_model, save_artifact};
pub use classifier::{Classifier, Head};
pub use label_map::LabelMap;
pub use metadata::ModelMetadata;
