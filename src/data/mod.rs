pub mod augment;
pub mod loader;
pub mod splitter;

pub use augment::AugmentationConfig;
pub use loader::{load_image, ImageFolder, Sample};
pub use splitter::{partition, split_dataset, ClassSplit, SplitReport};
