pub mod callbacks;
pub mod epoch_stats;
pub mod loop_fn;
pub mod train_config;

pub use callbacks::{EarlyStopping, Monitor, ReduceLrOnPlateau};
pub use epoch_stats::{EpochStats, History};
pub use loop_fn::{evaluate, extract_features, fit, Evaluation};
pub use train_config::FitConfig;
