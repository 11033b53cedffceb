use std::sync::mpsc;
use std::sync::{atomic::AtomicBool, Arc};

use crate::data::augment::AugmentationConfig;
use crate::train::callbacks::{EarlyStopping, ReduceLrOnPlateau};
use crate::train::epoch_stats::EpochStats;

/// Configuration for a `fit` run.
///
/// # Fields
/// - `epochs`        : maximum number of full passes over the training data
/// - `batch_size`    : images per mini-batch
/// - `learning_rate` : initial Adam step size
/// - `seed`          : drives shuffling, augmentation and dropout
/// - `early_stopping`: `None` trains for all `epochs`
/// - `reduce_lr`     : `None` keeps the learning rate fixed
/// - `progress_tx`   : optional channel sender; one `EpochStats` is sent per
///                      completed epoch. A dropped receiver is ignored.
/// - `stop_flag`     : optional atomic flag; when set to `true` from another
///                      thread the loop terminates after the current epoch.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub augmentation: AugmentationConfig,
    pub early_stopping: Option<EarlyStopping>,
    pub reduce_lr: Option<ReduceLrOnPlateau>,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl FitConfig {
    /// Creates a plain `FitConfig`: no augmentation, no callbacks, no
    /// progress channel and no stop flag.
    pub fn new(epochs: usize, batch_size: usize, learning_rate: f64) -> Self {
        FitConfig {
            epochs,
            batch_size,
            learning_rate,
            seed: 42,
            augmentation: AugmentationConfig::none(),
            early_stopping: None,
            reduce_lr: None,
            progress_tx: None,
            stop_flag: None,
        }
    }
}
