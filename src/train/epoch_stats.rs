use serde::{Deserialize, Serialize};

/// Per-epoch training statistics produced by `fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Mean training loss over all samples in this epoch (dropout active).
    pub train_loss: f64,
    /// Training accuracy as a fraction in [0, 1].
    pub train_accuracy: f64,
    /// Mean validation loss; `None` when the validation split is empty.
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    /// Learning rate the epoch was trained with.
    pub learning_rate: f64,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Everything `fit` observed, in epoch order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochStats>,
    pub stopped_early: bool,
    /// Epoch whose head weights were kept, when early stopping rolled back.
    pub restored_epoch: Option<usize>,
}

impl History {
    pub fn best_val_accuracy(&self) -> Option<f64> {
        self.epochs.iter().filter_map(|e| e.val_accuracy).fold(None, |best, v| match best {
            Some(b) if b >= v => Some(b),
            _ => Some(v),
        })
    }
}
