use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::train::epoch_stats::EpochStats;

/// Validation metric a callback watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    ValAccuracy,
    ValLoss,
}

impl Monitor {
    pub fn value(&self, stats: &EpochStats) -> Option<f64> {
        match self {
            Monitor::ValAccuracy => stats.val_accuracy,
            Monitor::ValLoss => stats.val_loss,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Monitor::ValAccuracy => "val_accuracy",
            Monitor::ValLoss => "val_loss",
        }
    }

    /// Whether `current` beats `best` by more than `min_delta`.
    fn improves(&self, current: f64, best: f64, min_delta: f64) -> bool {
        match self {
            Monitor::ValAccuracy => current - min_delta > best,
            Monitor::ValLoss => current + min_delta < best,
        }
    }

    fn worst(&self) -> f64 {
        match self {
            Monitor::ValAccuracy => f64::NEG_INFINITY,
            Monitor::ValLoss => f64::INFINITY,
        }
    }
}

/// Stop once `monitor` has not improved for `patience` epochs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopping {
    pub monitor: Monitor,
    pub patience: usize,
    pub min_delta: f64,
    /// Roll the head back to the best epoch when stopping.
    pub restore_best_weights: bool,
}

impl Default for EarlyStopping {
    fn default() -> Self {
        EarlyStopping {
            monitor: Monitor::ValAccuracy,
            patience: 5,
            min_delta: 0.0,
            restore_best_weights: true,
        }
    }
}

/// Multiply the learning rate by `factor` once `monitor` has not improved for
/// `patience` epochs, never going below `min_lr`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReduceLrOnPlateau {
    pub monitor: Monitor,
    pub factor: f64,
    pub patience: usize,
    pub min_delta: f64,
    pub min_lr: f64,
}

impl Default for ReduceLrOnPlateau {
    fn default() -> Self {
        ReduceLrOnPlateau {
            monitor: Monitor::ValLoss,
            factor: 0.2,
            patience: 3,
            min_delta: 1e-4,
            min_lr: 1e-6,
        }
    }
}

/// What the fit loop should do after an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The monitored value is the best so far; snapshot the weights.
    Improved,
    Continue,
    Stop,
}

#[derive(Debug, Clone)]
pub struct EarlyStoppingTracker {
    config: EarlyStopping,
    best: f64,
    best_epoch: Option<usize>,
    wait: usize,
}

impl EarlyStoppingTracker {
    pub fn new(config: EarlyStopping) -> Self {
        EarlyStoppingTracker { config, best: config.monitor.worst(), best_epoch: None, wait: 0 }
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn restores_best(&self) -> bool {
        self.config.restore_best_weights
    }

    /// `epoch` is the 1-based number carried by `stats`. Stopping is never
    /// signalled after the first epoch.
    pub fn update(&mut self, stats: &EpochStats) -> Verdict {
        let monitor = self.config.monitor;
        let Some(current) = monitor.value(stats) else {
            warn!(monitor = monitor.name(), "early stopping skipped: metric not available");
            return Verdict::Continue;
        };
        self.wait += 1;
        let mut verdict = Verdict::Continue;
        if monitor.improves(current, self.best, self.config.min_delta) {
            self.best = current;
            self.best_epoch = Some(stats.epoch);
            self.wait = 0;
            verdict = Verdict::Improved;
        }
        if self.wait >= self.config.patience && stats.epoch > 1 {
            return Verdict::Stop;
        }
        verdict
    }
}

#[derive(Debug, Clone)]
pub struct PlateauTracker {
    config: ReduceLrOnPlateau,
    best: f64,
    wait: usize,
}

impl PlateauTracker {
    pub fn new(config: ReduceLrOnPlateau) -> Self {
        PlateauTracker { config, best: config.monitor.worst(), wait: 0 }
    }

    /// Returns the new learning rate when a reduction is due.
    pub fn update(&mut self, stats: &EpochStats, learning_rate: f64) -> Option<f64> {
        let monitor = self.config.monitor;
        let Some(current) = monitor.value(stats) else {
            warn!(monitor = monitor.name(), "learning-rate schedule skipped: metric not available");
            return None;
        };
        if monitor.improves(current, self.best, self.config.min_delta) {
            self.best = current;
            self.wait = 0;
            return None;
        }
        self.wait += 1;
        if self.wait >= self.config.patience && learning_rate > self.config.min_lr {
            self.wait = 0;
            return Some((learning_rate * self.config.factor).max(self.config.min_lr));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(epoch: usize, val_loss: f64, val_accuracy: f64) -> EpochStats {
        EpochStats {
            epoch,
            total_epochs: 20,
            train_loss: 0.0,
            train_accuracy: 0.0,
            val_loss: Some(val_loss),
            val_accuracy: Some(val_accuracy),
            learning_rate: 0.001,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn early_stopping_fires_after_patience_flat_epochs() {
        let mut tracker = EarlyStoppingTracker::new(EarlyStopping::default());
        assert_eq!(tracker.update(&stats(1, 1.0, 0.5)), Verdict::Improved);
        assert_eq!(tracker.update(&stats(2, 1.0, 0.7)), Verdict::Improved);
        for epoch in 3..7 {
            assert_eq!(tracker.update(&stats(epoch, 1.0, 0.7)), Verdict::Continue);
        }
        assert_eq!(tracker.update(&stats(7, 1.0, 0.6)), Verdict::Stop);
        assert_eq!(tracker.best_epoch(), Some(2));
    }

    #[test]
    fn equal_accuracy_is_not_an_improvement() {
        let mut tracker = EarlyStoppingTracker::new(EarlyStopping { patience: 1, ..EarlyStopping::default() });
        tracker.update(&stats(1, 1.0, 0.5));
        assert_eq!(tracker.update(&stats(2, 1.0, 0.5)), Verdict::Stop);
    }

    #[test]
    fn plateau_reduces_by_factor_and_respects_the_floor() {
        let mut tracker = PlateauTracker::new(ReduceLrOnPlateau::default());
        assert_eq!(tracker.update(&stats(1, 1.0, 0.0), 0.001), None);
        assert_eq!(tracker.update(&stats(2, 1.0, 0.0), 0.001), None);
        assert_eq!(tracker.update(&stats(3, 1.0, 0.0), 0.001), None);
        let lr = tracker.update(&stats(4, 1.0, 0.0), 0.001).unwrap();
        assert!((lr - 0.0002).abs() < 1e-12);

        let mut tracker = PlateauTracker::new(ReduceLrOnPlateau { patience: 1, ..ReduceLrOnPlateau::default() });
        tracker.update(&stats(1, 1.0, 0.0), 2e-6);
        assert_eq!(tracker.update(&stats(2, 1.0, 0.0), 2e-6), Some(1e-6));
        assert_eq!(tracker.update(&stats(3, 1.0, 0.0), 1e-6), None);
    }

    #[test]
    fn tiny_loss_changes_do_not_count_as_progress() {
        let mut tracker = PlateauTracker::new(ReduceLrOnPlateau { patience: 1, ..ReduceLrOnPlateau::default() });
        tracker.update(&stats(1, 1.0, 0.0), 0.001);
        assert!(tracker.update(&stats(2, 0.99995, 0.0), 0.001).is_some());
    }

    #[test]
    fn missing_metric_is_skipped() {
        let mut tracker = EarlyStoppingTracker::new(EarlyStopping { patience: 1, ..EarlyStopping::default() });
        let mut s = stats(2, 1.0, 0.5);
        s.val_accuracy = None;
        assert_eq!(tracker.update(&s), Verdict::Continue);
    }
}
