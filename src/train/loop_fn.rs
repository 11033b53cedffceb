use std::sync::atomic::Ordering;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::data::augment::AugmentationConfig;
use crate::data::loader::ImageFolder;
use crate::error::DatasetError;
use crate::loss::{accuracy, SparseCrossEntropyLoss};
use crate::math::{ImageBatch, Matrix};
use crate::network::classifier::{Classifier, Head};
use crate::optim::Adam;
use crate::train::callbacks::{EarlyStoppingTracker, PlateauTracker, Verdict};
use crate::train::epoch_stats::{EpochStats, History};
use crate::train::train_config::FitConfig;

/// Loss and accuracy of a model over a labeled set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
    pub samples: usize,
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Trains the head of `classifier` on `train`, validating on `val` after
/// every epoch, and returns the per-epoch history.
///
/// The backbone is frozen, so validation features are extracted once up
/// front. Training images are augmented and passed through dropout; validation
/// images are not.
///
/// # Early termination
/// The loop ends before `config.epochs` if:
/// - early stopping fires (the best head is restored when configured), **or**
/// - `config.stop_flag` is set to `true`.
pub fn fit(
    classifier: &mut Classifier,
    train: &ImageFolder,
    val: &ImageFolder,
    config: &FitConfig,
) -> Result<History, DatasetError> {
    if train.is_empty() {
        return Err(DatasetError::Empty(train.root().to_path_buf()));
    }
    let batch_size = config.batch_size.max(1);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut optimizer = Adam::new(config.learning_rate);
    let mut early_stopping = config.early_stopping.map(EarlyStoppingTracker::new);
    let mut plateau = config.reduce_lr.map(PlateauTracker::new);
    let mut best_head: Option<Head> = None;
    let mut history = History::default();

    let (val_features, val_labels) = extract_features(classifier, val, batch_size)?;
    info!(train = train.len(), val = val_labels.len(), classes = classifier.num_classes(), "starting training");

    for epoch in 1..=config.epochs {
        if stop_requested(config) {
            break;
        }
        let t_start = Instant::now();

        // ── One full pass over the training data ───────────────────────────
        let (train_loss, train_accuracy) = run_one_epoch(classifier, train, &mut optimizer, config, &mut rng)?;

        // ── Validation ────────────────────────────────────────────────────
        let val_eval = score(&classifier.head, &val_features, &val_labels);

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss,
            train_accuracy,
            val_loss: val_eval.map(|e| e.loss),
            val_accuracy: val_eval.map(|e| e.accuracy),
            learning_rate: optimizer.learning_rate,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        info!(
            epoch,
            total = config.epochs,
            loss = %format!("{train_loss:.4}"),
            accuracy = %format!("{train_accuracy:.4}"),
            val_loss = ?stats.val_loss,
            val_accuracy = ?stats.val_accuracy,
            lr = stats.learning_rate,
            "epoch finished"
        );
        if let Some(ref tx) = config.progress_tx {
            let _ = tx.send(stats.clone());
        }

        // ── Callbacks ─────────────────────────────────────────────────────
        let verdict = early_stopping.as_mut().map(|t| t.update(&stats));
        if let Some(plateau) = plateau.as_mut() {
            if let Some(lr) = plateau.update(&stats, optimizer.learning_rate) {
                info!(from = optimizer.learning_rate, to = lr, "reducing learning rate");
                optimizer.learning_rate = lr;
            }
        }
        history.epochs.push(stats);

        match verdict {
            Some(Verdict::Improved) => best_head = Some(classifier.head.clone()),
            Some(Verdict::Stop) => {
                history.stopped_early = true;
                if let (Some(tracker), Some(best)) = (&early_stopping, best_head.take()) {
                    if tracker.restores_best() {
                        classifier.head = best;
                        history.restored_epoch = tracker.best_epoch();
                        info!(epoch = ?tracker.best_epoch(), "restored head weights from the best epoch");
                    }
                }
                info!(epoch, "early stopping");
                break;
            }
            _ => {}
        }
    }

    Ok(history)
}

/// Loss and accuracy of `classifier` over every image of `folder`.
/// An empty folder yields zero samples with zero loss and accuracy.
pub fn evaluate(classifier: &Classifier, folder: &ImageFolder, batch_size: usize) -> Result<Evaluation, DatasetError> {
    let (features, labels) = extract_features(classifier, folder, batch_size.max(1))?;
    Ok(score(&classifier.head, &features, &labels).unwrap_or(Evaluation { loss: 0.0, accuracy: 0.0, samples: 0 }))
}

/// Backbone features for every sample of `folder`, in sample order.
pub fn extract_features(
    classifier: &Classifier,
    folder: &ImageFolder,
    batch_size: usize,
) -> Result<(Matrix, Vec<usize>), DatasetError> {
    let dim = classifier.backbone.feature_dim();
    let mut data = Vec::with_capacity(folder.len() * dim);
    let mut labels = Vec::with_capacity(folder.len());
    for indices in folder.batches(batch_size) {
        let (batch, batch_labels) = folder.load_batch(&indices)?;
        data.extend(classifier.features(&batch).data);
        labels.extend(batch_labels);
    }
    Ok((Matrix::from_vec(labels.len(), dim, data), labels))
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Runs one epoch of mini-batch Adam over the shuffled training set.
/// Returns the sample-weighted mean loss and accuracy.
fn run_one_epoch<R: Rng + ?Sized>(
    classifier: &mut Classifier,
    train: &ImageFolder,
    optimizer: &mut Adam,
    config: &FitConfig,
    rng: &mut R,
) -> Result<(f64, f64), DatasetError> {
    let mut total_loss = 0.0;
    let mut total_correct = 0.0;

    for indices in train.shuffled_batches(config.batch_size.max(1), rng) {
        let (mut batch, labels) = train.load_batch(&indices)?;
        if !config.augmentation.is_identity() {
            augment_batch(&mut batch, &config.augmentation, rng);
        }

        let features = classifier.features(&batch);
        let dropped = classifier.head.dropout.forward_train(&features, rng);
        let probs = classifier.head.dense.feed_from(&dropped);

        let n = labels.len() as f64;
        total_loss += SparseCrossEntropyLoss::loss(&probs, &labels) as f64 * n;
        total_correct += accuracy(&probs, &labels) as f64 * n;

        let delta = SparseCrossEntropyLoss::derivative(&probs, &labels);
        let (w_grad, b_grad) = classifier.head.dense.compute_gradients(&dropped, &delta);
        optimizer.step(&mut classifier.head.dense, &w_grad, &b_grad);
    }

    let n = train.len() as f64;
    Ok((total_loss / n, total_correct / n))
}

fn augment_batch<R: Rng + ?Sized>(batch: &mut ImageBatch, augmentation: &AugmentationConfig, rng: &mut R) {
    let (height, width) = (batch.height, batch.width);
    for i in 0..batch.len {
        let mut image = batch.image(i).to_vec();
        augmentation.apply(&mut image, height, width, rng);
        batch.image_mut(i).copy_from_slice(&image);
    }
}

/// Inference-mode metrics over precomputed features; `None` for an empty set.
fn score(head: &Head, features: &Matrix, labels: &[usize]) -> Option<Evaluation> {
    if labels.is_empty() {
        return None;
    }
    let probs = head.forward(features);
    Some(Evaluation {
        loss: SparseCrossEntropyLoss::loss(&probs, labels) as f64,
        accuracy: accuracy(&probs, labels) as f64,
        samples: labels.len(),
    })
}

fn stop_requested(config: &FitConfig) -> bool {
    config.stop_flag.as_ref().map_or(false, |flag| flag.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::MobileNetV2;
    use crate::train::callbacks::EarlyStopping;
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc, Arc};
    use tempfile::TempDir;

    const SIZE: u32 = 32;

    fn write_split(root: &Path, per_class: usize) {
        for (class, color) in [("blight", [180u8, 60, 20]), ("healthy", [30, 160, 40])] {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let shade = (i * 7) as u8;
                let img = RgbImage::from_fn(20, 20, |x, _| {
                    let [r, g, b] = color;
                    Rgb([r.saturating_add(shade), g, b.saturating_add((x * 3) as u8)])
                });
                img.save(dir.join(format!("{i}.png"))).unwrap();
            }
        }
    }

    fn fixture(train_n: usize, val_n: usize) -> (TempDir, ImageFolder, ImageFolder) {
        let dir = TempDir::new().unwrap();
        write_split(&dir.path().join("train"), train_n);
        let train = ImageFolder::open(&dir.path().join("train"), SIZE).unwrap();
        let val_root = dir.path().join("val");
        if val_n > 0 {
            write_split(&val_root, val_n);
        } else {
            std::fs::create_dir_all(&val_root).unwrap();
        }
        let val = ImageFolder::open_with_classes(&val_root, train.class_names(), SIZE).unwrap();
        (dir, train, val)
    }

    fn tiny_classifier() -> Classifier {
        let mut rng = StdRng::seed_from_u64(1);
        let backbone = MobileNetV2::random(0.1, &mut rng);
        Classifier::new(backbone, 2, 0.2, SIZE, &mut rng)
    }

    #[test]
    fn fit_records_one_stats_entry_per_epoch() {
        let (_dir, train, val) = fixture(4, 2);
        let mut model = tiny_classifier();
        let before = model.head.clone();
        let (tx, rx) = mpsc::channel();
        let config = FitConfig {
            augmentation: AugmentationConfig::default(),
            progress_tx: Some(tx),
            ..FitConfig::new(3, 3, 0.01)
        };

        let history = fit(&mut model, &train, &val, &config).unwrap();
        assert_eq!(history.epochs.len(), 3);
        assert!(!history.stopped_early);
        assert_eq!(rx.try_iter().count(), 3);
        for (i, stats) in history.epochs.iter().enumerate() {
            assert_eq!(stats.epoch, i + 1);
            assert!(stats.train_loss.is_finite());
            assert!((0.0..=1.0).contains(&stats.train_accuracy));
            assert!(stats.val_loss.is_some_and(f64::is_finite));
            assert_eq!(stats.learning_rate, 0.01);
        }
        assert_ne!(model.head, before);
        assert_eq!(model.backbone, tiny_classifier().backbone);
    }

    #[test]
    fn empty_validation_split_disables_callbacks() {
        let (_dir, train, val) = fixture(2, 0);
        let mut model = tiny_classifier();
        let config = FitConfig {
            early_stopping: Some(EarlyStopping { patience: 1, ..EarlyStopping::default() }),
            ..FitConfig::new(3, 4, 0.001)
        };
        let history = fit(&mut model, &train, &val, &config).unwrap();
        assert_eq!(history.epochs.len(), 3);
        assert!(history.epochs.iter().all(|e| e.val_accuracy.is_none()));
    }

    #[test]
    fn raised_stop_flag_prevents_training() {
        let (_dir, train, val) = fixture(2, 1);
        let mut model = tiny_classifier();
        let config = FitConfig {
            stop_flag: Some(Arc::new(AtomicBool::new(true))),
            ..FitConfig::new(5, 4, 0.001)
        };
        let history = fit(&mut model, &train, &val, &config).unwrap();
        assert!(history.epochs.is_empty());
    }

    #[test]
    fn evaluate_reports_every_sample() {
        let (_dir, train, val) = fixture(3, 2);
        let model = tiny_classifier();
        let eval = evaluate(&model, &val, 3).unwrap();
        assert_eq!(eval.samples, 4);
        assert!(eval.loss.is_finite() && (0.0..=1.0).contains(&eval.accuracy));
        assert_eq!(evaluate(&model, &train, 2).unwrap().samples, 6);
    }
}
