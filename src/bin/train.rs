//! Trains the leaf-disease classifier on `dataset/train`, validating on
//! `dataset/val`, and writes `model/model.safetensors` plus
//! `model/label_map.json`.
//!
//! Run with:
//!   cargo run --release --bin train
//!
//! The ImageNet-pretrained MobileNetV2 weights are read from
//! `weights/mobilenet_v2.safetensors` (torchvision `features.*` naming).

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use ferrite_leaf::network::save_artifact;
use ferrite_leaf::{evaluate, fit, logging, Classifier, ImageFolder, LabelMap, MobileNetV2, TrainingConfig};

fn main() -> anyhow::Result<()> {
    logging::init();
    let config = TrainingConfig::default();

    let train = ImageFolder::open(&config.train_dir, config.image_size).context("failed to index the training split")?;
    let val = ImageFolder::open_with_classes(&config.val_dir, train.class_names(), config.image_size)
        .context("failed to index the validation split")?;
    info!(classes = train.class_names().len(), train = train.len(), val = val.len(), "datasets indexed");

    let labels = LabelMap::new(train.class_names().to_vec());
    labels.save(&config.label_map_path)?;
    info!(path = %config.label_map_path.display(), "label map written");

    let backbone = MobileNetV2::load_pretrained(&config.backbone_weights, config.width_mult)
        .with_context(|| format!("failed to load pretrained weights from {}", config.backbone_weights.display()))?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut classifier = Classifier::new(backbone, labels.len(), config.dropout, config.image_size, &mut rng);

    let history = fit(&mut classifier, &train, &val, &config.fit_config())?;
    info!(
        epochs = history.epochs.len(),
        stopped_early = history.stopped_early,
        restored_epoch = ?history.restored_epoch,
        best_val_accuracy = ?history.best_val_accuracy(),
        "training finished"
    );

    save_artifact(&classifier, &config.model_path)?;

    let final_val = evaluate(&classifier, &val, config.batch_size)?;
    info!(accuracy = %format!("{:.4}", final_val.accuracy), loss = %format!("{:.4}", final_val.loss), "final validation accuracy");

    if config.test_dir.is_dir() {
        let test = ImageFolder::open_with_classes(&config.test_dir, train.class_names(), config.image_size)
            .context("failed to index the test split")?;
        let report = evaluate(&classifier, &test, config.batch_size)?;
        info!(
            samples = report.samples,
            accuracy = %format!("{:.4}", report.accuracy),
            loss = %format!("{:.4}", report.loss),
            "test evaluation"
        );
    }
    Ok(())
}
