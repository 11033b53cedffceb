//! Split a generated dataset, train a small model on it, save it, load it
//! back and classify an uploaded image.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

use ferrite_leaf::data::loader::list_files;
use ferrite_leaf::network::save_artifact;
use ferrite_leaf::train::EarlyStopping;
use ferrite_leaf::{
    evaluate, fit, load_model, preprocess_image, split_dataset, top_k, Classifier, FitConfig, ImageFolder, LabelMap,
    MobileNetV2, SplitConfig, TOP_K,
};

const IMAGE_SIZE: u32 = 32;
const CLASSES: [(&str, [u8; 3]); 2] = [("Potato___Early_blight", [150, 90, 30]), ("Potato___healthy", [40, 170, 60])];

fn leaf(color: [u8; 3], variant: u32) -> RgbImage {
    RgbImage::from_fn(48, 40, |x, y| {
        let [r, g, b] = color;
        let spot = ((x + variant * 3) % 11 == 0 || (y + variant) % 13 == 0) as u8 * 40;
        Rgb([r.saturating_sub(spot), g.saturating_add(spot / 2), b])
    })
}

fn write_dataset(root: &Path, per_class: u32) {
    for (class, color) in CLASSES {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            leaf(color, i).save(dir.join(format!("{class}_{i:02}.png"))).unwrap();
        }
    }
}

#[test]
fn split_train_save_load_and_predict() {
    let work = TempDir::new().unwrap();
    let dataset = work.path().join("dataset");
    write_dataset(&dataset, 10);

    // ── Split ────────────────────────────────────────────────────────────
    let split = SplitConfig {
        dataset_dir: dataset.clone(),
        train_dir: dataset.join("train"),
        val_dir: dataset.join("val"),
        test_dir: dataset.join("test"),
        ..SplitConfig::default()
    };
    let report = split_dataset(&split).unwrap();
    assert_eq!(report.classes.len(), 2);
    for (class, _) in CLASSES {
        assert_eq!(list_files(&split.train_dir.join(class)).unwrap().len(), 6);
        assert_eq!(list_files(&split.val_dir.join(class)).unwrap().len(), 2);
        assert_eq!(list_files(&split.test_dir.join(class)).unwrap().len(), 2);
    }

    // ── Train ────────────────────────────────────────────────────────────
    let train = ImageFolder::open(&split.train_dir, IMAGE_SIZE).unwrap();
    let val = ImageFolder::open_with_classes(&split.val_dir, train.class_names(), IMAGE_SIZE).unwrap();
    assert_eq!(train.class_names().to_vec(), vec!["Potato___Early_blight", "Potato___healthy"]);

    let mut rng = StdRng::seed_from_u64(42);
    let backbone = MobileNetV2::random(0.1, &mut rng);
    let mut classifier = Classifier::new(backbone, train.class_names().len(), 0.2, IMAGE_SIZE, &mut rng);
    let config = FitConfig {
        early_stopping: Some(EarlyStopping { patience: 2, ..EarlyStopping::default() }),
        ..FitConfig::new(4, 4, 0.001)
    };
    let history = fit(&mut classifier, &train, &val, &config).unwrap();
    assert!(!history.epochs.is_empty() && history.epochs.len() <= 4);
    assert!(history.epochs.iter().all(|e| e.train_loss.is_finite()));

    // ── Save and reload ──────────────────────────────────────────────────
    let model_path = work.path().join("model").join("model.safetensors");
    let labels_path = work.path().join("model").join("label_map.json");
    save_artifact(&classifier, &model_path).unwrap();
    LabelMap::new(train.class_names().to_vec()).save(&labels_path).unwrap();

    let (loaded, labels) = load_model(&model_path, &labels_path).unwrap();
    assert_eq!(loaded, classifier);

    let test = ImageFolder::open_with_classes(&split.test_dir, labels.labels(), IMAGE_SIZE).unwrap();
    let before = evaluate(&classifier, &test, 8).unwrap();
    let after = evaluate(&loaded, &test, 8).unwrap();
    assert_eq!(before, after);
    assert_eq!(after.samples, 4);

    // ── Predict on an upload ─────────────────────────────────────────────
    let mut upload = Vec::new();
    DynamicImage::ImageRgb8(leaf(CLASSES[1].1, 99))
        .write_to(&mut Cursor::new(&mut upload), ImageOutputFormat::Jpeg(85))
        .unwrap();
    let batch = preprocess_image(&upload, loaded.image_size).unwrap();
    let probs = loaded.predict_proba(&batch);
    let predictions = top_k(probs.row(0), &labels, TOP_K);

    assert_eq!(predictions.len(), 2);
    assert!(predictions[0].confidence >= predictions[1].confidence);
    let total: f32 = predictions.iter().map(|p| p.confidence).sum();
    assert!((total - 1.0).abs() < 1e-4);
}
