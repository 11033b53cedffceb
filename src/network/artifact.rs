use std::path::Path;

use tracing::info;

use crate::activation::ActivationFunction;
use crate::backbone::{MobileNetV2, TensorStore};
use crate::error::ModelError;
use crate::layers::{Dense, Dropout};
use crate::math::Matrix;
use crate::network::classifier::{Classifier, Head};
use crate::network::label_map::LabelMap;
use crate::network::metadata::{ModelMetadata, FORMAT};

/// Safetensors metadata key holding the `ModelMetadata` JSON.
const METADATA_KEY: &str = "ferrite_leaf";
const BACKBONE_PREFIX: &str = "backbone";
const HEAD_WEIGHT: &str = "head.dense.weight";
const HEAD_BIAS: &str = "head.dense.bias";

/// Writes the whole classifier (folded backbone, head and metadata) into a
/// single safetensors file, creating the parent directory if needed.
pub fn save_artifact(classifier: &Classifier, path: &Path) -> Result<(), ModelError> {
    let head = &classifier.head;
    let meta = ModelMetadata {
        format: FORMAT.to_owned(),
        width_mult: classifier.backbone.width_mult(),
        image_size: classifier.image_size,
        feature_dim: head.dense.input_size(),
        num_classes: head.num_classes(),
        dropout: head.dropout.rate,
    };

    let mut store = TensorStore::new();
    classifier.backbone.export_folded(&mut store, BACKBONE_PREFIX);
    store.insert(HEAD_WEIGHT, vec![meta.feature_dim, meta.num_classes], head.dense.weights.data.clone());
    store.insert(HEAD_BIAS, vec![meta.num_classes], head.dense.biases.clone());
    store.set_metadata(METADATA_KEY, meta.to_json()?);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ModelError::io(parent, e))?;
    }
    store.write(path)?;
    info!(path = %path.display(), classes = meta.num_classes, "saved model");
    Ok(())
}

/// Rebuilds a classifier from a file written by `save_artifact`.
pub fn load_artifact(path: &Path) -> Result<Classifier, ModelError> {
    let mut store = TensorStore::read(path)?;
    let meta = store
        .metadata(METADATA_KEY)
        .ok_or_else(|| ModelError::Metadata(format!("no '{METADATA_KEY}' entry")))
        .and_then(ModelMetadata::from_json)?;

    let backbone = MobileNetV2::from_folded(&mut store, BACKBONE_PREFIX, meta.width_mult)?;
    if backbone.feature_dim() != meta.feature_dim {
        return Err(ModelError::Metadata(format!(
            "feature_dim {} does not match the backbone's {}",
            meta.feature_dim,
            backbone.feature_dim()
        )));
    }
    if !(0.0..1.0).contains(&meta.dropout) {
        return Err(ModelError::Metadata(format!("dropout {} outside [0, 1)", meta.dropout)));
    }

    let weights = store.take(HEAD_WEIGHT, &[meta.feature_dim, meta.num_classes])?;
    let biases = store.take(HEAD_BIAS, &[meta.num_classes])?;
    let dense = Dense {
        size: meta.num_classes,
        weights: Matrix::from_vec(meta.feature_dim, meta.num_classes, weights),
        biases,
        activator: ActivationFunction::Softmax,
    };
    let head = Head { dropout: Dropout::new(meta.dropout), dense };
    Ok(Classifier { backbone, head, image_size: meta.image_size })
}

/// Loads the model and its label map, refusing a pair that disagrees on
/// the number of classes.
pub fn load_model(model_path: &Path, labels_path: &Path) -> Result<(Classifier, LabelMap), ModelError> {
    let classifier = load_artifact(model_path)?;
    let labels = LabelMap::load(labels_path)?;
    if labels.len() != classifier.num_classes() {
        return Err(ModelError::LabelCountMismatch { labels: labels.len(), outputs: classifier.num_classes() });
    }
    Ok((classifier, labels))
}
