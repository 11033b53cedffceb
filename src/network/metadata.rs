use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Tag written into every artifact; anything else is refused at load.
pub const FORMAT: &str = "ferrite-leaf/mobilenet_v2-softmax/1";

/// Input sizes a model may declare. The backbone downsamples by 32.
pub const IMAGE_SIZES: RangeInclusive<u32> = 32..=1024;

/// Architecture annotations stored alongside the tensors of a saved model.
/// Enough to rebuild the network before its weights are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub format: String,
    pub width_mult: f32,
    /// Side length of the square input images the model was trained on.
    pub image_size: u32,
    pub feature_dim: usize,
    pub num_classes: usize,
    pub dropout: f32,
}

impl ModelMetadata {
    pub fn to_json(&self) -> Result<String, ModelError> {
        serde_json::to_string(self).map_err(|e| ModelError::Metadata(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<ModelMetadata, ModelError> {
        let meta: ModelMetadata = serde_json::from_str(json).map_err(|e| ModelError::Metadata(e.to_string()))?;
        if meta.format != FORMAT {
            return Err(ModelError::Metadata(format!("unknown format '{}'", meta.format)));
        }
        if meta.num_classes == 0 {
            return Err(ModelError::Metadata("model has no output classes".into()));
        }
        if !IMAGE_SIZES.contains(&meta.image_size) {
            return Err(ModelError::Metadata(format!(
                "input size {} outside {}..={}",
                meta.image_size,
                IMAGE_SIZES.start(),
                IMAGE_SIZES.end()
            )));
        }
        Ok(meta)
    }
}
