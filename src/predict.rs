use serde::{Deserialize, Serialize};

use crate::network::LabelMap;

/// Number of ranked classes returned per prediction.
pub const TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
}

/// Response body of a successful prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<Prediction>,
    pub top_prediction: Prediction,
}

impl PredictionResponse {
    /// `None` when there is nothing to rank.
    pub fn new(predictions: Vec<Prediction>) -> Option<PredictionResponse> {
        let top_prediction = predictions.first()?.clone();
        Some(PredictionResponse { predictions, top_prediction })
    }
}

/// The `k` most probable classes, most probable first.
///
/// Equal probabilities keep the lower class index first. Fewer than `k`
/// entries come back when the model has fewer classes.
pub fn top_k(probabilities: &[f32], labels: &LabelMap, k: usize) -> Vec<Prediction> {
    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| probabilities[b].total_cmp(&probabilities[a]));
    order
        .into_iter()
        .filter_map(|i| {
            labels.get(i).map(|name| Prediction { class_name: name.to_owned(), confidence: probabilities[i] })
        })
        .take(k)
        .collect()
}
