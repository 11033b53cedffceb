use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFunction {
    Identity,
    /// min(max(x, 0), 6), the MobileNet clamp.
    Relu6,
    /// Vector-valued; applied per row by `softmax_in_place`, never element-wise.
    Softmax,
}

impl ActivationFunction {
    /// Applies the activation to a whole buffer in place.
    pub fn apply(&self, values: &mut [f32]) {
        match self {
            ActivationFunction::Identity => {}
            ActivationFunction::Relu6 => values.iter_mut().for_each(|v| *v = v.clamp(0.0, 6.0)),
            ActivationFunction::Softmax => softmax_in_place(values),
        }
    }
}

/// Numerically stable softmax over one logit vector.
pub fn softmax_in_place(logits: &mut [f32]) {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in logits.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in logits.iter_mut() {
            *v /= sum;
        }
    }
}
