use rand::Rng;

use crate::math::Matrix;

/// Inverted dropout: during training each unit is zeroed with probability
/// `rate` and survivors are scaled by `1 / (1 - rate)`. Inference is the identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    pub rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Dropout {
        assert!((0.0..1.0).contains(&rate), "dropout rate must be in [0, 1)");
        Dropout { rate }
    }

    pub fn forward_train<R: Rng + ?Sized>(&self, inputs: &Matrix, rng: &mut R) -> Matrix {
        if self.rate == 0.0 {
            return inputs.clone();
        }
        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let data = inputs
            .data
            .iter()
            .map(|&x| if rng.gen::<f32>() < keep { x * scale } else { 0.0 })
            .collect();
        Matrix::from_vec(inputs.rows, inputs.cols, data)
    }
}
