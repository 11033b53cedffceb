use rand::Rng;

use crate::activation::ActivationFunction;
use crate::backbone::MobileNetV2;
use crate::layers::{Dense, Dropout};
use crate::math::{ImageBatch, Matrix};

/// The trainable part of the model: dropout followed by a softmax layer
/// over the pooled backbone features.
#[derive(Debug, Clone, PartialEq)]
pub struct Head {
    pub dropout: Dropout,
    pub dense: Dense,
}

impl Head {
    pub fn new<R: Rng + ?Sized>(feature_dim: usize, num_classes: usize, dropout: f32, rng: &mut R) -> Head {
        Head {
            dropout: Dropout::new(dropout),
            dense: Dense::new(feature_dim, num_classes, ActivationFunction::Softmax, rng),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.dense.size
    }

    /// Inference-mode forward pass; dropout is inactive.
    pub fn forward(&self, features: &Matrix) -> Matrix {
        self.dense.feed_from(features)
    }
}

/// Frozen MobileNetV2 backbone plus a trainable head.
#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    pub backbone: MobileNetV2,
    pub head: Head,
    pub image_size: u32,
}

impl Classifier {
    pub fn new<R: Rng + ?Sized>(
        backbone: MobileNetV2,
        num_classes: usize,
        dropout: f32,
        image_size: u32,
        rng: &mut R,
    ) -> Classifier {
        let head = Head::new(backbone.feature_dim(), num_classes, dropout, rng);
        Classifier { backbone, head, image_size }
    }

    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    pub fn features(&self, batch: &ImageBatch) -> Matrix {
        self.backbone.extract_batch(batch)
    }

    /// Class probabilities, one row per image; every row sums to 1.
    pub fn predict_proba(&self, batch: &ImageBatch) -> Matrix {
        self.head.forward(&self.features(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn probabilities_have_one_row_per_image() {
        let mut rng = StdRng::seed_from_u64(9);
        let backbone = MobileNetV2::random(0.1, &mut rng);
        let model = Classifier::new(backbone, 4, 0.2, 32, &mut rng);
        let mut batch = ImageBatch::new(32, 32);
        batch.push(&vec![0.25; 32 * 32 * 3]);
        batch.push(&vec![0.75; 32 * 32 * 3]);

        let probs = model.predict_proba(&batch);
        assert_eq!((probs.rows, probs.cols), (2, 4));
        for i in 0..2 {
            let row = probs.row(i);
            assert!(row.iter().all(|p| p.is_finite() && *p >= 0.0));
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
    }
}
