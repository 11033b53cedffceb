use crate::math::Matrix;

/// Sparse categorical cross-entropy for a softmax output layer: targets are
/// class indices rather than one-hot rows.
pub struct SparseCrossEntropyLoss;

/// Probabilities are clamped to [EPS, 1 - EPS] inside the log.
const EPS: f32 = 1e-7;

impl SparseCrossEntropyLoss {
    /// Mean of `-ln(p[label])` over the batch.
    ///
    /// `predicted`: softmax probabilities, `n × classes`
    /// `labels`   : class index per row
    pub fn loss(predicted: &Matrix, labels: &[usize]) -> f32 {
        assert_eq!(predicted.rows, labels.len());
        if labels.is_empty() {
            return 0.0;
        }
        let total: f32 = labels
            .iter()
            .enumerate()
            .map(|(i, &y)| -predicted.get(i, y).clamp(EPS, 1.0 - EPS).ln())
            .sum();
        total / labels.len() as f32
    }

    /// Gradient of the combined softmax + cross-entropy w.r.t. the logits,
    /// per sample: `predicted - onehot(label)`. Averaging over the batch is
    /// left to the layer.
    pub fn derivative(predicted: &Matrix, labels: &[usize]) -> Matrix {
        let mut delta = predicted.clone();
        for (i, &y) in labels.iter().enumerate() {
            let v = delta.get(i, y);
            delta.set(i, y, v - 1.0);
        }
        delta
    }
}

/// Index of the largest element; the first one wins on ties.
pub fn argmax(v: &[f32]) -> usize {
    let mut best = 0;
    for (i, &x) in v.iter().enumerate() {
        if x > v[best] {
            best = i;
        }
    }
    best
}

/// Fraction of rows whose argmax equals the label.
pub fn accuracy(predicted: &Matrix, labels: &[usize]) -> f32 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = labels
        .iter()
        .enumerate()
        .filter(|(i, &y)| argmax(predicted.row(*i)) == y)
        .count();
    correct as f32 / labels.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confident_correct_prediction_has_small_loss() {
        let p = Matrix::from_vec(2, 2, vec![0.99, 0.01, 0.2, 0.8]);
        let good = SparseCrossEntropyLoss::loss(&p, &[0, 1]);
        let bad = SparseCrossEntropyLoss::loss(&p, &[1, 0]);
        assert!(good < 0.2 && bad > 2.0);
    }

    #[test]
    fn zero_probability_does_not_produce_infinity() {
        let p = Matrix::from_vec(1, 2, vec![1.0, 0.0]);
        assert!(SparseCrossEntropyLoss::loss(&p, &[1]).is_finite());
    }

    #[test]
    fn derivative_subtracts_one_hot() {
        let p = Matrix::from_vec(1, 3, vec![0.2, 0.5, 0.3]);
        let d = SparseCrossEntropyLoss::derivative(&p, &[1]);
        assert!((d.data[0] - 0.2).abs() < 1e-6);
        assert!((d.data[1] + 0.5).abs() < 1e-6);
        assert!((d.data[2] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn accuracy_and_argmax_tie_break() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), 0);
        let p = Matrix::from_vec(2, 2, vec![0.9, 0.1, 0.7, 0.3]);
        assert_eq!(accuracy(&p, &[0, 1]), 0.5);
    }
}
