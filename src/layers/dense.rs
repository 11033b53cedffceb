use rand::Rng;

use crate::activation::ActivationFunction;
use crate::math::Matrix;

/// Fully connected layer: `a = activation(x · W + b)`.
///
/// `weights` is `input_size × size`; inputs are batches of row vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    pub size: usize,
    pub weights: Matrix,
    pub biases: Vec<f32>,
    pub activator: ActivationFunction,
}

impl Dense {
    /// Glorot-uniform weights and zero biases.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Dense {
        Dense {
            size,
            weights: Matrix::glorot_uniform(input_size, size, rng),
            biases: vec![0.0; size],
            activator: activation,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    /// Forward pass over a batch (`n × input_size`), returns `n × size` activations.
    pub fn feed_from(&self, inputs: &Matrix) -> Matrix {
        let mut z = inputs.matmul(&self.weights);
        for i in 0..z.rows {
            let row = z.row_mut(i);
            for (v, b) in row.iter_mut().zip(&self.biases) {
                *v += b;
            }
            self.activator.apply(row);
        }
        z
    }

    /// Batch-averaged gradients `(∂L/∂W, ∂L/∂b)`.
    ///
    /// `delta` is ∂L/∂z per sample (`n × size`). For a softmax layer trained
    /// with cross-entropy this is `predicted - onehot`, so no activation
    /// Jacobian is applied here.
    pub fn compute_gradients(&self, inputs: &Matrix, delta: &Matrix) -> (Matrix, Vec<f32>) {
        assert_eq!(inputs.rows, delta.rows, "inputs and delta disagree on batch size");
        let inv_n = 1.0 / inputs.rows.max(1) as f32;
        let weights_grad = inputs.transpose().matmul(delta).map(|x| x * inv_n);
        let biases_grad = delta.sum_rows().data.into_iter().map(|x| x * inv_n).collect();
        (weights_grad, biases_grad)
    }
}
