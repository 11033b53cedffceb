use crate::layers::Dense;
use crate::math::Matrix;

/// Adam with bias-corrected moment estimates.
///
/// `learning_rate` is public so plateau scheduling can lower it between epochs.
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    step: i32,
    m_weights: Matrix,
    v_weights: Matrix,
    m_biases: Vec<f32>,
    v_biases: Vec<f32>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            m_weights: Matrix::default(),
            v_weights: Matrix::default(),
            m_biases: Vec::new(),
            v_biases: Vec::new(),
        }
    }

    pub fn iterations(&self) -> i32 {
        self.step
    }

    /// Applies one update to `layer` from batch-averaged gradients.
    pub fn step(&mut self, layer: &mut Dense, weights_grad: &Matrix, biases_grad: &[f32]) {
        if self.m_weights.rows != layer.weights.rows || self.m_weights.cols != layer.weights.cols {
            self.m_weights = Matrix::zeros(layer.weights.rows, layer.weights.cols);
            self.v_weights = Matrix::zeros(layer.weights.rows, layer.weights.cols);
            self.m_biases = vec![0.0; layer.biases.len()];
            self.v_biases = vec![0.0; layer.biases.len()];
            self.step = 0;
        }
        self.step += 1;

        let (b1, b2) = (self.beta1 as f32, self.beta2 as f32);
        let correction1 = 1.0 - self.beta1.powi(self.step);
        let correction2 = 1.0 - self.beta2.powi(self.step);
        let lr_t = (self.learning_rate * correction2.sqrt() / correction1) as f32;
        let eps = self.epsilon as f32;

        update(&mut layer.weights.data, &weights_grad.data, &mut self.m_weights.data, &mut self.v_weights.data, b1, b2, lr_t, eps);
        update(&mut layer.biases, biases_grad, &mut self.m_biases, &mut self.v_biases, b1, b2, lr_t, eps);
    }
}

#[allow(clippy::too_many_arguments)]
fn update(params: &mut [f32], grads: &[f32], m: &mut [f32], v: &mut [f32], b1: f32, b2: f32, lr_t: f32, eps: f32) {
    for (((p, &g), m), v) in params.iter_mut().zip(grads).zip(m.iter_mut()).zip(v.iter_mut()) {
        *m = b1 * *m + (1.0 - b1) * g;
        *v = b2 * *v + (1.0 - b2) * g * g;
        *p -= lr_t * *m / (v.sqrt() + eps);
    }
}
