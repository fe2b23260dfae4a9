use rayon::prelude::*;

use crate::error::{NetError, Result};
use crate::layers::dense::DenseLayer;
use crate::layers::gradients::Gradients;
use crate::math::matrix::Matrix;
use crate::optim::optimizer::{batch_eta, Optimizer};

pub const DEFAULT_BETA1: f32 = 0.9;
pub const DEFAULT_BETA2: f32 = 0.999;
pub const DEFAULT_EPSILON: f32 = 1e-7;

/// First and second moment estimates for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    pub m_weights: Matrix,
    pub v_weights: Matrix,
    pub m_biases: Vec<f32>,
    pub v_biases: Vec<f32>,
}

impl Moments {
    fn zeros_like(layer: &DenseLayer) -> Moments {
        let (rows, cols) = layer.weights.shape();
        Moments {
            m_weights: Matrix::zeros(rows, cols),
            v_weights: Matrix::zeros(rows, cols),
            m_biases: vec![0.0; layer.biases.len()],
            v_biases: vec![0.0; layer.biases.len()],
        }
    }
}

/// Adam (Kingma & Ba) with bias-corrected moments.
///
/// `beta1_power`/`beta2_power` hold `β^t` for the upcoming step and advance
/// by one multiplication per call to `update`.
#[derive(Debug, Clone)]
pub struct Adam {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    beta1_power: f32,
    beta2_power: f32,
    t: u64,
    moments: Vec<Moments>,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Adam {
        Adam {
            beta1,
            beta2,
            epsilon,
            beta1_power: beta1,
            beta2_power: beta2,
            t: 1,
            moments: Vec::new(),
        }
    }

    /// Index of the next step (starts at 1).
    pub fn step(&self) -> u64 {
        self.t
    }

    pub fn moments(&self) -> &[Moments] {
        &self.moments
    }
}

impl Default for Adam {
    fn default() -> Self {
        Adam::new(DEFAULT_BETA1, DEFAULT_BETA2, DEFAULT_EPSILON)
    }
}

struct StepCoefficients {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    m_correction: f32,
    v_correction: f32,
    step: f32,
}

impl StepCoefficients {
    #[inline]
    fn apply(&self, param: &mut f32, m: &mut f32, v: &mut f32, g: f32) {
        *m = self.beta1 * *m + (1.0 - self.beta1) * g;
        *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
        let m_hat = *m / self.m_correction;
        let v_hat = *v / self.v_correction;
        *param -= self.step * m_hat / (v_hat.sqrt() + self.epsilon);
    }
}

impl Optimizer for Adam {
    fn init(&mut self, layers: &[DenseLayer]) {
        self.moments = layers.iter().map(Moments::zeros_like).collect();
    }

    fn update(
        &mut self,
        layers: &mut [DenseLayer],
        grads: &Gradients,
        batch_size: usize,
        eta: f32,
    ) -> Result<()> {
        grads.check_matches(layers)?;
        if self.moments.len() != layers.len() {
            return Err(NetError::shape(
                "Adam::update",
                format!("moments for {} layers (call init first)", layers.len()),
                format!("moments for {} layers", self.moments.len()),
            ));
        }

        let coeffs = StepCoefficients {
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            m_correction: 1.0 - self.beta1_power,
            v_correction: 1.0 - self.beta2_power,
            step: batch_eta(eta, batch_size)?,
        };

        // Layers are independent, so each one is updated on its own worker.
        layers
            .par_iter_mut()
            .zip(self.moments.par_iter_mut())
            .zip(grads.layers.par_iter())
            .for_each(|((layer, mom), g)| {
                let weights = layer.weights.as_mut_slice();
                let m = mom.m_weights.as_mut_slice();
                let v = mom.v_weights.as_mut_slice();
                for (((w, m), v), &d) in weights.iter_mut().zip(m).zip(v).zip(g.weights.as_slice()) {
                    coeffs.apply(w, m, v, d);
                }

                for (((b, m), v), &d) in layer
                    .biases
                    .iter_mut()
                    .zip(&mut mom.m_biases)
                    .zip(&mut mom.v_biases)
                    .zip(&g.biases)
                {
                    coeffs.apply(b, m, v, d);
                }
            });

        self.t += 1;
        self.beta1_power *= self.beta1;
        self.beta2_power *= self.beta2;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "adam"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use approx::assert_abs_diff_eq;

    fn single_weight(w: f32) -> Vec<DenseLayer> {
        vec![DenseLayer {
            weights: Matrix::filled(1, 1, w),
            biases: vec![0.0],
            activation: ActivationFunction::Softmax,
        }]
    }

    fn unit_gradient(layers: &[DenseLayer]) -> Gradients {
        let mut grads = Gradients::zeros_like(layers);
        grads.layers[0].weights.fill(1.0);
        grads.layers[0].biases[0] = 1.0;
        grads
    }

    #[test]
    fn first_step_matches_hand_computation() {
        let mut layers = single_weight(1.0);
        let grads = unit_gradient(&layers);
        let mut adam = Adam::default();
        adam.init(&layers);

        adam.update(&mut layers, &grads, 1, 0.1).unwrap();

        let mom = &adam.moments()[0];
        assert_abs_diff_eq!(mom.m_weights.get(0, 0), 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(mom.v_weights.get(0, 0), 0.001, epsilon = 1e-6);
        assert_abs_diff_eq!(layers[0].weights.get(0, 0), 0.9, epsilon = 1e-5);
        assert_abs_diff_eq!(layers[0].biases[0], -0.1, epsilon = 1e-5);
        assert_eq!(adam.step(), 2);
    }

    #[test]
    fn bias_correction_power_advances_linearly() {
        let mut layers = single_weight(0.0);
        let grads = unit_gradient(&layers);
        let mut adam = Adam::default();
        adam.init(&layers);

        for _ in 0..3 {
            adam.update(&mut layers, &grads, 1, 0.01).unwrap();
        }

        assert_abs_diff_eq!(adam.beta1_power, 0.9f32.powi(4), epsilon = 1e-6);
        assert_abs_diff_eq!(adam.beta2_power, 0.999f32.powi(4), epsilon = 1e-6);
        // constant gradient: every corrected step has size ~eta
        assert_abs_diff_eq!(layers[0].weights.get(0, 0), -0.03, epsilon = 1e-4);
    }

    #[test]
    fn update_leaves_gradients_untouched() {
        let mut layers = single_weight(1.0);
        let grads = unit_gradient(&layers);
        let before = grads.clone();
        let mut adam = Adam::default();
        adam.init(&layers);
        adam.update(&mut layers, &grads, 1, 0.1).unwrap();
        assert_eq!(grads, before);
    }

    #[test]
    fn requires_init() {
        let mut layers = single_weight(1.0);
        let grads = unit_gradient(&layers);
        let mut adam = Adam::default();
        assert!(adam.update(&mut layers, &grads, 1, 0.1).is_err());
        assert_eq!(layers[0].weights.get(0, 0), 1.0);
    }
}
