use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;

/// Parameters of one gap between adjacent layers.
///
/// `weights[i][j]` connects neuron `i` of the lower layer to neuron `j` of the
/// upper layer, so the shape is `(fan_in, fan_out)` and a batch is pushed
/// through as `inputs · weights + biases`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Matrix,
    pub biases: Vec<f32>,
    pub activation: ActivationFunction,
}

impl DenseLayer {
    /// Uniform init: bounded by `6 / sqrt(fan_in)` in front of ReLU and by
    /// `6 / sqrt(fan_in + fan_out)` otherwise. Biases start at zero.
    pub fn new<R: Rng + ?Sized>(
        fan_in: usize,
        fan_out: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> DenseLayer {
        let limit = init_limit(fan_in, fan_out, activation);
        DenseLayer {
            weights: Matrix::random_uniform(fan_in, fan_out, limit, rng),
            biases: vec![0.0; fan_out],
            activation,
        }
    }

    pub fn fan_in(&self) -> usize {
        self.weights.rows()
    }

    pub fn fan_out(&self) -> usize {
        self.weights.cols()
    }

    /// `activation(inputs · W + b)` for a whole batch of rows.
    pub fn forward(&self, inputs: &Matrix) -> Result<Matrix> {
        let mut z = inputs.matmul(&self.weights)?;
        z.add_row_vector(&self.biases)?;
        self.activation.apply(&mut z);
        Ok(z)
    }
}

pub(crate) fn init_limit(fan_in: usize, fan_out: usize, activation: ActivationFunction) -> f32 {
    match activation {
        ActivationFunction::ReLU => 6.0 / (fan_in as f32).sqrt(),
        _ => 6.0 / ((fan_in + fan_out) as f32).sqrt(),
    }
}

/// Gradient of the loss with respect to one `DenseLayer`.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerGradients {
    pub weights: Matrix,
    pub biases: Vec<f32>,
}

impl LayerGradients {
    pub fn zeros_like(layer: &DenseLayer) -> LayerGradients {
        LayerGradients {
            weights: Matrix::zeros(layer.fan_in(), layer.fan_out()),
            biases: vec![0.0; layer.fan_out()],
        }
    }

    pub fn reset(&mut self) {
        self.weights.fill(0.0);
        self.biases.iter_mut().for_each(|b| *b = 0.0);
    }

    pub fn accumulate(&mut self, other: &LayerGradients) -> Result<()> {
        if self.biases.len() != other.biases.len() {
            return Err(NetError::shape(
                "LayerGradients::accumulate",
                format!("{} biases", self.biases.len()),
                format!("{} biases", other.biases.len()),
            ));
        }
        self.weights.add_matrix(&other.weights)?;
        self.biases.iter_mut().zip(&other.biases).for_each(|(a, b)| *a += b);
        Ok(())
    }
}
