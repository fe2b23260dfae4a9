use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};
use crate::layers::dense::DenseLayer;
use crate::layers::gradients::Gradients;
use crate::optim::adam::{Adam, DEFAULT_BETA1, DEFAULT_BETA2, DEFAULT_EPSILON};
use crate::optim::sgd::Sgd;

/// A stateful update rule applied once per minibatch.
///
/// `update` receives the fully reduced gradients for the minibatch, mutates
/// the layers in place, and never modifies `grads`. It must validate shapes
/// before touching any parameter so a failed call leaves the network intact.
pub trait Optimizer: Send {
    /// Allocates per-parameter state for `layers`. Called once the network
    /// shapes are known.
    fn init(&mut self, _layers: &[DenseLayer]) {}

    fn update(
        &mut self,
        layers: &mut [DenseLayer],
        grads: &Gradients,
        batch_size: usize,
        eta: f32,
    ) -> Result<()>;

    fn name(&self) -> &'static str;
}

pub(crate) fn batch_eta(eta: f32, batch_size: usize) -> Result<f32> {
    if batch_size == 0 {
        return Err(NetError::InvalidConfig("batch size must be at least 1".into()));
    }
    Ok(eta / batch_size as f32)
}

/// Serializable optimizer selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Sgd,
    Adam {
        #[serde(default = "default_beta1")]
        beta1: f32,
        #[serde(default = "default_beta2")]
        beta2: f32,
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
}

fn default_beta1() -> f32 {
    DEFAULT_BETA1
}

fn default_beta2() -> f32 {
    DEFAULT_BETA2
}

fn default_epsilon() -> f32 {
    DEFAULT_EPSILON
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam {
            beta1: DEFAULT_BETA1,
            beta2: DEFAULT_BETA2,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl OptimizerConfig {
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            OptimizerConfig::Sgd => Box::new(Sgd::new()),
            OptimizerConfig::Adam { beta1, beta2, epsilon } => Box::new(Adam::new(beta1, beta2, epsilon)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_with_defaults() {
        let adam: OptimizerConfig = serde_json::from_str(r#"{"type": "adam", "beta1": 0.8}"#).unwrap();
        assert_eq!(
            adam,
            OptimizerConfig::Adam { beta1: 0.8, beta2: DEFAULT_BETA2, epsilon: DEFAULT_EPSILON }
        );
        assert_eq!(adam.build().name(), "adam");

        let sgd: OptimizerConfig = serde_json::from_str(r#"{"type": "sgd"}"#).unwrap();
        assert_eq!(sgd.build().name(), "sgd");
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(batch_eta(0.1, 0).is_err());
        assert_eq!(batch_eta(1.0, 4).unwrap(), 0.25);
    }
}
