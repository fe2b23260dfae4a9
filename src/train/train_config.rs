use std::sync::mpsc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};
use crate::train::epoch_stats::EpochStats;

/// Hyperparameters for one `train_loop` run.
///
/// # Fields
/// - `epochs`        : maximum number of passes over the training set
/// - `batch_size`    : rows per minibatch (the last one of an epoch may be shorter)
/// - `eta`           : starting learning rate
/// - `lambda`        : weight decay factor applied before every update; `0` disables it
/// - `early_stopping`: patience in epochs without a new best validation loss; `0` disables it
/// - `max_time_ms`   : wall-clock budget for the whole run; `0` means unlimited
/// - `seed`          : shuffling seed; entropy-seeded when absent
/// - `progress_tx`   : optional channel receiving one `EpochStats` per epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub eta: f32,
    pub lambda: f32,
    pub early_stopping: usize,
    pub max_time_ms: u64,
    pub seed: Option<u64>,
    #[serde(skip)]
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 1,
            batch_size: 32,
            eta: 0.1,
            lambda: 1e-6,
            early_stopping: 0,
            max_time_ms: 0,
            seed: None,
            progress_tx: None,
        }
    }
}

impl TrainConfig {
    pub fn new(epochs: usize, batch_size: usize, eta: f32) -> Self {
        TrainConfig {
            epochs,
            batch_size,
            eta,
            ..TrainConfig::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.eta < 0.0 {
            return Err(NetError::NegativeLearningRate(self.eta));
        }
        if self.batch_size == 0 {
            return Err(NetError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.lambda) {
            return Err(NetError::InvalidConfig(format!(
                "lambda must be in [0, 1), got {}",
                self.lambda
            )));
        }
        Ok(())
    }

    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
