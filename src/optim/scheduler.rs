use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Active,
    /// The rate has reached `min_eta` and will not change again.
    Floored,
}

/// Step-wise exponential learning-rate decay keyed on examples seen.
///
/// Every time the cumulative example count crosses another multiple of
/// `steps_decay`, the rate is multiplied by `decay_rate` and clamped to
/// `min_eta`. A starting rate below `min_eta` is raised to it. The rate
/// never increases between restarts.
#[derive(Debug, Clone)]
pub struct LrScheduler {
    current_eta: f32,
    min_eta: f32,
    decay_rate: f32,
    steps_decay: usize,
    steps_taken: usize,
}

impl LrScheduler {
    pub fn new(eta: f32, min_eta: f32, decay_rate: f32, steps_decay: usize) -> Result<LrScheduler> {
        if steps_decay == 0 {
            return Err(NetError::InvalidConfig("steps_decay must be at least 1".into()));
        }
        if !(decay_rate > 0.0 && decay_rate <= 1.0) {
            return Err(NetError::InvalidConfig(format!(
                "decay rate must be in (0, 1], got {decay_rate}"
            )));
        }
        if min_eta < 0.0 {
            return Err(NetError::NegativeLearningRate(min_eta));
        }
        Ok(LrScheduler {
            current_eta: eta.max(min_eta),
            min_eta,
            decay_rate,
            steps_decay,
            steps_taken: 0,
        })
    }

    /// Restarts the schedule from `eta`, clamped to `min_eta`.
    pub fn set_eta(&mut self, eta: f32) {
        self.current_eta = eta.max(self.min_eta);
        self.steps_taken = 0;
    }

    pub fn eta(&self) -> f32 {
        self.current_eta
    }

    pub fn state(&self) -> SchedulerState {
        if self.current_eta == self.min_eta {
            SchedulerState::Floored
        } else {
            SchedulerState::Active
        }
    }

    /// Returns the rate to use after `t` examples, decaying once for every
    /// `steps_decay` window crossed since the last call. Repeated calls within
    /// the same window return the same value.
    pub fn exponential(&mut self, t: usize) -> f32 {
        let windows = t / self.steps_decay;
        while self.state() == SchedulerState::Active && windows > self.steps_taken {
            self.steps_taken += 1;
            self.current_eta = (self.current_eta * self.decay_rate).max(self.min_eta);
        }
        self.current_eta
    }
}

/// Serializable scheduler parameters; the starting rate comes from training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub min_eta: f32,
    pub decay_rate: f32,
    pub steps_decay: usize,
}

impl SchedulerConfig {
    pub fn build(&self, eta: f32) -> Result<LrScheduler> {
        LrScheduler::new(eta, self.min_eta, self.decay_rate, self.steps_decay)
    }
}
