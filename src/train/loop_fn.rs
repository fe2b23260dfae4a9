use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::pipeline::{batch, shuffle, sub_batch};
use crate::data::split::TrainValSplit;
use crate::error::{NetError, Result};
use crate::metrics::stats::Stats;
use crate::network::network::Network;
use crate::optim::scheduler::LrScheduler;
use crate::train::epoch_stats::EpochStats;
use crate::train::train_config::TrainConfig;

/// Why `train_loop` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    EarlyStopped,
    TimeBudgetExceeded,
}

/// Outcome of a completed `train_loop` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub epochs_run: usize,
    pub stop_reason: StopReason,
    /// Lowest validation cross-entropy seen, if validation ran.
    pub best_val_loss: Option<f32>,
    pub history: Vec<EpochStats>,
}

impl FitReport {
    pub fn last_epoch(&self) -> Option<&EpochStats> {
        self.history.last()
    }
}

/// Trains `network` on `split.train` for up to `config.epochs` epochs.
///
/// Every epoch reshuffles the training set, cuts it into `batch_size` chunks
/// and, per chunk: splits it across the workers, runs the parallel
/// forward/backward pass, applies weight decay, and lets the optimizer update
/// the parameters with the scheduler's current rate. The validation set is
/// evaluated on the worker pool after each epoch.
///
/// # Termination
/// Checked at epoch boundaries only, so a minibatch in flight always finishes:
/// - `early_stopping` epochs without a new lowest validation loss
/// - `max_time_ms` of wall-clock time elapsed since the call began
///
/// # Errors
/// `NegativeLearningRate` when `config.eta < 0`, `InvalidTopology` when the
/// output layer is not softmax, and any shape error from the data.
pub fn train_loop(
    network: &mut Network,
    split: &TrainValSplit,
    config: &TrainConfig,
    mut scheduler: Option<&mut LrScheduler>,
) -> Result<FitReport> {
    config.validate()?;
    network.topology().require_softmax_output()?;
    if split.train.is_empty() {
        return Err(NetError::EmptyMatrix);
    }
    for (name, part) in [("train", &split.train), ("validation", &split.validation)] {
        if !part.is_empty() && part.data.cols() != network.topology().input_size() {
            return Err(NetError::shape(
                name,
                format!("{} columns", network.topology().input_size()),
                format!("{} columns", part.data.cols()),
            ));
        }
        let classes = network.topology().output_size();
        if let Some(&bad) = part.labels.iter().find(|&&l| l as usize >= classes) {
            return Err(NetError::shape(name, format!("labels below {classes}"), format!("label {bad}")));
        }
    }

    let workers = network.workers();
    let mut rng = config.rng();
    if let Some(s) = scheduler.as_deref_mut() {
        s.set_eta(config.eta);
    }

    let val_batches = sub_batch(&split.validation, workers)?;
    let mut examples_seen = 0usize;
    let mut best_val_loss = f32::INFINITY;
    let mut epoch_of_best = 0usize;
    let mut history = Vec::with_capacity(config.epochs);
    let mut stop_reason = StopReason::Completed;
    let started = Instant::now();

    info!(
        topology = %network.topology().describe(),
        train = split.train.len(),
        validation = split.validation.len(),
        epochs = config.epochs,
        batch_size = config.batch_size,
        workers,
        optimizer = network.optimizer_name(),
        "training started"
    );

    for epoch in 1..=config.epochs {
        let epoch_start = Instant::now();

        // ── One full pass over the shuffled training data ─────────────────
        let shuffled = shuffle(&split.train.data, &split.train.labels, &mut rng)?;
        let mut batch_stats = Vec::new();
        let mut eta = config.eta;
        for chunk in batch(&shuffled.data, &shuffled.labels, config.batch_size)? {
            if let Some(s) = scheduler.as_deref_mut() {
                eta = s.exponential(examples_seen);
            }
            let stats = network.forward_backward_pass(&sub_batch(&chunk, workers)?)?;
            network.weight_decay(config.lambda);
            network.update_weights(chunk.len(), eta)?;
            examples_seen += chunk.len();
            batch_stats.push(stats);
        }
        let train = Stats::mean(&batch_stats).unwrap_or_default();

        // ── Validation ────────────────────────────────────────────────────
        let val = network.predict_parallel(&val_batches)?;

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss: train.cross_entropy,
            train_accuracy: train.accuracy,
            val_loss: val.map(|v| v.cross_entropy),
            val_accuracy: val.map(|v| v.accuracy),
            eta,
            elapsed_ms: epoch_start.elapsed().as_millis() as u64,
        };
        info!(
            epoch,
            train_loss = stats.train_loss,
            train_acc = stats.train_accuracy,
            val_loss = ?stats.val_loss,
            val_acc = ?stats.val_accuracy,
            eta,
            ms = stats.elapsed_ms,
            "epoch finished"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            for (i, w) in network.weight_stats().iter().enumerate() {
                debug!(layer = i, sum = w.sum, min = w.min, max = w.max, median = w.median, mean = w.mean, "weights");
            }
        }

        if let Some(ref tx) = config.progress_tx {
            let _ = tx.send(stats.clone());
        }
        history.push(stats);

        // ── Termination checks ────────────────────────────────────────────
        if let Some(v) = val {
            if v.cross_entropy < best_val_loss {
                best_val_loss = v.cross_entropy;
                epoch_of_best = epoch;
            }
            if config.early_stopping > 0 && epoch - epoch_of_best >= config.early_stopping {
                info!(epoch, best_epoch = epoch_of_best, best_val_loss, "early stopping");
                stop_reason = StopReason::EarlyStopped;
                break;
            }
        }

        if config.max_time_ms > 0 && started.elapsed().as_millis() >= u128::from(config.max_time_ms) {
            info!(epoch, budget_ms = config.max_time_ms, "time budget exhausted");
            stop_reason = StopReason::TimeBudgetExceeded;
            break;
        }
    }

    Ok(FitReport {
        epochs_run: history.len(),
        stop_reason,
        best_val_loss: best_val_loss.is_finite().then_some(best_val_loss),
        history,
    })
}
