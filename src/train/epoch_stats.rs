use serde::{Deserialize, Serialize};

/// Per-epoch training statistics emitted by `train_loop`.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, the loop sends
/// one `EpochStats` at the end of every completed epoch. The same values are
/// collected in `FitReport::history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Maximum epochs configured for this run.
    pub total_epochs: usize,
    /// Mean cross-entropy over the epoch's minibatches.
    pub train_loss: f32,
    /// Mean training accuracy in percent.
    pub train_accuracy: f32,
    /// Validation cross-entropy; `None` when the validation set is empty.
    pub val_loss: Option<f32>,
    /// Validation accuracy in percent.
    pub val_accuracy: Option<f32>,
    /// Learning rate used for the last minibatch of the epoch.
    pub eta: f32,
    /// Wall-clock duration of this epoch in milliseconds.
    pub elapsed_ms: u64,
}
