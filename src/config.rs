use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};
use crate::network::topology::Topology;
use crate::optim::optimizer::OptimizerConfig;
use crate::optim::scheduler::SchedulerConfig;
use crate::train::train_config::TrainConfig;

/// Input and output files of a run. Vectors are comma-separated floats, labels
/// one class index per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFiles {
    pub train_vectors: PathBuf,
    pub train_labels: PathBuf,
    #[serde(default)]
    pub test_vectors: Option<PathBuf>,
    #[serde(default)]
    pub test_labels: Option<PathBuf>,
    /// Where predicted test classes are written, one per line.
    #[serde(default)]
    pub predictions: Option<PathBuf>,
}

/// Everything the command-line tool needs for one training run.
///
/// ```json
/// {
///   "topology": [{"size": 784}, {"size": 256, "activation": "relu"}, {"size": 10, "activation": "softmax"}],
///   "train": {"epochs": 20, "batch_size": 64, "eta": 0.001, "early_stopping": 3},
///   "optimizer": {"type": "adam"},
///   "scheduler": {"min_eta": 0.0001, "decay_rate": 0.5, "steps_decay": 60000},
///   "data": {"train_vectors": "train_vectors.csv", "train_labels": "train_labels.csv"}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub topology: Topology,
    #[serde(default)]
    pub train: TrainConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
    /// Training threads; defaults to the number of logical CPUs.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Share of every class kept for training; the rest is validation.
    #[serde(default = "default_train_ratio")]
    pub train_ratio: f32,
    /// Divide every input row by its maximum before training.
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    pub data: DataFiles,
}

fn default_workers() -> usize {
    rayon::current_num_threads()
}

fn default_train_ratio() -> f32 {
    0.8
}

fn default_normalize() -> bool {
    true
}

impl RunConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<RunConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config: RunConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.train.validate()?;
        self.topology.require_softmax_output()?;
        if self.workers == 0 {
            return Err(NetError::InvalidConfig("workers must be at least 1".into()));
        }
        if let Some(s) = &self.scheduler {
            s.build(self.train.eta)?;
        }
        if self.data.test_vectors.is_some() != self.data.test_labels.is_some() {
            return Err(NetError::InvalidConfig(
                "test_vectors and test_labels must be given together".into(),
            ));
        }
        Ok(())
    }
}
