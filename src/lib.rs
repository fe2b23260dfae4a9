pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod metrics;
pub mod optim;
pub mod data;
pub mod train;
pub mod tuning;
pub mod config;
pub mod error;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::dense::DenseLayer;
pub use layers::gradients::Gradients;
pub use network::network::Network;
pub use network::topology::{LayerSpec, Topology};
pub use loss::cross_entropy::CrossEntropyLoss;
pub use metrics::stats::Stats;
pub use optim::{Adam, LrScheduler, Optimizer, OptimizerConfig, SchedulerConfig, Sgd};
pub use data::{Batch, TrainValSplit};
pub use train::{train_loop, EpochStats, FitReport, StopReason, TrainConfig};
pub use config::RunConfig;
pub use error::{NetError, Result};
