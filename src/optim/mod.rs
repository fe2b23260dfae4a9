pub mod adam;
pub mod optimizer;
pub mod scheduler;
pub mod sgd;

pub use adam::Adam;
pub use optimizer::{Optimizer, OptimizerConfig};
pub use scheduler::{LrScheduler, SchedulerConfig, SchedulerState};
pub use sgd::Sgd;
