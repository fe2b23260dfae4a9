pub mod stats;
pub mod weights;

pub use stats::{accuracy, argmax_rows, Stats};
pub use weights::WeightStats;
