pub mod csv;
pub mod pipeline;
pub mod split;

pub use pipeline::{batch, shuffle, sub_batch, Batch};
pub use split::{stratified_split, TrainValSplit};
