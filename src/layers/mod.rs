pub mod dense;
pub mod gradients;

pub use dense::{DenseLayer, LayerGradients};
pub use gradients::Gradients;
