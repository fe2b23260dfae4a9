use thiserror::Error;

use crate::activation::activation::ActivationFunction;

/// Crate-wide error type.
///
/// Every variant except `Io`/`Json`/`Csv` describes a structural problem in the
/// caller's input: none of them are transient, so nothing in the crate retries.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("shape mismatch in {context}: expected {expected}, found {found}")]
    Shape {
        context: &'static str,
        expected: String,
        found: String,
    },

    #[error("cannot build a matrix with zero rows")]
    EmptyMatrix,

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("output layer uses {0:?}, but backpropagation requires a softmax output")]
    OutputActivationMismatch(ActivationFunction),

    #[error("learning rate must be non-negative, got {0}")]
    NegativeLearningRate(f32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV line {line}: {message}")]
    Csv { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl NetError {
    /// Shorthand for a `Shape` error with `(rows, cols)`-style descriptions.
    pub fn shape(context: &'static str, expected: impl ToString, found: impl ToString) -> NetError {
        NetError::Shape {
            context,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
