use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;

/// Cross-entropy for a softmax output layer against integer class labels.
pub struct CrossEntropyLoss;

/// Keeps `ln` finite; large enough to survive `1 - p + EPS` in f32.
const EPS: f32 = 1e-7;

impl CrossEntropyLoss {
    /// Mean over rows of the element-wise binary form
    ///   `-Σ_j [y_j ln(p_j + ε) + (1 - y_j) ln(1 - p_j + ε)]`
    /// where `y` is the one-hot encoding of the row's label.
    pub fn loss(predicted: &Matrix, labels: &[u32]) -> Result<f32> {
        check_labels(predicted, labels, "CrossEntropyLoss::loss")?;
        if labels.is_empty() {
            return Ok(0.0);
        }

        let mut total = 0.0;
        for (i, &label) in labels.iter().enumerate() {
            for (j, &p) in predicted.row(i).iter().enumerate() {
                total -= if j == label as usize {
                    (p + EPS).ln()
                } else {
                    (1.0 - p + EPS).ln()
                };
            }
        }
        Ok(total / labels.len() as f32)
    }

    /// Gradient of softmax + cross-entropy with respect to the output
    /// layer's logits: `predicted - one_hot(label)`, row by row, unscaled.
    pub fn delta(predicted: &Matrix, labels: &[u32]) -> Result<Matrix> {
        check_labels(predicted, labels, "CrossEntropyLoss::delta")?;
        let mut delta = predicted.clone();
        for (i, &label) in labels.iter().enumerate() {
            let j = label as usize;
            delta.set(i, j, delta.get(i, j) - 1.0);
        }
        Ok(delta)
    }
}

fn check_labels(predicted: &Matrix, labels: &[u32], context: &'static str) -> Result<()> {
    if predicted.rows() != labels.len() {
        return Err(NetError::shape(
            context,
            format!("{} labels", predicted.rows()),
            format!("{} labels", labels.len()),
        ));
    }
    if let Some(&bad) = labels.iter().find(|&&l| l as usize >= predicted.cols()) {
        return Err(NetError::shape(
            context,
            format!("labels below {}", predicted.cols()),
            format!("label {bad}"),
        ));
    }
    Ok(())
}
