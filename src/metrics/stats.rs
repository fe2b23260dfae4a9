use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::math::matrix::Matrix;

/// Accuracy (percent) and cross-entropy of one batch of predictions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub accuracy: f32,
    pub cross_entropy: f32,
}

impl Stats {
    pub fn compute(predicted: &Matrix, labels: &[u32]) -> Result<Stats> {
        let cross_entropy = CrossEntropyLoss::loss(predicted, labels)?;
        let accuracy = accuracy(&argmax_rows(predicted), labels);
        Ok(Stats { accuracy, cross_entropy })
    }

    /// Unweighted mean of several stats; `None` when `stats` is empty.
    pub fn mean(stats: &[Stats]) -> Option<Stats> {
        if stats.is_empty() {
            return None;
        }
        let n = stats.len() as f32;
        Some(Stats {
            accuracy: stats.iter().map(|s| s.accuracy).sum::<f32>() / n,
            cross_entropy: stats.iter().map(|s| s.cross_entropy).sum::<f32>() / n,
        })
    }
}

/// Index of the largest element in each row; ties go to the lowest index.
pub fn argmax_rows(matrix: &Matrix) -> Vec<usize> {
    (0..matrix.rows())
        .map(|i| {
            matrix
                .row(i)
                .iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (j, &x)| if x > best.1 { (j, x) } else { best })
                .0
        })
        .collect()
}

/// Percentage of positions where `predicted` matches `expected`.
pub fn accuracy(predicted: &[usize], expected: &[u32]) -> f32 {
    if predicted.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(expected)
        .filter(|(&p, &e)| p == e as usize)
        .count();
    correct as f32 / predicted.len() as f32 * 100.0
}
