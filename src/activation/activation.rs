use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NetError;
use crate::math::matrix::Matrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFunction {
    Identity,
    Sigmoid,
    /// `x / (1 + |x|)`, a cheaper sigmoid-shaped curve.
    FastSigmoid,
    #[serde(rename = "relu")]
    ReLU,
    /// Row-wise softmax. Only valid on the output layer, where its gradient
    /// is fused with cross-entropy into `predicted - one_hot(label)`.
    Softmax,
}

impl ActivationFunction {
    /// Applies the activation to `matrix` in place.
    pub fn apply(&self, matrix: &mut Matrix) {
        match self {
            ActivationFunction::Identity => {}
            ActivationFunction::Sigmoid => matrix.apply(|x| 1.0 / (1.0 + (-x).exp())),
            ActivationFunction::FastSigmoid => matrix.apply(|x| x / (1.0 + x.abs())),
            ActivationFunction::ReLU => matrix.apply(|x| x.max(0.0)),
            ActivationFunction::Softmax => softmax_rows(matrix),
        }
    }

    /// Replaces already-activated values `y = f(x)` with `f'(x)` expressed
    /// through `y`, so pre-activations never need to be stored.
    ///
    /// - Sigmoid: `y (1 - y)`
    /// - FastSigmoid: `y²` (approximation, not the exact derivative)
    /// - ReLU: `1` where `y > 0`, else `0`; an input of exactly zero therefore
    ///   gets derivative `0`
    /// - Identity: constant `1`
    ///
    /// Softmax has no standalone derivative; it is rejected with
    /// `InvalidTopology`.
    pub fn derivative(&self, matrix: &mut Matrix) -> Result<(), NetError> {
        match self {
            ActivationFunction::Identity => matrix.fill(1.0),
            ActivationFunction::Sigmoid => matrix.apply(|y| y * (1.0 - y)),
            ActivationFunction::FastSigmoid => matrix.apply(|y| y * y),
            ActivationFunction::ReLU => matrix.apply(|y| if y > 0.0 { 1.0 } else { 0.0 }),
            ActivationFunction::Softmax => {
                return Err(NetError::InvalidTopology(
                    "softmax has no standalone derivative; it must be the output layer".into(),
                ))
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActivationFunction::Identity => "identity",
            ActivationFunction::Sigmoid => "sigmoid",
            ActivationFunction::FastSigmoid => "fast_sigmoid",
            ActivationFunction::ReLU => "relu",
            ActivationFunction::Softmax => "softmax",
        }
    }
}

/// Numerically stable softmax: subtract the row max before exponentiating.
fn softmax_rows(matrix: &mut Matrix) {
    for i in 0..matrix.rows() {
        let max = matrix.max_of_row(i);
        let row = matrix.row_mut(i);

        let mut sum = 0.0;
        for x in row.iter_mut() {
            *x = (*x - max).exp();
            sum += *x;
        }
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
}

impl fmt::Display for ActivationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivationFunction {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "identity" | "linear" => Ok(ActivationFunction::Identity),
            "sigmoid" => Ok(ActivationFunction::Sigmoid),
            "fast_sigmoid" | "fastsigmoid" => Ok(ActivationFunction::FastSigmoid),
            "relu" => Ok(ActivationFunction::ReLU),
            "softmax" => Ok(ActivationFunction::Softmax),
            other => Err(NetError::InvalidTopology(format!("unknown activation function '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn row(values: &[f32]) -> Matrix {
        Matrix::from_rows(vec![values.to_vec()]).unwrap()
    }

    #[test]
    fn softmax_rows_are_distributions() {
        let mut m = Matrix::from_rows(vec![
            vec![1.0, 2.0, 3.0],
            vec![1000.0, 1000.0, 999.0],
            vec![-50.0, 0.0, 50.0],
        ])
        .unwrap();

        ActivationFunction::Softmax.apply(&mut m);

        for i in 0..m.rows() {
            let sum: f32 = m.row(i).iter().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-5);
            assert!(m.row(i).iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
        assert_abs_diff_eq!(m.get(1, 0), m.get(1, 1));
        assert!(m.get(0, 2) > m.get(0, 1));
    }

    #[test]
    fn sigmoid_and_derivative_from_activated_value() {
        let mut m = row(&[0.0, 2.0]);
        ActivationFunction::Sigmoid.apply(&mut m);
        assert_abs_diff_eq!(m.get(0, 0), 0.5);

        let y = m.get(0, 1);
        ActivationFunction::Sigmoid.derivative(&mut m).unwrap();
        assert_abs_diff_eq!(m.get(0, 0), 0.25);
        assert_abs_diff_eq!(m.get(0, 1), y * (1.0 - y));
    }

    #[test]
    fn fast_sigmoid_uses_squared_approximation() {
        let mut m = row(&[1.0, -3.0]);
        ActivationFunction::FastSigmoid.apply(&mut m);
        assert_abs_diff_eq!(m.get(0, 0), 0.5);
        assert_abs_diff_eq!(m.get(0, 1), -0.75);

        ActivationFunction::FastSigmoid.derivative(&mut m).unwrap();
        assert_abs_diff_eq!(m.get(0, 0), 0.25);
        assert_abs_diff_eq!(m.get(0, 1), 0.5625);
    }

    #[test]
    fn relu_derivative_is_zero_at_zero() {
        let mut m = row(&[-2.0, 0.0, 3.0]);
        ActivationFunction::ReLU.apply(&mut m);
        assert_eq!(m.as_slice(), &[0.0, 0.0, 3.0]);

        ActivationFunction::ReLU.derivative(&mut m).unwrap();
        assert_eq!(m.as_slice(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn identity_is_noop_with_unit_derivative() {
        let mut m = row(&[-2.0, 7.0]);
        ActivationFunction::Identity.apply(&mut m);
        assert_eq!(m.as_slice(), &[-2.0, 7.0]);
        ActivationFunction::Identity.derivative(&mut m).unwrap();
        assert_eq!(m.as_slice(), &[1.0, 1.0]);
    }

    #[test]
    fn softmax_has_no_derivative() {
        let mut m = row(&[0.1, 0.9]);
        assert!(matches!(
            ActivationFunction::Softmax.derivative(&mut m),
            Err(NetError::InvalidTopology(_))
        ));
    }

    #[test]
    fn parses_names_and_rejects_unknown() {
        assert_eq!("ReLU".parse::<ActivationFunction>().unwrap(), ActivationFunction::ReLU);
        assert_eq!("fast-sigmoid".parse::<ActivationFunction>().unwrap(), ActivationFunction::FastSigmoid);
        assert!(matches!("tanh".parse::<ActivationFunction>(), Err(NetError::InvalidTopology(_))));

        let json = serde_json::to_string(&ActivationFunction::FastSigmoid).unwrap();
        assert_eq!(json, "\"fast_sigmoid\"");
        let back: ActivationFunction = serde_json::from_str("\"relu\"").unwrap();
        assert_eq!(back, ActivationFunction::ReLU);
    }
}
