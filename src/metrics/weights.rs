use crate::math::matrix::Matrix;

/// Summary of the values in one weight matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightStats {
    pub sum: f32,
    pub min: f32,
    pub max: f32,
    pub median: f32,
    pub mean: f32,
}

impl WeightStats {
    pub fn of(weights: &Matrix) -> WeightStats {
        let mut values = weights.as_slice().to_vec();
        if values.is_empty() {
            return WeightStats::default();
        }
        values.sort_by(f32::total_cmp);

        let sum: f32 = values.iter().sum();
        let mid = values.len() / 2;
        // even length: mean of the two middle values
        let median = if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        };
        WeightStats {
            sum,
            min: values[0],
            max: values[values.len() - 1],
            median,
            mean: sum / values.len() as f32,
        }
    }
}
