use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;

/// Rows of input data with one class label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub data: Matrix,
    pub labels: Vec<u32>,
}

impl Batch {
    pub fn new(data: Matrix, labels: Vec<u32>) -> Result<Batch> {
        check_aligned(&data, &labels)?;
        Ok(Batch { data, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

pub(crate) fn check_aligned(data: &Matrix, labels: &[u32]) -> Result<()> {
    if data.rows() != labels.len() {
        return Err(NetError::shape(
            "data/labels alignment",
            format!("{} labels", data.rows()),
            format!("{} labels", labels.len()),
        ));
    }
    Ok(())
}

/// Reorders rows of `data` and `labels` by the same uniformly random
/// permutation (Fisher-Yates).
pub fn shuffle<R: Rng + ?Sized>(data: &Matrix, labels: &[u32], rng: &mut R) -> Result<Batch> {
    check_aligned(data, labels)?;

    let mut indices: Vec<usize> = (0..labels.len()).collect();
    indices.shuffle(rng);

    Ok(Batch {
        data: data.select_rows(&indices),
        labels: indices.iter().map(|&i| labels[i]).collect(),
    })
}

/// Splits rows into consecutive batches of at most `size` rows.
pub fn batch(data: &Matrix, labels: &[u32], size: usize) -> Result<Vec<Batch>> {
    check_aligned(data, labels)?;
    let batches = data
        .row_batches(size)?
        .into_iter()
        .zip(labels.chunks(size))
        .map(|(data, labels)| Batch {
            data,
            labels: labels.to_vec(),
        })
        .collect();
    Ok(batches)
}

/// Splits one batch into at most `workers` contiguous sub-batches of
/// `ceil(len / workers)` rows each.
pub fn sub_batch(batch: &Batch, workers: usize) -> Result<Vec<Batch>> {
    if workers == 0 {
        return Err(NetError::InvalidConfig("worker count must be at least 1".into()));
    }
    if batch.is_empty() {
        return Ok(vec![]);
    }
    let chunk = batch.len().div_ceil(workers);
    self::batch(&batch.data, &batch.labels, chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn numbered(rows: usize) -> (Matrix, Vec<u32>) {
        let data = Matrix::from_vec(rows, 2, (0..rows * 2).map(|x| x as f32).collect()).unwrap();
        let labels = (0..rows as u32).collect();
        (data, labels)
    }

    #[test]
    fn shuffle_keeps_rows_and_labels_together() {
        let (data, labels) = numbered(50);
        let mut rng = StdRng::seed_from_u64(11);

        let shuffled = shuffle(&data, &labels, &mut rng).unwrap();

        assert_ne!(shuffled.labels, labels);
        for (i, &l) in shuffled.labels.iter().enumerate() {
            assert_eq!(shuffled.data.row(i), data.row(l as usize));
        }
        let mut sorted = shuffled.labels.clone();
        sorted.sort();
        assert_eq!(sorted, labels);
    }

    #[test]
    fn shuffle_rejects_misaligned_input() {
        let (data, _) = numbered(4);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(shuffle(&data, &[0, 1], &mut rng), Err(NetError::Shape { .. })));
    }

    #[test]
    fn batch_partitions_in_order() {
        let (data, labels) = numbered(7);
        let batches = batch(&data, &labels, 3).unwrap();

        assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![3, 3, 1]);
        assert_eq!(batches[1].labels, vec![3, 4, 5]);
        assert_eq!(batches[2].data.row(0), data.row(6));
    }

    #[test]
    fn sub_batch_spreads_rows_over_workers() {
        let (data, labels) = numbered(10);
        let whole = Batch::new(data, labels).unwrap();

        let parts = sub_batch(&whole, 4).unwrap();
        assert_eq!(parts.iter().map(Batch::len).collect::<Vec<_>>(), vec![3, 3, 3, 1]);

        let parts = sub_batch(&whole, 1).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0], whole);

        assert!(sub_batch(&whole, 0).is_err());
    }
}
