use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::pipeline::{check_aligned, Batch};
use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;

/// Training and validation sets produced once per run.
#[derive(Debug, Clone)]
pub struct TrainValSplit {
    pub train: Batch,
    pub validation: Batch,
}

/// Shuffles, groups rows by label, and moves the first `train_ratio` share of
/// every class (rounded down) into the training set. The rest of each class
/// goes to validation, so class proportions are preserved in both halves.
pub fn stratified_split<R: Rng + ?Sized>(
    data: &Matrix,
    labels: &[u32],
    train_ratio: f32,
    rng: &mut R,
) -> Result<TrainValSplit> {
    check_aligned(data, labels)?;
    if !(train_ratio > 0.0 && train_ratio <= 1.0) {
        return Err(NetError::InvalidConfig(format!(
            "train ratio must be in (0, 1], got {train_ratio}"
        )));
    }

    let mut indices: Vec<usize> = (0..labels.len()).collect();
    indices.shuffle(rng);

    let mut by_class: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for i in indices {
        by_class.entry(labels[i]).or_default().push(i);
    }

    let mut train_idx = Vec::new();
    let mut val_idx = Vec::new();
    for members in by_class.values() {
        let take = (members.len() as f32 * train_ratio) as usize;
        train_idx.extend_from_slice(&members[..take]);
        val_idx.extend_from_slice(&members[take..]);
    }

    if train_idx.is_empty() {
        return Err(NetError::EmptyMatrix);
    }

    // Undo the grouping by class.
    train_idx.shuffle(rng);
    val_idx.shuffle(rng);

    let gather = |idx: &[usize]| Batch {
        data: data.select_rows(idx),
        labels: idx.iter().map(|&i| labels[i]).collect(),
    };

    Ok(TrainValSplit {
        train: gather(&train_idx),
        validation: gather(&val_idx),
    })
}
