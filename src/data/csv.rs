//! Plain numeric CSV: comma-separated values, one sample per line, no header.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;

/// Reads a matrix of floats. Blank lines are skipped; every other line must
/// have the same number of columns as the first.
pub fn read_matrix(path: impl AsRef<Path>) -> Result<Matrix> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut data = Vec::new();
    let mut cols = None;
    let mut rows = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let before = data.len();
        for cell in line.split(',') {
            let value = cell.trim().parse::<f32>().map_err(|_| NetError::Csv {
                line: idx + 1,
                message: format!("'{}' is not a number", cell.trim()),
            })?;
            data.push(value);
        }

        let width = data.len() - before;
        match cols {
            None => cols = Some(width),
            Some(c) if c != width => {
                return Err(NetError::Csv {
                    line: idx + 1,
                    message: format!("expected {c} columns, got {width}"),
                })
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let cols = cols.ok_or(NetError::EmptyMatrix)?;
    debug!(path = %path.display(), rows, cols, "read CSV matrix");
    Matrix::from_vec(rows, cols, data)
}

/// Reads one class index per line (first column of each line).
pub fn read_labels(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let reader = BufReader::new(File::open(path.as_ref())?);

    let mut labels = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let cell = line.split(',').next().unwrap_or_default().trim();
        let label = cell.parse::<u32>().map_err(|_| NetError::Csv {
            line: idx + 1,
            message: format!("class index '{cell}' is not a non-negative integer"),
        })?;
        labels.push(label);
    }
    Ok(labels)
}

/// Divides every row by its maximum. Rows whose maximum is not positive are
/// left untouched.
pub fn normalize_rows(matrix: &mut Matrix) {
    let mut skipped = 0usize;
    for i in 0..matrix.rows() {
        let max = matrix.max_of_row(i);
        if max > 0.0 {
            matrix.row_mut(i).iter_mut().for_each(|x| *x /= max);
        } else {
            skipped += 1;
        }
    }
    if skipped > 0 {
        warn!(skipped, "rows with non-positive maximum were not normalized");
    }
}

/// Writes one predicted class index per line.
pub fn write_labels(path: impl AsRef<Path>, labels: &[usize]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    for label in labels {
        writeln!(writer, "{label}")?;
    }
    writer.flush()?;
    Ok(())
}
