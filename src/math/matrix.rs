use std::ops::{AddAssign, MulAssign, SubAssign};

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};

/// Dense 2-D matrix of `f32` stored row-major in a single contiguous buffer.
///
/// Invariant: `data.len() == rows * cols`. The shape never changes after
/// construction; factory methods build new instances instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix::filled(rows, cols, 0.0)
    }

    pub fn filled(rows: usize, cols: usize, value: f32) -> Matrix {
        Matrix {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Builds a matrix from nested rows. Every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Matrix> {
        let first = rows.first().ok_or(NetError::EmptyMatrix)?;
        let cols = first.len();

        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(NetError::shape(
                    "Matrix::from_rows",
                    format!("{cols} columns"),
                    format!("{} columns in row {i}", row.len()),
                ));
            }
            data.extend_from_slice(row);
        }

        Ok(Matrix {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Wraps an existing row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Matrix> {
        if data.len() != rows * cols {
            return Err(NetError::shape(
                "Matrix::from_vec",
                format!("{} elements", rows * cols),
                format!("{} elements", data.len()),
            ));
        }
        Ok(Matrix { rows, cols, data })
    }

    /// Samples every element from `Uniform(-limit, limit)`.
    pub fn random_uniform<R: Rng + ?Sized>(rows: usize, cols: usize, limit: f32, rng: &mut R) -> Matrix {
        let mut res = Matrix::zeros(rows, cols);
        if limit > 0.0 {
            let dist = Uniform::new_inclusive(-limit, limit);
            for x in res.data.iter_mut() {
                *x = dist.sample(rng);
            }
        }
        res
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    pub fn transpose(&self) -> Matrix {
        let mut res = Matrix::zeros(self.cols, self.rows);
        self.write_transposed(&mut res);
        res
    }

    /// Writes the transpose of `self` into an existing `(cols, rows)` matrix.
    pub fn transpose_into(&self, dst: &mut Matrix) -> Result<()> {
        if dst.rows != self.cols || dst.cols != self.rows {
            return Err(NetError::shape(
                "Matrix::transpose_into",
                format!("{}x{}", self.cols, self.rows),
                format!("{}x{}", dst.rows, dst.cols),
            ));
        }
        self.write_transposed(dst);
        Ok(())
    }

    fn write_transposed(&self, dst: &mut Matrix) {
        for i in 0..self.rows {
            for j in 0..self.cols {
                dst.data[j * dst.cols + i] = self.data[i * self.cols + j];
            }
        }
    }

    pub fn matmul(&self, rhs: &Matrix) -> Result<Matrix> {
        self.matmul_rows(rhs, self.rows)
    }

    /// Multiplies the first `limit_rows` rows of `self` by `rhs`.
    ///
    /// Accumulates in `i, k, j` order: each output row is built by adding
    /// `rhs` rows scaled by `self[i][k]`, which walks both operands row-major.
    pub fn matmul_rows(&self, rhs: &Matrix, limit_rows: usize) -> Result<Matrix> {
        if self.cols != rhs.rows {
            return Err(NetError::shape(
                "Matrix::matmul",
                format!("rhs with {} rows", self.cols),
                format!("{}x{}", rhs.rows, rhs.cols),
            ));
        }
        if limit_rows > self.rows {
            return Err(NetError::shape(
                "Matrix::matmul",
                format!("at most {} rows", self.rows),
                format!("{limit_rows} rows"),
            ));
        }

        let n = rhs.cols;
        let mut res = Matrix::zeros(limit_rows, n);

        for i in 0..limit_rows {
            let out = &mut res.data[i * n..(i + 1) * n];
            for k in 0..self.cols {
                let x = self.data[i * self.cols + k];
                let rhs_row = &rhs.data[k * n..(k + 1) * n];
                for (o, r) in out.iter_mut().zip(rhs_row) {
                    *o += x * r;
                }
            }
        }

        Ok(res)
    }

    fn check_same_shape(&self, rhs: &Matrix, context: &'static str) -> Result<()> {
        if self.rows != rhs.rows || self.cols != rhs.cols {
            return Err(NetError::shape(
                context,
                format!("{}x{}", self.rows, self.cols),
                format!("{}x{}", rhs.rows, rhs.cols),
            ));
        }
        Ok(())
    }

    /// Element-wise `self += rhs`.
    pub fn add_matrix(&mut self, rhs: &Matrix) -> Result<()> {
        self.check_same_shape(rhs, "Matrix::add_matrix")?;
        self.data.iter_mut().zip(&rhs.data).for_each(|(a, b)| *a += b);
        Ok(())
    }

    /// Element-wise `self -= rhs`.
    pub fn sub_matrix(&mut self, rhs: &Matrix) -> Result<()> {
        self.check_same_shape(rhs, "Matrix::sub_matrix")?;
        self.data.iter_mut().zip(&rhs.data).for_each(|(a, b)| *a -= b);
        Ok(())
    }

    /// Element-wise (Hadamard) `self *= rhs`.
    pub fn hadamard(&mut self, rhs: &Matrix) -> Result<()> {
        self.check_same_shape(rhs, "Matrix::hadamard")?;
        self.data.iter_mut().zip(&rhs.data).for_each(|(a, b)| *a *= b);
        Ok(())
    }

    /// Adds `vector` to every row.
    pub fn add_row_vector(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.cols {
            return Err(NetError::shape(
                "Matrix::add_row_vector",
                format!("vector of length {}", self.cols),
                format!("vector of length {}", vector.len()),
            ));
        }
        for row in self.data.chunks_exact_mut(self.cols.max(1)) {
            row.iter_mut().zip(vector).for_each(|(a, b)| *a += b);
        }
        Ok(())
    }

    /// Applies `f` to every element in place.
    pub fn apply<F>(&mut self, f: F)
    where
        F: Fn(f32) -> f32,
    {
        self.data.iter_mut().for_each(|x| *x = f(*x));
    }

    pub fn map<F>(&self, f: F) -> Matrix
    where
        F: Fn(f32) -> f32,
    {
        let mut res = self.clone();
        res.apply(f);
        res
    }

    pub fn max_of_row(&self, row: usize) -> f32 {
        self.row(row).iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn column_sums(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.cols];
        for row in self.data.chunks_exact(self.cols.max(1)) {
            sums.iter_mut().zip(row).for_each(|(s, x)| *s += x);
        }
        sums
    }

    /// Copies the listed rows, in order, into a new matrix.
    pub fn select_rows(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Matrix {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    /// Splits the rows into consecutive chunks of at most `batch_size` rows.
    /// The chunks preserve row order and partition the matrix; only the last
    /// one may be smaller.
    pub fn row_batches(&self, batch_size: usize) -> Result<Vec<Matrix>> {
        if batch_size == 0 {
            return Err(NetError::InvalidConfig("batch size must be at least 1".into()));
        }

        let batches = (0..self.rows)
            .step_by(batch_size)
            .map(|start| {
                let end = (start + batch_size).min(self.rows);
                Matrix {
                    rows: end - start,
                    cols: self.cols,
                    data: self.data[start * self.cols..end * self.cols].to_vec(),
                }
            })
            .collect();

        Ok(batches)
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix { rows: 0, cols: 0, data: vec![] }
    }
}

impl AddAssign<f32> for Matrix {
    fn add_assign(&mut self, rhs: f32) {
        self.apply(|x| x + rhs);
    }
}

impl SubAssign<f32> for Matrix {
    fn sub_assign(&mut self, rhs: f32) {
        self.apply(|x| x - rhs);
    }
}

impl MulAssign<f32> for Matrix {
    fn mul_assign(&mut self, rhs: f32) {
        self.apply(|x| x * rhs);
    }
}
