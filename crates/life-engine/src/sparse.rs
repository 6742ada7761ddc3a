// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Sparse forward matrix
//!
//! Rows are `voxel * n_directions + direction`, columns are fascicles. The
//! matrix is held twice: column-compressed for per-fascicle access and
//! `Mᵀ r`, row-compressed for `M w`. Both products run in parallel without
//! shared writes (each output slot is owned by exactly one task).
//!
//! The sparsity pattern records traversal: a column stores every row of each
//! voxel its fascicle passes through, including entries whose value is zero.

use rayon::prelude::*;

use life_structures::{LifeError, Result};

/// One fascicle's stored entries, sorted by row
pub type SparseColumn = Vec<(usize, f64)>;

#[derive(Debug, Clone, PartialEq)]
pub struct ForwardMatrix {
    n_rows: usize,
    n_directions: usize,
    // CSC
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    col_values: Vec<f64>,
    // CSR
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    row_values: Vec<f64>,
}

impl ForwardMatrix {
    /// Assemble from per-fascicle columns in column order.
    ///
    /// Each column must be sorted by row with rows `< n_rows`; the builder
    /// guarantees both.
    pub fn from_columns(n_rows: usize, n_directions: usize, columns: Vec<SparseColumn>) -> Self {
        let nnz: usize = columns.iter().map(|c| c.len()).sum();

        let mut col_ptr = Vec::with_capacity(columns.len() + 1);
        let mut row_idx = Vec::with_capacity(nnz);
        let mut col_values = Vec::with_capacity(nnz);
        let mut row_counts = vec![0usize; n_rows];

        col_ptr.push(0);
        for column in &columns {
            for &(row, value) in column {
                row_idx.push(row);
                col_values.push(value);
                row_counts[row] += 1;
            }
            col_ptr.push(row_idx.len());
        }

        // Transpose by counting sort; columns are visited in order so each
        // row's column indices come out sorted.
        let mut row_ptr = Vec::with_capacity(n_rows + 1);
        row_ptr.push(0);
        for count in &row_counts {
            let last = *row_ptr.last().unwrap_or(&0);
            row_ptr.push(last + count);
        }
        let mut next = row_ptr[..n_rows].to_vec();
        let mut col_idx = vec![0usize; nnz];
        let mut row_values = vec![0.0; nnz];
        for col in 0..columns.len() {
            for k in col_ptr[col]..col_ptr[col + 1] {
                let row = row_idx[k];
                let slot = next[row];
                col_idx[slot] = col;
                row_values[slot] = col_values[k];
                next[row] += 1;
            }
        }

        Self {
            n_rows,
            n_directions,
            col_ptr,
            row_idx,
            col_values,
            row_ptr,
            col_idx,
            row_values,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.col_ptr.len() - 1
    }

    pub fn n_directions(&self) -> usize {
        self.n_directions
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.col_values.len()
    }

    /// Rows and values of column `col`
    pub fn column(&self, col: usize) -> (&[usize], &[f64]) {
        let range = self.col_ptr[col]..self.col_ptr[col + 1];
        (&self.row_idx[range.clone()], &self.col_values[range])
    }

    /// True when column `col` stores nothing, i.e. its fascicle traverses no
    /// masked voxel
    pub fn column_is_zero(&self, col: usize) -> bool {
        self.col_ptr[col] == self.col_ptr[col + 1]
    }

    /// Sorted masked-voxel indices traversed by column `col`
    pub fn column_voxels(&self, col: usize) -> Vec<usize> {
        let (rows, _) = self.column(col);
        let mut voxels: Vec<usize> = rows
            .iter()
            .map(|&r| r / self.n_directions.max(1))
            .collect();
        voxels.dedup();
        voxels
    }

    fn check_len(&self, what: &str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(LifeError::dimension(what, expected, actual))
        }
    }

    /// `M w`
    ///
    /// # Errors
    /// `DimensionMismatch` if `w.len() != n_cols`.
    pub fn mul_vec(&self, w: &[f64]) -> Result<Vec<f64>> {
        self.check_len("weight vector", self.n_cols(), w.len())?;
        let mut out = vec![0.0; self.n_rows];
        self.mul_vec_into(w, &mut out);
        Ok(out)
    }

    pub(crate) fn mul_vec_into(&self, w: &[f64], out: &mut [f64]) {
        out.par_iter_mut().enumerate().for_each(|(row, slot)| {
            *slot = self.row_dot(row, w);
        });
    }

    fn row_dot(&self, row: usize, w: &[f64]) -> f64 {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        self.col_idx[range.clone()]
            .iter()
            .zip(&self.row_values[range])
            .map(|(&c, &v)| v * w[c])
            .sum()
    }

    /// `(M w)[r]` for the given rows only, in the order given
    ///
    /// # Errors
    /// `DimensionMismatch` for a wrong weight length, `IndexOutOfRange` for a
    /// row outside the matrix.
    pub fn mul_vec_rows(&self, w: &[f64], rows: &[usize]) -> Result<Vec<f64>> {
        self.check_len("weight vector", self.n_cols(), w.len())?;
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.n_rows) {
            return Err(LifeError::IndexOutOfRange {
                index: bad,
                len: self.n_rows,
            });
        }
        Ok(rows.par_iter().map(|&row| self.row_dot(row, w)).collect())
    }

    /// `Mᵀ r`
    ///
    /// # Errors
    /// `DimensionMismatch` if `r.len() != n_rows`.
    pub fn transpose_mul_vec(&self, r: &[f64]) -> Result<Vec<f64>> {
        self.check_len("residual vector", self.n_rows, r.len())?;
        let mut out = vec![0.0; self.n_cols()];
        self.transpose_mul_vec_into(r, &mut out);
        Ok(out)
    }

    pub(crate) fn transpose_mul_vec_into(&self, r: &[f64], out: &mut [f64]) {
        out.par_iter_mut().enumerate().for_each(|(col, slot)| {
            let (rows, values) = self.column(col);
            *slot = rows.iter().zip(values).map(|(&row, &v)| v * r[row]).sum();
        });
    }

    /// New matrix holding `columns` in the order given, re-indexed from 0
    ///
    /// # Errors
    /// `IndexOutOfRange` for a column outside the matrix.
    pub fn select_columns(&self, columns: &[usize]) -> Result<ForwardMatrix> {
        let n_cols = self.n_cols();
        let picked = columns
            .iter()
            .map(|&col| {
                if col >= n_cols {
                    return Err(LifeError::IndexOutOfRange {
                        index: col,
                        len: n_cols,
                    });
                }
                let (rows, values) = self.column(col);
                Ok(rows.iter().copied().zip(values.iter().copied()).collect())
            })
            .collect::<Result<Vec<SparseColumn>>>()?;
        Ok(ForwardMatrix::from_columns(self.n_rows, self.n_directions, picked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 4 rows (2 voxels × 2 directions), 3 columns:
    // [1 0 0]
    // [2 0 0]
    // [0 0 3]
    // [0 0 4]
    fn matrix() -> ForwardMatrix {
        ForwardMatrix::from_columns(
            4,
            2,
            vec![vec![(0, 1.0), (1, 2.0)], vec![], vec![(2, 3.0), (3, 4.0)]],
        )
    }

    #[test]
    fn test_stored_zeros_count_as_traversal() {
        let m = ForwardMatrix::from_columns(4, 2, vec![vec![(2, 0.0), (3, 0.0)], vec![]]);
        assert!(!m.column_is_zero(0));
        assert_eq!(m.column_voxels(0), vec![1]);
        assert!(m.column_is_zero(1));
        assert_eq!(m.mul_vec(&[5.0, 1.0]).unwrap(), vec![0.0; 4]);
    }

    #[test]
    fn test_shape() {
        let m = matrix();
        assert_eq!(m.n_rows(), 4);
        assert_eq!(m.n_cols(), 3);
        assert_eq!(m.nnz(), 4);
    }

    #[test]
    fn test_products() {
        let m = matrix();
        assert_eq!(m.mul_vec(&[1.0, 5.0, 2.0]).unwrap(), vec![1.0, 2.0, 6.0, 8.0]);
        assert_eq!(
            m.transpose_mul_vec(&[1.0, 1.0, 1.0, -1.0]).unwrap(),
            vec![3.0, 0.0, -1.0]
        );
        assert_eq!(m.mul_vec_rows(&[1.0, 0.0, 1.0], &[3, 0]).unwrap(), vec![4.0, 1.0]);
    }

    #[test]
    fn test_dimension_checks() {
        let m = matrix();
        assert!(matches!(
            m.mul_vec(&[1.0]),
            Err(LifeError::DimensionMismatch { expected: 3, actual: 1, .. })
        ));
        assert!(m.transpose_mul_vec(&[0.0; 3]).is_err());
        assert!(matches!(
            m.mul_vec_rows(&[0.0; 3], &[4]),
            Err(LifeError::IndexOutOfRange { index: 4, len: 4 })
        ));
    }

    #[test]
    fn test_zero_columns_and_voxels() {
        let m = matrix();
        assert!(!m.column_is_zero(0));
        assert!(m.column_is_zero(1));
        assert_eq!(m.column_voxels(0), vec![0]);
        assert_eq!(m.column_voxels(2), vec![1]);
        assert!(m.column_voxels(1).is_empty());
    }

    #[test]
    fn test_select_columns_reindexes() {
        let m = matrix();
        let sub = m.select_columns(&[2, 0]).unwrap();
        assert_eq!(sub.n_cols(), 2);
        assert_eq!(sub.mul_vec(&[1.0, 1.0]).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(sub.column(0).1, &[3.0, 4.0]);
        assert!(m.select_columns(&[3]).is_err());
    }
}
