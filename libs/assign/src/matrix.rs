//! Dense cost matrix storage.

use crate::error::AssignError;

/// Row-major dense cost matrix.
///
/// Entries are non-negative integers. The matrix may be rectangular; the
/// solver pads it to square internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostMatrix {
    rows: usize,
    cols: usize,
    data: Vec<u64>,
}

impl CostMatrix {
    /// Create a matrix with every entry set to `fill`.
    pub fn new(rows: usize, cols: usize, fill: u64) -> Self {
        Self {
            rows,
            cols,
            data: vec![fill; rows * cols],
        }
    }

    /// Build a matrix by evaluating `f(row, col)` for every entry.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> u64,
    {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    /// Build a matrix from nested rows. All rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<u64>>) -> Result<Self, AssignError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);

        for (row, values) in rows.iter().enumerate() {
            if values.len() != cols {
                return Err(AssignError::Ragged {
                    row,
                    expected: cols,
                    found: values.len(),
                });
            }
            data.extend_from_slice(values);
        }

        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Entry at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if the position is out of bounds.
    pub fn get(&self, row: usize, col: usize) -> u64 {
        assert!(row < self.rows && col < self.cols, "index out of bounds");
        self.data[row * self.cols + col]
    }

    /// Overwrite the entry at `(row, col)`.
    pub fn set(&mut self, row: usize, col: usize, value: u64) {
        assert!(row < self.rows && col < self.cols, "index out of bounds");
        self.data[row * self.cols + col] = value;
    }

    /// Copy into a square `n x n` buffer, padding with zeros.
    pub(crate) fn padded_square(&self) -> (usize, Vec<u64>) {
        let n = self.rows.max(self.cols);
        let mut out = vec![0; n * n];
        for r in 0..self.rows {
            let src = &self.data[r * self.cols..(r + 1) * self.cols];
            out[r * n..r * n + self.cols].copy_from_slice(src);
        }
        (n, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_rejects_ragged() {
        let err = CostMatrix::from_rows(vec![vec![1, 2], vec![3]]).unwrap_err();
        assert_eq!(
            err,
            AssignError::Ragged {
                row: 1,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_from_fn_matches_get() {
        let m = CostMatrix::from_fn(2, 3, |r, c| (r * 10 + c) as u64);
        assert_eq!(m.get(0, 2), 2);
        assert_eq!(m.get(1, 0), 10);
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
    }

    #[test]
    fn test_padded_square() {
        let m = CostMatrix::from_rows(vec![vec![5, 6, 7]]).unwrap();
        let (n, data) = m.padded_square();
        assert_eq!(n, 3);
        assert_eq!(data, vec![5, 6, 7, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_empty() {
        assert!(CostMatrix::from_rows(vec![]).unwrap().is_empty());
        assert!(CostMatrix::new(3, 0, 1).is_empty());
        assert!(!CostMatrix::new(1, 1, 0).is_empty());
    }
}
