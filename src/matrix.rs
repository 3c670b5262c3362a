//! Column-major storage for a set of sampled curves.
//!
//! [`FdMatrix`] keeps one curve per row and one sample point per column in a
//! flat column-major buffer, so element `(curve, point)` lives at
//! `curve + point * n_curves`. Columns (all curves at one sample point) are
//! contiguous, which is what the depth measures scan.

use nalgebra::DMatrix;

use crate::error::FdaError;

/// Column-major matrix of curves (rows) by sample points (columns).
///
/// ```
/// use fdaval::matrix::FdMatrix;
///
/// let mat = FdMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
/// assert_eq!(mat.shape(), (2, 3));
/// assert_eq!(mat[(1, 0)], 4.0);
/// assert_eq!(mat.column(2), &[3.0, 6.0]);
/// assert_eq!(mat.row(0), vec![1.0, 2.0, 3.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FdMatrix {
    data: Vec<f64>,
    nrows: usize,
    ncols: usize,
}

impl FdMatrix {
    /// Wrap flat column-major data.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::ShapeMismatch`] | `data.len() != nrows * ncols` |
    pub fn from_column_major(data: Vec<f64>, nrows: usize, ncols: usize) -> Result<Self, FdaError> {
        if data.len() != nrows * ncols {
            return Err(FdaError::ShapeMismatch {
                len: data.len(),
                rows: nrows,
                cols: ncols,
            });
        }
        Ok(Self { data, nrows, ncols })
    }

    /// Build from one vector per curve.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::LengthMismatch`] | Curves have different lengths |
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, FdaError> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        let mut data = vec![0.0; nrows * ncols];
        for (i, row) in rows.iter().enumerate() {
            if row.len() != ncols {
                return Err(FdaError::LengthMismatch {
                    expected: ncols,
                    got: row.len(),
                });
            }
            for (j, &v) in row.iter().enumerate() {
                data[i + j * nrows] = v;
            }
        }
        Ok(Self { data, nrows, ncols })
    }

    /// Number of curves.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of sample points.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Dimensions as `(nrows, ncols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// All curves at one sample point (zero-copy).
    ///
    /// # Panics
    /// Panics if `col >= ncols`.
    #[inline]
    pub fn column(&self, col: usize) -> &[f64] {
        let start = col * self.nrows;
        &self.data[start..start + self.nrows]
    }

    /// One curve, copied out of the column-major buffer.
    pub fn row(&self, row: usize) -> Vec<f64> {
        (0..self.ncols)
            .map(|j| self.data[row + j * self.nrows])
            .collect()
    }

    /// Every curve as its own vector.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.nrows).map(|i| self.row(i)).collect()
    }

    /// Pointwise mean across curves.
    pub fn mean_curve(&self) -> Vec<f64> {
        if self.nrows == 0 {
            return Vec::new();
        }
        (0..self.ncols)
            .map(|j| self.column(j).iter().sum::<f64>() / self.nrows as f64)
            .collect()
    }

    /// Copy into a nalgebra matrix; both layouts are column-major.
    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(self.nrows, self.ncols, &self.data)
    }
}

impl std::ops::Index<(usize, usize)> for FdMatrix {
    type Output = f64;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        debug_assert!(
            row < self.nrows && col < self.ncols,
            "FdMatrix index ({}, {}) out of bounds for {}x{} matrix",
            row,
            col,
            self.nrows,
            self.ncols
        );
        &self.data[row + col * self.nrows]
    }
}
