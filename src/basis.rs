//! Finite function bases for smoothing sampled curves.
//!
//! Two families are provided: uniform-knot B-splines and Fourier series.
//! Both produce an `n_points x nbasis` evaluation matrix with exactly
//! `nbasis` columns, so the basis size requested is the basis size fitted.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::FdaError;

/// Highest B-spline order used (cubic splines).
pub const MAX_BSPLINE_ORDER: usize = 4;

/// Basis family used by the smoother.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasisFamily {
    /// Piecewise polynomial splines on uniform knots (cubic when `nbasis >= 4`).
    #[default]
    BSpline,
    /// Constant plus sine/cosine pairs with period equal to the sample range.
    Fourier,
}

impl std::fmt::Display for BasisFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BasisFamily::BSpline => write!(f, "B-spline"),
            BasisFamily::Fourier => write!(f, "Fourier"),
        }
    }
}

fn sample_range(t: &[f64]) -> Result<(f64, f64), FdaError> {
    let t_min = t.iter().cloned().fold(f64::INFINITY, f64::min);
    let t_max = t.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(t_max > t_min) {
        return Err(FdaError::Numerical("sample grid must span a positive range"));
    }
    Ok((t_min, t_max))
}

/// Check `1 <= nbasis < n_points`.
pub fn validate_basis_size(nbasis: usize, n_points: usize) -> Result<(), FdaError> {
    if nbasis < 1 || nbasis >= n_points {
        return Err(FdaError::InvalidBasisSize {
            k: nbasis,
            n: n_points,
        });
    }
    Ok(())
}

/// Evaluate a B-spline basis with exactly `nbasis` functions on `t`.
///
/// The spline order is `min(4, nbasis)`. Breakpoints are uniform over
/// `[t_min, t_max]` and the knot vector is extended by `order - 1` knots on
/// each side, so every basis function is non-zero somewhere on the sample
/// range and the functions sum to one at every point.
pub fn bspline_basis(t: &[f64], nbasis: usize) -> Result<DMatrix<f64>, FdaError> {
    if nbasis == 0 {
        return Err(FdaError::InvalidBasisSize {
            k: nbasis,
            n: t.len(),
        });
    }
    let (t_min, t_max) = sample_range(t)?;
    let order = nbasis.min(MAX_BSPLINE_ORDER);
    // nbasis = n_breaks + order - 2
    let n_breaks = nbasis + 2 - order;
    let dt = (t_max - t_min) / (n_breaks - 1) as f64;

    let mut knots = Vec::with_capacity(n_breaks + 2 * (order - 1));
    for i in 0..(order - 1) {
        knots.push(t_min - (order - 1 - i) as f64 * dt);
    }
    for i in 0..(n_breaks - 1) {
        knots.push(t_min + i as f64 * dt);
    }
    knots.push(t_max);
    for i in 1..order {
        knots.push(t_max + i as f64 * dt);
    }

    // The interval ending at t_max is closed on the right.
    let last_interval = order + n_breaks - 3;
    let n = t.len();
    let mut basis = DMatrix::zeros(n, nbasis);

    for (ti, &t_val) in t.iter().enumerate() {
        let mut b = vec![0.0; knots.len() - 1];
        for j in 0..(knots.len() - 1) {
            let inside = if j == last_interval {
                t_val >= knots[j] && t_val <= knots[j + 1]
            } else {
                t_val >= knots[j] && t_val < knots[j + 1]
            };
            if inside {
                b[j] = 1.0;
                break;
            }
        }

        for k in 2..=order {
            let mut b_next = vec![0.0; knots.len() - k];
            for j in 0..(knots.len() - k) {
                let d1 = knots[j + k - 1] - knots[j];
                let d2 = knots[j + k] - knots[j + 1];
                let left = if d1.abs() > 1e-12 {
                    (t_val - knots[j]) / d1 * b[j]
                } else {
                    0.0
                };
                let right = if d2.abs() > 1e-12 {
                    (knots[j + k] - t_val) / d2 * b[j + 1]
                } else {
                    0.0
                };
                b_next[j] = left + right;
            }
            b = b_next;
        }

        for j in 0..nbasis {
            basis[(ti, j)] = b[j];
        }
    }

    Ok(basis)
}

/// Evaluate a Fourier basis with exactly `nbasis` functions on `t`.
///
/// Column 0 is the constant 1; subsequent columns alternate `sin(f x)` and
/// `cos(f x)` for frequencies `f = 1, 2, ...`, with
/// `x = 2 pi (t - t_min) / (t_max - t_min)`.
pub fn fourier_basis(t: &[f64], nbasis: usize) -> Result<DMatrix<f64>, FdaError> {
    if nbasis == 0 {
        return Err(FdaError::InvalidBasisSize {
            k: nbasis,
            n: t.len(),
        });
    }
    let (t_min, t_max) = sample_range(t)?;
    let period = t_max - t_min;
    let n = t.len();
    let mut basis = DMatrix::zeros(n, nbasis);

    for (i, &ti) in t.iter().enumerate() {
        let x = 2.0 * PI * (ti - t_min) / period;
        basis[(i, 0)] = 1.0;

        let mut k = 1;
        let mut freq = 1.0;
        while k < nbasis {
            basis[(i, k)] = (freq * x).sin();
            k += 1;
            if k < nbasis {
                basis[(i, k)] = (freq * x).cos();
                k += 1;
            }
            freq += 1.0;
        }
    }

    Ok(basis)
}

/// Evaluate `family` with `nbasis` functions on the sample grid `t`.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::InvalidBasisSize`] | `nbasis < 1` or `nbasis >= t.len()` |
/// | [`FdaError::Numerical`] | The grid does not span a positive range |
pub fn basis_matrix(
    t: &[f64],
    family: BasisFamily,
    nbasis: usize,
) -> Result<DMatrix<f64>, FdaError> {
    validate_basis_size(nbasis, t.len())?;
    match family {
        BasisFamily::BSpline => bspline_basis(t, nbasis),
        BasisFamily::Fourier => fourier_basis(t, nbasis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_grid(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
    }

    // ============== B-spline basis tests ==============

    #[test]
    fn test_bspline_basis_dimensions() {
        let t = uniform_grid(50);
        for nbasis in 1..=12 {
            let basis = bspline_basis(&t, nbasis).unwrap();
            assert_eq!(basis.shape(), (50, nbasis));
        }
    }

    #[test]
    fn test_bspline_basis_partition_of_unity() {
        let t = uniform_grid(50);
        for nbasis in [1, 2, 3, 4, 7, 15] {
            let basis = bspline_basis(&t, nbasis).unwrap();
            for i in 0..t.len() {
                let sum: f64 = basis.row(i).iter().sum();
                assert!(
                    (sum - 1.0).abs() < 1e-10,
                    "partition of unity failed at point {} with nbasis {}: sum = {}",
                    i,
                    nbasis,
                    sum
                );
            }
        }
    }

    #[test]
    fn test_bspline_basis_non_negative() {
        let t = uniform_grid(40);
        let basis = bspline_basis(&t, 9).unwrap();
        assert!(basis.iter().all(|&v| v >= -1e-12));
    }

    #[test]
    fn test_bspline_every_function_used() {
        let t = uniform_grid(60);
        let basis = bspline_basis(&t, 10).unwrap();
        for j in 0..10 {
            let col_max = basis.column(j).iter().cloned().fold(0.0, f64::max);
            assert!(col_max > 0.0, "basis function {} vanishes on the grid", j);
        }
    }

    #[test]
    fn test_bspline_hourly_grid() {
        let t: Vec<f64> = (6..54).map(|h| h as f64).collect();
        let basis = bspline_basis(&t, 8).unwrap();
        let last: f64 = basis.row(t.len() - 1).iter().sum();
        assert!((last - 1.0).abs() < 1e-10);
    }

    // ============== Fourier basis tests ==============

    #[test]
    fn test_fourier_basis_dimensions_even_and_odd() {
        let t = uniform_grid(30);
        assert_eq!(fourier_basis(&t, 5).unwrap().shape(), (30, 5));
        assert_eq!(fourier_basis(&t, 6).unwrap().shape(), (30, 6));
    }

    #[test]
    fn test_fourier_basis_columns() {
        let t = uniform_grid(9);
        let basis = fourier_basis(&t, 3).unwrap();
        for i in 0..t.len() {
            let x = 2.0 * PI * t[i];
            assert_eq!(basis[(i, 0)], 1.0);
            assert!((basis[(i, 1)] - x.sin()).abs() < 1e-12);
            assert!((basis[(i, 2)] - x.cos()).abs() < 1e-12);
        }
    }

    // ============== Validation tests ==============

    #[test]
    fn test_basis_matrix_rejects_invalid_size() {
        let t = uniform_grid(10);
        assert_eq!(
            basis_matrix(&t, BasisFamily::BSpline, 10).unwrap_err(),
            FdaError::InvalidBasisSize { k: 10, n: 10 }
        );
        assert_eq!(
            basis_matrix(&t, BasisFamily::Fourier, 0).unwrap_err(),
            FdaError::InvalidBasisSize { k: 0, n: 10 }
        );
    }

    #[test]
    fn test_basis_matrix_degenerate_grid() {
        let t = vec![1.0; 5];
        assert!(matches!(
            basis_matrix(&t, BasisFamily::BSpline, 3),
            Err(FdaError::Numerical(_))
        ));
    }

    #[test]
    fn test_basis_family_display() {
        assert_eq!(BasisFamily::BSpline.to_string(), "B-spline");
        assert_eq!(BasisFamily::Fourier.to_string(), "Fourier");
    }
}
