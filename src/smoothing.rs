//! Basis smoothing of sampled curves.
//!
//! Each curve is projected onto a finite basis by ordinary least squares and
//! evaluated back on its sample grid. The Gram matrix is inverted through an
//! SVD pseudo-inverse so nearly collinear bases (a Fourier basis whose period
//! equals the sample range, say) still produce a fit.

use nalgebra::{DMatrix, DVector, SVD};
#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;
use tracing::{debug, info, instrument};

use crate::basis::{basis_matrix, validate_basis_size, BasisFamily};
use crate::curves::CurveSet;
use crate::error::{ensure_same_len, FdaError};
use crate::iter_maybe_parallel;
use crate::matrix::FdMatrix;

/// Default lower bound for cross-validated basis size.
pub const DEFAULT_MIN_NBASIS: usize = 4;
/// Default upper bound for cross-validated basis size.
pub const DEFAULT_MAX_NBASIS: usize = 15;

/// A curve re-expressed in a finite basis.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedCurve {
    /// Basis coefficients (length `nbasis`).
    pub coefficients: Vec<f64>,
    /// Fitted values on the original sample grid.
    pub fitted: Vec<f64>,
    /// Basis family used.
    pub family: BasisFamily,
    /// Number of basis functions.
    pub nbasis: usize,
    /// Residual sum of squares of the fit.
    pub rss: f64,
}

/// Least-squares smoother for one sample grid, basis family and basis size.
///
/// Building a `Smoother` factors the basis once; every curve smoothed with it
/// reuses the projection.
#[derive(Debug, Clone)]
pub struct Smoother {
    family: BasisFamily,
    nbasis: usize,
    basis: DMatrix<f64>,
    projection: DMatrix<f64>,
    hat: DMatrix<f64>,
}

/// Moore-Penrose inverse of `B'B` via SVD, dropping singular values below
/// `1e-10 * max`.
fn gram_pseudo_inverse(b_mat: &DMatrix<f64>) -> Result<DMatrix<f64>, FdaError> {
    let k = b_mat.ncols();
    let btb = b_mat.transpose() * b_mat;
    let svd = SVD::new(btb, true, true);

    let max_sv = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let eps = 1e-10 * max_sv;

    let u = svd
        .u
        .as_ref()
        .ok_or(FdaError::Numerical("SVD of the Gram matrix returned no U"))?;
    let v_t = svd
        .v_t
        .as_ref()
        .ok_or(FdaError::Numerical("SVD of the Gram matrix returned no V'"))?;

    let s_inv: Vec<f64> = svd
        .singular_values
        .iter()
        .map(|&s| if s > eps { 1.0 / s } else { 0.0 })
        .collect();

    let mut inv = DMatrix::zeros(k, k);
    for i in 0..k {
        for j in 0..k {
            let mut sum = 0.0;
            for l in 0..s_inv.len() {
                sum += v_t[(l, i)] * s_inv[l] * u[(j, l)];
            }
            inv[(i, j)] = sum;
        }
    }
    Ok(inv)
}

impl Smoother {
    /// Factor the basis on `argvals`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::InvalidBasisSize`] | `nbasis < 1` or `nbasis >= argvals.len()` |
    /// | [`FdaError::Numerical`] | Degenerate grid or failed decomposition |
    pub fn new(argvals: &[f64], family: BasisFamily, nbasis: usize) -> Result<Self, FdaError> {
        let basis = basis_matrix(argvals, family, nbasis)?;
        let gram_inv = gram_pseudo_inverse(&basis)?;
        let projection = &gram_inv * basis.transpose();
        let hat = &basis * &projection;
        Ok(Self {
            family,
            nbasis,
            basis,
            projection,
            hat,
        })
    }

    /// Basis family of this smoother.
    pub fn family(&self) -> BasisFamily {
        self.family
    }

    /// Number of basis functions.
    pub fn nbasis(&self) -> usize {
        self.nbasis
    }

    /// Number of sample points the smoother was built for.
    pub fn n_points(&self) -> usize {
        self.basis.nrows()
    }

    /// Smooth one curve.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::LengthMismatch`] | `curve.len()` differs from the grid length |
    pub fn smooth(&self, curve: &[f64]) -> Result<SmoothedCurve, FdaError> {
        ensure_same_len(self.n_points(), curve.len())?;
        let y = DVector::from_column_slice(curve);
        let coefs = &self.projection * &y;
        let fitted = &self.basis * &coefs;
        let rss: f64 = curve
            .iter()
            .zip(fitted.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();

        Ok(SmoothedCurve {
            coefficients: coefs.iter().copied().collect(),
            fitted: fitted.iter().copied().collect(),
            family: self.family,
            nbasis: self.nbasis,
            rss,
        })
    }

    /// Leave-one-out cross-validation mean squared residual for one curve.
    ///
    /// For a linear smoother the leave-one-out residual at point `i` is
    /// `r_i / (1 - h_ii)`, so no refitting is needed. Returns infinity when a
    /// point has leverage one.
    pub fn loocv_score(&self, curve: &[f64]) -> Result<f64, FdaError> {
        ensure_same_len(self.n_points(), curve.len())?;
        let y = DVector::from_column_slice(curve);
        let fitted = &self.hat * &y;
        let mut total = 0.0;
        for i in 0..curve.len() {
            let leverage = 1.0 - self.hat[(i, i)];
            if leverage < 1e-8 {
                return Ok(f64::INFINITY);
            }
            let r = (curve[i] - fitted[i]) / leverage;
            total += r * r;
        }
        Ok(total / curve.len() as f64)
    }

    /// Smooth every curve in `set`, keeping ids and grid.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::LengthMismatch`] | The set's grid differs in length from the smoother's |
    pub fn smooth_set(&self, set: &CurveSet) -> Result<CurveSet, FdaError> {
        ensure_same_len(self.n_points(), set.n_points())?;
        let y = set.data().to_dmatrix();
        // Rows are curves, so fitted = Y H' (H is symmetric).
        let fitted = y * self.hat.transpose();
        let (n, m) = fitted.shape();
        let data = FdMatrix::from_column_major(fitted.as_slice().to_vec(), n, m)?;
        CurveSet::new(set.ids().to_vec(), set.argvals().to_vec(), data)
    }
}

/// Smooth a single curve sampled on `argvals`.
pub fn smooth_curve(
    curve: &[f64],
    argvals: &[f64],
    family: BasisFamily,
    nbasis: usize,
) -> Result<SmoothedCurve, FdaError> {
    Smoother::new(argvals, family, nbasis)?.smooth(curve)
}

/// Outcome of cross-validated basis size selection.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisSelection {
    /// Selected basis size.
    pub nbasis: usize,
    /// Mean LOOCV residual of the selected size.
    pub score: f64,
    /// `(nbasis, score)` for every candidate, ascending by `nbasis`.
    pub candidates: Vec<(usize, f64)>,
}

/// Choose the basis size in `[min_nbasis, max_nbasis]` that minimizes the
/// leave-one-out mean squared residual averaged over every curve of `data`.
///
/// The upper bound is clipped to `n_points - 1`. Ties go to the smallest size.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::InvalidRange`] | `min_nbasis > max_nbasis` |
/// | [`FdaError::InvalidBasisSize`] | `min_nbasis < 1` or `min_nbasis >= n_points` |
/// | [`FdaError::EmptyInput`] | `data` holds no curves |
#[instrument(skip(data, argvals), fields(n_curves = data.nrows(), n_points = data.ncols()))]
pub fn select_basis_size(
    data: &FdMatrix,
    argvals: &[f64],
    family: BasisFamily,
    min_nbasis: usize,
    max_nbasis: usize,
) -> Result<BasisSelection, FdaError> {
    if min_nbasis > max_nbasis {
        return Err(FdaError::InvalidRange {
            min: min_nbasis,
            max: max_nbasis,
            reason: "minimum basis size exceeds maximum",
        });
    }
    let (n, m) = data.shape();
    if n == 0 {
        return Err(FdaError::EmptyInput);
    }
    ensure_same_len(m, argvals.len())?;
    validate_basis_size(min_nbasis, m)?;
    let max_nb = max_nbasis.min(m - 1);

    let curves = data.rows();
    let scored: Vec<Result<(usize, f64), FdaError>> = iter_maybe_parallel!(min_nbasis..=max_nb)
        .map(|nbasis| {
            let smoother = Smoother::new(argvals, family, nbasis)?;
            let mut total = 0.0;
            for curve in &curves {
                total += smoother.loocv_score(curve)?;
            }
            Ok((nbasis, total / n as f64))
        })
        .collect();
    let candidates = scored.into_iter().collect::<Result<Vec<_>, _>>()?;

    let mut best: Option<(usize, f64)> = None;
    for &(nbasis, score) in &candidates {
        debug!(nbasis, score, "basis size candidate");
        // Scores within rounding of the incumbent count as ties.
        let better = match best {
            Some((_, incumbent)) => incumbent - score > 1e-12 * (1.0 + incumbent.abs()),
            None => true,
        };
        if better {
            best = Some((nbasis, score));
        }
    }
    let best = best.ok_or(FdaError::EmptyInput)?;
    info!(nbasis = best.0, score = best.1, %family, "selected basis size");

    Ok(BasisSelection {
        nbasis: best.0,
        score: best.1,
        candidates,
    })
}
