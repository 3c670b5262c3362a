//! Depth measures for curve sets.
//!
//! A depth assigns each curve a centrality score relative to the rest of the
//! set; the deepest curve is the set's most representative member.

#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::curves::CurveSet;
use crate::error::{ensure_same_len, FdaError};
use crate::helpers::{argmax, l2_distance, trapezoid_weights};
use crate::matrix::FdMatrix;
use crate::{iter_maybe_parallel, slice_maybe_parallel};

/// Scores within this tolerance of the maximum count as tied.
const TIE_TOL: f64 = 1e-12;

/// Functional depth measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthMethod {
    /// Modified band depth over pairs of the other curves.
    ModifiedBand,
    /// Inverse of one plus the mean absolute deviation from the mean curve.
    MeanDistance,
    /// Inverse of one plus the L2 distance to the mean curve.
    Hypograph,
}

impl DepthMethod {
    /// Every method, in reporting order.
    pub const ALL: [DepthMethod; 3] = [
        DepthMethod::ModifiedBand,
        DepthMethod::MeanDistance,
        DepthMethod::Hypograph,
    ];
}

impl std::fmt::Display for DepthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepthMethod::ModifiedBand => write!(f, "modified band"),
            DepthMethod::MeanDistance => write!(f, "mean distance"),
            DepthMethod::Hypograph => write!(f, "hypograph"),
        }
    }
}

fn require_curves(data: &FdMatrix, needed: usize) -> Result<(), FdaError> {
    let (n, m) = data.shape();
    if m == 0 {
        return Err(FdaError::EmptyInput);
    }
    if n < needed {
        return Err(FdaError::TooFewCurves { needed, got: n });
    }
    Ok(())
}

/// Compute modified band depth of every curve.
///
/// MBD(x_i) is the average, over all pairs `(j, k)` of curves other than `i`,
/// of the fraction of sample points where `x_i` lies inside the band
/// `[min(x_j, x_k), max(x_j, x_k)]`.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::TooFewCurves`] | Fewer than 3 curves |
/// | [`FdaError::EmptyInput`] | Curves have no sample points |
pub fn modified_band_depth(data: &FdMatrix) -> Result<Vec<f64>, FdaError> {
    require_curves(data, 3)?;
    let (n, n_points) = data.shape();
    let n_pairs = ((n - 1) * (n - 2)) / 2;

    Ok(iter_maybe_parallel!(0..n)
        .map(|i| {
            let mut total_proportion = 0.0;

            for j in 0..n {
                if j == i {
                    continue;
                }
                for k in (j + 1)..n {
                    if k == i {
                        continue;
                    }
                    let mut count_inside = 0usize;

                    for t in 0..n_points {
                        let x_t = data[(i, t)];
                        let y_j_t = data[(j, t)];
                        let y_k_t = data[(k, t)];

                        let band_min = y_j_t.min(y_k_t);
                        let band_max = y_j_t.max(y_k_t);

                        if x_t >= band_min && x_t <= band_max {
                            count_inside += 1;
                        }
                    }

                    total_proportion += count_inside as f64 / n_points as f64;
                }
            }

            total_proportion / n_pairs as f64
        })
        .collect())
}

/// Compute band depth of every curve.
///
/// BD(x_i) is the fraction of pairs of other curves whose band contains
/// `x_i` at every sample point.
///
/// # Errors
///
/// Same as [`modified_band_depth`].
pub fn band_depth(data: &FdMatrix) -> Result<Vec<f64>, FdaError> {
    require_curves(data, 3)?;
    let (n, n_points) = data.shape();
    let n_pairs = ((n - 1) * (n - 2)) / 2;

    Ok(iter_maybe_parallel!(0..n)
        .map(|i| {
            let mut count_in_band = 0usize;

            for j in 0..n {
                if j == i {
                    continue;
                }
                for k in (j + 1)..n {
                    if k == i {
                        continue;
                    }
                    let inside_band = (0..n_points).all(|t| {
                        let x_t = data[(i, t)];
                        let band_min = data[(j, t)].min(data[(k, t)]);
                        let band_max = data[(j, t)].max(data[(k, t)]);
                        x_t >= band_min && x_t <= band_max
                    });
                    if inside_band {
                        count_in_band += 1;
                    }
                }
            }

            count_in_band as f64 / n_pairs as f64
        })
        .collect())
}

/// Compute mean-distance depth `1 / (1 + mean_t |x_i(t) - mean(t)|)`.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::TooFewCurves`] | No curves |
/// | [`FdaError::EmptyInput`] | Curves have no sample points |
pub fn mean_distance_depth(data: &FdMatrix) -> Result<Vec<f64>, FdaError> {
    require_curves(data, 1)?;
    let (n, n_points) = data.shape();
    let mean = data.mean_curve();

    Ok(iter_maybe_parallel!(0..n)
        .map(|i| {
            let mad: f64 = (0..n_points)
                .map(|t| (data[(i, t)] - mean[t]).abs())
                .sum::<f64>()
                / n_points as f64;
            1.0 / (1.0 + mad)
        })
        .collect())
}

/// Compute hypograph depth `1 / (1 + L2(x_i, mean))` with the trapezoidal
/// L2 norm on `argvals`.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::TooFewCurves`] | No curves |
/// | [`FdaError::EmptyInput`] | Curves have no sample points |
/// | [`FdaError::LengthMismatch`] | `argvals` length differs from the curve length |
pub fn hypograph_depth(data: &FdMatrix, argvals: &[f64]) -> Result<Vec<f64>, FdaError> {
    require_curves(data, 1)?;
    ensure_same_len(data.ncols(), argvals.len())?;
    let n = data.nrows();
    let mean = data.mean_curve();
    let weights = trapezoid_weights(argvals);

    Ok(iter_maybe_parallel!(0..n)
        .map(|i| 1.0 / (1.0 + l2_distance(&data.row(i), &mean, &weights)))
        .collect())
}

/// Compute depth of every curve in `set` with `method`.
pub fn depth(set: &CurveSet, method: DepthMethod) -> Result<Vec<f64>, FdaError> {
    match method {
        DepthMethod::ModifiedBand => modified_band_depth(set.data()),
        DepthMethod::MeanDistance => mean_distance_depth(set.data()),
        DepthMethod::Hypograph => hypograph_depth(set.data(), set.argvals()),
    }
}

/// Index of the maximum primary score. Curves tied on the primary score are
/// separated by the secondary score, then by lowest index.
fn argmax_with_tiebreak(primary: &[f64], secondary: impl FnOnce() -> Vec<f64>) -> Option<usize> {
    let best = argmax(primary)?;
    let tied: Vec<usize> = (0..primary.len())
        .filter(|&i| primary[best] - primary[i] <= TIE_TOL)
        .collect();
    if tied.len() == 1 {
        return Some(best);
    }
    let secondary = secondary();
    let tied_secondary: Vec<f64> = tied
        .iter()
        .map(|&i| secondary.get(i).copied().unwrap_or(f64::NAN))
        .collect();
    argmax(&tied_secondary).map(|pos| tied[pos]).or(Some(best))
}

/// Depth scores of one method and the deepest curve they select.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthRanking {
    /// Method used.
    pub method: DepthMethod,
    /// Depth per curve, in curve-set order.
    pub scores: Vec<f64>,
    /// Index of the most representative curve.
    pub representative: usize,
}

impl DepthRanking {
    /// Score every curve of `set` and pick the deepest.
    ///
    /// Ties go to the lowest index; for modified band depth, curves tied on
    /// MBD are first separated by band depth.
    pub fn compute(set: &CurveSet, method: DepthMethod) -> Result<Self, FdaError> {
        let scores = depth(set, method)?;
        let representative = match method {
            DepthMethod::ModifiedBand => {
                argmax_with_tiebreak(&scores, || band_depth(set.data()).unwrap_or_default())
            }
            _ => argmax(&scores),
        }
        .ok_or(FdaError::Numerical("depth scores contain no finite value"))?;
        debug!(%method, representative, score = scores[representative], "depth ranking");
        Ok(Self {
            method,
            scores,
            representative,
        })
    }

    /// Identifier of the representative curve.
    pub fn representative_id<'a>(&self, set: &'a CurveSet) -> &'a str {
        &set.ids()[self.representative]
    }

    /// Curve set indices sorted from deepest to shallowest.
    pub fn order(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.scores.len()).collect();
        idx.sort_by(|&a, &b| self.scores[b].total_cmp(&self.scores[a]).then(a.cmp(&b)));
        idx
    }
}

/// Rank `set` by each of `methods`, in parallel when enabled.
pub fn rank_all(set: &CurveSet, methods: &[DepthMethod]) -> Result<Vec<DepthRanking>, FdaError> {
    slice_maybe_parallel!(methods)
        .map(|&method| DepthRanking::compute(set, method))
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

/// Rankings of several depth methods and which of them fits a reference best.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSelection {
    /// One ranking per method, in the order requested.
    pub rankings: Vec<DepthRanking>,
    /// L2 distance between each method's representative and the reference.
    pub distances: Vec<f64>,
    /// Index into `rankings` of the selected method.
    pub best: usize,
}

impl DepthSelection {
    /// The selected ranking.
    pub fn best_ranking(&self) -> &DepthRanking {
        &self.rankings[self.best]
    }
}

/// Rank `set` with every method and select the one whose representative
/// curve is closest (trapezoidal L2) to `reference`, ties by method order.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::EmptyInput`] | `methods` is empty |
/// | [`FdaError::LengthMismatch`] | `reference` length differs from the curve length |
/// | [`FdaError::TooFewCurves`] | Modified band depth requested with fewer than 3 curves |
#[instrument(skip(set, reference), fields(n_curves = set.n_curves()))]
pub fn select_depth_method(
    set: &CurveSet,
    methods: &[DepthMethod],
    reference: &[f64],
) -> Result<DepthSelection, FdaError> {
    if methods.is_empty() {
        return Err(FdaError::EmptyInput);
    }
    ensure_same_len(set.n_points(), reference.len())?;
    let rankings = rank_all(set, methods)?;
    let weights = set.weights();
    let distances: Vec<f64> = rankings
        .iter()
        .map(|r| l2_distance(&set.curve(r.representative), reference, &weights))
        .collect();

    let mut best = 0;
    for (i, &d) in distances.iter().enumerate().skip(1) {
        if d < distances[best] {
            best = i;
        }
    }
    info!(
        method = %rankings[best].method,
        representative = %set.ids()[rankings[best].representative],
        distance = distances[best],
        "selected depth method"
    );
    Ok(DepthSelection {
        rankings,
        distances,
        best,
    })
}
