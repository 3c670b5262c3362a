//! K-medoids clustering of curves.
//!
//! Medoids are actual curves of the set, so every cluster is represented by
//! a real location. Initialization is k-medoids++ with a seeded RNG followed
//! by PAM swap iterations; the best of several restarts is kept.

use std::collections::BTreeMap;

use rand::prelude::*;
#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;
use tracing::{debug, info, instrument};

use crate::curves::CurveSet;
use crate::error::{ensure_same_len, FdaError};
use crate::helpers::{euclidean_distance, NUMERICAL_EPS};
use crate::iter_maybe_parallel;
use crate::matrix::FdMatrix;

/// Default number of restarts.
pub const DEFAULT_N_INIT: usize = 10;
/// Default cap on PAM swap iterations per restart.
pub const DEFAULT_MAX_ITER: usize = 100;
/// Default RNG seed.
pub const DEFAULT_SEED: u64 = 42;
/// Default lower bound for silhouette selection of k.
pub const DEFAULT_MIN_K: usize = 2;
/// Default upper bound for silhouette selection of k.
pub const DEFAULT_MAX_K: usize = 10;

/// Pairwise Euclidean distances between curves, row-major `n x n`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    /// Compute distances between every pair of rows of `data`.
    pub fn new(data: &FdMatrix) -> Self {
        let n = data.nrows();
        let curves = data.rows();
        let rows: Vec<Vec<f64>> = iter_maybe_parallel!(0..n)
            .map(|i| {
                curves
                    .iter()
                    .map(|other| euclidean_distance(&curves[i], other))
                    .collect()
            })
            .collect();
        Self {
            n,
            values: rows.into_iter().flatten().collect(),
        }
    }

    /// Number of curves.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Whether the matrix is empty.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Distance between curves `i` and `j`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }
}

/// Result of k-medoids clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct KMedoidsResult {
    /// Cluster label per curve, `0..k`.
    pub labels: Vec<usize>,
    /// Curve index of each cluster's medoid, ascending; cluster `c` has medoid `medoids[c]`.
    pub medoids: Vec<usize>,
    /// Sum of distances from every curve to its medoid.
    pub total_cost: f64,
    /// Swap iterations of the retained restart.
    pub iter: usize,
    /// Whether the retained restart stopped because no swap improved the cost.
    pub converged: bool,
}

impl KMedoidsResult {
    /// Number of clusters.
    pub fn k(&self) -> usize {
        self.medoids.len()
    }

    /// Number of curves in each cluster.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k()];
        for &c in &self.labels {
            sizes[c] += 1;
        }
        sizes
    }
}

/// K-medoids configuration.
///
/// ```
/// use fdaval::clustering::KMedoidsConfig;
///
/// let config = KMedoidsConfig::new(3).unwrap().with_seed(7).with_n_init(4);
/// assert_eq!(config.k(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct KMedoidsConfig {
    k: usize,
    n_init: usize,
    max_iter: usize,
    seed: u64,
}

impl KMedoidsConfig {
    /// Create a configuration for `k` clusters with default restarts,
    /// iteration cap and seed.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::InvalidK`] | `k == 0` |
    pub fn new(k: usize) -> Result<Self, FdaError> {
        if k == 0 {
            return Err(FdaError::InvalidK { k });
        }
        Ok(Self {
            k,
            n_init: DEFAULT_N_INIT,
            max_iter: DEFAULT_MAX_ITER,
            seed: DEFAULT_SEED,
        })
    }

    /// Number of restarts (at least one is always run).
    #[must_use]
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    /// Cap on swap iterations per restart.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// RNG seed for initialization.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of clusters.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Cluster the rows of `data`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::EmptyInput`] | Curves have no sample points |
    /// | [`FdaError::TooFewCurves`] | Fewer curves than clusters |
    pub fn fit(&self, data: &FdMatrix) -> Result<KMedoidsResult, FdaError> {
        let (n, m) = data.shape();
        if m == 0 {
            return Err(FdaError::EmptyInput);
        }
        if self.k > n {
            return Err(FdaError::TooFewCurves {
                needed: self.k,
                got: n,
            });
        }
        Ok(self.fit_distances(&DistanceMatrix::new(data)))
    }

    /// Cluster from precomputed distances. `k <= dist.len()` must hold.
    fn fit_distances(&self, dist: &DistanceMatrix) -> KMedoidsResult {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(Vec<usize>, f64, usize, bool)> = None;

        for restart in 0..self.n_init {
            let init = kmedoids_plusplus_init(dist, self.k, &mut rng);
            let (medoids, cost, iter, converged) = pam_swap(dist, init, self.max_iter);
            debug!(restart, cost, iter, "k-medoids restart");
            // Keep the first of equally good restarts.
            let better = match &best {
                Some((_, best_cost, _, _)) => *best_cost - cost > 1e-12 * (1.0 + best_cost.abs()),
                None => true,
            };
            if better {
                best = Some((medoids, cost, iter, converged));
            }
        }

        let (mut medoids, total_cost, iter, converged) =
            best.unwrap_or_else(|| (Vec::new(), 0.0, 0, false));
        medoids.sort_unstable();
        let (labels, _) = assign(dist, &medoids);

        KMedoidsResult {
            labels,
            medoids,
            total_cost,
            iter,
            converged,
        }
    }
}

/// K-medoids++ initialization: the first medoid is uniform, later ones are
/// drawn with probability proportional to squared distance to the nearest
/// chosen medoid.
fn kmedoids_plusplus_init(dist: &DistanceMatrix, k: usize, rng: &mut StdRng) -> Vec<usize> {
    let n = dist.len();
    let mut medoids = Vec::with_capacity(k);
    medoids.push(rng.gen_range(0..n));

    while medoids.len() < k {
        let dist_sq: Vec<f64> = (0..n)
            .map(|i| {
                let d = medoids
                    .iter()
                    .map(|&c| dist.get(i, c))
                    .fold(f64::INFINITY, f64::min);
                if medoids.contains(&i) {
                    0.0
                } else {
                    d * d
                }
            })
            .collect();
        let total: f64 = dist_sq.iter().sum();

        let chosen = if total < NUMERICAL_EPS {
            // Remaining curves coincide with chosen medoids.
            let free: Vec<usize> = (0..n).filter(|i| !medoids.contains(i)).collect();
            free[rng.gen_range(0..free.len())]
        } else {
            let r = rng.gen::<f64>() * total;
            let mut cumsum = 0.0;
            let mut chosen = None;
            for (i, &d) in dist_sq.iter().enumerate() {
                cumsum += d;
                if d > 0.0 && cumsum >= r {
                    chosen = Some(i);
                    break;
                }
            }
            // Rounding can leave r just above the final cumsum.
            chosen.unwrap_or_else(|| {
                dist_sq
                    .iter()
                    .rposition(|&d| d > 0.0)
                    .unwrap_or(0)
            })
        };
        medoids.push(chosen);
    }
    medoids
}

/// Assign every curve to its nearest medoid. Medoids always belong to their
/// own cluster; other ties go to the earlier medoid in `medoids`.
fn assign(dist: &DistanceMatrix, medoids: &[usize]) -> (Vec<usize>, f64) {
    let n = dist.len();
    let mut labels = vec![0; n];
    let mut cost = 0.0;
    for i in 0..n {
        if let Some(own) = medoids.iter().position(|&c| c == i) {
            labels[i] = own;
            continue;
        }
        let mut best_cluster = 0;
        let mut best_dist = f64::INFINITY;
        for (c, &medoid) in medoids.iter().enumerate() {
            let d = dist.get(i, medoid);
            if d < best_dist {
                best_dist = d;
                best_cluster = c;
            }
        }
        labels[i] = best_cluster;
        cost += best_dist;
    }
    (labels, cost)
}

fn total_cost(dist: &DistanceMatrix, medoids: &[usize]) -> f64 {
    (0..dist.len())
        .map(|i| {
            medoids
                .iter()
                .map(|&c| dist.get(i, c))
                .fold(f64::INFINITY, f64::min)
        })
        .sum()
}

/// PAM swap phase: repeatedly apply the single medoid/non-medoid swap that
/// lowers total cost the most, until none does or `max_iter` is reached.
fn pam_swap(
    dist: &DistanceMatrix,
    mut medoids: Vec<usize>,
    max_iter: usize,
) -> (Vec<usize>, f64, usize, bool) {
    let n = dist.len();
    let mut cost = total_cost(dist, &medoids);
    let mut converged = false;
    let mut iter = 0;

    for iteration in 0..max_iter {
        iter = iteration + 1;
        let mut best_swap: Option<(usize, usize, f64)> = None;

        for pos in 0..medoids.len() {
            for candidate in 0..n {
                if medoids.contains(&candidate) {
                    continue;
                }
                let mut trial = medoids.clone();
                trial[pos] = candidate;
                let trial_cost = total_cost(dist, &trial);
                let incumbent = best_swap.map_or(cost, |(_, _, c)| c);
                if incumbent - trial_cost > 1e-12 * (1.0 + incumbent.abs()) {
                    best_swap = Some((pos, candidate, trial_cost));
                }
            }
        }

        match best_swap {
            Some((pos, candidate, new_cost)) => {
                medoids[pos] = candidate;
                cost = new_cost;
            }
            None => {
                converged = true;
                break;
            }
        }
    }

    (medoids, cost, iter, converged)
}

/// Silhouette value of every curve under `labels`.
///
/// `s_i = (b_i - a_i) / max(a_i, b_i)` with `a_i` the mean distance to the
/// rest of its cluster and `b_i` the smallest mean distance to another
/// cluster. Curves in singleton clusters score 0, as do all curves when
/// there is a single cluster.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::LengthMismatch`] | `labels.len()` differs from the number of curves |
/// | [`FdaError::EmptyInput`] | No curves |
pub fn silhouette_scores(data: &FdMatrix, labels: &[usize]) -> Result<Vec<f64>, FdaError> {
    ensure_same_len(data.nrows(), labels.len())?;
    Ok(silhouette_from_distances(&DistanceMatrix::new(data), labels))
}

/// Mean silhouette over all curves.
pub fn mean_silhouette(data: &FdMatrix, labels: &[usize]) -> Result<f64, FdaError> {
    let scores = silhouette_scores(data, labels)?;
    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}

fn silhouette_from_distances(dist: &DistanceMatrix, labels: &[usize]) -> Vec<f64> {
    let n = dist.len();
    let k = labels.iter().copied().max().map_or(0, |c| c + 1);
    let mut members = vec![Vec::new(); k];
    for (i, &c) in labels.iter().enumerate() {
        members[c].push(i);
    }
    let mean_distance = |i: usize, indices: &[usize]| -> f64 {
        indices.iter().map(|&j| dist.get(i, j)).sum::<f64>() / indices.len() as f64
    };

    iter_maybe_parallel!(0..n)
        .map(|i| {
            let own = labels[i];
            let same: Vec<usize> = members[own].iter().copied().filter(|&j| j != i).collect();
            if same.is_empty() {
                return 0.0;
            }
            let a_i = mean_distance(i, &same);
            let b_i = (0..k)
                .filter(|&c| c != own && !members[c].is_empty())
                .map(|c| mean_distance(i, &members[c]))
                .fold(f64::INFINITY, f64::min);
            if b_i.is_infinite() {
                return 0.0;
            }
            let max_ab = a_i.max(b_i);
            if max_ab > NUMERICAL_EPS {
                (b_i - a_i) / max_ab
            } else {
                0.0
            }
        })
        .collect()
}

/// Outcome of silhouette-based selection of k.
#[derive(Debug, Clone, PartialEq)]
pub struct KSelection {
    /// Selected number of clusters.
    pub k: usize,
    /// Mean silhouette of the selected clustering.
    pub silhouette: f64,
    /// `(k, mean silhouette)` for every candidate, ascending by k.
    pub candidates: Vec<(usize, f64)>,
    /// Clustering at the selected k.
    pub result: KMedoidsResult,
}

/// Cluster `data` for every k in `min_k..=max_k` (upper bound clipped to
/// `n - 1`) and keep the k with the highest mean silhouette, ties by
/// smallest k. `base` supplies restarts, iteration cap and seed; its own k
/// is ignored.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::InvalidRange`] | `min_k < 2` or `min_k > max_k` |
/// | [`FdaError::TooFewCurves`] | Fewer than `min_k + 1` curves |
/// | [`FdaError::EmptyInput`] | Curves have no sample points |
#[instrument(skip(data, base), fields(n_curves = data.nrows()))]
pub fn select_k(
    data: &FdMatrix,
    min_k: usize,
    max_k: usize,
    base: &KMedoidsConfig,
) -> Result<KSelection, FdaError> {
    if min_k < 2 {
        return Err(FdaError::InvalidRange {
            min: min_k,
            max: max_k,
            reason: "silhouette needs at least two clusters",
        });
    }
    if min_k > max_k {
        return Err(FdaError::InvalidRange {
            min: min_k,
            max: max_k,
            reason: "minimum cluster count exceeds maximum",
        });
    }
    let (n, m) = data.shape();
    if m == 0 {
        return Err(FdaError::EmptyInput);
    }
    let max_k = max_k.min(n.saturating_sub(1));
    if max_k < min_k {
        return Err(FdaError::TooFewCurves {
            needed: min_k + 1,
            got: n,
        });
    }

    let dist = DistanceMatrix::new(data);
    let fits: Vec<(KMedoidsResult, f64)> = iter_maybe_parallel!(min_k..=max_k)
        .map(|k| {
            let config = KMedoidsConfig { k, ..base.clone() };
            let result = config.fit_distances(&dist);
            let scores = silhouette_from_distances(&dist, &result.labels);
            let mean = scores.iter().sum::<f64>() / n as f64;
            (result, mean)
        })
        .collect();

    let candidates: Vec<(usize, f64)> = fits.iter().map(|(r, s)| (r.k(), *s)).collect();
    let mut best = 0;
    for (i, &(k, score)) in candidates.iter().enumerate() {
        debug!(k, silhouette = score, "cluster count candidate");
        if score - candidates[best].1 > 1e-12 {
            best = i;
        }
    }
    let (k, silhouette) = candidates[best];
    info!(k, silhouette, "selected cluster count");
    let result = fits.into_iter().nth(best).map(|(r, _)| r).ok_or(FdaError::Numerical(
        "cluster count selection produced no candidate",
    ))?;

    Ok(KSelection {
        k,
        silhouette,
        candidates,
        result,
    })
}

/// Cluster membership keyed by curve identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    /// Cluster index per curve id.
    pub labels: BTreeMap<String, usize>,
    /// Medoid curve id per cluster index.
    pub medoid_ids: Vec<String>,
}

impl ClusterAssignment {
    /// Attach curve ids from `set` to a clustering of its curves.
    pub fn new(set: &CurveSet, result: &KMedoidsResult) -> Self {
        let ids = set.ids();
        Self {
            labels: ids
                .iter()
                .cloned()
                .zip(result.labels.iter().copied())
                .collect(),
            medoid_ids: result.medoids.iter().map(|&i| ids[i].clone()).collect(),
        }
    }

    /// Number of clusters.
    pub fn k(&self) -> usize {
        self.medoid_ids.len()
    }

    /// Ids of the curves in cluster `c`, in id order.
    pub fn members(&self, c: usize) -> Vec<&str> {
        self.labels
            .iter()
            .filter(|(_, &label)| label == c)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}
