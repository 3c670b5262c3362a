//! End-to-end evaluation: smoothing, depth ranking, clustering and metrics.
//!
//! [`evaluate_station`] compares one simulated series with its observation;
//! [`run`] evaluates a whole set of simulated locations against one
//! observation. Both are driven by a [`PipelineConfig`].

use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::basis::BasisFamily;
use crate::clustering::{
    select_k, ClusterAssignment, KMedoidsConfig, DEFAULT_MAX_ITER, DEFAULT_MAX_K, DEFAULT_MIN_K,
    DEFAULT_N_INIT, DEFAULT_SEED,
};
use crate::curves::{CurveGridConfig, CurveSet};
use crate::depth::{select_depth_method, DepthMethod, DepthSelection};
use crate::error::{ensure_same_len, FdaError};
use crate::matrix::FdMatrix;
use crate::metric::ComparisonMetrics;
use crate::smoothing::{
    select_basis_size, BasisSelection, Smoother, DEFAULT_MAX_NBASIS, DEFAULT_MIN_NBASIS,
};
use crate::timeseries::MergedSeries;

/// How the basis size is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasisSize {
    /// Use exactly this many basis functions.
    Fixed(usize),
    /// Leave-one-out cross-validation over `min..=max`.
    CrossValidated {
        /// Smallest candidate.
        min: usize,
        /// Largest candidate (clipped to the number of points minus one).
        max: usize,
    },
}

impl Default for BasisSize {
    fn default() -> Self {
        BasisSize::CrossValidated {
            min: DEFAULT_MIN_NBASIS,
            max: DEFAULT_MAX_NBASIS,
        }
    }
}

/// How the number of clusters is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterCount {
    /// Use exactly this many clusters.
    Fixed(usize),
    /// Highest mean silhouette over `min..=max`.
    Silhouette {
        /// Smallest candidate (at least 2).
        min: usize,
        /// Largest candidate (clipped to the number of curves minus one).
        max: usize,
    },
}

/// Configuration for a pipeline run.
///
/// Construct with [`PipelineConfig::default`] and chain `with_*` methods, or
/// deserialize it; missing fields take their defaults.
///
/// # Defaults
///
/// | Parameter       | Default                        |
/// |-----------------|--------------------------------|
/// | `basis_family`  | `BSpline`                      |
/// | `basis_size`    | `CrossValidated { 4, 15 }`     |
/// | `cluster_count` | `Some(Silhouette { 2, 10 })`   |
/// | `depth_methods` | all three                      |
/// | `spin_up_hours` | 0                              |
/// | `n_hours`       | `None`                         |
/// | `seed`          | 42                             |
/// | `n_init`        | 10                             |
/// | `max_iter`      | 100                            |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Basis family for smoothing.
    pub basis_family: BasisFamily,
    /// Basis size rule.
    pub basis_size: BasisSize,
    /// Cluster count rule; `None` skips clustering.
    pub cluster_count: Option<ClusterCount>,
    /// Depth methods to rank with, in tie-breaking order.
    pub depth_methods: Vec<DepthMethod>,
    /// Leading hours discarded before comparison.
    pub spin_up_hours: usize,
    /// Length of the evaluation window in hours since start.
    pub n_hours: Option<usize>,
    /// Seed for k-medoids initialization.
    pub seed: u64,
    /// K-medoids restarts.
    pub n_init: usize,
    /// Cap on k-medoids swap iterations.
    pub max_iter: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            basis_family: BasisFamily::BSpline,
            basis_size: BasisSize::default(),
            cluster_count: Some(ClusterCount::Silhouette {
                min: DEFAULT_MIN_K,
                max: DEFAULT_MAX_K,
            }),
            depth_methods: DepthMethod::ALL.to_vec(),
            spin_up_hours: 0,
            n_hours: None,
            seed: DEFAULT_SEED,
            n_init: DEFAULT_N_INIT,
            max_iter: DEFAULT_MAX_ITER,
        }
    }
}

impl PipelineConfig {
    // --- Setters ---

    /// Set the basis family.
    #[must_use]
    pub fn with_basis_family(mut self, basis_family: BasisFamily) -> Self {
        self.basis_family = basis_family;
        self
    }

    /// Set the basis size rule.
    #[must_use]
    pub fn with_basis_size(mut self, basis_size: BasisSize) -> Self {
        self.basis_size = basis_size;
        self
    }

    /// Set the cluster count rule. `None` disables clustering.
    #[must_use]
    pub fn with_cluster_count(mut self, cluster_count: Option<ClusterCount>) -> Self {
        self.cluster_count = cluster_count;
        self
    }

    /// Set the depth methods.
    #[must_use]
    pub fn with_depth_methods(mut self, depth_methods: Vec<DepthMethod>) -> Self {
        self.depth_methods = depth_methods;
        self
    }

    /// Set the spin-up trim in hours.
    #[must_use]
    pub fn with_spin_up_hours(mut self, spin_up_hours: usize) -> Self {
        self.spin_up_hours = spin_up_hours;
        self
    }

    /// Set the window length in hours since start.
    #[must_use]
    pub fn with_n_hours(mut self, n_hours: Option<usize>) -> Self {
        self.n_hours = n_hours;
        self
    }

    /// Set the clustering seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of k-medoids restarts.
    #[must_use]
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Set the k-medoids iteration cap.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    // --- Validation ---

    /// Check the configuration for contradictions that do not depend on data.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::InvalidBasisSize`] | A fixed basis size or CV minimum of zero |
    /// | [`FdaError::InvalidRange`] | Reversed or out-of-domain CV, silhouette or hour window |
    /// | [`FdaError::InvalidK`] | A fixed cluster count of zero |
    /// | [`FdaError::EmptyInput`] | No depth method |
    pub fn validate(&self) -> Result<(), FdaError> {
        match self.basis_size {
            BasisSize::Fixed(0) | BasisSize::CrossValidated { min: 0, .. } => {
                return Err(FdaError::InvalidBasisSize { k: 0, n: 0 });
            }
            BasisSize::CrossValidated { min, max } if min > max => {
                return Err(FdaError::InvalidRange {
                    min,
                    max,
                    reason: "minimum basis size exceeds maximum",
                });
            }
            _ => {}
        }
        match self.cluster_count {
            Some(ClusterCount::Fixed(0)) => return Err(FdaError::InvalidK { k: 0 }),
            Some(ClusterCount::Silhouette { min, max }) if min < 2 || min > max => {
                return Err(FdaError::InvalidRange {
                    min,
                    max,
                    reason: "silhouette range must satisfy 2 <= min <= max",
                });
            }
            _ => {}
        }
        if self.depth_methods.is_empty() {
            return Err(FdaError::EmptyInput);
        }
        if let Some(n_hours) = self.n_hours {
            if n_hours <= self.spin_up_hours {
                return Err(FdaError::InvalidRange {
                    min: self.spin_up_hours,
                    max: n_hours,
                    reason: "evaluation window ends before spin-up does",
                });
            }
        }
        Ok(())
    }

    /// Sample grid settings for [`CurveSet::from_series`].
    pub fn grid_config(&self) -> CurveGridConfig {
        CurveGridConfig {
            spin_up_hours: self.spin_up_hours,
            n_hours: self.n_hours,
        }
    }

    fn kmedoids_config(&self, k: usize) -> Result<KMedoidsConfig, FdaError> {
        Ok(KMedoidsConfig::new(k)?
            .with_n_init(self.n_init)
            .with_max_iter(self.max_iter)
            .with_seed(self.seed))
    }

    /// Resolve the basis size for curves on `argvals`, returning the CV
    /// outcome when one was run.
    fn resolve_basis(
        &self,
        data: &FdMatrix,
        argvals: &[f64],
    ) -> Result<(usize, Option<BasisSelection>), FdaError> {
        match self.basis_size {
            BasisSize::Fixed(k) => Ok((k, None)),
            BasisSize::CrossValidated { min, max } => {
                let sel = select_basis_size(data, argvals, self.basis_family, min, max)?;
                Ok((sel.nbasis, Some(sel)))
            }
        }
    }
}

fn hours(h: usize) -> Duration {
    Duration::hours(h as i64)
}

// ============== Single station ==============

/// Raw and smoothed agreement for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct StationEvaluation {
    /// Number of shared samples compared.
    pub n_points: usize,
    /// Basis family used.
    pub basis_family: BasisFamily,
    /// Basis size used.
    pub nbasis: usize,
    /// Metrics on the unsmoothed values.
    pub raw: ComparisonMetrics,
    /// Metrics on the smoothed curves.
    pub smoothed: ComparisonMetrics,
}

/// Compare one simulated series with its observation.
///
/// Timestamps before `start + spin_up_hours` (and at or after
/// `start + n_hours` when set) are discarded; the sample grid is hours since
/// `start`. Both series are smoothed with a shared basis, whose size is
/// cross-validated on the two curves together when configured so.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::EmptyInput`] | No shared samples remain in the window |
/// | [`FdaError::InvalidBasisSize`] | The basis is too large for the remaining samples |
///
/// plus any error of [`PipelineConfig::validate`].
#[instrument(skip(merged, config), fields(n_shared = merged.len()))]
pub fn evaluate_station(
    merged: &MergedSeries,
    start: NaiveDateTime,
    config: &PipelineConfig,
) -> Result<StationEvaluation, FdaError> {
    config.validate()?;
    let mut window = merged.trim_before(start + hours(config.spin_up_hours));
    if let Some(n_hours) = config.n_hours {
        let end = start + hours(n_hours);
        let keep = window.times.partition_point(|&t| t < end);
        window.times.truncate(keep);
        window.simulated.truncate(keep);
        window.observed.truncate(keep);
    }
    if window.is_empty() {
        return Err(FdaError::EmptyInput);
    }
    let argvals = window.hours_since(start);

    let pair = FdMatrix::from_rows(&[window.simulated.clone(), window.observed.clone()])?;
    let (nbasis, _) = config.resolve_basis(&pair, &argvals)?;
    let smoother = Smoother::new(&argvals, config.basis_family, nbasis)?;
    let sim_fit = smoother.smooth(&window.simulated)?.fitted;
    let obs_fit = smoother.smooth(&window.observed)?.fitted;

    let raw = ComparisonMetrics::compute(&window.observed, &window.simulated, &argvals)?
        .with_kendall(&window.observed, &window.simulated);
    let smoothed =
        ComparisonMetrics::compute(&obs_fit, &sim_fit, &argvals)?.with_kendall(&obs_fit, &sim_fit);
    info!(n_points = argvals.len(), nbasis, rmse = smoothed.rmse, "evaluated station");

    Ok(StationEvaluation {
        n_points: argvals.len(),
        basis_family: config.basis_family,
        nbasis,
        raw,
        smoothed,
    })
}

impl fmt::Display for StationEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples: {}", self.n_points)?;
        writeln!(f, "Basis: {} with {} functions", self.basis_family, self.nbasis)?;
        writeln!(f, "-- raw --")?;
        write!(f, "{}", self.raw)?;
        writeln!(f, "-- smoothed --")?;
        write!(f, "{}", self.smoothed)
    }
}

// ============== Curve set ==============

/// Clustering outcome with per-medoid agreement.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterReport {
    /// Membership and medoid ids.
    pub assignment: ClusterAssignment,
    /// Mean silhouette when k was selected by silhouette.
    pub silhouette: Option<f64>,
    /// Metrics of each medoid's smoothed curve against the observation.
    pub medoid_metrics: Vec<ComparisonMetrics>,
}

/// Everything produced by [`run`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    /// Location ids in curve-set order.
    pub ids: Vec<String>,
    /// Basis family used.
    pub basis_family: BasisFamily,
    /// Basis size used.
    pub nbasis: usize,
    /// Cross-validation outcome, when the size was cross-validated.
    pub basis_selection: Option<BasisSelection>,
    /// Rankings for every depth method and the selected one.
    pub depth: DepthSelection,
    /// Metrics of the representative curve of the selected method.
    pub representative_metrics: ComparisonMetrics,
    /// Clustering outcome, when configured.
    pub clusters: Option<ClusterReport>,
}

impl EvaluationReport {
    /// Id of the representative location under the selected depth method.
    pub fn representative_id(&self) -> &str {
        &self.ids[self.depth.best_ranking().representative]
    }
}

/// Evaluate every location of `set` against `observed`.
///
/// Curves and observation are smoothed with one shared basis, ranked by each
/// configured depth method, and the method whose representative lies
/// closest to the smoothed observation is selected. When clustering is
/// configured, each medoid is compared with the observation as well.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::LengthMismatch`] | `observed` differs in length from the curves |
/// | [`FdaError::TooFewCurves`] | Band depth on fewer than 3 curves, or more clusters than curves |
/// | [`FdaError::NonFiniteValue`] | `observed` contains NaN or infinity |
///
/// plus any error of [`PipelineConfig::validate`] and the smoothing stage.
#[instrument(
    skip(set, observed, config),
    fields(n_curves = set.n_curves(), n_points = set.n_points())
)]
pub fn run(
    set: &CurveSet,
    observed: &[f64],
    config: &PipelineConfig,
) -> Result<EvaluationReport, FdaError> {
    config.validate()?;
    ensure_same_len(set.n_points(), observed.len())?;
    if let Some(col) = observed.iter().position(|v| !v.is_finite()) {
        return Err(FdaError::NonFiniteValue {
            row: set.n_curves(),
            col,
        });
    }
    let argvals = set.argvals();

    let mut rows = set.data().rows();
    rows.push(observed.to_vec());
    let (nbasis, basis_selection) = config.resolve_basis(&FdMatrix::from_rows(&rows)?, argvals)?;
    let smoother = Smoother::new(argvals, config.basis_family, nbasis)?;
    let smoothed = smoother.smooth_set(set)?;
    let obs_fit = smoother.smooth(observed)?.fitted;

    let depth = select_depth_method(&smoothed, &config.depth_methods, &obs_fit)?;
    let representative = depth.best_ranking().representative;
    let representative_metrics =
        ComparisonMetrics::compute(&obs_fit, &smoothed.curve(representative), argvals)?
            .with_kendall(&obs_fit, &smoothed.curve(representative));

    let clusters = match config.cluster_count {
        None => None,
        Some(rule) => {
            let (result, silhouette) = match rule {
                ClusterCount::Fixed(k) => (config.kmedoids_config(k)?.fit(smoothed.data())?, None),
                ClusterCount::Silhouette { min, max } => {
                    let sel = select_k(smoothed.data(), min, max, &config.kmedoids_config(min)?)?;
                    (sel.result, Some(sel.silhouette))
                }
            };
            let medoid_metrics = result
                .medoids
                .iter()
                .map(|&i| {
                    let curve = smoothed.curve(i);
                    Ok(ComparisonMetrics::compute(&obs_fit, &curve, argvals)?
                        .with_kendall(&obs_fit, &curve))
                })
                .collect::<Result<Vec<_>, FdaError>>()?;
            Some(ClusterReport {
                assignment: ClusterAssignment::new(&smoothed, &result),
                silhouette,
                medoid_metrics,
            })
        }
    };

    let report = EvaluationReport {
        ids: set.ids().to_vec(),
        basis_family: config.basis_family,
        nbasis,
        basis_selection,
        depth,
        representative_metrics,
        clusters,
    };
    info!(
        nbasis,
        representative = report.representative_id(),
        rmse = report.representative_metrics.rmse,
        "evaluation complete"
    );
    Ok(report)
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Locations: {}", self.ids.len())?;
        writeln!(f, "Basis family: {}", self.basis_family)?;
        writeln!(f, "Basis size: {}", self.nbasis)?;
        if let Some(sel) = &self.basis_selection {
            writeln!(f, "Basis CV score: {:.4}", sel.score)?;
        }
        for (ranking, distance) in self.depth.rankings.iter().zip(&self.depth.distances) {
            writeln!(
                f,
                "Depth {}: {} (L2 to observation {:.4})",
                ranking.method, self.ids[ranking.representative], distance
            )?;
        }
        writeln!(f, "Selected depth method: {}", self.depth.best_ranking().method)?;
        writeln!(f, "Representative: {}", self.representative_id())?;
        write!(f, "{}", self.representative_metrics)?;

        if let Some(clusters) = &self.clusters {
            writeln!(f, "Clusters: {}", clusters.assignment.k())?;
            if let Some(s) = clusters.silhouette {
                writeln!(f, "Silhouette: {:.4}", s)?;
            }
            for (c, (medoid, metrics)) in clusters
                .assignment
                .medoid_ids
                .iter()
                .zip(&clusters.medoid_metrics)
                .enumerate()
            {
                writeln!(f, "Cluster {} medoid: {}", c, medoid)?;
                writeln!(f, "Cluster {} size: {}", c, clusters.assignment.members(c).len())?;
                write!(f, "{}", metrics)?;
            }
        }
        Ok(())
    }
}
