//! # fdaval
//!
//! Functional data analysis for evaluating numerical weather simulation
//! output against ground station observations.
//!
//! The crate provides:
//! - Time series handling (hourly resampling, merging by timestamp)
//! - Nearest-cell extraction from gridded simulation fields
//! - Curve sets on a shared hourly grid with spin-up trimming
//! - Basis smoothing (B-splines, Fourier) with cross-validated basis size
//! - Depth measures (modified band, mean distance, hypograph)
//! - K-medoids clustering with silhouette selection of k
//! - Agreement metrics (RMSE, Pearson r, MFB, L2 distance, Kendall tau)
//! - A pipeline driver and plain-text report
//!
//! ## Data Layout
//!
//! Curve values are stored in column-major matrices: for n curves with m
//! sample points, `data[i + j * n]` gives curve i at point j.
//!
//! ## Example
//!
//! ```
//! use fdaval::metric::{pearson, rmse};
//!
//! let observed = [10.0, 12.0, 14.0, 12.0, 10.0];
//! let simulated = [11.0, 12.0, 13.0, 12.0, 11.0];
//! assert!((rmse(&observed, &simulated).unwrap() - 0.6_f64.sqrt()).abs() < 1e-12);
//! assert!((pearson(&observed, &simulated).unwrap() - 1.0).abs() < 1e-12);
//! ```

#![allow(clippy::needless_range_loop)]

pub mod parallel;

pub mod basis;
pub mod clustering;
pub mod curves;
pub mod depth;
pub mod error;
pub mod grid;
pub mod helpers;
pub mod matrix;
pub mod metric;
pub mod pipeline;
pub mod smoothing;
pub mod timeseries;
pub mod variables;

// Re-export commonly used items
pub use basis::BasisFamily;
pub use clustering::{ClusterAssignment, KMedoidsConfig, KMedoidsResult};
pub use curves::{CurveGridConfig, CurveSet};
pub use depth::{DepthMethod, DepthRanking};
pub use error::FdaError;
pub use grid::{GriddedField, Station};
pub use helpers::{l2_distance, trapezoid_weights, NUMERICAL_EPS};
pub use matrix::FdMatrix;
pub use metric::ComparisonMetrics;
pub use pipeline::{
    evaluate_station, run, BasisSize, ClusterCount, EvaluationReport, PipelineConfig,
    StationEvaluation,
};
pub use smoothing::{SmoothedCurve, Smoother};
pub use timeseries::{merge, MergedSeries, TimeSeries};
