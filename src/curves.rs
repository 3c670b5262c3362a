//! Curve sets: one curve per location on a shared hourly sample grid.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FdaError;
use crate::helpers::trapezoid_weights;
use crate::matrix::FdMatrix;
use crate::timeseries::{floor_to_hour, TimeSeries};

/// Sample grid for [`CurveSet::from_series`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CurveGridConfig {
    /// Leading hours discarded before comparison.
    pub spin_up_hours: usize,
    /// Total hours in the window. `None` means one past the last hour present.
    pub n_hours: Option<usize>,
}

/// Curves of several locations sampled on the same grid.
///
/// Rows of [`CurveSet::data`] are curves (one per id, in id order), columns are
/// sample points. Every value is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveSet {
    ids: Vec<String>,
    argvals: Vec<f64>,
    data: FdMatrix,
}

impl CurveSet {
    /// Wrap already aligned curves.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::EmptyCurveSet`] | `data` has no rows |
    /// | [`FdaError::LengthMismatch`] | `ids` or `argvals` disagree with the shape of `data` |
    /// | [`FdaError::NonFiniteValue`] | `data` contains NaN or infinity |
    pub fn new(ids: Vec<String>, argvals: Vec<f64>, data: FdMatrix) -> Result<Self, FdaError> {
        let (n, m) = data.shape();
        if n == 0 {
            return Err(FdaError::EmptyCurveSet {
                reason: "no curves supplied",
            });
        }
        if ids.len() != n {
            return Err(FdaError::LengthMismatch {
                expected: n,
                got: ids.len(),
            });
        }
        if argvals.len() != m {
            return Err(FdaError::LengthMismatch {
                expected: m,
                got: argvals.len(),
            });
        }
        for j in 0..m {
            if let Some(i) = data.column(j).iter().position(|v| !v.is_finite()) {
                return Err(FdaError::NonFiniteValue { row: i, col: j });
            }
        }
        Ok(Self { ids, argvals, data })
    }

    /// Build a curve set from per-location series.
    ///
    /// Each series is resampled to hourly means; sample index `h` is the
    /// number of whole hours since `start` floored to its hour, so the bucket
    /// holding `start` is sample 0. The grid runs over
    /// `spin_up_hours..n_hours`. A location missing any sample on the grid is
    /// excluded and logged.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::EmptyCurveSet`] | The grid is empty or every location was excluded |
    pub fn from_series(
        series: &BTreeMap<String, TimeSeries>,
        start: NaiveDateTime,
        config: &CurveGridConfig,
    ) -> Result<Self, FdaError> {
        let start = floor_to_hour(start);
        let offsets: Vec<(&String, HashMap<i64, f64>)> = series
            .iter()
            .map(|(id, ts)| {
                let by_hour = ts.resample_hourly().hour_offsets(start).into_iter().collect();
                (id, by_hour)
            })
            .collect();

        let n_hours = match config.n_hours {
            Some(n) => n,
            None => offsets
                .iter()
                .flat_map(|(_, by_hour)| by_hour.keys().copied())
                .max()
                .map_or(0, |h| h as usize + 1),
        };
        if config.spin_up_hours >= n_hours {
            return Err(FdaError::EmptyCurveSet {
                reason: "sample grid is empty after spin-up trim",
            });
        }
        let hours: Vec<usize> = (config.spin_up_hours..n_hours).collect();

        let mut ids = Vec::new();
        let mut rows = Vec::new();
        for (id, by_hour) in &offsets {
            let row: Option<Vec<f64>> = hours
                .iter()
                .map(|&h| by_hour.get(&(h as i64)).copied())
                .collect();
            match row {
                Some(row) => {
                    ids.push((*id).clone());
                    rows.push(row);
                }
                None => {
                    let missing = hours
                        .iter()
                        .filter(|&&h| !by_hour.contains_key(&(h as i64)))
                        .count();
                    warn!(location = %id, missing, "excluding location with missing samples");
                }
            }
        }
        if rows.is_empty() {
            return Err(FdaError::EmptyCurveSet {
                reason: "every location has missing samples",
            });
        }
        debug!(
            kept = ids.len(),
            excluded = series.len() - ids.len(),
            n_points = hours.len(),
            "built curve set"
        );

        let argvals = hours.iter().map(|&h| h as f64).collect();
        let data = FdMatrix::from_rows(&rows)?;
        Self::new(ids, argvals, data)
    }

    /// Location identifiers, one per curve.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Shared sample grid (hours since start).
    pub fn argvals(&self) -> &[f64] {
        &self.argvals
    }

    /// Curve values, rows = curves.
    pub fn data(&self) -> &FdMatrix {
        &self.data
    }

    /// Number of curves.
    pub fn n_curves(&self) -> usize {
        self.data.nrows()
    }

    /// Number of sample points per curve.
    pub fn n_points(&self) -> usize {
        self.data.ncols()
    }

    /// Values of curve `i`.
    pub fn curve(&self, i: usize) -> Vec<f64> {
        self.data.row(i)
    }

    /// Position of the curve with identifier `id`.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|x| x == id)
    }

    /// Trapezoidal integration weights for the sample grid.
    pub fn weights(&self) -> Vec<f64> {
        trapezoid_weights(&self.argvals)
    }

    /// Pointwise mean curve.
    pub fn mean_curve(&self) -> Vec<f64> {
        self.data.mean_curve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn hourly(values: &[f64]) -> TimeSeries {
        TimeSeries::new(
            values
                .iter()
                .enumerate()
                .map(|(h, &v)| (start() + Duration::hours(h as i64), v))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_validates_shape() {
        let data = FdMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(
            CurveSet::new(vec!["a".into()], vec![0.0, 1.0], data.clone()).unwrap_err(),
            FdaError::LengthMismatch { expected: 2, got: 1 }
        );
        assert_eq!(
            CurveSet::new(vec!["a".into(), "b".into()], vec![0.0], data).unwrap_err(),
            FdaError::LengthMismatch { expected: 2, got: 1 }
        );
    }

    #[test]
    fn test_new_rejects_non_finite() {
        let data = FdMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, f64::NAN]]).unwrap();
        assert_eq!(
            CurveSet::new(vec!["a".into(), "b".into()], vec![0.0, 1.0], data).unwrap_err(),
            FdaError::NonFiniteValue { row: 1, col: 1 }
        );
    }

    #[test]
    fn test_from_series_excludes_incomplete_location() {
        let mut series = BTreeMap::new();
        series.insert("a".to_string(), hourly(&[1.0, 2.0, 3.0, 4.0]));
        series.insert("b".to_string(), hourly(&[5.0, f64::NAN, 7.0, 8.0]));
        series.insert("c".to_string(), hourly(&[9.0, 10.0, 11.0, 12.0]));

        let set = CurveSet::from_series(&series, start(), &CurveGridConfig::default()).unwrap();
        assert_eq!(set.ids(), &["a".to_string(), "c".to_string()]);
        assert_eq!(set.argvals(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(set.curve(1), vec![9.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_from_series_start_off_the_hour() {
        let mut series = BTreeMap::new();
        series.insert("a".to_string(), hourly(&[1.0, 2.0, 3.0]));
        let late_start = start() + Duration::minutes(30);
        let set = CurveSet::from_series(&series, late_start, &CurveGridConfig::default()).unwrap();
        assert_eq!(set.argvals(), &[0.0, 1.0, 2.0]);
        assert_eq!(set.curve(0), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_from_series_spin_up_trim() {
        let mut series = BTreeMap::new();
        series.insert("a".to_string(), hourly(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        series.insert("b".to_string(), hourly(&[f64::NAN, 2.0, 3.0, 4.0, 5.0]));
        let config = CurveGridConfig {
            spin_up_hours: 2,
            n_hours: None,
        };
        let set = CurveSet::from_series(&series, start(), &config).unwrap();
        assert_eq!(set.n_curves(), 2);
        assert_eq!(set.argvals(), &[2.0, 3.0, 4.0]);
        assert_eq!(set.curve(0), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_from_series_fixed_window() {
        let mut series = BTreeMap::new();
        series.insert("a".to_string(), hourly(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        let config = CurveGridConfig {
            spin_up_hours: 1,
            n_hours: Some(3),
        };
        let set = CurveSet::from_series(&series, start(), &config).unwrap();
        assert_eq!(set.curve(0), vec![2.0, 3.0]);

        let too_long = CurveGridConfig {
            spin_up_hours: 0,
            n_hours: Some(8),
        };
        assert!(matches!(
            CurveSet::from_series(&series, start(), &too_long),
            Err(FdaError::EmptyCurveSet { .. })
        ));
    }

    #[test]
    fn test_from_series_empty_grid() {
        let mut series = BTreeMap::new();
        series.insert("a".to_string(), hourly(&[1.0, 2.0]));
        let config = CurveGridConfig {
            spin_up_hours: 2,
            n_hours: None,
        };
        assert!(matches!(
            CurveSet::from_series(&series, start(), &config),
            Err(FdaError::EmptyCurveSet { .. })
        ));
    }

    #[test]
    fn test_index_and_weights() {
        let data = FdMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![3.0, 4.0, 5.0]]).unwrap();
        let set = CurveSet::new(vec!["x".into(), "y".into()], vec![0.0, 1.0, 2.0], data).unwrap();
        assert_eq!(set.index_of("y"), Some(1));
        assert_eq!(set.index_of("z"), None);
        assert_eq!(set.weights(), vec![0.5, 1.0, 0.5]);
        assert_eq!(set.mean_curve(), vec![2.0, 3.0, 4.0]);
    }
}
