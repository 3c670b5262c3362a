//! Timestamped series, hourly resampling and simulation/observation merging.

use chrono::{NaiveDateTime, Timelike};
use tracing::{debug, warn};

use crate::error::FdaError;

/// Ordered `(timestamp, value)` pairs for one variable at one location.
///
/// Timestamps are strictly increasing. Non-finite values are missing data and
/// are dropped when the series is built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeries {
    times: Vec<NaiveDateTime>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Build a series from `(timestamp, value)` pairs.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::NonMonotonicTimestamps`] | A timestamp is not later than its predecessor |
    pub fn new(points: Vec<(NaiveDateTime, f64)>) -> Result<Self, FdaError> {
        let mut times = Vec::with_capacity(points.len());
        let mut values = Vec::with_capacity(points.len());
        let mut previous: Option<NaiveDateTime> = None;
        let mut dropped = 0usize;

        for (index, (t, v)) in points.into_iter().enumerate() {
            if previous.is_some_and(|p| t <= p) {
                return Err(FdaError::NonMonotonicTimestamps { index });
            }
            previous = Some(t);
            if v.is_finite() {
                times.push(t);
                values.push(v);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(dropped, "dropped missing values");
        }
        Ok(Self { times, values })
    }

    /// Build a series from parallel timestamp and value vectors.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::LengthMismatch`] | The vectors differ in length |
    /// | [`FdaError::NonMonotonicTimestamps`] | Timestamps are not strictly increasing |
    pub fn from_parts(times: Vec<NaiveDateTime>, values: Vec<f64>) -> Result<Self, FdaError> {
        if times.len() != values.len() {
            return Err(FdaError::LengthMismatch {
                expected: times.len(),
                got: values.len(),
            });
        }
        Self::new(times.into_iter().zip(values).collect())
    }

    /// Number of (non-missing) points.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether the series has no points.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Timestamps, strictly increasing.
    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    /// Values aligned with [`TimeSeries::times`].
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Iterate `(timestamp, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    /// Apply `f` to every value, e.g. a unit conversion.
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Self {
        let mut times = Vec::with_capacity(self.len());
        let mut values = Vec::with_capacity(self.len());
        for (t, v) in self.iter() {
            let mapped = f(v);
            if mapped.is_finite() {
                times.push(t);
                values.push(mapped);
            }
        }
        Self { times, values }
    }

    /// Average values into hourly buckets.
    ///
    /// Each timestamp is floored to the start of its hour and values sharing
    /// an hour are averaged. Hours with no data stay absent.
    pub fn resample_hourly(&self) -> Self {
        let mut times: Vec<NaiveDateTime> = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        let mut count = 0usize;

        for (t, v) in self.iter() {
            let hour = floor_to_hour(t);
            if times.last() == Some(&hour) {
                if let Some(sum) = values.last_mut() {
                    *sum += v;
                }
                count += 1;
            } else {
                if let Some(sum) = values.last_mut() {
                    *sum /= count as f64;
                }
                times.push(hour);
                values.push(v);
                count = 1;
            }
        }
        if let Some(sum) = values.last_mut() {
            *sum /= count as f64;
        }
        Self { times, values }
    }

    /// Keep only points at or after `start`.
    pub fn since(&self, start: NaiveDateTime) -> Self {
        let first = self.times.partition_point(|&t| t < start);
        Self {
            times: self.times[first..].to_vec(),
            values: self.values[first..].to_vec(),
        }
    }

    /// Whole hours elapsed since `start` for every point at or after `start`.
    pub fn hour_offsets(&self, start: NaiveDateTime) -> Vec<(i64, f64)> {
        self.iter()
            .filter(|(t, _)| *t >= start)
            .map(|(t, v)| ((t - start).num_hours(), v))
            .collect()
    }
}

/// Floor a timestamp to the start of its hour.
pub fn floor_to_hour(t: NaiveDateTime) -> NaiveDateTime {
    t.date().and_hms_opt(t.hour(), 0, 0).unwrap_or(t)
}

/// Simulated and observed values sharing the same timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedSeries {
    /// Shared timestamps, strictly increasing.
    pub times: Vec<NaiveDateTime>,
    /// Simulated values.
    pub simulated: Vec<f64>,
    /// Observed values.
    pub observed: Vec<f64>,
}

impl MergedSeries {
    /// Number of shared timestamps.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether no timestamps are shared.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Hours since `start` for each shared timestamp, as a sample grid.
    pub fn hours_since(&self, start: NaiveDateTime) -> Vec<f64> {
        self.times
            .iter()
            .map(|&t| (t - start).num_seconds() as f64 / 3600.0)
            .collect()
    }

    /// Drop timestamps earlier than `cutoff`.
    pub fn trim_before(&self, cutoff: NaiveDateTime) -> Self {
        let first = self.times.partition_point(|&t| t < cutoff);
        Self {
            times: self.times[first..].to_vec(),
            simulated: self.simulated[first..].to_vec(),
            observed: self.observed[first..].to_vec(),
        }
    }
}

/// Inner-join a simulated and an observed series on identical timestamps.
pub fn merge(simulated: &TimeSeries, observed: &TimeSeries) -> MergedSeries {
    let mut merged = MergedSeries::default();
    let (mut i, mut j) = (0, 0);
    while i < simulated.len() && j < observed.len() {
        let (ts, to) = (simulated.times[i], observed.times[j]);
        if ts < to {
            i += 1;
        } else if to < ts {
            j += 1;
        } else {
            merged.times.push(ts);
            merged.simulated.push(simulated.values[i]);
            merged.observed.push(observed.values[j]);
            i += 1;
            j += 1;
        }
    }
    if merged.is_empty() {
        warn!(
            simulated = simulated.len(),
            observed = observed.len(),
            "simulation and observation share no timestamps"
        );
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_new_drops_missing_values() {
        let ts = TimeSeries::new(vec![
            (at(1, 0, 0), 20.0),
            (at(1, 1, 0), f64::NAN),
            (at(1, 2, 0), 22.0),
        ])
        .unwrap();
        assert_eq!(ts.len(), 2);
        assert_eq!(ts.values(), &[20.0, 22.0]);
    }

    #[test]
    fn test_new_rejects_unordered_timestamps() {
        let result = TimeSeries::new(vec![(at(1, 2, 0), 1.0), (at(1, 1, 0), 2.0)]);
        assert_eq!(result, Err(FdaError::NonMonotonicTimestamps { index: 1 }));
        let dup = TimeSeries::new(vec![(at(1, 2, 0), 1.0), (at(1, 2, 0), 2.0)]);
        assert!(dup.is_err());
    }

    #[test]
    fn test_from_parts_length_mismatch() {
        let result = TimeSeries::from_parts(vec![at(1, 0, 0)], vec![1.0, 2.0]);
        assert_eq!(result, Err(FdaError::LengthMismatch { expected: 1, got: 2 }));
    }

    #[test]
    fn test_resample_hourly_averages_within_hour() {
        let ts = TimeSeries::new(vec![
            (at(1, 0, 0), 10.0),
            (at(1, 0, 20), 12.0),
            (at(1, 0, 40), 14.0),
            (at(1, 1, 10), 20.0),
            (at(1, 3, 30), 30.0),
        ])
        .unwrap();
        let hourly = ts.resample_hourly();
        assert_eq!(hourly.times(), &[at(1, 0, 0), at(1, 1, 0), at(1, 3, 0)]);
        assert_eq!(hourly.values(), &[12.0, 20.0, 30.0]);
    }

    #[test]
    fn test_resample_hourly_empty() {
        assert!(TimeSeries::default().resample_hourly().is_empty());
    }

    #[test]
    fn test_map_values() {
        let ts = TimeSeries::new(vec![(at(1, 0, 0), 273.15), (at(1, 1, 0), 300.15)]).unwrap();
        let celsius = ts.map_values(|k| k - 273.15);
        assert!((celsius.values()[1] - 27.0).abs() < 1e-9);
    }

    #[test]
    fn test_hour_offsets_and_since() {
        let ts = TimeSeries::new(vec![
            (at(1, 0, 0), 1.0),
            (at(1, 5, 0), 2.0),
            (at(2, 1, 0), 3.0),
        ])
        .unwrap();
        assert_eq!(ts.hour_offsets(at(1, 1, 0)), vec![(4, 2.0), (24, 3.0)]);
        assert_eq!(ts.since(at(1, 5, 0)).len(), 2);
    }

    #[test]
    fn test_merge_keeps_shared_timestamps() {
        let sim = TimeSeries::new(vec![
            (at(1, 0, 0), 11.0),
            (at(1, 1, 0), 12.0),
            (at(1, 2, 0), 13.0),
        ])
        .unwrap();
        let obs = TimeSeries::new(vec![
            (at(1, 1, 0), 10.0),
            (at(1, 2, 0), 12.5),
            (at(1, 4, 0), 9.0),
        ])
        .unwrap();
        let merged = merge(&sim, &obs);
        assert_eq!(merged.times, vec![at(1, 1, 0), at(1, 2, 0)]);
        assert_eq!(merged.simulated, vec![12.0, 13.0]);
        assert_eq!(merged.observed, vec![10.0, 12.5]);
        assert_eq!(merged.hours_since(at(1, 0, 0)), vec![1.0, 2.0]);
        assert_eq!(merged.trim_before(at(1, 2, 0)).len(), 1);
    }

    #[test]
    fn test_merge_disjoint_is_empty() {
        let sim = TimeSeries::new(vec![(at(1, 0, 0), 1.0)]).unwrap();
        let obs = TimeSeries::new(vec![(at(2, 0, 0), 1.0)]).unwrap();
        assert!(merge(&sim, &obs).is_empty());
    }
}
