//! Gridded simulation output and nearest-cell extraction.
//!
//! A [`GriddedField`] holds one variable on a regular latitude/longitude grid
//! over time, laid out row-major as `[time][lat][lon]`.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::error::FdaError;
use crate::timeseries::TimeSeries;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points given in degrees, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// A ground station to extract from a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    /// Location identifier.
    pub id: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// One variable over time on a latitude/longitude grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedField {
    times: Vec<NaiveDateTime>,
    lats: Vec<f64>,
    lons: Vec<f64>,
    values: Vec<f64>,
}

impl GriddedField {
    /// Wrap a row-major `[time][lat][lon]` buffer.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::EmptyInput`] | Either spatial axis is empty |
    /// | [`FdaError::ShapeMismatch`] | `values.len() != times * lats * lons` |
    pub fn new(
        times: Vec<NaiveDateTime>,
        lats: Vec<f64>,
        lons: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<Self, FdaError> {
        if lats.is_empty() || lons.is_empty() {
            return Err(FdaError::EmptyInput);
        }
        let n_cells = lats.len() * lons.len();
        if values.len() != times.len() * n_cells {
            return Err(FdaError::ShapeMismatch {
                len: values.len(),
                rows: times.len(),
                cols: n_cells,
            });
        }
        Ok(Self {
            times,
            lats,
            lons,
            values,
        })
    }

    /// Timestamps of the time axis.
    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    /// Latitude axis in degrees.
    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    /// Longitude axis in degrees.
    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    /// Cell `(lat_index, lon_index)` closest to the point by great-circle
    /// distance. Ties go to the lowest latitude index, then longitude index.
    pub fn nearest_cell(&self, lat: f64, lon: f64) -> (usize, usize) {
        let mut best = (0, 0);
        let mut best_dist = f64::INFINITY;
        for (i, &cell_lat) in self.lats.iter().enumerate() {
            for (j, &cell_lon) in self.lons.iter().enumerate() {
                let d = haversine_km(lat, lon, cell_lat, cell_lon);
                if d < best_dist {
                    best_dist = d;
                    best = (i, j);
                }
            }
        }
        debug!(lat, lon, cell = ?best, distance_km = best_dist, "nearest grid cell");
        best
    }

    /// Time series of one cell. Missing (non-finite) values are dropped.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::CellOutOfBounds`] | An index is outside the grid |
    /// | [`FdaError::NonMonotonicTimestamps`] | The time axis is not strictly increasing |
    pub fn extract_cell(&self, lat_index: usize, lon_index: usize) -> Result<TimeSeries, FdaError> {
        let (n_lat, n_lon) = (self.lats.len(), self.lons.len());
        if lat_index >= n_lat || lon_index >= n_lon {
            return Err(FdaError::CellOutOfBounds {
                lat_index,
                lon_index,
                n_lat,
                n_lon,
            });
        }
        let n_cells = n_lat * n_lon;
        let cell = lat_index * n_lon + lon_index;
        let points = self
            .times
            .iter()
            .enumerate()
            .map(|(t, &time)| (time, self.values[t * n_cells + cell]))
            .collect();
        TimeSeries::new(points)
    }

    /// Time series of the cell nearest to a point.
    pub fn extract_nearest(&self, lat: f64, lon: f64) -> Result<TimeSeries, FdaError> {
        let (i, j) = self.nearest_cell(lat, lon);
        self.extract_cell(i, j)
    }

    /// Nearest-cell series for every station, keyed by station id.
    pub fn extract_stations(
        &self,
        stations: &[Station],
    ) -> Result<BTreeMap<String, TimeSeries>, FdaError> {
        stations
            .iter()
            .map(|s| Ok((s.id.clone(), self.extract_nearest(s.lat, s.lon)?)))
            .collect()
    }
}
