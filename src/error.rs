//! Error type shared by every fallible operation in the crate.

/// Errors raised while loading, smoothing, ranking, clustering or comparing curves.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FdaError {
    /// Returned when a basis size is outside `1..n_points`.
    #[error("basis size {k} is invalid for {n} sample points (need 1 <= k < n)")]
    InvalidBasisSize {
        /// The requested basis size.
        k: usize,
        /// Number of sample points in the curve.
        n: usize,
    },

    /// Returned when a correlation coefficient has no defined value.
    #[error("correlation is undefined: {reason}")]
    UndefinedCorrelation {
        /// Which input made the correlation undefined.
        reason: &'static str,
    },

    /// Returned when two sequences that must align have different lengths.
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// Returned when an operation receives no data points.
    #[error("empty input")]
    EmptyInput,

    /// Returned when a search range has its bounds reversed or out of domain.
    #[error("invalid range [{min}, {max}]: {reason}")]
    InvalidRange {
        /// Lower bound of the range.
        min: usize,
        /// Upper bound of the range.
        max: usize,
        /// Why the range was rejected.
        reason: &'static str,
    },

    /// Returned when a cluster count of zero is requested.
    #[error("k must be at least 1, got {k}")]
    InvalidK {
        /// The invalid k value provided.
        k: usize,
    },

    /// Returned when a curve set is too small for the requested operation.
    #[error("need at least {needed} curves, got {got}")]
    TooFewCurves {
        /// Minimum number of curves required.
        needed: usize,
        /// Number of curves provided.
        got: usize,
    },

    /// Returned when a flat buffer does not match its declared dimensions.
    #[error("shape mismatch: {len} values cannot fill a {rows}x{cols} layout")]
    ShapeMismatch {
        /// Number of values supplied.
        len: usize,
        /// Declared leading dimension.
        rows: usize,
        /// Declared trailing dimension.
        cols: usize,
    },

    /// Returned when timestamps are not strictly increasing.
    #[error("timestamps must be strictly increasing (violated at index {index})")]
    NonMonotonicTimestamps {
        /// Index of the first offending timestamp.
        index: usize,
    },

    /// Returned when a value that must be finite is NaN or infinite.
    #[error("non-finite value at curve {row}, point {col}")]
    NonFiniteValue {
        /// Curve index.
        row: usize,
        /// Sample index.
        col: usize,
    },

    /// Returned when no location survives curve set construction.
    #[error("curve set is empty: {reason}")]
    EmptyCurveSet {
        /// Why nothing was left.
        reason: &'static str,
    },

    /// Returned when a grid cell index lies outside the field.
    #[error("grid cell ({lat_index}, {lon_index}) is outside a {n_lat}x{n_lon} grid")]
    CellOutOfBounds {
        /// Requested latitude index.
        lat_index: usize,
        /// Requested longitude index.
        lon_index: usize,
        /// Number of latitudes.
        n_lat: usize,
        /// Number of longitudes.
        n_lon: usize,
    },

    /// Returned when a linear algebra routine fails to produce a result.
    #[error("numerical failure: {0}")]
    Numerical(&'static str),
}

/// Check that two sequences have the same, non-zero length.
pub(crate) fn ensure_same_len(expected: usize, got: usize) -> Result<(), FdaError> {
    if expected != got {
        return Err(FdaError::LengthMismatch { expected, got });
    }
    if expected == 0 {
        return Err(FdaError::EmptyInput);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_basis_size_message() {
        let err = FdaError::InvalidBasisSize { k: 10, n: 8 };
        assert_eq!(
            err.to_string(),
            "basis size 10 is invalid for 8 sample points (need 1 <= k < n)"
        );
    }

    #[test]
    fn test_ensure_same_len() {
        assert!(ensure_same_len(3, 3).is_ok());
        assert_eq!(
            ensure_same_len(3, 2),
            Err(FdaError::LengthMismatch { expected: 3, got: 2 })
        );
        assert_eq!(ensure_same_len(0, 0), Err(FdaError::EmptyInput));
    }
}
