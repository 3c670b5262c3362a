//! Numerical helpers: integration weights and curve distances.

/// Small epsilon for numerical comparisons (e.g., avoiding division by zero).
pub const NUMERICAL_EPS: f64 = 1e-10;

/// Composite trapezoidal integration weights for a (possibly non-uniform) grid.
///
/// # Arguments
/// * `argvals` - Grid points (evaluation points)
///
/// # Returns
/// One weight per grid point; `sum(w_i * f_i)` approximates the integral of `f`.
pub fn trapezoid_weights(argvals: &[f64]) -> Vec<f64> {
    let n = argvals.len();
    if n < 2 {
        return vec![1.0; n];
    }

    let mut weights = vec![0.0; n];
    weights[0] = (argvals[1] - argvals[0]) / 2.0;
    weights[n - 1] = (argvals[n - 1] - argvals[n - 2]) / 2.0;
    for i in 1..(n - 1) {
        weights[i] = (argvals[i + 1] - argvals[i - 1]) / 2.0;
    }
    weights
}

/// Weighted L2 distance between two curves.
///
/// With `weights` from [`trapezoid_weights`] this is the functional L2 distance
/// `sqrt(integral (c1 - c2)^2)` over the grid.
pub fn l2_distance(curve1: &[f64], curve2: &[f64], weights: &[f64]) -> f64 {
    curve1
        .iter()
        .zip(curve2)
        .zip(weights)
        .map(|((a, b), w)| {
            let diff = a - b;
            diff * diff * w
        })
        .sum::<f64>()
        .sqrt()
}

/// Plain Euclidean distance between two sampled curve vectors.
pub fn euclidean_distance(curve1: &[f64], curve2: &[f64]) -> f64 {
    curve1
        .iter()
        .zip(curve2)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt()
}

/// Index of the maximum value, ties broken by lowest index. NaN never wins.
pub(crate) fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some(b) if values[b] >= v => {}
            _ => best = Some(i),
        }
    }
    best
}
