//! Agreement metrics between an observed and a simulated curve.
//!
//! Every function takes `(observed, simulated)` sampled on the same grid and
//! rejects sequences of different or zero length.

use std::fmt;

use crate::error::{ensure_same_len, FdaError};
use crate::helpers::{l2_distance as weighted_l2, trapezoid_weights};

/// Root mean squared error `sqrt(mean((sim - obs)^2))`.
pub fn rmse(observed: &[f64], simulated: &[f64]) -> Result<f64, FdaError> {
    ensure_same_len(observed.len(), simulated.len())?;
    let mse = observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| (s - o) * (s - o))
        .sum::<f64>()
        / observed.len() as f64;
    Ok(mse.sqrt())
}

/// Pearson correlation coefficient.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::LengthMismatch`] | Sequences differ in length |
/// | [`FdaError::EmptyInput`] | Sequences are empty |
/// | [`FdaError::UndefinedCorrelation`] | Either sequence is constant |
pub fn pearson(observed: &[f64], simulated: &[f64]) -> Result<f64, FdaError> {
    ensure_same_len(observed.len(), simulated.len())?;
    if is_constant(observed) {
        return Err(FdaError::UndefinedCorrelation {
            reason: "observed sequence is constant",
        });
    }
    if is_constant(simulated) {
        return Err(FdaError::UndefinedCorrelation {
            reason: "simulated sequence is constant",
        });
    }
    let n = observed.len() as f64;
    let mean_o = observed.iter().sum::<f64>() / n;
    let mean_s = simulated.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_o = 0.0;
    let mut var_s = 0.0;
    for (o, s) in observed.iter().zip(simulated) {
        let (d_o, d_s) = (o - mean_o, s - mean_s);
        cov += d_o * d_s;
        var_o += d_o * d_o;
        var_s += d_s * d_s;
    }
    // Distinct values can still underflow to zero variance.
    if var_o == 0.0 || var_s == 0.0 {
        return Err(FdaError::UndefinedCorrelation {
            reason: "variance underflows",
        });
    }
    Ok((cov / (var_o.sqrt() * var_s.sqrt())).clamp(-1.0, 1.0))
}

fn is_constant(values: &[f64]) -> bool {
    values.iter().all(|&v| v == values[0])
}

/// Mean fractional bias `2 * mean((sim - obs) / (sim + obs))`.
///
/// A zero denominator yields NaN, which propagates to the result.
pub fn mean_fractional_bias(observed: &[f64], simulated: &[f64]) -> Result<f64, FdaError> {
    ensure_same_len(observed.len(), simulated.len())?;
    let sum: f64 = observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| {
            let denom = s + o;
            if denom == 0.0 {
                f64::NAN
            } else {
                (s - o) / denom
            }
        })
        .sum();
    Ok(2.0 * sum / observed.len() as f64)
}

/// Functional L2 distance on `argvals` by the trapezoidal rule.
pub fn l2_distance(
    observed: &[f64],
    simulated: &[f64],
    argvals: &[f64],
) -> Result<f64, FdaError> {
    ensure_same_len(observed.len(), simulated.len())?;
    ensure_same_len(observed.len(), argvals.len())?;
    Ok(weighted_l2(observed, simulated, &trapezoid_weights(argvals)))
}

/// Kendall rank correlation, tau-b variant (ties in either sequence are
/// accounted for in the denominator).
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`FdaError::LengthMismatch`] | Sequences differ in length |
/// | [`FdaError::EmptyInput`] | Sequences are empty |
/// | [`FdaError::UndefinedCorrelation`] | Every pair is tied in either sequence |
pub fn kendall_tau(observed: &[f64], simulated: &[f64]) -> Result<f64, FdaError> {
    ensure_same_len(observed.len(), simulated.len())?;
    let n = observed.len();
    let mut concordant = 0i64;
    let mut discordant = 0i64;
    let mut ties_o = 0i64;
    let mut ties_s = 0i64;

    for i in 0..n {
        for j in (i + 1)..n {
            let d_o = observed[i] - observed[j];
            let d_s = simulated[i] - simulated[j];
            if d_o == 0.0 && d_s == 0.0 {
                ties_o += 1;
                ties_s += 1;
            } else if d_o == 0.0 {
                ties_o += 1;
            } else if d_s == 0.0 {
                ties_s += 1;
            } else if (d_o > 0.0) == (d_s > 0.0) {
                concordant += 1;
            } else {
                discordant += 1;
            }
        }
    }

    let n_pairs = (n * n.saturating_sub(1) / 2) as i64;
    let denom = tau_b_denominator(n_pairs, ties_o, ties_s);
    if denom == 0.0 {
        return Err(FdaError::UndefinedCorrelation {
            reason: "every pair is tied",
        });
    }
    Ok((concordant - discordant) as f64 / denom)
}

/// `sqrt((n0 - n1) * (n0 - n2))`, multiplied in floating point so long
/// series do not overflow.
fn tau_b_denominator(n_pairs: i64, ties_o: i64, ties_s: i64) -> f64 {
    ((n_pairs - ties_o) as f64 * (n_pairs - ties_s) as f64).sqrt()
}

/// All agreement metrics for one observed/simulated pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonMetrics {
    /// Root mean squared error.
    pub rmse: f64,
    /// Pearson r; `None` when undefined (a constant sequence).
    pub pearson: Option<f64>,
    /// Mean fractional bias (may be NaN).
    pub mean_fractional_bias: f64,
    /// Trapezoidal L2 distance.
    pub l2_distance: f64,
    /// Kendall tau-b; `None` unless requested with [`ComparisonMetrics::with_kendall`]
    /// or when undefined.
    pub kendall_tau: Option<f64>,
}

impl ComparisonMetrics {
    /// Compute RMSE, Pearson r, MFB and L2 distance.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FdaError::LengthMismatch`] | Sequences or grid differ in length |
    /// | [`FdaError::EmptyInput`] | Sequences are empty |
    pub fn compute(
        observed: &[f64],
        simulated: &[f64],
        argvals: &[f64],
    ) -> Result<Self, FdaError> {
        let l2_distance = l2_distance(observed, simulated, argvals)?;
        let pearson = match pearson(observed, simulated) {
            Ok(r) => Some(r),
            Err(FdaError::UndefinedCorrelation { .. }) => None,
            Err(e) => return Err(e),
        };
        Ok(Self {
            rmse: rmse(observed, simulated)?,
            pearson,
            mean_fractional_bias: mean_fractional_bias(observed, simulated)?,
            l2_distance,
            kendall_tau: None,
        })
    }

    /// Add Kendall's tau to already computed metrics.
    #[must_use]
    pub fn with_kendall(mut self, observed: &[f64], simulated: &[f64]) -> Self {
        self.kendall_tau = kendall_tau(observed, simulated).ok();
        self
    }
}

fn fmt_optional(f: &mut fmt::Formatter<'_>, label: &str, value: Option<f64>) -> fmt::Result {
    match value {
        Some(v) => writeln!(f, "{}: {:.4}", label, v),
        None => writeln!(f, "{}: undefined", label),
    }
}

impl fmt::Display for ComparisonMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RMSE: {:.4}", self.rmse)?;
        fmt_optional(f, "Pearson r", self.pearson)?;
        writeln!(f, "MFB: {:.4}", self.mean_fractional_bias)?;
        writeln!(f, "L2 distance: {:.4}", self.l2_distance)?;
        if self.kendall_tau.is_some() {
            fmt_optional(f, "Kendall tau", self.kendall_tau)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBS: [f64; 5] = [10.0, 12.0, 14.0, 12.0, 10.0];
    const SIM: [f64; 5] = [11.0, 12.0, 13.0, 12.0, 11.0];

    // ============== Point metric tests ==============

    #[test]
    fn test_rmse_reference_example() {
        let r = rmse(&OBS, &SIM).unwrap();
        assert!((r - 0.6_f64.sqrt()).abs() < 1e-12, "rmse = {}", r);
    }

    #[test]
    fn test_rmse_identical_is_zero() {
        assert_eq!(rmse(&OBS, &OBS).unwrap(), 0.0);
    }

    #[test]
    fn test_pearson_reference_example() {
        let r = pearson(&OBS, &SIM).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_anticorrelated() {
        let r = pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_zero_variance() {
        assert!(matches!(
            pearson(&[5.0, 5.0, 5.0], &[1.0, 2.0, 3.0]),
            Err(FdaError::UndefinedCorrelation { .. })
        ));
        assert!(matches!(
            pearson(&[1.0, 2.0, 3.0], &[4.0, 4.0, 4.0]),
            Err(FdaError::UndefinedCorrelation { .. })
        ));
    }

    #[test]
    fn test_pearson_constant_at_large_magnitude() {
        let ramp = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        assert!(matches!(
            pearson(&[1e6 + 0.1; 7], &ramp),
            Err(FdaError::UndefinedCorrelation { .. })
        ));
        let metrics = ComparisonMetrics::compute(&[1e6 + 0.1; 7], &ramp, &ramp).unwrap();
        assert_eq!(metrics.pearson, None);
    }

    #[test]
    fn test_pearson_small_magnitude() {
        let tiny = [1e-11, 2e-11, 3e-11];
        let r = pearson(&tiny, &tiny).unwrap();
        assert!((r - 1.0).abs() < 1e-12, "r = {}", r);
    }

    #[test]
    fn test_mfb_reference_example() {
        let mfb = mean_fractional_bias(&OBS, &SIM).unwrap();
        assert!(mfb.abs() < 0.05);
        let expected = 2.0 * (1.0 / 21.0 - 1.0 / 27.0 + 1.0 / 21.0) / 5.0;
        assert!((mfb - expected).abs() < 1e-12);
    }

    #[test]
    fn test_mfb_zero_denominator_is_nan() {
        let mfb = mean_fractional_bias(&[1.0, -2.0], &[1.0, 2.0]).unwrap();
        assert!(mfb.is_nan());
    }

    #[test]
    fn test_l2_distance_trapezoid() {
        // Constant difference 1 over [0, 4]: sqrt(4).
        let d = l2_distance(&[0.0; 5], &[1.0; 5], &[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((d - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_kendall_tau() {
        let up = [1.0, 2.0, 3.0, 4.0];
        let down = [4.0, 3.0, 2.0, 1.0];
        assert!((kendall_tau(&up, &up).unwrap() - 1.0).abs() < 1e-12);
        assert!((kendall_tau(&up, &down).unwrap() + 1.0).abs() < 1e-12);
        // One discordant pair out of three, no ties.
        let tau = kendall_tau(&[1.0, 2.0, 3.0], &[1.0, 3.0, 2.0]).unwrap();
        assert!((tau - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_kendall_tau_with_ties() {
        // Pairs: (0,1) tie in obs, (0,2) concordant, (1,2) concordant.
        let tau = kendall_tau(&[1.0, 1.0, 2.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((tau - 2.0 / (2.0_f64 * 3.0).sqrt()).abs() < 1e-12);
        assert!(matches!(
            kendall_tau(&[1.0, 1.0], &[1.0, 2.0]),
            Err(FdaError::UndefinedCorrelation { .. })
        ));
    }

    #[test]
    fn test_length_and_empty_errors() {
        assert_eq!(
            rmse(&[1.0, 2.0], &[1.0]).unwrap_err(),
            FdaError::LengthMismatch { expected: 2, got: 1 }
        );
        assert_eq!(pearson(&[], &[]).unwrap_err(), FdaError::EmptyInput);
        assert_eq!(mean_fractional_bias(&[], &[]).unwrap_err(), FdaError::EmptyInput);
        assert_eq!(kendall_tau(&[], &[]).unwrap_err(), FdaError::EmptyInput);
        assert_eq!(
            l2_distance(&[1.0], &[1.0], &[0.0, 1.0]).unwrap_err(),
            FdaError::LengthMismatch { expected: 1, got: 2 }
        );
    }

    #[test]
    fn test_tau_b_denominator_long_series() {
        // 80_000 samples: the squared pair count is beyond i64::MAX.
        let n: i64 = 80_000;
        let n_pairs = n * (n - 1) / 2;
        let denom = tau_b_denominator(n_pairs, 0, 0);
        assert!((denom - n_pairs as f64).abs() / (n_pairs as f64) < 1e-12);
        let tied = tau_b_denominator(n_pairs, n_pairs / 2, 0);
        assert!(tied > 0.0 && tied < denom);
    }

    // ============== Property tests ==============

    fn sample_sequences() -> Vec<Vec<f64>> {
        let wave: Vec<f64> = (0..24).map(|i| 20.0 + 6.0 * (0.26 * i as f64).sin()).collect();
        let noisy: Vec<f64> = (0..24)
            .map(|i| 18.0 + 0.5 * i as f64 + (17.3 * i as f64).sin())
            .collect();
        let spikes: Vec<f64> = (0..24).map(|i| ((i * 7) % 5) as f64 - 2.0).collect();
        let descending: Vec<f64> = (0..24).map(|i| 100.0 - 3.0 * i as f64).collect();
        vec![wave, noisy, spikes, descending]
    }

    #[test]
    fn test_rmse_symmetric() {
        let seqs = sample_sequences();
        for x in &seqs {
            for y in &seqs {
                assert_eq!(rmse(x, y).unwrap(), rmse(y, x).unwrap());
            }
        }
    }

    #[test]
    fn test_pearson_symmetric_and_bounded() {
        let seqs = sample_sequences();
        for x in &seqs {
            for y in &seqs {
                let r = pearson(x, y).unwrap();
                assert!((r - pearson(y, x).unwrap()).abs() < 1e-12);
                assert!((-1.0..=1.0).contains(&r), "r = {}", r);
            }
        }
    }

    #[test]
    fn test_pearson_self_is_one_across_magnitudes() {
        for x in sample_sequences() {
            for scale in [1e-11, 1e-3, 1.0, 1e3, 1e6] {
                let scaled: Vec<f64> = x.iter().map(|v| v * scale).collect();
                let r = pearson(&scaled, &scaled).unwrap();
                assert!((r - 1.0).abs() < 1e-12, "scale {}: r = {}", scale, r);
                let shifted: Vec<f64> = x.iter().map(|v| v + 1e6).collect();
                assert!((pearson(&shifted, &shifted).unwrap() - 1.0).abs() < 1e-12);
            }
        }
    }

    // ============== Bundle tests ==============

    #[test]
    fn test_comparison_metrics_bundle() {
        let argvals = [0.0, 1.0, 2.0, 3.0, 4.0];
        let metrics = ComparisonMetrics::compute(&OBS, &SIM, &argvals)
            .unwrap()
            .with_kendall(&OBS, &SIM);
        assert!((metrics.rmse - 0.6_f64.sqrt()).abs() < 1e-12);
        assert!((metrics.pearson.unwrap() - 1.0).abs() < 1e-12);
        assert!(metrics.kendall_tau.is_some());
        let text = metrics.to_string();
        assert!(text.contains("RMSE: 0.7746"));
        assert!(text.contains("Kendall tau"));
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn test_comparison_metrics_constant_observation() {
        let metrics =
            ComparisonMetrics::compute(&[2.0; 3], &[1.0, 2.0, 3.0], &[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(metrics.pearson, None);
        assert!(metrics.to_string().contains("Pearson r: undefined"));
    }
}
