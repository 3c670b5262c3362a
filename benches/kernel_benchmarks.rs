//! Benchmarks for the numerical kernels of the evaluation pipeline
//!
//! Covers:
//! - Cross-validated basis size selection
//! - Depth measures (modified band, mean distance, hypograph)
//! - K-medoids fitting and silhouette selection of k
//! - Agreement metrics

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fdaval::clustering::{select_k, KMedoidsConfig};
use fdaval::depth::{hypograph_depth, mean_distance_depth, modified_band_depth};
use fdaval::matrix::FdMatrix;
use fdaval::metric::{kendall_tau, ComparisonMetrics};
use fdaval::smoothing::select_basis_size;
use fdaval::BasisFamily;
use std::f64::consts::PI;

/// Generate `n` noisy diurnal temperature curves over `m` hours
fn generate_curves(n: usize, m: usize, noise_level: f64) -> (FdMatrix, Vec<f64>) {
    let argvals: Vec<f64> = (0..m).map(|h| h as f64).collect();
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let offset = (i % 7) as f64 - 3.0;
            argvals
                .iter()
                .enumerate()
                .map(|(j, &h)| {
                    let signal = 20.0 + offset + 6.0 * (2.0 * PI * (h - 9.0) / 24.0).sin();
                    // Deterministic pseudo-noise for reproducibility
                    let noise = noise_level * ((17.3 * (i * m + j) as f64).sin());
                    signal + noise
                })
                .collect()
        })
        .collect();
    let data = FdMatrix::from_rows(&rows).expect("rows share a length");
    (data, argvals)
}

/// Benchmark LOOCV basis size selection over the default candidate range
fn bench_basis_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("BasisSelection");

    for n in [5, 20, 50].iter() {
        let (data, argvals) = generate_curves(*n, 48, 0.3);
        group.bench_with_input(BenchmarkId::new("bspline", n), n, |b, _| {
            b.iter(|| {
                select_basis_size(
                    black_box(&data),
                    black_box(&argvals),
                    BasisFamily::BSpline,
                    4,
                    15,
                )
            })
        });
    }

    let (data, argvals) = generate_curves(20, 48, 0.3);
    group.bench_function("fourier_20", |b| {
        b.iter(|| {
            select_basis_size(
                black_box(&data),
                black_box(&argvals),
                BasisFamily::Fourier,
                4,
                15,
            )
        })
    });

    group.finish();
}

/// Benchmark the depth measures with a growing number of curves
fn bench_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("Depth");

    for n in [10, 50, 100].iter() {
        let (data, argvals) = generate_curves(*n, 72, 0.2);
        group.bench_with_input(BenchmarkId::new("modified_band", n), n, |b, _| {
            b.iter(|| modified_band_depth(black_box(&data)))
        });
        group.bench_with_input(BenchmarkId::new("mean_distance", n), n, |b, _| {
            b.iter(|| mean_distance_depth(black_box(&data)))
        });
        group.bench_with_input(BenchmarkId::new("hypograph", n), n, |b, _| {
            b.iter(|| hypograph_depth(black_box(&data), black_box(&argvals)))
        });
    }

    group.finish();
}

/// Benchmark k-medoids fitting and silhouette-driven k selection
fn bench_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("KMedoids");

    for n in [20, 50, 100].iter() {
        let (data, _) = generate_curves(*n, 48, 0.2);
        let config = KMedoidsConfig::new(3).expect("k is positive");
        group.bench_with_input(BenchmarkId::new("fit_k3", n), n, |b, _| {
            b.iter(|| config.fit(black_box(&data)))
        });
    }

    let (data, _) = generate_curves(30, 48, 0.2);
    let base = KMedoidsConfig::new(2).expect("k is positive");
    group.bench_function("select_k_30", |b| {
        b.iter(|| select_k(black_box(&data), 2, 8, &base))
    });

    group.finish();
}

/// Benchmark the agreement metrics on long series
fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("Metrics");

    for m in [48, 240, 1000].iter() {
        let (data, argvals) = generate_curves(2, *m, 0.5);
        let observed = data.row(0);
        let simulated = data.row(1);
        group.bench_with_input(BenchmarkId::new("bundle", m), m, |b, _| {
            b.iter(|| {
                ComparisonMetrics::compute(
                    black_box(&observed),
                    black_box(&simulated),
                    black_box(&argvals),
                )
            })
        });
        group.bench_with_input(BenchmarkId::new("kendall_tau", m), m, |b, _| {
            b.iter(|| kendall_tau(black_box(&observed), black_box(&simulated)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_basis_selection,
    bench_depth,
    bench_clustering,
    bench_metrics
);
criterion_main!(benches);
