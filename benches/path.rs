//! Performance benchmarks for path fits
//!
//! Run with: cargo bench

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use glmpath::{
    CscMatrix, DesignMatrix, GaussianMode, PathOptions, SolverConfig, fit_binomial, fit_gaussian,
};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_distr::Distribution;
use rand_pcg::Pcg64;

/// Generate a dense regression problem with a sparse true signal.
fn generate_problem(n: usize, p: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = Pcg64::seed_from_u64(seed);
    let normal = rand_distr::Normal::new(0.0, 0.5).expect("valid noise");
    let mut x = Array2::zeros((n, p));
    for i in 0..n {
        for j in 0..p {
            x[[i, j]] = rng.random_range(-1.0..1.0);
        }
    }
    let mut y = Array1::zeros(n);
    for i in 0..n {
        y[i] = 1.5 * x[[i, 0]] - 1.0 * x[[i, 1]] + 0.5 * x[[i, 2]] + normal.sample(&mut rng);
    }
    (x, y)
}

fn bench_gaussian_modes(c: &mut Criterion) {
    let (raw, y) = generate_problem(500, 50, 42);
    let dense = DesignMatrix::dense(raw.clone()).expect("finite design");
    let cfg = SolverConfig::default();

    let naive = PathOptions {
        nlambda: 50,
        gaussian_mode: GaussianMode::Naive,
        ..PathOptions::default()
    };
    c.bench_function("gaussian_naive_500x50", |b| {
        b.iter(|| {
            let fit = fit_gaussian(black_box(&dense), black_box(&y), &naive, &cfg, None);
            let _ = black_box(fit);
        })
    });

    let covariance = PathOptions {
        gaussian_mode: GaussianMode::Covariance,
        ..naive.clone()
    };
    c.bench_function("gaussian_covariance_500x50", |b| {
        b.iter(|| {
            let fit = fit_gaussian(black_box(&dense), black_box(&y), &covariance, &cfg, None);
            let _ = black_box(fit);
        })
    });

    let sparse = DesignMatrix::sparse(CscMatrix::from_dense(&raw));
    c.bench_function("gaussian_sparse_500x50", |b| {
        b.iter(|| {
            let fit = fit_gaussian(black_box(&sparse), black_box(&y), &naive, &cfg, None);
            let _ = black_box(fit);
        })
    });
}

fn bench_binomial(c: &mut Criterion) {
    let (raw, linear) = generate_problem(400, 30, 7);
    let x = DesignMatrix::dense(raw).expect("finite design");
    let y = Array1::from_iter(linear.iter().map(|&v| if v > 0.0 { 1.0 } else { 0.0 }));
    let cfg = SolverConfig::default();
    let options = PathOptions {
        nlambda: 40,
        ..PathOptions::default()
    };
    c.bench_function("binomial_400x30", |b| {
        b.iter(|| {
            let fit = fit_binomial(black_box(&x), black_box(&y), &options, &cfg, None);
            let _ = black_box(fit);
        })
    });
}

criterion_group!(benches, bench_gaussian_modes, bench_binomial);
criterion_main!(benches);
