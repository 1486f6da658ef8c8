//! Randomized path invariants: KKT conditions, standardization invariance,
//! sparse/dense equivalence, grid correctness and constraint respect.

use approx::assert_relative_eq;
use glmpath::{
    CscMatrix, DesignMatrix, GaussianMode, PathOptions, SolverConfig, fit_binomial,
    fit_gaussian,
};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_distr::Distribution;
use rand_pcg::Pcg64;

fn seeded_problem(n: usize, p: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = Pcg64::seed_from_u64(seed);
    let normal = rand_distr::Normal::new(0.0, 0.4).expect("valid noise");
    let mut x = Array2::zeros((n, p));
    for i in 0..n {
        for j in 0..p {
            x[[i, j]] = rng.random_range(-2.0..2.0);
        }
    }
    let mut y = Array1::zeros(n);
    for i in 0..n {
        y[i] = 0.5 + 1.2 * x[[i, 0]] - 0.9 * x[[i, 1]] + 0.4 * x[[i, 2]]
            + normal.sample(&mut rng);
    }
    (x, y)
}

fn sparse_problem(n: usize, p: usize, density: f64, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = Pcg64::seed_from_u64(seed);
    let normal = rand_distr::Normal::new(0.0, 0.3).expect("valid noise");
    let mut x = Array2::zeros((n, p));
    for i in 0..n {
        for j in 0..p {
            if rng.random_bool(density) {
                x[[i, j]] = rng.random_range(-2.0..2.0);
            }
        }
    }
    let mut y = Array1::zeros(n);
    for i in 0..n {
        y[i] = 1.0 * x[[i, 0]] - 0.8 * x[[i, 1]] + normal.sample(&mut rng);
    }
    (x, y)
}

/// KKT conditions at every recorded point of an elastic-net Gaussian path:
/// inactive gradients under the L1 threshold, active gradients stationary.
#[test]
fn gaussian_path_satisfies_kkt_conditions() {
    let (raw, y) = seeded_problem(50, 8, 101);
    let x = DesignMatrix::dense(raw.clone()).expect("finite design");
    let alpha = 0.7;
    let options = PathOptions {
        alpha,
        nlambda: 15,
        standardize: false,
        gaussian_mode: GaussianMode::Naive,
        ..PathOptions::default()
    };
    let cfg = SolverConfig {
        thresh: 1e-12,
        ..SolverConfig::default()
    };
    let fit = fit_gaussian(&x, &y, &options, &cfg, None).expect("gaussian fit");

    let n = raw.nrows();
    let p = raw.ncols();
    let w = 1.0 / n as f64;
    for m in 0..fit.lmu {
        let lam = fit.lambda[m];
        let beta = fit.coefficients(m);
        let a0 = fit.a0[m];
        // Weighted gradient of the unpenalized loss per coordinate.
        let mut g = vec![0.0; p];
        for i in 0..n {
            let mut fit_i = a0;
            for j in 0..p {
                fit_i += beta[j] * raw[[i, j]];
            }
            let r = y[i] - fit_i;
            for j in 0..p {
                g[j] += w * raw[[i, j]] * r;
            }
        }
        // The design is centered by the intercept; remove the mean term.
        let mut xbar = vec![0.0; p];
        for i in 0..n {
            for j in 0..p {
                xbar[j] += w * raw[[i, j]];
            }
        }
        let resid_mean: f64 = (0..n)
            .map(|i| {
                let mut fit_i = a0;
                for j in 0..p {
                    fit_i += beta[j] * raw[[i, j]];
                }
                w * (y[i] - fit_i)
            })
            .sum();
        for j in 0..p {
            g[j] -= xbar[j] * resid_mean;
        }

        for j in 0..p {
            if beta[j] == 0.0 {
                assert!(
                    g[j].abs() <= lam * alpha * (1.0 + 1e-6) + 1e-9,
                    "inactive KKT violated at step {m}, var {j}: |g| = {}, bound = {}",
                    g[j].abs(),
                    lam * alpha
                );
            } else {
                let stationarity =
                    g[j] - lam * (1.0 - alpha) * beta[j] - lam * alpha * beta[j].signum();
                assert!(
                    stationarity.abs() < 1e-4,
                    "active KKT violated at step {m}, var {j}: residual {stationarity}"
                );
            }
        }
    }
}

/// Rescaling one column must not change the deviance path or the active
/// set under standardization; only that coefficient rescales.
#[test]
fn standardization_makes_the_path_scale_invariant() {
    let (raw, y) = seeded_problem(40, 6, 111);
    let mut scaled = raw.clone();
    let c = 10.0;
    for i in 0..raw.nrows() {
        scaled[[i, 2]] *= c;
    }
    let x1 = DesignMatrix::dense(raw).expect("finite design");
    let x2 = DesignMatrix::dense(scaled).expect("finite design");

    let options = PathOptions {
        alpha: 0.9,
        nlambda: 20,
        standardize: true,
        gaussian_mode: GaussianMode::Naive,
        ..PathOptions::default()
    };
    let cfg = SolverConfig {
        thresh: 1e-12,
        ..SolverConfig::default()
    };
    let base = fit_gaussian(&x1, &y, &options, &cfg, None).expect("base fit");
    let rescaled = fit_gaussian(&x2, &y, &options, &cfg, None).expect("rescaled fit");

    assert_eq!(base.lmu, rescaled.lmu);
    for m in 0..base.lmu {
        assert_relative_eq!(base.lambda[m], rescaled.lambda[m], max_relative = 1e-10);
        assert_relative_eq!(
            base.dev_ratio[m],
            rescaled.dev_ratio[m],
            epsilon = 1e-8,
            max_relative = 1e-6
        );
        let b1 = base.coefficients(m);
        let b2 = rescaled.coefficients(m);
        for j in 0..6 {
            let expected = if j == 2 { b1[j] / c } else { b1[j] };
            assert_relative_eq!(b2[j], expected, epsilon = 1e-8, max_relative = 1e-5);
            assert_eq!(
                b1[j] != 0.0,
                b2[j] != 0.0,
                "active sets must match at step {m}, var {j}"
            );
        }
    }
}

/// The same design encoded dense and CSC produces the same path.
#[test]
fn sparse_and_dense_designs_agree() {
    let (raw, y) = sparse_problem(60, 10, 0.1, 121);
    let dense = DesignMatrix::dense(raw.clone()).expect("finite design");
    let sparse = DesignMatrix::sparse(CscMatrix::from_dense(&raw));

    let cfg = SolverConfig {
        thresh: 1e-12,
        ..SolverConfig::default()
    };
    // Force the same bookkeeping on both sides so only the storage differs.
    let options = PathOptions {
        alpha: 1.0,
        nlambda: 20,
        gaussian_mode: GaussianMode::Naive,
        ..PathOptions::default()
    };
    let df = fit_gaussian(&dense, &y, &options, &cfg, None).expect("dense fit");
    let sf = fit_gaussian(&sparse, &y, &options, &cfg, None).expect("sparse fit");

    assert_eq!(df.lmu, sf.lmu);
    for m in 0..df.lmu {
        assert_relative_eq!(df.lambda[m], sf.lambda[m], max_relative = 1e-12);
        let bd = df.coefficients(m);
        let bs = sf.coefficients(m);
        for j in 0..10 {
            assert_relative_eq!(bd[j], bs[j], epsilon = 1e-6, max_relative = 1e-6);
        }
    }

    // Same check through the binomial family.
    let ybin = Array1::from_iter(y.iter().map(|&v| if v > 0.0 { 1.0 } else { 0.0 }));
    let bin_options = PathOptions {
        alpha: 1.0,
        nlambda: 12,
        ..PathOptions::default()
    };
    let dbf = fit_binomial(&dense, &ybin, &bin_options, &cfg, None).expect("dense binomial");
    let sbf = fit_binomial(&sparse, &ybin, &bin_options, &cfg, None).expect("sparse binomial");
    assert_eq!(dbf.lmu, sbf.lmu);
    for m in 0..dbf.lmu {
        let bd = dbf.coefficients(m);
        let bs = sbf.coefficients(m);
        for j in 0..10 {
            assert_relative_eq!(bd[j], bs[j], epsilon = 1e-6, max_relative = 1e-5);
        }
    }
}

/// The first grid value keeps every penalized coefficient at zero, and any
/// slightly smaller value activates at least one variable.
#[test]
fn lambda_max_is_tight() {
    let (raw, y) = seeded_problem(50, 6, 131);
    let x = DesignMatrix::dense(raw).expect("finite design");
    let options = PathOptions {
        alpha: 1.0,
        nlambda: 10,
        ..PathOptions::default()
    };
    let cfg = SolverConfig::default();
    let fit = fit_gaussian(&x, &y, &options, &cfg, None).expect("gaussian fit");

    assert_eq!(fit.nin[0], 0, "entry column must be the null model");
    for j in 0..6 {
        assert_eq!(fit.coefficients(0)[j], 0.0);
    }

    // Step just below the entry value: something must activate.
    let probe = PathOptions {
        lambdas: Some(vec![fit.lambda[0] * 0.99]),
        ..options
    };
    let probe_fit = fit_gaussian(&x, &y, &probe, &cfg, None).expect("probe fit");
    assert!(
        probe_fit.df(0) > 0,
        "lambda just under lambda_max must admit a variable"
    );
}

/// Box constraints clamp every coefficient at every step, and a zero-width
/// side pins coefficients to one sign.
#[test]
fn box_constraints_are_respected() {
    let (raw, y) = seeded_problem(50, 6, 141);
    let x = DesignMatrix::dense(raw).expect("finite design");
    let cap = 0.05;
    let options = PathOptions {
        alpha: 1.0,
        nlambda: 15,
        lower_limits: Some(Array1::from_elem(6, -cap)),
        upper_limits: Some(Array1::from_elem(6, cap)),
        ..PathOptions::default()
    };
    let fit = fit_gaussian(&x, &y, &options, &SolverConfig::default(), None)
        .expect("boxed fit");
    for m in 0..fit.lmu {
        let b = fit.coefficients(m);
        for j in 0..6 {
            assert!(
                (-cap - 1e-12..=cap + 1e-12).contains(&b[j]),
                "coefficient escaped the box at step {m}, var {j}: {}",
                b[j]
            );
        }
    }

    // Non-negative fit: the known-negative coefficient stays at zero.
    let nonneg = PathOptions {
        lower_limits: Some(Array1::zeros(6)),
        upper_limits: None,
        ..options
    };
    let nonneg_fit = fit_gaussian(&x, &y, &nonneg, &SolverConfig::default(), None)
        .expect("non-negative fit");
    for m in 0..nonneg_fit.lmu {
        let b = nonneg_fit.coefficients(m);
        for j in 0..6 {
            assert!(b[j] >= 0.0, "negative coefficient under a zero lower bound");
        }
    }
}

/// An unpenalized coordinate enters the model at the very first lambda.
#[test]
fn unpenalized_coordinates_are_always_active() {
    let (raw, y) = seeded_problem(50, 6, 151);
    let x = DesignMatrix::dense(raw).expect("finite design");
    let mut vp = Array1::ones(6);
    vp[0] = 0.0;
    let options = PathOptions {
        alpha: 1.0,
        nlambda: 10,
        penalty_factors: Some(vp),
        ..PathOptions::default()
    };
    let fit = fit_gaussian(&x, &y, &options, &SolverConfig::default(), None)
        .expect("unpenalized fit");
    let b0 = fit.coefficients(0);
    assert!(
        b0[0] != 0.0,
        "the unpenalized coordinate should be nonzero at lambda_max"
    );
    for j in 1..6 {
        assert_eq!(b0[j], 0.0, "penalized coordinates stay zero at lambda_max");
    }
}
