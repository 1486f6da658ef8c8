//! Binomial, Poisson and multinomial path behavior.

use approx::assert_relative_eq;
use glmpath::{
    DesignMatrix, NewtonKind, PathOptions, SolverConfig, fit_binomial, fit_multinomial,
    fit_poisson,
};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_distr::Distribution;
use rand_pcg::Pcg64;

fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

fn seeded_design(n: usize, p: usize, seed: u64) -> Array2<f64> {
    let mut rng = Pcg64::seed_from_u64(seed);
    let mut x = Array2::zeros((n, p));
    for i in 0..n {
        for j in 0..p {
            x[[i, j]] = rng.random_range(-1.5..1.5);
        }
    }
    x
}

fn bernoulli_response(x: &Array2<f64>, beta: &[f64], intercept: f64, seed: u64) -> Array1<f64> {
    let mut rng = Pcg64::seed_from_u64(seed);
    let n = x.nrows();
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut eta = intercept;
        for (j, &b) in beta.iter().enumerate() {
            eta += b * x[[i, j]];
        }
        y[i] = if rng.random_bool(sigmoid(eta)) { 1.0 } else { 0.0 };
    }
    y
}

/// Binomial lasso: deviance fraction climbs along the path, the grid
/// descends, and fitted probabilities stay strictly inside (0, 1).
#[test]
fn binomial_path_is_monotone_and_bounded() {
    let x_raw = seeded_design(100, 5, 21);
    let y = bernoulli_response(&x_raw, &[1.4, -1.0, 0.0, 0.0, 0.6], -0.2, 22);
    let x = DesignMatrix::dense(x_raw.clone()).expect("finite design");

    let options = PathOptions {
        alpha: 1.0,
        nlambda: 25,
        ..PathOptions::default()
    };
    let cfg = SolverConfig::default();
    let fit = fit_binomial(&x, &y, &options, &cfg, None).expect("binomial fit");

    assert!(fit.lmu >= 2, "path should record several steps");
    for m in 1..fit.lmu {
        assert!(
            fit.lambda[m] < fit.lambda[m - 1],
            "lambda grid must strictly decrease"
        );
        assert!(
            fit.dev_ratio[m] >= fit.dev_ratio[m - 1] - 1e-6,
            "deviance fraction must not decrease: step {m}"
        );
    }

    // Fitted probabilities at the end of the path stay off the boundary.
    let b = fit.coefficients(fit.lmu - 1);
    let a0 = fit.a0[fit.lmu - 1];
    for i in 0..x_raw.nrows() {
        let mut eta = a0;
        for j in 0..x_raw.ncols() {
            eta += b[j] * x_raw[[i, j]];
        }
        let p = sigmoid(eta);
        assert!(
            (cfg.pmin..=1.0 - cfg.pmin).contains(&p),
            "fitted probability {p} escaped the clipping range"
        );
    }

    // The strongest true effects carry the right signs at the path end.
    assert!(b[0] > 0.0, "beta[0] should be positive, got {}", b[0]);
    assert!(b[1] < 0.0, "beta[1] should be negative, got {}", b[1]);
}

/// Exact and modified Newton weights reach the same optimum.
#[test]
fn binomial_newton_modes_agree() {
    let x_raw = seeded_design(80, 4, 31);
    let y = bernoulli_response(&x_raw, &[1.0, -0.8, 0.4, 0.0], 0.1, 32);
    let x = DesignMatrix::dense(x_raw).expect("finite design");

    let grid: Vec<f64> = (0..10).map(|i| 0.2 * 0.6f64.powi(i)).collect();
    // The quarter-bound weights converge linearly, not quadratically, so
    // give the reweighting loop a generous budget at this threshold.
    let cfg = SolverConfig {
        thresh: 1e-11,
        mxitnr: 500,
        ..SolverConfig::default()
    };
    let exact_options = PathOptions {
        alpha: 1.0,
        lambdas: Some(grid.clone()),
        ..PathOptions::default()
    };
    let modified_options = PathOptions {
        newton: NewtonKind::Modified,
        ..exact_options.clone()
    };

    let exact = fit_binomial(&x, &y, &exact_options, &cfg, None).expect("exact fit");
    let modified = fit_binomial(&x, &y, &modified_options, &cfg, None).expect("modified fit");

    assert_eq!(exact.lmu, modified.lmu);
    for m in 0..exact.lmu {
        let be = exact.coefficients(m);
        let bm = modified.coefficients(m);
        for j in 0..4 {
            assert_relative_eq!(be[j], bm[j], epsilon = 5e-4, max_relative = 5e-3);
        }
    }
}

/// Poisson lasso: monotone deviance and sign recovery, with the offset
/// acting as a log-exposure shift.
#[test]
fn poisson_path_recovers_structure() {
    let mut rng = Pcg64::seed_from_u64(41);
    let x_raw = seeded_design(150, 4, 42);
    let n = x_raw.nrows();
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let eta: f64 = 0.4 + 0.8 * x_raw[[i, 0]] - 0.6 * x_raw[[i, 1]];
        let sampler = rand_distr::Poisson::new(eta.exp()).expect("positive mean");
        y[i] = sampler.sample(&mut rng);
    }
    let x = DesignMatrix::dense(x_raw).expect("finite design");

    let options = PathOptions {
        alpha: 1.0,
        nlambda: 25,
        ..PathOptions::default()
    };
    let fit = fit_poisson(&x, &y, &options, &SolverConfig::default(), None)
        .expect("poisson fit");

    assert!(fit.lmu >= 2);
    for m in 1..fit.lmu {
        assert!(fit.lambda[m] < fit.lambda[m - 1]);
        assert!(
            fit.dev_ratio[m] >= fit.dev_ratio[m - 1] - 1e-6,
            "deviance fraction must not decrease: step {m}"
        );
    }

    let b = fit.coefficients(fit.lmu - 1);
    assert!(b[0] > 0.0, "beta[0] should be positive, got {}", b[0]);
    assert!(b[1] < 0.0, "beta[1] should be negative, got {}", b[1]);
}

/// A constant offset shifts the Poisson intercept by the same amount.
#[test]
fn poisson_offset_shifts_the_intercept() {
    let mut rng = Pcg64::seed_from_u64(51);
    let x_raw = seeded_design(100, 3, 52);
    let n = x_raw.nrows();
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let eta: f64 = 0.5 + 0.7 * x_raw[[i, 0]];
        let sampler = rand_distr::Poisson::new(eta.exp()).expect("positive mean");
        y[i] = sampler.sample(&mut rng);
    }
    let x = DesignMatrix::dense(x_raw).expect("finite design");
    let cfg = SolverConfig {
        thresh: 1e-11,
        ..SolverConfig::default()
    };

    let grid: Vec<f64> = (0..8).map(|i| 0.3 * 0.5f64.powi(i)).collect();
    let plain_options = PathOptions {
        alpha: 1.0,
        lambdas: Some(grid.clone()),
        ..PathOptions::default()
    };
    let shifted_options = PathOptions {
        offset: Some(Array1::from_elem(n, 0.9)),
        ..plain_options.clone()
    };

    let plain = fit_poisson(&x, &y, &plain_options, &cfg, None).expect("plain fit");
    let shifted = fit_poisson(&x, &y, &shifted_options, &cfg, None).expect("offset fit");

    assert_eq!(plain.lmu, shifted.lmu);
    for m in 0..plain.lmu {
        assert_relative_eq!(
            plain.a0[m] - 0.9,
            shifted.a0[m],
            epsilon = 1e-4,
            max_relative = 1e-3
        );
        let bp = plain.coefficients(m);
        let bs = shifted.coefficients(m);
        for j in 0..3 {
            assert_relative_eq!(bp[j], bs[j], epsilon = 1e-4, max_relative = 1e-3);
        }
    }
}

fn multinomial_data(n: usize, p: usize, seed: u64) -> (Array2<f64>, Array2<f64>) {
    let mut rng = Pcg64::seed_from_u64(seed);
    let x = seeded_design(n, p, seed.wrapping_add(1));
    let betas = [
        [1.2, -0.4, 0.0],
        [-0.8, 0.9, 0.0],
        [0.0, -0.5, 0.6],
    ];
    let mut y = Array2::zeros((n, 3));
    for i in 0..n {
        let mut eta = [0.0f64; 3];
        for (k, row) in betas.iter().enumerate() {
            for (j, &b) in row.iter().enumerate().take(p.min(3)) {
                eta[k] += b * x[[i, j]];
            }
        }
        let m = eta.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = eta.iter().map(|e| (e - m).exp()).collect();
        let total: f64 = weights.iter().sum();
        let draw: f64 = rng.random_range(0.0..total);
        let mut acc = 0.0;
        let mut class = 2;
        for (k, wk) in weights.iter().enumerate() {
            acc += wk;
            if draw < acc {
                class = k;
                break;
            }
        }
        y[[i, class]] = 1.0;
    }
    (x, y)
}

/// Multinomial lasso: monotone deviance, descending grid, and a sane
/// coefficient layout.
#[test]
fn multinomial_path_is_monotone() {
    let (x_raw, y) = multinomial_data(120, 5, 61);
    let x = DesignMatrix::dense(x_raw).expect("finite design");

    let options = PathOptions {
        alpha: 1.0,
        nlambda: 20,
        ..PathOptions::default()
    };
    let fit = fit_multinomial(&x, &y, &options, &SolverConfig::default(), None)
        .expect("multinomial fit");

    assert_eq!(fit.nclasses, 3);
    assert!(fit.lmu >= 2);
    for m in 1..fit.lmu {
        assert!(fit.lambda[m] < fit.lambda[m - 1]);
        assert!(
            fit.dev_ratio[m] >= fit.dev_ratio[m - 1] - 1e-6,
            "deviance fraction must not decrease: step {m}"
        );
    }

    let b = fit.coefficients(fit.lmu - 1);
    assert_eq!(b.dim(), (5, 3));
    // Intercepts stay near-centered on the symmetric multilogit scale; the
    // updates of the final reweighting cycle may drift them slightly.
    for m in 0..fit.lmu {
        let total: f64 = fit.a0[m].iter().sum();
        assert_relative_eq!(total, 0.0, epsilon = 0.05);
    }
}

/// Grouped multinomial: a variable's class block is zero or nonzero as a
/// unit.
#[test]
fn grouped_multinomial_zeroes_blocks_jointly() {
    let (x_raw, y) = multinomial_data(120, 6, 71);
    let x = DesignMatrix::dense(x_raw).expect("finite design");

    let options = PathOptions {
        alpha: 1.0,
        nlambda: 20,
        grouped: true,
        ..PathOptions::default()
    };
    let fit = fit_multinomial(&x, &y, &options, &SolverConfig::default(), None)
        .expect("grouped fit");

    for m in 1..fit.lmu {
        assert!(
            fit.dev_ratio[m] >= fit.dev_ratio[m - 1] - 1e-6,
            "deviance fraction must not decrease: step {m}"
        );
    }

    // Early in the path some variables must be inactive while others have a
    // whole nonzero block; a block is never only partially shrunk to zero
    // from the group threshold alone (box constraints are absent here).
    let m_probe = fit.lmu / 2;
    let b = fit.coefficients(m_probe);
    let mut saw_zero_block = false;
    let mut saw_live_block = false;
    for j in 0..6 {
        let norm: f64 = (0..3).map(|k| b[[j, k]] * b[[j, k]]).sum::<f64>().sqrt();
        if norm == 0.0 {
            saw_zero_block = true;
        } else {
            saw_live_block = true;
        }
    }
    assert!(saw_live_block, "mid-path fit should have active blocks");
    assert!(
        saw_zero_block || fit.nin[m_probe] == 6,
        "mid-path fit should shrink some blocks entirely"
    );
}
