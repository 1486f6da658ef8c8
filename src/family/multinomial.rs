//! Multinomial family: symmetric multilogit probabilities and per-class
//! working responses.

use ndarray::Array2;

use crate::config::SolverConfig;
use crate::error::PathError;

/// Maximum fixed-point steps for the null intercepts under an offset.
const NULL_CYCLE_STEPS: usize = 50;

/// Multinomial family over an n x K indicator (or fractional) response.
pub(crate) struct MultinomialModel<'a> {
    /// Class memberships; each row sums to one.
    pub y: &'a Array2<f64>,
    /// Normalized observation weights.
    pub w: &'a [f64],
    /// Optional per-observation, per-class offset.
    pub offset: Option<&'a Array2<f64>>,
    /// Grouped mode: one L2-penalized block per variable, with the 1/4
    /// curvature bound shared by all classes.
    pub grouped: bool,
}

impl MultinomialModel<'_> {
    /// Number of classes.
    pub fn nclasses(&self) -> usize {
        self.y.ncols()
    }

    /// Offset for observation `i`, class `k`.
    pub fn offset_at(&self, i: usize, k: usize) -> f64 {
        self.offset.map_or(0.0, |o| o[[i, k]])
    }

    /// Null intercepts on the symmetric multilogit scale (mean zero).
    pub fn null_intercepts(
        &self,
        intercept: bool,
        cfg: &SolverConfig,
    ) -> Result<Vec<f64>, PathError> {
        let nc = self.nclasses();
        if !intercept {
            return Ok(vec![0.0; nc]);
        }
        if self.offset.is_none() {
            let mut a0 = Vec::with_capacity(nc);
            for k in 0..nc {
                let qk: f64 = self
                    .y
                    .column(k)
                    .iter()
                    .zip(self.w)
                    .map(|(yik, wi)| wi * yik)
                    .sum();
                a0.push(qk.clamp(cfg.pmin, 1.0 - cfg.pmin).ln());
            }
            center(&mut a0);
            return Ok(a0);
        }
        // With offsets the intercepts have no closed form; cycle per-class
        // Newton steps on the intercept-only model.
        let n = self.y.nrows();
        let mut a0 = vec![0.0; nc];
        let mut eta = Array2::zeros((n, nc));
        for _ in 0..NULL_CYCLE_STEPS {
            for i in 0..n {
                for k in 0..nc {
                    eta[[i, k]] = a0[k] + self.offset_at(i, k);
                }
            }
            let probs = self.probabilities(&eta, cfg);
            let mut max_step = 0.0f64;
            for k in 0..nc {
                let mut score = 0.0;
                let mut info = 0.0;
                for i in 0..n {
                    let p = probs[[i, k]];
                    score += self.w[i] * (self.y[[i, k]] - p);
                    info += self.w[i] * p * (1.0 - p);
                }
                if info > cfg.pmin {
                    let step = score / info;
                    a0[k] += step;
                    max_step = max_step.max(step.abs());
                }
            }
            center(&mut a0);
            if max_step < 1e-10 {
                break;
            }
        }
        if a0.iter().any(|v| !v.is_finite()) {
            return Err(PathError::Validation(
                "Null multinomial fit diverged; response may be degenerate".to_string(),
            ));
        }
        Ok(a0)
    }

    /// Row-wise softmax probabilities, clipped away from 0 and 1.
    pub fn probabilities(&self, eta: &Array2<f64>, cfg: &SolverConfig) -> Array2<f64> {
        let (n, nc) = eta.dim();
        let mut probs = Array2::zeros((n, nc));
        for i in 0..n {
            let row = eta.row(i);
            let m = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mut total = 0.0;
            for k in 0..nc {
                let e = (eta[[i, k]] - m).exp();
                probs[[i, k]] = e;
                total += e;
            }
            for k in 0..nc {
                probs[[i, k]] = (probs[[i, k]] / total).clamp(cfg.pmin, 1.0 - cfg.pmin);
            }
        }
        probs
    }

    /// Working weights and residual for one class at fixed probabilities.
    pub fn working_class(&self, k: usize, probs: &Array2<f64>) -> (Vec<f64>, Vec<f64>) {
        let n = self.y.nrows();
        let mut wt = Vec::with_capacity(n);
        let mut resid = Vec::with_capacity(n);
        for i in 0..n {
            let p = probs[[i, k]];
            let v = if self.grouped { 0.25 } else { p * (1.0 - p) };
            wt.push(self.w[i] * v);
            resid.push(self.w[i] * (self.y[[i, k]] - p));
        }
        (wt, resid)
    }

    /// Multinomial deviance `-2 sum_ik w_i y_ik ln p_ik`.
    pub fn deviance(&self, probs: &Array2<f64>) -> f64 {
        let (n, nc) = probs.dim();
        let mut dev = 0.0;
        for i in 0..n {
            for k in 0..nc {
                let yik = self.y[[i, k]];
                if yik > 0.0 {
                    dev -= 2.0 * self.w[i] * yik * probs[[i, k]].ln();
                }
            }
        }
        dev
    }
}

fn center(a0: &mut [f64]) {
    let mean = a0.iter().sum::<f64>() / a0.len() as f64;
    for v in a0 {
        *v -= mean;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn probabilities_are_a_row_stochastic_softmax() {
        let y = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let w = [0.5, 0.5];
        let fam = MultinomialModel {
            y: &y,
            w: &w,
            offset: None,
            grouped: false,
        };
        let cfg = SolverConfig::default();
        let eta = array![[0.0, 0.0, 0.0], [1.0, 0.0, -1.0]];
        let probs = fam.probabilities(&eta, &cfg);
        for i in 0..2 {
            let total: f64 = probs.row(i).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        }
        assert_relative_eq!(probs[[0, 0]], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn null_intercepts_recover_class_frequencies() {
        let y = array![
            [1.0, 0.0],
            [1.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0]
        ];
        let w = [0.25; 4];
        let fam = MultinomialModel {
            y: &y,
            w: &w,
            offset: None,
            grouped: false,
        };
        let cfg = SolverConfig::default();
        let a0 = fam.null_intercepts(true, &cfg).expect("valid response");
        assert_relative_eq!(a0[0] + a0[1], 0.0, epsilon = 1e-12);
        // Softmax of the intercepts reproduces the class frequencies.
        let p0 = a0[0].exp() / (a0[0].exp() + a0[1].exp());
        assert_relative_eq!(p0, 0.75, epsilon = 1e-9);
    }
}
